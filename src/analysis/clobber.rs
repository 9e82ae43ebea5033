//! Clobber query: which abstract locations an instruction may write.
//!
//! Interference analysis needs to know, for every node, which stack slots
//! its execution can store to. The answer is a sequence of
//! [`AbstractLocation`]s: identified slots where possible, and a generic
//! whole-stack location when the write cannot be pinned down. Consumers
//! must treat [`AbstractLocation::EntireStack`] as overlapping every slot -
//! the conservative reading the pass's soundness depends on.
//!
//! Heap effects are deliberately not reported: the pass only reasons about
//! aliasing with call-frame stack storage, and no heap write can alias a
//! stack slot.

use crate::ir::{Graph, NodeId, Op, VirtualRegister};

/// A memory location an instruction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractLocation {
    /// A single identified stack slot.
    Stack(VirtualRegister),
    /// An unidentified write somewhere in the stack region; overlaps
    /// every slot.
    EntireStack,
}

/// Invokes `f` for every stack location `node` may write.
pub fn for_each_write<F>(graph: &Graph, node: NodeId, mut f: F)
where
    F: FnMut(AbstractLocation),
{
    match graph.node(node).op() {
        Op::PutStack { access } => {
            f(AbstractLocation::Stack(
                graph.stack_access_data(*access).register,
            ));
        }
        Op::KillStack { register } => {
            f(AbstractLocation::Stack(*register));
        }
        // A variadic load stores the argument count and up to `limit`
        // argument values into its reserved slot range.
        Op::LoadVarargs { data } | Op::ForwardVarargs { data } => {
            f(AbstractLocation::Stack(data.count_register));
            for offset in 0..data.limit {
                f(AbstractLocation::Stack(data.start.offset_by(offset)));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GraphBuilder, Op, ValueFormat, VarargsData, VirtualRegister};

    #[test]
    fn test_put_stack_writes_its_slot() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let value = b.int32(entry, 1).unwrap();
        b.ret(entry, Some(value)).unwrap();
        let mut graph = b.finish().unwrap();

        let access = graph.stack_access(VirtualRegister::new(5), ValueFormat::JsValue);
        let origin = graph.node(value).origin();
        let put = graph.new_node(
            Op::PutStack { access },
            vec![crate::ir::Edge::untyped(value)],
            origin,
        );

        let mut writes = Vec::new();
        for_each_write(&graph, put, |loc| writes.push(loc));
        assert_eq!(
            writes,
            vec![AbstractLocation::Stack(VirtualRegister::new(5))]
        );
    }

    #[test]
    fn test_load_varargs_writes_count_and_range() {
        let mut b = GraphBuilder::new(1, 16);
        let entry = b.block();
        let value = b.int32(entry, 1).unwrap();
        b.ret(entry, Some(value)).unwrap();
        let mut graph = b.finish().unwrap();

        let data = VarargsData {
            start: VirtualRegister::new(8),
            count_register: VirtualRegister::new(7),
            limit: 3,
            first_vararg_offset: 0,
        };
        let origin = graph.node(value).origin();
        let load = graph.new_node(
            Op::LoadVarargs { data },
            vec![crate::ir::Edge::untyped(value)],
            origin,
        );

        let mut slots = Vec::new();
        for_each_write(&graph, load, |loc| match loc {
            AbstractLocation::Stack(reg) => slots.push(reg.index()),
            AbstractLocation::EntireStack => panic!("identified writes expected"),
        });
        assert_eq!(slots, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_reads_do_not_write() {
        let mut b = GraphBuilder::new(1, 8);
        let entry = b.block();
        let value = b.int32(entry, 1).unwrap();
        let copy = b.add(entry, Op::Identity, vec![value]).unwrap();
        b.ret(entry, Some(copy)).unwrap();
        let graph = b.finish().unwrap();

        let mut any = false;
        for_each_write(&graph, copy, |_| any = true);
        assert!(!any);
    }
}
