//! Canonical structure registry.
//!
//! Every heap object carries a structure describing its shape. The
//! allocations the elision pass understands all use *canonical* structures
//! owned by the global object - a direct-arguments object allocated in a
//! given global always has the direct-arguments structure of that global.
//! The registry interns one [`StructureId`] per canonical shape so a
//! [`CheckStructure`](crate::ir::Op::CheckStructure) against an eliminated
//! allocation can be matched exactly: if the checked set contains the
//! candidate's canonical structure, the check is statically known to pass.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use crate::ir::IndexingType;

/// Unique identifier for an interned structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructureId(u32);

impl StructureId {
    /// Returns the underlying table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "structure{}", self.0)
    }
}

/// The canonical shapes the registry can intern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureKind {
    /// The direct-arguments object of the global.
    DirectArguments,
    /// The cloned-arguments object of the global.
    ClonedArguments,
    /// A rest-parameter array with the given storage representation.
    RestArray(IndexingType),
    /// An array literal with the given storage representation.
    ArrayLiteral(IndexingType),
}

/// Interns canonical structures per shape.
#[derive(Debug, Default)]
pub struct StructureRegistry {
    interned: RefCell<HashMap<StructureKind, StructureId>>,
}

impl StructureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical structure for a shape, interning it on first
    /// use. Repeated requests for the same shape return the same id.
    pub fn canonical(&self, kind: StructureKind) -> StructureId {
        let mut interned = self.interned.borrow_mut();
        let next = StructureId(u32::try_from(interned.len()).expect("structure table overflow"));
        *interned.entry(kind).or_insert(next)
    }
}

/// A small set of admissible structures carried by a structure check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StructureSet(Vec<StructureId>);

impl StructureSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a set holding a single structure.
    #[must_use]
    pub fn single(id: StructureId) -> Self {
        Self(vec![id])
    }

    /// Adds a structure to the set.
    pub fn add(&mut self, id: StructureId) {
        if !self.0.contains(&id) {
            self.0.push(id);
        }
    }

    /// Returns `true` if the set contains the structure.
    #[must_use]
    pub fn contains(&self, id: StructureId) -> bool {
        self.0.contains(&id)
    }

    /// Returns the number of structures in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the structures.
    pub fn iter(&self) -> impl Iterator<Item = StructureId> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<StructureId>> for StructureSet {
    fn from(ids: Vec<StructureId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.add(id);
        }
        set
    }
}
