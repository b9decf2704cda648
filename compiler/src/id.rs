// id.rs — Stable arena indices for IR entities.
//
// Operations and values live in per-function arenas and are referenced by
// these indices everywhere else. Indices stay valid across rewrites: an
// erased operation leaves its arena slot in place, so a rewrite never
// invalidates an outstanding OpId or ValueId.

/// Stable index of an operation in a function body's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

/// Stable index of a value in a function body's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl OpId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
