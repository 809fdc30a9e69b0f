//! Addressable storage (section 3 "Places")
//!
//! Three shapes of place exist and only three: a reference into a numbered
//! fixed memory block, a named abstract temp-block region, and a versioned
//! SSA register. Every pass matches on `Place` exhaustively rather than
//! probing which shape it got, see the "Tagged unions vs. dispatch" design
//! note.

use std::rc::Rc;

/// A reference to cell `index + offset` of fixed memory block `block_id`.
///
/// Before allocation, temp blocks are *not* `BlockPlace`s; `block_id` here is
/// always one of the fixed ids in [`crate::blocks::FixedBlock`] or, after
/// allocation, the scratch block [`crate::blocks::SCRATCH_BLOCK_ID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPlace {
    pub block_id: u32,
    pub index: u32,
    pub offset: u32,
}

impl BlockPlace {
    pub fn new(block_id: u32, index: u32, offset: u32) -> Self {
        BlockPlace {
            block_id,
            index,
            offset,
        }
    }

    /// The resolved cell address within the block.
    pub fn cell(&self) -> u32 {
        self.index + self.offset
    }
}

/// A named abstract storage region of `size` cells.
///
/// `size == 1` temps are scalars and are eligible for SSA promotion
/// (section 4.6); `size > 1` temps are arrays whose elements alias and stay
/// out of SSA for the lifetime of the compilation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TempPlace {
    pub name: Rc<str>,
    pub size: u32,
}

impl TempPlace {
    pub fn new(name: impl Into<Rc<str>>, size: u32) -> Self {
        assert!(size >= 1, "temp block size must be at least 1");
        TempPlace {
            name: name.into(),
            size,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.size == 1
    }
}

/// A versioned virtual register produced by SSA construction (section 4.6).
///
/// Only ever exists between `ToSSA` and `FromSSA`; see the invariant in
/// section 3 that after `FromSSA` no `SsaPlace` survives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SsaPlace {
    pub name: Rc<str>,
    pub version: u32,
}

impl SsaPlace {
    pub fn new(name: impl Into<Rc<str>>, version: u32) -> Self {
        SsaPlace {
            name: name.into(),
            version,
        }
    }

    /// The sentinel place substituted for a use with no defined version on an
    /// unreachable path (section 4.6, section 9 Open Question ii). Lattice
    /// and inliner treat this as permanently non-constant; no real path may
    /// observe its value.
    pub fn sentinel() -> Self {
        SsaPlace::new("err", 0)
    }

    pub fn is_sentinel(&self) -> bool {
        &*self.name == "err" && self.version == 0
    }

    /// The temp-block name this SSA place retires to during `FromSSA`:
    /// `"{name}.{version}"` (section 4.7).
    pub fn retired_temp_name(&self) -> String {
        format!("{}.{}", self.name, self.version)
    }
}

/// The closed union of addressable storage (section 3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Place {
    Block(BlockPlace),
    Temp(TempPlace),
    Ssa(SsaPlace),
}

impl From<BlockPlace> for Place {
    fn from(p: BlockPlace) -> Self {
        Place::Block(p)
    }
}

impl From<TempPlace> for Place {
    fn from(p: TempPlace) -> Self {
        Place::Temp(p)
    }
}

impl From<SsaPlace> for Place {
    fn from(p: SsaPlace) -> Self {
        Place::Ssa(p)
    }
}

impl Place {
    pub fn as_temp(&self) -> Option<&TempPlace> {
        match self {
            Place::Temp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_ssa(&self) -> Option<&SsaPlace> {
        match self {
            Place::Ssa(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockPlace> {
        match self {
            Place::Block(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_round_trips() {
        let s = SsaPlace::sentinel();
        assert!(s.is_sentinel());
        assert!(!SsaPlace::new("x", 0).is_sentinel());
    }

    #[test]
    fn retired_temp_name_is_dotted() {
        let s = SsaPlace::new("x", 3);
        assert_eq!(s.retired_temp_name(), "x.3");
    }

    #[test]
    fn block_place_cell_adds_offset() {
        let p = BlockPlace::new(10000, 4, 16);
        assert_eq!(p.cell(), 20);
    }
}
