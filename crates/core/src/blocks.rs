//! Fixed memory block ids (section 6 "External interfaces")
//!
//! The frontend addresses engine memory through a small set of reserved
//! block ids whose readability/writability varies by callback phase. The
//! backend treats all of these as opaque; this table exists so that
//! tooling built on top of this crate (tests, debug dumps, an eventual
//! frontend) has one place to look the symbolic names up, not because any
//! pass inspects it.

/// The id of the scratch region that `passes::allocate` assigns temp blocks
/// into (section 4.15).
pub const SCRATCH_BLOCK_ID: u32 = 10000;

/// The scratch region is at most this many cells (section 3 invariant).
pub const SCRATCH_CAPACITY: u32 = 4096;

/// The callback phase a compilation unit executes under. Readability and
/// writability of fixed blocks is phase-dependent (section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Play,
    Watch,
    Preview,
    Tutorial,
}

pub const ALL_PHASES: [Phase; 4] = [Phase::Play, Phase::Watch, Phase::Preview, Phase::Tutorial];

/// A fixed, reserved memory block with defined read/write semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedBlock {
    RuntimeEnvironment,
    RuntimeUpdate,
    SkinTransform,
    ParticleTransform,
    Background,
    Ui,
    UiConfiguration,
    LevelMemory,
    LevelData,
    LevelOption,
    LevelBucket,
    LevelScore,
    LevelLife,
    EngineRom,
    EntityMemory,
    EntityData,
    EntityShared,
    EntityInfo,
    EntityDespawn,
    EntityInput,
    EntityMemoryArray,
    EntityDataArray,
    EntitySharedArray,
    EntityInfoArray,
    EntityDespawnArray,
    EntityInputArray,
    ArchetypeLife,
}

impl FixedBlock {
    /// The numeric block id. Stable for the lifetime of the toolchain; never
    /// collides with [`SCRATCH_BLOCK_ID`].
    pub fn id(self) -> u32 {
        use FixedBlock::*;
        match self {
            RuntimeEnvironment => 1,
            RuntimeUpdate => 2,
            SkinTransform => 3,
            ParticleTransform => 4,
            Background => 5,
            Ui => 6,
            UiConfiguration => 7,
            LevelMemory => 8,
            LevelData => 9,
            LevelOption => 10,
            LevelBucket => 11,
            LevelScore => 12,
            LevelLife => 13,
            EngineRom => 14,
            EntityMemory => 15,
            EntityData => 16,
            EntityShared => 17,
            EntityInfo => 18,
            EntityDespawn => 19,
            EntityInput => 20,
            EntityMemoryArray => 21,
            EntityDataArray => 22,
            EntitySharedArray => 23,
            EntityInfoArray => 24,
            EntityDespawnArray => 25,
            EntityInputArray => 26,
            ArchetypeLife => 27,
        }
    }

    /// True when `phase` may read this block.
    pub fn readable_in(self, phase: Phase) -> bool {
        use FixedBlock::*;
        use Phase::*;
        match self {
            // The engine ROM and runtime environment are readable everywhere.
            EngineRom | RuntimeEnvironment => true,
            // Entity/archetype memory does not exist outside gameplay phases.
            EntityMemory | EntityData | EntityShared | EntityInfo | EntityDespawn
            | EntityInput | EntityMemoryArray | EntityDataArray | EntitySharedArray
            | EntityInfoArray | EntityDespawnArray | EntityInputArray | ArchetypeLife => {
                matches!(phase, Play | Watch | Preview)
            }
            LevelScore | LevelLife => matches!(phase, Play | Watch),
            _ => true,
        }
    }

    /// True when `phase` may write this block.
    pub fn writable_in(self, phase: Phase) -> bool {
        use FixedBlock::*;
        use Phase::*;
        match self {
            // ROM is never writable: it is loaded, not produced, by callbacks.
            EngineRom => false,
            RuntimeEnvironment => false,
            RuntimeUpdate | SkinTransform | ParticleTransform | Background | Ui
            | UiConfiguration => matches!(phase, Play | Watch | Preview | Tutorial),
            LevelScore | LevelLife => phase == Play,
            EntityMemory | EntityData | EntityDespawn | EntityMemoryArray | EntityDataArray
            | EntityDespawnArray => matches!(phase, Play | Watch),
            EntityShared | EntityInfo | EntityInput | EntitySharedArray | EntityInfoArray
            | EntityInputArray | ArchetypeLife => matches!(phase, Play | Watch | Preview),
            LevelMemory | LevelData | LevelOption | LevelBucket => matches!(phase, Play | Watch),
        }
    }
}
