//! Small newtypes shared across the engine.

use derive_more::{Add, AddAssign, Sub};

/// Capacity of the probe table (spec §3: `MAX_PROBES = 256`).
pub const MAX_PROBES: usize = 256;

/// A hop count / TTL value, always in `1..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Add, Sub, AddAssign)]
pub struct Hops(pub u8);

impl Hops {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(255);

    #[must_use]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

/// Identifier of a probe: an index into the probe table.
///
/// Dense id space with capacity [`MAX_PROBES`] (spec §3): ids are reused
/// across runs of the engine but never within one, since the table is
/// never shrunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId(pub u16);

impl ProbeId {
    #[must_use]
    pub fn as_index(self) -> usize {
        usize::from(self.0)
    }
}

impl From<ProbeId> for u16 {
    fn from(id: ProbeId) -> Self {
        id.0
    }
}
