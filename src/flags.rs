//! Session-level recording, imaging, and blanking option flags.
//!
//! A session requests work with a set of [`BurnFlags`]; plugins declare which
//! flag combinations they support and which they require. Three masks carve
//! the flag space into the subsets each plugin table is consulted with.

use bitflags::bitflags;

bitflags! {
    /// Options a session may request for recording, imaging, and blanking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BurnFlags: u32 {
        /// Eject the medium when the operation completes.
        const EJECT = 1 << 0;
        /// Skip the simulation pass normally run before a real burn.
        const NO_SIMULATE_CHECK = 1 << 1;
        /// Simulate the burn without writing anything.
        const DUMMY = 1 << 2;
        /// Disc-at-once write mode.
        const DAO = 1 << 3;
        /// Raw write mode (full 2448-byte sectors).
        const RAW = 1 << 4;
        /// Buffer-underrun protection.
        const BURNPROOF = 1 << 5;
        /// Allow writing past the medium's nominal capacity.
        const OVERBURN = 1 << 6;
        /// Leave the session open so more sessions can be appended.
        const MULTI = 1 << 7;
        /// Merge the new session with data already on the medium.
        const MERGE = 1 << 8;
        /// Append the new session after existing sessions.
        const APPEND = 1 << 9;
        /// Blank the medium before writing to it.
        const BLANK_BEFORE_WRITE = 1 << 10;
        /// Use the quick variant when blanking.
        const FAST_BLANK = 1 << 11;
        /// Pipe data between stages instead of staging temporary files.
        const NO_TMP_FILES = 1 << 12;
        /// Verify that the data fits on the medium before starting.
        const CHECK_SIZE = 1 << 13;
    }
}

impl BurnFlags {
    /// Flags meaningful to a recording plugin. Plugin burn tables are only
    /// ever consulted with the session flags masked down to this set.
    pub const BURN_MASK: Self = Self::EJECT
        .union(Self::NO_SIMULATE_CHECK)
        .union(Self::DUMMY)
        .union(Self::DAO)
        .union(Self::RAW)
        .union(Self::BURNPROOF)
        .union(Self::OVERBURN)
        .union(Self::MULTI)
        .union(Self::MERGE)
        .union(Self::APPEND);

    /// Flags meaningful to an imaging plugin.
    pub const IMAGE_MASK: Self = Self::APPEND.union(Self::MERGE);

    /// Flags meaningful to a blanking plugin. `BLANK_BEFORE_WRITE` is not
    /// here: whether to blank at all is a session-level decision, not a
    /// blanking-plugin option.
    pub const BLANK_MASK: Self = Self::EJECT
        .union(Self::NO_SIMULATE_CHECK)
        .union(Self::DUMMY)
        .union(Self::FAST_BLANK);
}

/// The outcome of a flag negotiation: what the reachable plugin set can do
/// and what it insists on.
///
/// The negotiator maintains `compulsory ⊆ supported` as an invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSet {
    /// Union of every flag some qualifying plugin chain supports.
    pub supported: BurnFlags,
    /// Intersection of the flags every qualifying plugin chain requires.
    pub compulsory: BurnFlags,
}

impl FlagSet {
    /// An empty set: nothing supported, nothing required.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another negotiation result into this one.
    ///
    /// Supported flags accumulate as a union; compulsory flags narrow as an
    /// intersection.
    pub fn merge(&mut self, other: FlagSet) {
        self.supported |= other.supported;
        self.compulsory &= other.compulsory;
    }

    /// Re-establish `compulsory ⊆ supported` after removing supported bits.
    pub fn normalize(&mut self) {
        self.compulsory &= self.supported;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_are_disjoint_from_blank_specifics() {
        assert!(!BurnFlags::BURN_MASK.contains(BurnFlags::BLANK_BEFORE_WRITE));
        assert!(!BurnFlags::BURN_MASK.contains(BurnFlags::FAST_BLANK));
        assert!(BurnFlags::BLANK_MASK.contains(BurnFlags::FAST_BLANK));
    }

    #[test]
    fn test_flag_set_merge() {
        let mut acc = FlagSet {
            supported: BurnFlags::DAO,
            compulsory: BurnFlags::DAO,
        };
        acc.merge(FlagSet {
            supported: BurnFlags::RAW | BurnFlags::DAO,
            compulsory: BurnFlags::empty(),
        });
        assert_eq!(acc.supported, BurnFlags::DAO | BurnFlags::RAW);
        assert_eq!(acc.compulsory, BurnFlags::empty());
    }

    #[test]
    fn test_flag_set_normalize() {
        let mut set = FlagSet {
            supported: BurnFlags::DAO,
            compulsory: BurnFlags::DAO | BurnFlags::MULTI,
        };
        set.normalize();
        assert_eq!(set.compulsory, BurnFlags::DAO);
    }
}
