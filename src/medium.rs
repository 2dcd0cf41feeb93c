//! Physical medium description and the drive query boundary.
//!
//! A [`Media`] value is a bitmask over five independent dimensions: the
//! medium kind (CD/DVD/BD), its write attribute (ROM / write-once /
//! rewritable), the DVD recording subtype, its status (blank / appendable /
//! closed), and content info bits. A mask with several bits per dimension
//! describes a *class* of media ("any writable CD"); a mask with one bit per
//! dimension describes a concrete medium as reported by a drive.

use bitflags::bitflags;

bitflags! {
    /// Medium class bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Media: u32 {
        // Kind
        /// Compact disc family.
        const CD = 1 << 0;
        /// DVD family.
        const DVD = 1 << 1;
        /// Blu-ray family.
        const BD = 1 << 2;

        // Write attribute
        /// Pressed, read-only medium.
        const ROM = 1 << 3;
        /// Write-once medium (-R / +R / BD-R).
        const WRITABLE = 1 << 4;
        /// Rewritable medium (-RW / +RW / BD-RE / RAM).
        const REWRITABLE = 1 << 5;

        // DVD recording subtype
        /// Plus-format DVD (+R / +RW).
        const PLUS = 1 << 6;
        /// Dash-format DVD in sequential recording mode.
        const SEQUENTIAL = 1 << 7;
        /// Dash-format DVD-RW in restricted overwrite mode.
        const RESTRICTED = 1 << 8;
        /// DVD-RAM random-access medium.
        const RAM = 1 << 9;
        /// Dual-layer variant.
        const DUAL_LAYER = 1 << 10;

        // Status
        /// Nothing written yet.
        const BLANK = 1 << 11;
        /// An open session can still be appended to.
        const APPENDABLE = 1 << 12;
        /// The medium is finalized.
        const CLOSED = 1 << 13;

        // Info
        /// The medium carries a data track.
        const HAS_DATA = 1 << 14;
        /// The medium carries audio tracks.
        const HAS_AUDIO = 1 << 15;
        /// The medium needs formatting before use.
        const UNFORMATTED = 1 << 16;
        /// The medium is write-protected.
        const PROTECTED = 1 << 17;
    }
}

impl Media {
    /// All kind bits.
    pub const ALL_KINDS: Self = Self::CD.union(Self::DVD).union(Self::BD);
    /// All write-attribute bits.
    pub const ALL_ATTRIBUTES: Self = Self::ROM.union(Self::WRITABLE).union(Self::REWRITABLE);
    /// All DVD-subtype bits.
    pub const ALL_SUBTYPES: Self = Self::PLUS
        .union(Self::SEQUENTIAL)
        .union(Self::RESTRICTED)
        .union(Self::RAM)
        .union(Self::DUAL_LAYER);
    /// All status bits.
    pub const ALL_STATUS: Self = Self::BLANK.union(Self::APPENDABLE).union(Self::CLOSED);
    /// All info bits.
    pub const ALL_INFO: Self = Self::HAS_DATA
        .union(Self::HAS_AUDIO)
        .union(Self::UNFORMATTED)
        .union(Self::PROTECTED);

    /// A write-once CD.
    pub const CD_R: Self = Self::CD.union(Self::WRITABLE);
    /// A rewritable CD.
    pub const CD_RW: Self = Self::CD.union(Self::REWRITABLE);
    /// A write-once dash-format DVD.
    pub const DVD_R: Self = Self::DVD.union(Self::WRITABLE).union(Self::SEQUENTIAL);
    /// A rewritable dash-format DVD in sequential recording mode.
    pub const DVD_RW: Self = Self::DVD.union(Self::REWRITABLE).union(Self::SEQUENTIAL);
    /// A DVD-RW in restricted overwrite mode.
    pub const DVD_RW_RESTRICTED: Self =
        Self::DVD.union(Self::REWRITABLE).union(Self::RESTRICTED);
    /// A write-once plus-format DVD.
    pub const DVD_R_PLUS: Self = Self::DVD.union(Self::WRITABLE).union(Self::PLUS);
    /// A rewritable plus-format DVD.
    pub const DVD_RW_PLUS: Self = Self::DVD.union(Self::REWRITABLE).union(Self::PLUS);
    /// A DVD-RAM.
    pub const DVD_RAM: Self = Self::DVD.union(Self::REWRITABLE).union(Self::RAM);
    /// A write-once Blu-ray.
    pub const BD_R: Self = Self::BD.union(Self::WRITABLE);
    /// A rewritable Blu-ray.
    pub const BD_RE: Self = Self::BD.union(Self::REWRITABLE);

    /// Kind bits of this mask.
    pub fn kinds(self) -> Self {
        self & Self::ALL_KINDS
    }

    /// Write-attribute bits of this mask.
    pub fn attributes(self) -> Self {
        self & Self::ALL_ATTRIBUTES
    }

    /// DVD-subtype bits of this mask.
    pub fn subtypes(self) -> Self {
        self & Self::ALL_SUBTYPES
    }

    /// Status bits of this mask.
    pub fn status(self) -> Self {
        self & Self::ALL_STATUS
    }

    /// Info bits of this mask.
    pub fn info(self) -> Self {
        self & Self::ALL_INFO
    }

    /// Whether this mask describes a DVD-RW in sequential recording mode.
    ///
    /// This medium class gets special treatment from the flag negotiator: a
    /// fast blank only erases its TOC, which is incompatible with keeping
    /// the disc appendable.
    pub fn is_dvd_rw_sequential(self) -> bool {
        self.contains(Self::DVD_RW) && !self.intersects(Self::PLUS | Self::RESTRICTED | Self::RAM)
    }

    /// The same medium, pretended blank: content and openness bits cleared,
    /// `BLANK` set. Used by the blanking-retry search.
    pub fn as_blanked(self) -> Self {
        let cleared = self
            - (Self::CLOSED | Self::APPENDABLE | Self::UNFORMATTED | Self::HAS_DATA | Self::HAS_AUDIO);
        cleared | Self::BLANK
    }

    /// Decompose a class mask into the concrete media it covers.
    ///
    /// An atom carries one kind bit, one attribute bit, one DVD-subtype
    /// class (for DVDs), and one status bit; `DUAL_LAYER` and info bits ride
    /// along. `HAS_DATA`/`HAS_AUDIO` are dropped from atoms whose status is
    /// `BLANK`.
    pub fn expand(self) -> Vec<Media> {
        let kinds = [Self::CD, Self::DVD, Self::BD];
        let attributes = [Self::ROM, Self::WRITABLE, Self::REWRITABLE];
        let subtype_classes = [Self::PLUS, Self::SEQUENTIAL, Self::RESTRICTED, Self::RAM];
        let statuses = [Self::BLANK, Self::APPENDABLE, Self::CLOSED];

        let mut atoms = Vec::new();
        let dual = self & Self::DUAL_LAYER;
        let info = self.info();

        for &kind in kinds.iter().filter(|&&k| self.contains(k)) {
            let subtypes: Vec<Media> = if kind == Self::DVD {
                let present: Vec<Media> = subtype_classes
                    .iter()
                    .copied()
                    .filter(|&s| self.contains(s))
                    .collect();
                if present.is_empty() {
                    vec![Self::empty()]
                } else {
                    present
                }
            } else {
                vec![Self::empty()]
            };

            for &attribute in attributes.iter().filter(|&&a| self.contains(a)) {
                for &subtype in &subtypes {
                    // RAM media are rewritable only
                    if subtype == Self::RAM && attribute != Self::REWRITABLE {
                        continue;
                    }
                    let statuses_present: Vec<Media> = statuses
                        .iter()
                        .copied()
                        .filter(|&s| self.contains(s))
                        .collect();
                    let statuses_present = if statuses_present.is_empty() {
                        vec![Self::empty()]
                    } else {
                        statuses_present
                    };
                    for status in statuses_present {
                        let mut atom = kind | attribute | subtype | dual | status | info;
                        if status == Self::BLANK {
                            atom -= Self::HAS_DATA | Self::HAS_AUDIO;
                        }
                        atoms.push(atom);
                    }
                }
            }
        }
        atoms
    }
}

/// Capability queries against the drive holding the destination medium.
///
/// This is the single boundary where the planner consults hardware state;
/// only the drive-refinement step of the flag negotiator uses it.
pub trait MediumInfo {
    /// The medium currently loaded, as a concrete [`Media`] value.
    fn media(&self) -> Media;

    /// Whether the drive can write media of the given class at all.
    fn can_write_media(&self, media: Media) -> bool;

    /// Session-at-once write support.
    fn supports_sao(&self) -> bool;

    /// Track-at-once write support.
    fn supports_tao(&self) -> bool;

    /// Simulated session-at-once write support.
    fn supports_dummy_sao(&self) -> bool;

    /// Simulated track-at-once write support.
    fn supports_dummy_tao(&self) -> bool;

    /// Buffer-underrun protection availability.
    fn supports_burnproof(&self) -> bool;

    /// Whether the loaded medium cannot be written without blanking first.
    fn must_blank_before_write(&self) -> bool;
}
