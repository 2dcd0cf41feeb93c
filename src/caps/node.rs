//! Capability graph nodes and edges.

use crate::plugin::PluginId;
use crate::track::{TrackTag, TrackType};
use bitflags::bitflags;
use smallvec::SmallVec;

bitflags! {
    /// How an artifact of a capability node can be consumed or produced.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoFlags: u8 {
        /// The artifact can live in a regular file.
        const ACCEPT_FILE = 1 << 0;
        /// The artifact can be streamed through a pipe.
        const ACCEPT_PIPE = 1 << 1;
    }
}

/// Identifier of a capability node inside a registry.
///
/// Ids are arena indices: they stay valid for the life of the registry, the
/// sorted traversal order is kept separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapsId(pub(crate) usize);

impl CapsId {
    /// Get the underlying index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A directed edge: the owning (output) node can be produced from `target`
/// by any of `plugins`.
///
/// A `None` target marks a blanking-only edge — the owning node's medium can
/// be erased by the listed plugins, nothing is produced.
#[derive(Debug, Clone)]
pub struct CapsLink {
    pub(crate) target: Option<CapsId>,
    pub(crate) plugins: SmallVec<[PluginId; 4]>,
}

impl CapsLink {
    /// The input node this edge transforms from, `None` for blanking edges.
    pub fn target(&self) -> Option<CapsId> {
        self.target
    }

    /// Plugins able to realize this edge.
    pub fn plugins(&self) -> &[PluginId] {
        &self.plugins
    }
}

/// One class of producible artifact: a track type, its I/O acceptance, its
/// production edges, and the modifiers that can process it in place.
#[derive(Debug, Clone)]
pub struct Caps {
    pub(crate) track: TrackType,
    pub(crate) io: IoFlags,
    pub(crate) links: Vec<CapsLink>,
    pub(crate) modifiers: SmallVec<[PluginId; 4]>,
}

impl Caps {
    pub(crate) fn new(track: TrackType, io: IoFlags) -> Self {
        Self {
            track,
            io,
            links: Vec::new(),
            modifiers: SmallVec::new(),
        }
    }

    /// The artifact type this node stands for.
    pub fn track(&self) -> &TrackType {
        &self.track
    }

    /// The node's I/O acceptance. Disc nodes carry no I/O flags.
    pub fn io(&self) -> IoFlags {
        self.io
    }

    /// Production edges of this node.
    pub fn links(&self) -> &[CapsLink] {
        &self.links
    }

    /// Modifier plugins registered on this node.
    pub fn modifiers(&self) -> &[PluginId] {
        &self.modifiers
    }

    /// Ordering key: discs sort before streams before images before data;
    /// discs break ties by kind, DVD subtype, attribute, status, then info
    /// bits, the other tags by subtype bits then I/O flags. The order only
    /// stabilizes "first matching node" selection.
    pub(crate) fn sort_key(&self) -> (TrackTag, u32, u32, u32, u32, u32) {
        match self.track {
            TrackType::Disc(media) => (
                TrackTag::Disc,
                media.kinds().bits(),
                media.subtypes().bits(),
                media.attributes().bits(),
                media.status().bits(),
                media.info().bits(),
            ),
            _ => (
                self.track.tag(),
                self.track.subtype_bits(),
                self.io.bits() as u32,
                0,
                0,
                0,
            ),
        }
    }
}

/// The checksum algorithms the planner knows how to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumKind {
    /// MD5 digests.
    Md5,
    /// SHA-1 digests.
    Sha1,
    /// SHA-256 digests.
    Sha256,
}

/// An edge from the checksum table to a node whose content an algorithm can
/// process.
#[derive(Debug, Clone)]
pub struct CapsTestLink {
    pub(crate) target: CapsId,
    pub(crate) plugins: SmallVec<[PluginId; 4]>,
}

impl CapsTestLink {
    /// The node this checksum edge covers.
    pub fn target(&self) -> CapsId {
        self.target
    }

    /// Plugins implementing the algorithm for that node.
    pub fn plugins(&self) -> &[PluginId] {
        &self.plugins
    }
}

/// Checksum capability table entry: one algorithm and the nodes it covers.
#[derive(Debug, Clone)]
pub struct CapsTest {
    pub(crate) kind: ChecksumKind,
    pub(crate) links: Vec<CapsTestLink>,
}

impl CapsTest {
    /// The checksum algorithm.
    pub fn kind(&self) -> ChecksumKind {
        self.kind
    }

    /// Edges to the nodes this algorithm can process.
    pub fn links(&self) -> &[CapsTestLink] {
        &self.links
    }
}
