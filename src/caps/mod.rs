//! The capability graph.
//!
//! Nodes ([`Caps`]) describe classes of producible artifacts; edges
//! ([`CapsLink`]) say which plugins can produce a node's artifact from
//! another node's. Plugins populate the graph through a
//! [`RegistryBuilder`] during startup; the frozen [`Registry`] is what every
//! resolution and negotiation call reads.
//!
//! # Node splitting
//!
//! Registration works in capability classes ("any writable CD", "ISO or
//! Joliet filesystems"). When a new registration only partially overlaps an
//! existing node, the node is split so that, at all times, the nodes of one
//! track tag partition the capability space requested so far. Splitting
//! replicates edges, modifiers, and checksum references onto the new node,
//! so earlier registrations keep their meaning.

mod node;
mod registry;

pub use node::{Caps, CapsId, CapsLink, CapsTest, CapsTestLink, ChecksumKind, IoFlags};
pub use registry::{Registry, RegistryBuilder};
