//! Per-medium flag capability tables.
//!
//! Plugins accumulate `(supported, compulsory)` flag pairs against concrete
//! media over repeated registration calls. Lookup merges every pair that can
//! accommodate the session's current flags: supported flags union, compulsory
//! flags intersect.

use crate::flags::{BurnFlags, FlagSet};
use crate::medium::Media;

/// One registered capability: what the plugin can do on a medium and what it
/// insists on when it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagPair {
    /// Flags the plugin can honour.
    pub supported: BurnFlags,
    /// Flags the plugin requires to be set.
    pub compulsory: BurnFlags,
}

/// Pairs registered for one concrete medium.
#[derive(Debug, Clone, Default)]
struct FlagNode {
    media: Media,
    pairs: Vec<FlagPair>,
}

/// A table mapping concrete media to their registered flag pairs.
///
/// Registration expands media class masks into atoms (see
/// [`Media::expand`]); lookup matches the first node whose media is a
/// superset of the queried medium.
#[derive(Debug, Clone, Default)]
pub struct FlagTable {
    nodes: Vec<FlagNode>,
}

impl FlagTable {
    /// Whether nothing was ever registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Register a flag pair for every atomic medium covered by `media`.
    ///
    /// A pair already subsumed by an existing one for that medium (both its
    /// supported and compulsory sets covered) is dropped.
    pub fn add(&mut self, media: Media, supported: BurnFlags, compulsory: BurnFlags) {
        for atom in media.expand() {
            let node = match self.nodes.iter_mut().find(|n| n.media == atom) {
                Some(node) => node,
                None => {
                    self.nodes.push(FlagNode {
                        media: atom,
                        pairs: Vec::new(),
                    });
                    self.nodes.last_mut().unwrap()
                }
            };
            let subsumed = node
                .pairs
                .iter()
                .any(|p| p.supported.contains(supported) && p.compulsory.contains(compulsory));
            if !subsumed {
                node.pairs.push(FlagPair {
                    supported,
                    compulsory,
                });
            }
        }
    }

    /// Whether any node covers the given medium.
    pub fn matches_media(&self, media: Media) -> bool {
        self.pairs_for(media).is_some()
    }

    fn pairs_for(&self, media: Media) -> Option<&[FlagPair]> {
        self.nodes
            .iter()
            .find(|n| n.media.contains(media))
            .map(|n| n.pairs.as_slice())
    }

    /// Merge every pair for `media` that accommodates the `current` flags.
    ///
    /// A pair qualifies when `current` is a subset of its supported set and,
    /// if `check_compulsory` is requested, `current` also covers the pair's
    /// masked compulsory set. Returns `None` when no pair qualifies.
    pub fn all_flags(
        &self,
        media: Media,
        mask: BurnFlags,
        current: BurnFlags,
        check_compulsory: bool,
    ) -> Option<FlagSet> {
        let pairs = self.pairs_for(media)?;
        let mut supported = BurnFlags::empty();
        let mut compulsory = BurnFlags::all() & mask;
        let mut found = false;
        for pair in pairs {
            if !pair.supported.contains(current) {
                continue;
            }
            let masked = pair.compulsory & mask;
            if check_compulsory && !current.contains(masked) {
                continue;
            }
            supported |= pair.supported & mask;
            compulsory &= masked;
            found = true;
        }
        found.then_some(FlagSet {
            supported,
            compulsory,
        })
    }

    /// Whether the table can accommodate `current` on `media`, compulsory
    /// flags included.
    pub fn supports(&self, media: Media, mask: BurnFlags, current: BurnFlags) -> bool {
        self.all_flags(media, mask, current, true).is_some()
    }
}
