//! The capability registry: build phase and query phase.
//!
//! Plugins register what they can produce from what during startup; the
//! result is a graph of [`Caps`] nodes connected by [`CapsLink`] edges. The
//! build phase may split existing nodes when a new registration only
//! partially overlaps them; once [`RegistryBuilder::build`] runs, the graph
//! structure is frozen and every resolution call reads it concurrently.
//! Only plugin activation/error state stays mutable on the frozen registry.

use super::node::{Caps, CapsId, CapsLink, CapsTest, CapsTestLink, ChecksumKind, IoFlags};
use crate::medium::Media;
use crate::plugin::{GroupId, Plugin, PluginId};
use crate::track::{FsFlags, ImageFormats, StreamFormats, TrackType};
use smallvec::smallvec;

/// Mutable registration phase of the capability registry.
///
/// All node creation, splitting, and edge registration happens here;
/// [`build`](Self::build) yields the read-mostly [`Registry`] the planner
/// queries.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    caps: Vec<Caps>,
    order: Vec<CapsId>,
    tests: Vec<CapsTest>,
    plugins: Vec<Plugin>,
    groups: Vec<String>,
}

impl RegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin's fact record.
    pub fn register_plugin(&mut self, plugin: Plugin) -> PluginId {
        self.plugins.push(plugin);
        PluginId(self.plugins.len() - 1)
    }

    /// Mutable access to a registered plugin, for follow-up fact calls.
    pub fn plugin_mut(&mut self, id: PluginId) -> &mut Plugin {
        &mut self.plugins[id.0]
    }

    /// Register (or look up) a plugin group by name.
    pub fn register_group(&mut self, name: &str) -> GroupId {
        if let Some(pos) = self.groups.iter().position(|g| g == name) {
            return GroupId(pos);
        }
        self.groups.push(name.to_string());
        GroupId(self.groups.len() - 1)
    }

    /// Nodes covering a class of physical media: one node per concrete
    /// medium the mask expands to.
    ///
    /// Media bits are dimensional (kind, attribute, status), so disc nodes
    /// are keyed by atom instead of going through subtype splitting — two
    /// different media share bits without one containing the other.
    pub fn get_or_create_disc_caps(&mut self, media: Media) -> Vec<CapsId> {
        let mut retval = Vec::new();
        for atom in media.expand() {
            let existing = self
                .order
                .iter()
                .copied()
                .find(|&id| matches!(self.caps[id.0].track, TrackType::Disc(m) if m == atom));
            let id = match existing {
                Some(id) => id,
                None => self.insert_caps(Caps::new(TrackType::Disc(atom), IoFlags::empty())),
            };
            if !retval.contains(&id) {
                retval.push(id);
            }
        }
        self.resort();
        retval
    }

    /// Nodes covering image formats with the given I/O acceptance.
    pub fn get_or_create_image_caps(&mut self, io: IoFlags, formats: ImageFormats) -> Vec<CapsId> {
        self.get_or_create(TrackType::Image(formats), io, true)
    }

    /// Nodes covering stream formats with the given I/O acceptance.
    pub fn get_or_create_stream_caps(&mut self, io: IoFlags, formats: StreamFormats) -> Vec<CapsId> {
        self.get_or_create(TrackType::Stream(formats), io, true)
    }

    /// Nodes covering data filesystems. Data artifacts always live in files.
    pub fn get_or_create_data_caps(&mut self, fs: FsFlags) -> Vec<CapsId> {
        self.get_or_create(TrackType::Data(fs), IoFlags::ACCEPT_FILE, false)
    }

    /// Record that each node in `outputs` can be produced from each node in
    /// `inputs` by `plugin`.
    ///
    /// Self-links are dropped; an existing (output, input) edge only gains
    /// the plugin, once.
    pub fn register_link(&mut self, outputs: &[CapsId], inputs: &[CapsId], plugin: PluginId) {
        for &out in outputs {
            for &input in inputs {
                if out == input {
                    tracing::trace!(caps = out.0, "dropping self-link");
                    continue;
                }
                let links = &mut self.caps[out.0].links;
                match links.iter_mut().find(|l| l.target == Some(input)) {
                    Some(link) => {
                        if !link.plugins.contains(&plugin) {
                            link.plugins.push(plugin);
                        }
                    }
                    None => links.push(CapsLink {
                        target: Some(input),
                        plugins: smallvec![plugin],
                    }),
                }
            }
        }
    }

    /// Record that `plugin` can blank the media of each node in `outputs`.
    pub fn register_blank(&mut self, outputs: &[CapsId], plugin: PluginId) {
        for &out in outputs {
            let links = &mut self.caps[out.0].links;
            match links.iter_mut().find(|l| l.target.is_none()) {
                Some(link) => {
                    if !link.plugins.contains(&plugin) {
                        link.plugins.push(plugin);
                    }
                }
                None => links.push(CapsLink {
                    target: None,
                    plugins: smallvec![plugin],
                }),
            }
        }
    }

    /// Record that `plugin` can process tracks of each node in place.
    pub fn register_modifier(&mut self, caps: &[CapsId], plugin: PluginId) {
        for &id in caps {
            let modifiers = &mut self.caps[id.0].modifiers;
            if !modifiers.contains(&plugin) {
                modifiers.push(plugin);
            }
        }
    }

    /// Record that `plugin` implements `kind` checksums for the content of
    /// each node.
    pub fn register_checksum(&mut self, kind: ChecksumKind, caps: &[CapsId], plugin: PluginId) {
        let test = match self.tests.iter_mut().position(|t| t.kind == kind) {
            Some(pos) => &mut self.tests[pos],
            None => {
                self.tests.push(CapsTest {
                    kind,
                    links: Vec::new(),
                });
                self.tests.last_mut().unwrap()
            }
        };
        for &id in caps {
            match test.links.iter_mut().find(|l| l.target == id) {
                Some(link) => {
                    if !link.plugins.contains(&plugin) {
                        link.plugins.push(plugin);
                    }
                }
                None => test.links.push(CapsTestLink {
                    target: id,
                    plugins: smallvec![plugin],
                }),
            }
        }
    }

    /// Freeze the graph for querying.
    pub fn build(self) -> Registry {
        Registry {
            caps: self.caps,
            order: self.order,
            tests: self.tests,
            plugins: self.plugins,
            groups: self.groups,
        }
    }

    /// Find or create the set of nodes jointly covering `requested`.
    ///
    /// Walks every same-tag node with a subtype (and, when `use_io`, I/O)
    /// overlap. A node only partially inside the request is split: it keeps
    /// the complement and a deep copy carrying the intersection is inserted,
    /// so nodes of one tag always partition the capability space requested
    /// so far. Whatever no node covers gets a fresh node at the end.
    fn get_or_create(&mut self, requested: TrackType, io: IoFlags, use_io: bool) -> Vec<CapsId> {
        let requested_bits = requested.subtype_bits();
        let mut remaining = requested_bits;
        let mut retval = Vec::new();

        let existing: Vec<CapsId> = self.order.clone();
        for id in existing {
            let caps = &self.caps[id.0];
            if caps.track.tag() != requested.tag() {
                continue;
            }
            let common_io = caps.io & io;
            if use_io && common_io.is_empty() {
                continue;
            }
            let common = caps.track.subtype_bits() & requested_bits;
            if common == 0 {
                continue;
            }

            let mut id = id;
            if common != self.caps[id.0].track.subtype_bits() {
                id = self.split_subtype(id, common);
            }
            if use_io && common_io != self.caps[id.0].io {
                id = self.split_io(id, common_io);
            }
            retval.push(id);
            remaining &= !common;
        }

        if remaining != 0 {
            let id = self.insert_caps(Caps::new(requested.with_subtype_bits(remaining), io));
            retval.push(id);
        }

        // splits shrink keys in place, restore the traversal order
        self.resort();
        retval
    }

    /// Split `src` along its subtype: `src` keeps the complement, the
    /// returned copy carries `common` with `src`'s edges, modifiers, and
    /// checksum references replicated.
    fn split_subtype(&mut self, src: CapsId, common: u32) -> CapsId {
        let old = &self.caps[src.0];
        let keep = old.track.subtype_bits() & !common;
        let take_track = old.track.with_subtype_bits(common);
        let io = old.io;
        tracing::debug!(
            caps = src.0,
            keep,
            take = common,
            "splitting capability node on subtype"
        );
        self.caps[src.0].track = self.caps[src.0].track.with_subtype_bits(keep);
        self.clone_node_deep(src, take_track, io)
    }

    /// Split `src` along its I/O flags: `src` keeps the complement, the
    /// returned copy carries `common_io`.
    fn split_io(&mut self, src: CapsId, common_io: IoFlags) -> CapsId {
        let old = &self.caps[src.0];
        let track = old.track;
        tracing::debug!(caps = src.0, "splitting capability node on io flags");
        self.caps[src.0].io -= common_io;
        self.clone_node_deep(src, track, common_io)
    }

    /// Deep copy of `src` under a new identity: outgoing edges and modifiers
    /// are cloned, every edge elsewhere pointing at `src` is replicated to
    /// point at the copy, checksum tables included.
    fn clone_node_deep(&mut self, src: CapsId, track: TrackType, io: IoFlags) -> CapsId {
        let links = self.caps[src.0].links.clone();
        let modifiers = self.caps[src.0].modifiers.clone();
        let new_id = self.insert_caps(Caps {
            track,
            io,
            links,
            modifiers,
        });

        for idx in 0..self.caps.len() {
            if idx == new_id.0 || idx == src.0 {
                continue;
            }
            let replicated = self.caps[idx]
                .links
                .iter()
                .find(|l| l.target == Some(src))
                .map(|l| l.plugins.clone());
            if let Some(plugins) = replicated {
                self.caps[idx].links.push(CapsLink {
                    target: Some(new_id),
                    plugins,
                });
            }
        }

        for test in &mut self.tests {
            let replicated = test
                .links
                .iter()
                .find(|l| l.target == src)
                .map(|l| l.plugins.clone());
            if let Some(plugins) = replicated {
                test.links.push(CapsTestLink {
                    target: new_id,
                    plugins,
                });
            }
        }

        new_id
    }

    fn insert_caps(&mut self, caps: Caps) -> CapsId {
        self.caps.push(caps);
        let id = CapsId(self.caps.len() - 1);
        self.order.push(id);
        id
    }

    fn resort(&mut self) {
        let caps = &self.caps;
        self.order.sort_by_key(|id| caps[id.0].sort_key());
    }
}

/// The frozen capability registry every resolution call reads.
///
/// Graph structure is immutable; plugin activation and error state remain
/// settable because they change after registration (a background install
/// finishing, an operator toggling a backend).
#[derive(Default)]
pub struct Registry {
    caps: Vec<Caps>,
    order: Vec<CapsId>,
    tests: Vec<CapsTest>,
    plugins: Vec<Plugin>,
    groups: Vec<String>,
}

impl Registry {
    /// Start a registration phase.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Access a node by id.
    pub fn caps(&self, id: CapsId) -> &Caps {
        &self.caps[id.0]
    }

    /// All nodes in registry order: discs first, then streams, images, data.
    pub fn iter_caps(&self) -> impl Iterator<Item = (CapsId, &Caps)> {
        self.order.iter().map(move |&id| (id, &self.caps[id.0]))
    }

    /// Number of nodes.
    pub fn caps_count(&self) -> usize {
        self.caps.len()
    }

    /// The first node, in registry order, able to stand for the requested
    /// output: exact-superset media for discs, superset subtype plus file
    /// acceptance for everything else.
    pub fn find_start_caps(&self, output: &TrackType) -> Option<CapsId> {
        self.order.iter().copied().find(|&id| {
            let caps = &self.caps[id.0];
            match (caps.track, *output) {
                (TrackType::Disc(have), TrackType::Disc(want)) => {
                    !want.is_empty() && have.contains(want)
                }
                (have, want) => {
                    have.tag() == want.tag()
                        && caps.io.contains(IoFlags::ACCEPT_FILE)
                        && have.subtype_bits() & want.subtype_bits() == want.subtype_bits()
                }
            }
        })
    }

    /// Access a plugin's facts.
    pub fn plugin(&self, id: PluginId) -> &Plugin {
        &self.plugins[id.0]
    }

    /// All registered plugins.
    pub fn iter_plugins(&self) -> impl Iterator<Item = (PluginId, &Plugin)> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (PluginId(i), p))
    }

    /// Enable or disable a plugin.
    pub fn set_plugin_active(&mut self, id: PluginId, active: bool) {
        self.plugins[id.0].set_active(active);
    }

    /// Record a plugin problem (e.g. its external tool is missing).
    pub fn push_plugin_error(&mut self, id: PluginId, message: impl Into<String>) {
        self.plugins[id.0].push_error(message);
    }

    /// Clear a plugin's problems (e.g. after an install completed).
    pub fn clear_plugin_errors(&mut self, id: PluginId) {
        self.plugins[id.0].clear_errors();
    }

    /// Override a plugin's priority; negative disables it.
    pub fn set_plugin_user_priority(&mut self, id: PluginId, priority: i32) {
        self.plugins[id.0].set_user_priority(priority);
    }

    /// The checksum table entry for an algorithm, if any plugin registered it.
    pub fn checksum_test(&self, kind: ChecksumKind) -> Option<&CapsTest> {
        self.tests.iter().find(|t| t.kind == kind)
    }

    /// A group's registered name.
    pub fn group_name(&self, id: GroupId) -> &str {
        &self.groups[id.0]
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("caps", &self.caps.len())
            .field("plugins", &self.plugins.len())
            .field("tests", &self.tests.len())
            .field("groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_caps_reuse() {
        let mut builder = RegistryBuilder::new();
        let first = builder.get_or_create_data_caps(FsFlags::ISO);
        let second = builder.get_or_create_data_caps(FsFlags::ISO);
        assert_eq!(first, second);
        assert_eq!(builder.caps.len(), 1);
    }

    #[test]
    fn test_widening_request_creates_remainder_node() {
        let mut builder = RegistryBuilder::new();
        builder.get_or_create_data_caps(FsFlags::ISO);
        let ids = builder.get_or_create_data_caps(FsFlags::ISO | FsFlags::JOLIET);
        assert_eq!(ids.len(), 2);
        let mut subtypes: Vec<u32> = ids
            .iter()
            .map(|&id| builder.caps[id.0].track.subtype_bits())
            .collect();
        subtypes.sort_unstable();
        assert_eq!(
            subtypes,
            vec![FsFlags::ISO.bits(), FsFlags::JOLIET.bits()]
        );
    }

    #[test]
    fn test_narrowing_request_splits_node() {
        let mut builder = RegistryBuilder::new();
        let wide = builder.get_or_create_data_caps(FsFlags::ISO | FsFlags::JOLIET);
        assert_eq!(wide.len(), 1);
        let narrow = builder.get_or_create_data_caps(FsFlags::ISO);
        assert_eq!(narrow.len(), 1);
        // the original node shrank to the complement
        assert_eq!(
            builder.caps[wide[0].0].track.subtype_bits(),
            FsFlags::JOLIET.bits()
        );
        assert_eq!(
            builder.caps[narrow[0].0].track.subtype_bits(),
            FsFlags::ISO.bits()
        );
    }

    #[test]
    fn test_split_replicates_incoming_links() {
        let mut builder = RegistryBuilder::new();
        let plugin = builder.register_plugin(Plugin::new("mkimage", 0));
        let data = builder.get_or_create_data_caps(FsFlags::ISO | FsFlags::JOLIET);
        let image = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
        builder.register_link(&image, &data, plugin);

        let narrow = builder.get_or_create_data_caps(FsFlags::ISO);
        // the image node must now be producible from both halves
        let targets: Vec<Option<CapsId>> = builder.caps[image[0].0]
            .links
            .iter()
            .map(|l| l.target)
            .collect();
        assert!(targets.contains(&Some(data[0])));
        assert!(targets.contains(&Some(narrow[0])));
    }

    #[test]
    fn test_link_registration_is_idempotent() {
        let mut builder = RegistryBuilder::new();
        let plugin = builder.register_plugin(Plugin::new("mkimage", 0));
        let data = builder.get_or_create_data_caps(FsFlags::ISO);
        let image = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
        builder.register_link(&image, &data, plugin);
        builder.register_link(&image, &data, plugin);
        let links = &builder.caps[image[0].0].links;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].plugins.len(), 1);
    }

    #[test]
    fn test_self_links_are_dropped() {
        let mut builder = RegistryBuilder::new();
        let plugin = builder.register_plugin(Plugin::new("noop", 0));
        let data = builder.get_or_create_data_caps(FsFlags::ISO);
        builder.register_link(&data, &data, plugin);
        assert!(builder.caps[data[0].0].links.is_empty());
    }

    #[test]
    fn test_io_split() {
        let mut builder = RegistryBuilder::new();
        let both = builder.get_or_create_image_caps(
            IoFlags::ACCEPT_FILE | IoFlags::ACCEPT_PIPE,
            ImageFormats::BIN,
        );
        assert_eq!(both.len(), 1);
        let piped = builder.get_or_create_image_caps(IoFlags::ACCEPT_PIPE, ImageFormats::BIN);
        assert_eq!(piped.len(), 1);
        assert_ne!(both[0], piped[0]);
        assert_eq!(builder.caps[both[0].0].io, IoFlags::ACCEPT_FILE);
        assert_eq!(builder.caps[piped[0].0].io, IoFlags::ACCEPT_PIPE);
    }

    #[test]
    fn test_registry_order_groups_discs_first() {
        let mut builder = RegistryBuilder::new();
        builder.get_or_create_data_caps(FsFlags::ISO);
        builder.get_or_create_disc_caps(Media::CD_R | Media::BLANK);
        let registry = builder.build();
        let (_, first) = registry.iter_caps().next().unwrap();
        assert!(matches!(first.track(), TrackType::Disc(_)));
    }

    #[test]
    fn test_partition_invariant_after_overlapping_registrations() {
        let mut builder = RegistryBuilder::new();
        builder.get_or_create_data_caps(FsFlags::ISO | FsFlags::JOLIET | FsFlags::UDF);
        builder.get_or_create_data_caps(FsFlags::JOLIET | FsFlags::SYMLINK);
        builder.get_or_create_data_caps(FsFlags::ISO);

        let mut seen = 0u32;
        for caps in &builder.caps {
            let bits = caps.track.subtype_bits();
            assert_eq!(seen & bits, 0, "nodes must stay pairwise disjoint");
            seen |= bits;
        }
        let all = FsFlags::ISO | FsFlags::JOLIET | FsFlags::UDF | FsFlags::SYMLINK;
        assert_eq!(seen, all.bits());
    }

    #[test]
    fn test_checksum_registration() {
        let mut builder = RegistryBuilder::new();
        let plugin = builder.register_plugin(Plugin::new("md5sum", 0));
        let image = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
        builder.register_checksum(ChecksumKind::Md5, &image, plugin);
        builder.register_checksum(ChecksumKind::Md5, &image, plugin);
        let registry = builder.build();
        let test = registry.checksum_test(ChecksumKind::Md5).unwrap();
        assert_eq!(test.links().len(), 1);
        assert_eq!(test.links()[0].plugins().len(), 1);
        assert!(registry.checksum_test(ChecksumKind::Sha1).is_none());
    }

    #[test]
    fn test_group_registration_dedupes() {
        let mut builder = RegistryBuilder::new();
        let a = builder.register_group("cdrtools");
        let b = builder.register_group("cdrtools");
        let c = builder.register_group("libburnia");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
