//! Path resolution over the capability graph.
//!
//! Two searches share the graph but differ in exit policy:
//! [`find_best_link`] ranks candidate edges by plugin priority and returns
//! the best production chain; [`find_link`] stops at the first viable edge
//! and answers yes/no questions, optionally reporting viable-but-broken
//! plugins back to the caller so the application can offer to install a
//! missing backend.

use crate::caps::{Caps, CapsId, CapsLink, IoFlags, Registry};
use crate::flags::BurnFlags;
use crate::medium::Media;
use crate::plugin::{GroupId, Plugin, PluginId, ProcessOrder};
use crate::track::TrackType;

/// Recursion ceiling. The registry is built by trusted plugins, the cap only
/// guards against a pathological registration sequence.
const MAX_DEPTH: usize = 32;

/// One resolved edge of a production chain: `source` is produced from
/// `target` by `plugin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChosenLink {
    /// The plugin realizing the transformation.
    pub plugin: PluginId,
    /// The node being produced.
    pub source: CapsId,
    /// The node being consumed.
    pub target: CapsId,
}

/// Inputs of a best-path resolution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolveCtx {
    pub group: Option<GroupId>,
    pub session_flags: BurnFlags,
    pub media: Media,
    pub input: TrackType,
    pub io_flags: IoFlags,
}

/// Find the best chain of links producing `caps_id` from something
/// compatible with the context's input type.
///
/// The returned chain is in callee-to-caller order: the last element sits on
/// the input side. Callers reverse it into execution order.
pub(crate) fn find_best_link(
    registry: &Registry,
    ctx: &ResolveCtx,
    caps_id: CapsId,
    used: &[CapsId],
) -> Option<Vec<ChosenLink>> {
    if used.len() >= MAX_DEPTH {
        return None;
    }
    let caps = registry.caps(caps_id);

    struct Candidate {
        target: CapsId,
        plugin: PluginId,
        priority: i32,
        perfect: bool,
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for link in caps.links() {
        let Some(target_id) = link.target() else {
            continue;
        };
        if used.contains(&target_id) {
            continue;
        }
        let target = registry.caps(target_id);
        let perfect = target.io().contains(IoFlags::ACCEPT_FILE)
            && target.track().is_compatible_with(&ctx.input);
        if !perfect {
            // to keep going through this node it must share an IO mode and
            // must not be a disc: nothing converts out of a medium here
            if (target.io() & ctx.io_flags).is_empty() {
                continue;
            }
            if matches!(target.track(), TrackType::Disc(_)) {
                continue;
            }
        }
        let Some(plugin) = find_link_plugin(registry, ctx, caps, link) else {
            continue;
        };
        candidates.push(Candidate {
            target: target_id,
            plugin,
            priority: registry.plugin(plugin).effective_priority(),
            perfect,
        });
    }

    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

    // Walk the candidates best-first. The first perfect fit is accepted
    // provisionally; a recursive chain displaces it only when it brings an
    // active processing stage the shorter path would skip. Candidates tied
    // at the accepted priority get the same comparison; lower priorities
    // are never reconsidered.
    let mut chosen: Option<(i32, bool, Vec<ChosenLink>)> = None;
    for candidate in &candidates {
        if let Some((accepted_priority, _, _)) = &chosen {
            if candidate.priority < *accepted_priority {
                break;
            }
        }
        let own = ChosenLink {
            plugin: candidate.plugin,
            source: caps_id,
            target: candidate.target,
        };
        if candidate.perfect {
            match &chosen {
                None => chosen = Some((candidate.priority, true, vec![own])),
                Some((_, false, chain)) => {
                    if !chain_has_processing_stage(registry, &chain[1..]) {
                        chosen = Some((candidate.priority, true, vec![own]));
                    }
                }
                Some((_, true, _)) => {}
            }
            continue;
        }
        // a settled recursive choice cannot be displaced by another one
        if matches!(&chosen, Some((_, false, _))) {
            continue;
        }
        let mut next_used = Vec::with_capacity(used.len() + 1);
        next_used.extend_from_slice(used);
        next_used.push(caps_id);
        let Some(rest) = find_best_link(registry, ctx, candidate.target, &next_used) else {
            continue;
        };
        let displaces = match &chosen {
            None => true,
            Some((_, true, _)) => chain_has_processing_stage(registry, &rest),
            Some((_, false, _)) => false,
        };
        if displaces {
            let mut chain = Vec::with_capacity(rest.len() + 1);
            chain.push(own);
            chain.extend(rest);
            chosen = Some((candidate.priority, false, chain));
        }
    }

    let result = chosen.map(|(_, _, chain)| chain);
    if result.is_none() {
        tracing::trace!(caps = caps_id.index(), "no production chain");
    }
    result
}

/// Select the best plugin able to realize `link`, or `None` when the link is
/// unusable under the context.
///
/// Qualification depends on where the edge sits: recording flags when the
/// produced node is a disc, imaging flags when the consumed node is data,
/// plain media restrictions otherwise. Among qualifiers the caller's
/// favourite group outranks priority; priority decides the rest.
fn find_link_plugin(
    registry: &Registry,
    ctx: &ResolveCtx,
    source: &Caps,
    link: &CapsLink,
) -> Option<PluginId> {
    let mut candidate: Option<PluginId> = None;
    for &id in link.plugins() {
        let plugin = registry.plugin(id);
        if !plugin.is_active(false) {
            continue;
        }
        if !link_plugin_qualifies(registry, ctx, source, link, plugin) {
            continue;
        }
        let Some(current) = candidate else {
            candidate = Some(id);
            continue;
        };
        if let Some(group) = ctx.group {
            let current_in = registry.plugin(current).group() == Some(group);
            let this_in = plugin.group() == Some(group);
            if current_in != this_in {
                if this_in {
                    candidate = Some(id);
                }
                continue;
            }
        }
        if plugin.effective_priority() > registry.plugin(current).effective_priority() {
            candidate = Some(id);
        }
    }
    candidate
}

fn link_plugin_qualifies(
    registry: &Registry,
    ctx: &ResolveCtx,
    source: &Caps,
    link: &CapsLink,
    plugin: &Plugin,
) -> bool {
    if matches!(source.track(), TrackType::Disc(_)) {
        return plugin.check_record_flags(ctx.media, ctx.session_flags);
    }
    if let Some(target) = link.target() {
        if matches!(registry.caps(target).track(), TrackType::Data(_)) {
            return plugin.check_image_flags(ctx.media, ctx.session_flags);
        }
    }
    plugin.check_media_restrictions(ctx.media)
}

/// Whether an intermediate node along the chain carries an active modifier
/// that would run before its stage's target.
///
/// The chain is callee-to-caller, so the produced (source) side of each of
/// its links names exactly the intermediate artifacts a longer path would
/// route through.
fn chain_has_processing_stage(registry: &Registry, chain: &[ChosenLink]) -> bool {
    chain.iter().any(|link| {
        registry.caps(link.source).modifiers().iter().any(|&id| {
            let plugin = registry.plugin(id);
            plugin.is_active(false) && plugin.process_order().contains(ProcessOrder::BEFORE_TARGET)
        })
    })
}

/// Outcome of a feasibility search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A viable chain exists.
    Found,
    /// No viable chain exists.
    NotSupported,
    /// The broken-plugin callback aborted the walk.
    Cancelled,
}

/// What the broken-plugin callback wants the search to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchControl {
    /// Keep searching other edges.
    Continue,
    /// Abort the whole search.
    Abort,
}

/// Inputs of a feasibility search.
pub(crate) struct FeasibleCtx<'a> {
    pub session_flags: BurnFlags,
    pub media: Media,
    pub input: TrackType,
    pub io_flags: IoFlags,
    /// Let plugins with unresolved errors count as viable.
    pub ignore_plugin_errors: bool,
    /// Invoked for a plugin that would qualify if its errors were resolved.
    pub broken_plugin: Option<&'a mut dyn FnMut(&Plugin) -> SearchControl>,
}

enum LinkViability {
    Viable,
    Broken(PluginId),
    Unusable,
}

/// Same traversal as [`find_best_link`] but stops at the first viable edge.
/// No ranking, no best-path arbitration; used for yes/no queries.
pub(crate) fn find_link(
    registry: &Registry,
    ctx: &mut FeasibleCtx<'_>,
    caps_id: CapsId,
    used: &[CapsId],
) -> SearchOutcome {
    if used.len() >= MAX_DEPTH {
        return SearchOutcome::NotSupported;
    }
    let caps = registry.caps(caps_id);
    for link in caps.links() {
        let Some(target_id) = link.target() else {
            continue;
        };
        if used.contains(&target_id) {
            continue;
        }

        match link_viability(registry, ctx, caps, link) {
            LinkViability::Viable => {}
            LinkViability::Broken(_) if ctx.ignore_plugin_errors => {}
            LinkViability::Broken(id) => {
                if let Some(callback) = ctx.broken_plugin.as_mut() {
                    if callback(registry.plugin(id)) == SearchControl::Abort {
                        return SearchOutcome::Cancelled;
                    }
                }
                continue;
            }
            LinkViability::Unusable => continue,
        }

        let target = registry.caps(target_id);
        if target.io().contains(IoFlags::ACCEPT_FILE)
            && target.track().is_compatible_with(&ctx.input)
        {
            return SearchOutcome::Found;
        }
        if (target.io() & ctx.io_flags).is_empty() {
            continue;
        }
        if matches!(target.track(), TrackType::Disc(_)) {
            continue;
        }

        let mut next_used = Vec::with_capacity(used.len() + 1);
        next_used.extend_from_slice(used);
        next_used.push(caps_id);
        match find_link(registry, ctx, target_id, &next_used) {
            SearchOutcome::Found => return SearchOutcome::Found,
            SearchOutcome::Cancelled => return SearchOutcome::Cancelled,
            SearchOutcome::NotSupported => {}
        }
    }
    SearchOutcome::NotSupported
}

fn link_viability(
    registry: &Registry,
    ctx: &FeasibleCtx<'_>,
    source: &Caps,
    link: &CapsLink,
) -> LinkViability {
    let resolve_ctx = ResolveCtx {
        group: None,
        session_flags: ctx.session_flags,
        media: ctx.media,
        input: ctx.input,
        io_flags: ctx.io_flags,
    };
    let mut broken = None;
    for &id in link.plugins() {
        let plugin = registry.plugin(id);
        if !plugin.is_active(true) {
            continue;
        }
        if !link_plugin_qualifies(registry, &resolve_ctx, source, link, plugin) {
            continue;
        }
        if plugin.is_active(false) {
            return LinkViability::Viable;
        }
        // qualifies, but unresolved errors hold it back
        broken = Some(id);
    }
    match broken {
        Some(id) => LinkViability::Broken(id),
        None => LinkViability::Unusable,
    }
}

/// Whether some active plugin can blank media of the given class under the
/// session flags.
pub(crate) fn can_blank(registry: &Registry, media: Media, session_flags: BurnFlags) -> bool {
    for (_, caps) in registry.iter_caps() {
        let TrackType::Disc(caps_media) = caps.track() else {
            continue;
        };
        if !caps_media.contains(media) {
            continue;
        }
        for link in caps.links() {
            if link.target().is_some() {
                continue;
            }
            for &id in link.plugins() {
                let plugin = registry.plugin(id);
                if plugin.is_active(false) && plugin.check_blank_flags(media, session_flags) {
                    return true;
                }
            }
        }
    }
    false
}
