//! Flag negotiation over the capability graph.
//!
//! Answers "which options can I offer for this destination, and which must I
//! force": a recursive walk over the same graph the path resolver uses,
//! aggregating supported flags as a union and compulsory flags as an
//! intersection across every viable production chain, then layering
//! format-, metadata-, medium-, and drive-specific refinements on top.

use super::solver::can_blank;
use crate::caps::{CapsId, CapsLink, IoFlags, Registry};
use crate::error::{Error, Result};
use crate::flags::{BurnFlags, FlagSet};
use crate::medium::{Media, MediumInfo};
use crate::track::{ImageFormats, StreamFormats, TrackType};

const MAX_DEPTH: usize = 32;

/// Aggregate the flag sets of every chain able to produce `media` from
/// `input`, then refine for the input's format and metadata.
pub(crate) fn flags_for_disc(
    registry: &Registry,
    media: Media,
    input: &TrackType,
    session_flags: BurnFlags,
) -> Result<FlagSet> {
    let start = registry
        .find_start_caps(&TrackType::Disc(media))
        .ok_or(Error::NotSupported)?;
    let mut set = caps_flags(registry, start, media, input, session_flags, &[])
        .ok_or(Error::NotSupported)?;

    // image-format refinements: CUE sheets force disc-at-once, clone images
    // force raw writing, anything else cannot be written raw
    match input {
        TrackType::Image(format)
            if format.intersects(ImageFormats::CUE | ImageFormats::CDRDAO) =>
        {
            if !set.supported.contains(BurnFlags::DAO) {
                return Err(Error::NotSupported);
            }
            set.compulsory |= BurnFlags::DAO;
        }
        TrackType::Image(format) if format.contains(ImageFormats::CLONE) => {
            if !set.supported.contains(BurnFlags::RAW) {
                return Err(Error::NotSupported);
            }
            set.compulsory |= BurnFlags::RAW;
            set.supported -= BurnFlags::DAO;
            set.compulsory -= BurnFlags::DAO;
        }
        TrackType::Image(_) => {
            set.supported -= BurnFlags::RAW;
            set.compulsory -= BurnFlags::RAW;
        }
        // CD-TEXT needs disc-at-once, which rules out multisession
        TrackType::Stream(format) if format.contains(StreamFormats::METADATA_INFO) => {
            if !set.supported.contains(BurnFlags::DAO) {
                return Err(Error::NotSupported);
            }
            set.compulsory |= BurnFlags::DAO;
            set.supported -= BurnFlags::MULTI;
            set.compulsory -= BurnFlags::MULTI;
        }
        _ => {}
    }

    set.normalize();
    Ok(set)
}

/// Recursive aggregation step: union supported, intersect compulsory over
/// every viable link out of `caps_id`.
fn caps_flags(
    registry: &Registry,
    caps_id: CapsId,
    media: Media,
    input: &TrackType,
    session_flags: BurnFlags,
    used: &[CapsId],
) -> Option<FlagSet> {
    if used.len() >= MAX_DEPTH {
        return None;
    }
    let caps = registry.caps(caps_id);
    let source_is_disc = matches!(caps.track(), TrackType::Disc(_));

    let mut acc: Option<FlagSet> = None;
    for link in caps.links() {
        let Some(target_id) = link.target() else {
            continue;
        };
        if used.contains(&target_id) {
            continue;
        }
        let target = registry.caps(target_id);

        let mut link_set = FlagSet {
            supported: BurnFlags::empty(),
            compulsory: BurnFlags::all(),
        };
        if source_is_disc {
            // sub-trees whose plugins cannot accommodate the session flags
            // are cut here
            match link_record_flags(registry, link, media, session_flags) {
                Some(set) => {
                    link_set.supported |= set.supported;
                    // each table only governs its own mask; bits outside it
                    // stay unconstrained for the intersection
                    link_set.compulsory &= set.compulsory | !BurnFlags::BURN_MASK;
                }
                None => continue,
            }
        }
        if matches!(target.track(), TrackType::Data(_)) {
            match link_image_flags(registry, link, media, session_flags) {
                Some(set) => {
                    link_set.supported |= set.supported;
                    link_set.compulsory &= set.compulsory | !BurnFlags::IMAGE_MASK;
                }
                None => continue,
            }
        } else if !link_media_ok(registry, link, media) {
            continue;
        }

        // perfect fit: the target itself satisfies the input
        if target.io().contains(IoFlags::ACCEPT_FILE) && target.track().is_compatible_with(input) {
            merge_into(&mut acc, link_set);
            continue;
        }

        if !target.io().contains(IoFlags::ACCEPT_FILE) {
            continue;
        }
        if matches!(target.track(), TrackType::Disc(_)) {
            continue;
        }

        let mut next_used = Vec::with_capacity(used.len() + 1);
        next_used.extend_from_slice(used);
        next_used.push(caps_id);
        if let Some(deeper) = caps_flags(registry, target_id, media, input, session_flags, &next_used)
        {
            link_set.supported |= deeper.supported;
            link_set.compulsory &= deeper.compulsory;
            merge_into(&mut acc, link_set);
        }
    }
    acc
}

fn merge_into(acc: &mut Option<FlagSet>, set: FlagSet) {
    match acc {
        Some(acc) => acc.merge(set),
        None => *acc = Some(set),
    }
}

/// Union the recording flag sets of every active plugin on a link.
///
/// A plugin that registered no recording facts still qualifies when the
/// session requests nothing from the burn mask; it just brings no flags.
fn link_record_flags(
    registry: &Registry,
    link: &CapsLink,
    media: Media,
    session_flags: BurnFlags,
) -> Option<FlagSet> {
    let mut acc: Option<FlagSet> = None;
    for &id in link.plugins() {
        let plugin = registry.plugin(id);
        if !plugin.is_active(false) {
            continue;
        }
        if let Some(set) = plugin.record_flags(media, session_flags) {
            merge_into(&mut acc, set);
        } else if plugin.check_record_flags(media, session_flags) {
            merge_into(&mut acc, FlagSet::new());
        }
    }
    acc
}

/// Union the imaging flag sets of every active plugin on a link, with the
/// same empty-table rule as [`link_record_flags`].
fn link_image_flags(
    registry: &Registry,
    link: &CapsLink,
    media: Media,
    session_flags: BurnFlags,
) -> Option<FlagSet> {
    let mut acc: Option<FlagSet> = None;
    for &id in link.plugins() {
        let plugin = registry.plugin(id);
        if !plugin.is_active(false) {
            continue;
        }
        if let Some(set) = plugin.image_flags(media, session_flags) {
            merge_into(&mut acc, set);
        } else if plugin.check_image_flags(media, session_flags) {
            merge_into(&mut acc, FlagSet::new());
        }
    }
    acc
}

fn link_media_ok(registry: &Registry, link: &CapsLink, media: Media) -> bool {
    link.plugins().iter().any(|&id| {
        let plugin = registry.plugin(id);
        plugin.is_active(false) && plugin.check_media_restrictions(media)
    })
}

/// Union the blanking flag sets registered for `media`, across every disc
/// node covering it.
fn blanking_flag_sets(
    registry: &Registry,
    media: Media,
    session_flags: BurnFlags,
) -> Option<FlagSet> {
    let mut acc: Option<FlagSet> = None;
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
                if !plugin.is_active(false) {
                    continue;
                }
                if let Some(set) = plugin.blank_flags(media, session_flags) {
                    merge_into(&mut acc, set);
                }
            }
        }
    }
    acc
}

/// The flag sets a blanking operation on `media` can offer.
///
/// DVD-RW in sequential mode gets the special rules: a fast blank leaves the
/// disc unappendable, so `MULTI` with `FAST_BLANK` is rejected outright and
/// `MULTI` alone withdraws the fast-blank offer.
pub(crate) fn blank_flags(
    registry: &Registry,
    media: Media,
    session_flags: BurnFlags,
) -> Result<FlagSet> {
    if media.is_dvd_rw_sequential() {
        let exclusive = BurnFlags::MULTI | BurnFlags::FAST_BLANK;
        if session_flags.contains(exclusive) {
            return Err(Error::NotSupported);
        }
    }
    let mut set = blanking_flag_sets(registry, media, session_flags).ok_or(Error::NotSupported)?;
    if media.is_dvd_rw_sequential() && session_flags.contains(BurnFlags::MULTI) {
        set.supported -= BurnFlags::FAST_BLANK;
    }
    set.normalize();
    Ok(set)
}

/// Burn flags for a session's destination medium.
///
/// Runs [`flags_for_disc`] against the medium as-is and, when blanking could
/// change the answer, against the medium pretended blank, to decide whether
/// `BLANK_BEFORE_WRITE` is offered or forced.
pub(crate) fn flags_for_medium(
    registry: &Registry,
    media: Media,
    input: &TrackType,
    session_flags: BurnFlags,
) -> Result<FlagSet> {
    let blankable = can_blank(registry, media, session_flags);

    let mut set = match flags_for_disc(registry, media, input, session_flags) {
        Ok(mut set) => {
            // writable as-is: blanking first is an option, not an obligation
            if blankable {
                set.supported |= BurnFlags::BLANK_BEFORE_WRITE;
                if let Some(blank_set) = blanking_flag_sets(registry, media, session_flags) {
                    set.supported |= blank_set.supported;
                }
            }
            set
        }
        Err(Error::NotSupported) => {
            // unwritable in its current state; only a blank-first pipeline
            // could save the session
            if !blankable {
                return Err(Error::NotSupported);
            }
            let pretend = media.as_blanked();
            let retry_flags = session_flags - BurnFlags::BLANK_BEFORE_WRITE;
            let mut set = flags_for_disc(registry, pretend, input, retry_flags)?;
            set.supported |= BurnFlags::BLANK_BEFORE_WRITE;
            set.compulsory |= BurnFlags::BLANK_BEFORE_WRITE;
            if let Some(blank_set) = blanking_flag_sets(registry, media, session_flags) {
                set.supported |= blank_set.supported;
                set.compulsory |= blank_set.compulsory & blank_set.supported;
            }
            set
        }
        Err(other) => return Err(other),
    };

    if media.is_dvd_rw_sequential() {
        if session_flags.contains(BurnFlags::MULTI) {
            set.supported -= BurnFlags::FAST_BLANK;
            set.compulsory -= BurnFlags::FAST_BLANK;
        } else if session_flags.contains(BurnFlags::FAST_BLANK | BurnFlags::BLANK_BEFORE_WRITE) {
            // a fast-blanked sequential DVD-RW ends up closed, only a
            // disc-at-once burn can follow
            if !set.supported.contains(BurnFlags::DAO) {
                return Err(Error::NotSupported);
            }
            set.compulsory |= BurnFlags::DAO;
        }
    }

    set.normalize();
    Ok(set)
}

/// Post-filter a negotiated flag set against what the drive holding the
/// medium can actually do.
pub(crate) fn flags_update_for_drive(mut set: FlagSet, drive: &dyn MediumInfo) -> FlagSet {
    if !drive.supports_burnproof() {
        set.supported -= BurnFlags::BURNPROOF;
    }
    if !drive.supports_sao() {
        set.supported -= BurnFlags::DAO;
    }
    if set.supported.contains(BurnFlags::DUMMY) {
        let dummy_usable = if set.compulsory.contains(BurnFlags::DAO) {
            drive.supports_dummy_sao()
        } else {
            drive.supports_dummy_sao() || drive.supports_dummy_tao()
        };
        if !dummy_usable {
            set.supported -= BurnFlags::DUMMY;
        }
    }
    if drive.must_blank_before_write() && set.supported.contains(BurnFlags::BLANK_BEFORE_WRITE) {
        set.compulsory |= BurnFlags::BLANK_BEFORE_WRITE;
    }
    set.normalize();
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::RegistryBuilder;
    use crate::plugin::Plugin;
    use crate::track::FsFlags;

    fn recorder_registry(media: Media, supported: BurnFlags, compulsory: BurnFlags) -> Registry {
        let mut builder = RegistryBuilder::new();
        let mkisofs = builder.register_plugin(Plugin::new("mkisofs", 0));
        let mut recorder = Plugin::new("recorder", 0);
        recorder.set_record_flags(media, supported, compulsory);
        let recorder = builder.register_plugin(recorder);

        let data = builder.get_or_create_data_caps(FsFlags::ISO);
        let image = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
        let disc = builder.get_or_create_disc_caps(media);
        builder.register_link(&image, &data, mkisofs);
        builder.register_link(&disc, &image, recorder);
        builder.build()
    }

    #[test]
    fn test_flags_for_disc_aggregates_plugin_tables() {
        let media = Media::CD_R | Media::BLANK;
        let registry = recorder_registry(media, BurnFlags::DAO | BurnFlags::MULTI, BurnFlags::empty());
        let set = flags_for_disc(
            &registry,
            media,
            &TrackType::Data(FsFlags::ISO),
            BurnFlags::empty(),
        )
        .unwrap();
        assert!(set.supported.contains(BurnFlags::DAO | BurnFlags::MULTI));
        assert!(set.compulsory.is_empty());
    }

    #[test]
    fn test_compulsory_subset_of_supported() {
        let media = Media::CD_R | Media::BLANK;
        let registry = recorder_registry(media, BurnFlags::DAO, BurnFlags::DAO);
        let set = flags_for_disc(
            &registry,
            media,
            &TrackType::Data(FsFlags::ISO),
            BurnFlags::DAO,
        )
        .unwrap();
        assert!(set.supported.contains(set.compulsory));
    }

    #[test]
    fn test_unsatisfiable_session_flags_cut_the_tree() {
        let media = Media::CD_R | Media::BLANK;
        let registry = recorder_registry(media, BurnFlags::DAO, BurnFlags::empty());
        let result = flags_for_disc(
            &registry,
            media,
            &TrackType::Data(FsFlags::ISO),
            BurnFlags::RAW,
        );
        assert_eq!(result, Err(Error::NotSupported));
    }

    #[test]
    fn test_cue_image_forces_dao() {
        let media = Media::CD_R | Media::BLANK;
        let mut builder = RegistryBuilder::new();
        let mut recorder = Plugin::new("cdrdao", 0);
        recorder.set_record_flags(media, BurnFlags::DAO | BurnFlags::BURNPROOF, BurnFlags::empty());
        let recorder = builder.register_plugin(recorder);
        let cue = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::CUE);
        let disc = builder.get_or_create_disc_caps(media);
        builder.register_link(&disc, &cue, recorder);
        let registry = builder.build();

        let set = flags_for_disc(
            &registry,
            media,
            &TrackType::Image(ImageFormats::CUE),
            BurnFlags::empty(),
        )
        .unwrap();
        assert!(set.compulsory.contains(BurnFlags::DAO));
    }

    #[test]
    fn test_plain_image_strips_raw() {
        let media = Media::CD_R | Media::BLANK;
        let registry = recorder_registry(media, BurnFlags::DAO | BurnFlags::RAW, BurnFlags::empty());
        let set = flags_for_disc(
            &registry,
            media,
            &TrackType::Image(ImageFormats::ISO),
            BurnFlags::empty(),
        )
        .unwrap();
        assert!(!set.supported.contains(BurnFlags::RAW));
    }

    #[test]
    fn test_cdtext_forces_dao_and_strips_multi() {
        let media = Media::CD_R | Media::BLANK;
        let mut builder = RegistryBuilder::new();
        let mut recorder = Plugin::new("recorder", 0);
        recorder.set_record_flags(
            media,
            BurnFlags::DAO | BurnFlags::MULTI,
            BurnFlags::empty(),
        );
        let recorder = builder.register_plugin(recorder);
        let stream = builder.get_or_create_stream_caps(
            IoFlags::ACCEPT_FILE,
            StreamFormats::RAW_AUDIO | StreamFormats::METADATA_INFO,
        );
        let disc = builder.get_or_create_disc_caps(media);
        builder.register_link(&disc, &stream, recorder);
        let registry = builder.build();

        let set = flags_for_disc(
            &registry,
            media,
            &TrackType::Stream(StreamFormats::RAW_AUDIO | StreamFormats::METADATA_INFO),
            BurnFlags::empty(),
        )
        .unwrap();
        assert!(set.compulsory.contains(BurnFlags::DAO));
        assert!(!set.supported.contains(BurnFlags::MULTI));
    }

    #[test]
    fn test_dvd_rw_multi_fast_blank_rejected() {
        let media = Media::DVD_RW | Media::CLOSED | Media::HAS_DATA;
        let mut builder = RegistryBuilder::new();
        let mut blanker = Plugin::new("blanker", 0);
        blanker.set_blank_flags(media, BurnFlags::FAST_BLANK, BurnFlags::empty());
        let blanker = builder.register_plugin(blanker);
        let disc = builder.get_or_create_disc_caps(media);
        builder.register_blank(&disc, blanker);
        let registry = builder.build();

        let result = blank_flags(
            &registry,
            media,
            BurnFlags::FAST_BLANK | BurnFlags::MULTI,
        );
        assert_eq!(result, Err(Error::NotSupported));

        // MULTI alone merely withdraws the fast-blank offer
        let set = blank_flags(&registry, media, BurnFlags::MULTI).unwrap();
        assert!(!set.supported.contains(BurnFlags::FAST_BLANK));
    }

    #[test]
    fn test_flags_for_medium_forces_blank_on_closed_media() {
        let media = Media::CD_RW | Media::CLOSED | Media::HAS_DATA;
        let blank_media = media.as_blanked();
        let mut builder = RegistryBuilder::new();
        let mkisofs = builder.register_plugin(Plugin::new("mkisofs", 0));
        let mut recorder = Plugin::new("recorder", 0);
        // the recorder only handles blank media
        recorder.set_record_flags(blank_media, BurnFlags::DAO, BurnFlags::empty());
        let recorder = builder.register_plugin(recorder);
        let mut blanker = Plugin::new("blanker", 0);
        blanker.set_blank_flags(media, BurnFlags::FAST_BLANK, BurnFlags::empty());
        let blanker = builder.register_plugin(blanker);

        let data = builder.get_or_create_data_caps(FsFlags::ISO);
        let image = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
        let closed_disc = builder.get_or_create_disc_caps(media);
        let blank_disc = builder.get_or_create_disc_caps(blank_media);
        builder.register_link(&image, &data, mkisofs);
        builder.register_link(&blank_disc, &image, recorder);
        builder.register_blank(&closed_disc, blanker);
        let registry = builder.build();

        let set = flags_for_medium(
            &registry,
            media,
            &TrackType::Data(FsFlags::ISO),
            BurnFlags::empty(),
        )
        .unwrap();
        assert!(set.compulsory.contains(BurnFlags::BLANK_BEFORE_WRITE));
        assert!(set.supported.contains(BurnFlags::FAST_BLANK));
    }

    struct FakeDrive {
        sao: bool,
        dummy_sao: bool,
        dummy_tao: bool,
        burnproof: bool,
    }

    impl MediumInfo for FakeDrive {
        fn media(&self) -> Media {
            Media::CD_R | Media::BLANK
        }
        fn can_write_media(&self, _media: Media) -> bool {
            true
        }
        fn supports_sao(&self) -> bool {
            self.sao
        }
        fn supports_tao(&self) -> bool {
            true
        }
        fn supports_dummy_sao(&self) -> bool {
            self.dummy_sao
        }
        fn supports_dummy_tao(&self) -> bool {
            self.dummy_tao
        }
        fn supports_burnproof(&self) -> bool {
            self.burnproof
        }
        fn must_blank_before_write(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_drive_refinement_strips_unusable_flags() {
        let set = FlagSet {
            supported: BurnFlags::DAO | BurnFlags::DUMMY | BurnFlags::BURNPROOF,
            compulsory: BurnFlags::DAO,
        };
        let drive = FakeDrive {
            sao: true,
            dummy_sao: false,
            dummy_tao: true,
            burnproof: false,
        };
        let refined = flags_update_for_drive(set, &drive);
        assert!(refined.supported.contains(BurnFlags::DAO));
        // DAO is compulsory and the drive cannot simulate SAO writes
        assert!(!refined.supported.contains(BurnFlags::DUMMY));
        assert!(!refined.supported.contains(BurnFlags::BURNPROOF));
    }
}
