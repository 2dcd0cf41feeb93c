//! Integration tests for the scorch planning pipeline.

use scorch::caps::{ChecksumKind, IoFlags, Registry, RegistryBuilder};
use scorch::error::Error;
use scorch::flags::BurnFlags;
use scorch::medium::Media;
use scorch::plugin::{Plugin, ProcessOrder};
use scorch::session::Session;
use scorch::track::{FsFlags, ImageFormats, TrackType};

const BLANK_CDR: Media = Media::CD_R.union(Media::BLANK);

/// A registry resembling a small real-world plugin set: an imager, a
/// recorder, a CUE-only recorder requiring DAO, a blanker, and a checksummer.
fn build_registry() -> Registry {
    let mut builder = RegistryBuilder::new();

    let mkisofs = builder.register_plugin(Plugin::new("mkisofs", 10));

    let mut cdrecord = Plugin::new("cdrecord", 10);
    cdrecord.set_record_flags(
        Media::CD | Media::WRITABLE | Media::REWRITABLE | Media::BLANK | Media::APPENDABLE,
        BurnFlags::DAO | BurnFlags::BURNPROOF | BurnFlags::MULTI | BurnFlags::DUMMY,
        BurnFlags::empty(),
    );
    let cdrecord = builder.register_plugin(cdrecord);

    let mut cdrdao = Plugin::new("cdrdao", 5);
    cdrdao.set_record_flags(
        Media::CD | Media::WRITABLE | Media::BLANK,
        BurnFlags::DAO | BurnFlags::BURNPROOF,
        BurnFlags::DAO,
    );
    let cdrdao = builder.register_plugin(cdrdao);

    let mut blanker = Plugin::new("blanker", 0);
    blanker.set_blank_flags(
        Media::CD | Media::REWRITABLE | Media::CLOSED | Media::APPENDABLE | Media::HAS_DATA,
        BurnFlags::FAST_BLANK,
        BurnFlags::empty(),
    );
    let blanker = builder.register_plugin(blanker);

    let mut md5sum = Plugin::new("md5sum", 0);
    md5sum.set_process_order(ProcessOrder::BEFORE_TARGET | ProcessOrder::AFTER_TARGET);
    let md5sum = builder.register_plugin(md5sum);

    let data = builder.get_or_create_data_caps(FsFlags::ISO | FsFlags::JOLIET);
    let iso = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
    let cue = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::CUE);
    let writable_cd = builder.get_or_create_disc_caps(
        Media::CD | Media::WRITABLE | Media::REWRITABLE | Media::BLANK | Media::APPENDABLE,
    );
    let closed_cdrw = builder.get_or_create_disc_caps(
        Media::CD | Media::REWRITABLE | Media::CLOSED | Media::HAS_DATA,
    );

    builder.register_link(&iso, &data, mkisofs);
    builder.register_link(&writable_cd, &iso, cdrecord);
    builder.register_link(&writable_cd, &cue, cdrdao);
    builder.register_blank(&closed_cdrw, blanker);
    builder.register_checksum(ChecksumKind::Md5, &iso, md5sum);

    builder.build()
}

/// An active, media-compatible link chain must be reported reachable.
#[test]
fn test_input_supported_through_chain() {
    let registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    assert!(registry.is_input_supported(&session, &TrackType::Data(FsFlags::ISO), true));
    assert!(registry.is_input_supported(&session, &TrackType::Image(ImageFormats::ISO), true));
    assert!(!registry.is_input_supported(&session, &TrackType::Image(ImageFormats::CLONE), true));
}

/// Output-side feasibility mirrors the input side.
#[test]
fn test_output_supported() {
    let registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    assert!(registry.is_output_supported(&session, &TrackType::Disc(BLANK_CDR)));
    assert!(registry.is_output_supported(&session, &TrackType::Image(ImageFormats::ISO)));
    assert!(!registry.is_output_supported(&session, &TrackType::Image(ImageFormats::CDRDAO)));
}

/// A data burn plans as two tasks: imaging, then recording.
#[test]
fn test_new_task_two_stages() {
    let registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    let tasks = registry.new_task(&session, None).unwrap();
    assert_eq!(tasks.len(), 2);

    // stage typing follows the chain
    let imaging = &tasks[0].jobs[0];
    let recording = tasks[1].jobs.last().unwrap();
    assert_eq!(imaging.input, TrackType::Data(FsFlags::ISO));
    assert_eq!(recording.output, TrackType::Disc(BLANK_CDR));
}

/// With a pipe-capable edge and temp files elided, the stages collapse into
/// one task.
#[test]
fn test_new_task_pipes_into_single_task() {
    let mut builder = RegistryBuilder::new();
    let mkimage = builder.register_plugin(Plugin::new("mkimage", 0));
    let mut recorder = Plugin::new("recorder", 0);
    recorder.set_record_flags(BLANK_CDR, BurnFlags::BURN_MASK, BurnFlags::empty());
    let recorder = builder.register_plugin(recorder);

    let data = builder.get_or_create_data_caps(FsFlags::ISO);
    let image = builder.get_or_create_image_caps(
        IoFlags::ACCEPT_FILE | IoFlags::ACCEPT_PIPE,
        ImageFormats::BIN,
    );
    let disc = builder.get_or_create_disc_caps(BLANK_CDR);
    builder.register_link(&image, &data, mkimage);
    builder.register_link(&disc, &image, recorder);
    let registry = builder.build();

    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    let tasks = registry.new_task(&session, None).unwrap();
    assert_eq!(tasks.len(), 2);

    let piped = session.with_flags(BurnFlags::NO_TMP_FILES);
    let tasks = registry.new_task(&piped, None).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].jobs.len(), 2);
}

/// A closed CD-RW only resolves through the blanking retry, and the blanking
/// task lands right before the recording task.
#[test]
fn test_blanking_retry_schedules_blank_task() {
    let registry = build_registry();
    let closed = Media::CD_RW | Media::CLOSED | Media::HAS_DATA;
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(closed))
        .with_flags(BurnFlags::BLANK_BEFORE_WRITE);
    let tasks = registry.new_task(&session, None).unwrap();
    // imaging, blanking, recording
    assert_eq!(tasks.len(), 3);
    let blanking = &tasks[1].jobs[0];
    assert_eq!(blanking.input, TrackType::Disc(closed));
    assert_eq!(blanking.output, TrackType::Disc(closed.as_blanked()));

    // without permission to blank, the session is unplannable
    let refused = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(closed));
    assert_eq!(registry.new_task(&refused, None), Err(Error::NotSupported));
}

/// Temp output overrides the session output: planning stops at the image.
#[test]
fn test_new_task_with_temp_output() {
    let registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    let tasks = registry
        .new_task(&session, Some(TrackType::Image(ImageFormats::ISO)))
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        tasks[0].jobs.last().unwrap().output,
        TrackType::Image(ImageFormats::ISO)
    );
}

/// Flag negotiation keeps compulsory a subset of supported.
#[test]
fn test_burn_flags_compulsory_subset() {
    let registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    let set = registry.burn_flags(&session).unwrap();
    assert!(set.supported.contains(set.compulsory));
    assert!(set.supported.contains(BurnFlags::DAO | BurnFlags::MULTI));
}

/// A CUE image with only a DAO-compulsory recorder surfaces DAO as
/// compulsory even when the session did not request it.
#[test]
fn test_cue_burn_forces_dao_compulsory() {
    let registry = build_registry();
    let session = Session::new(
        TrackType::Image(ImageFormats::CUE),
        TrackType::Disc(BLANK_CDR),
    );
    let set = registry.burn_flags(&session).unwrap();
    assert!(set.compulsory.contains(BurnFlags::DAO));
    assert!(set.supported.contains(BurnFlags::DAO));
}

/// DVD-RW sequential media reject the MULTI+FAST_BLANK combination in blank
/// negotiation.
#[test]
fn test_dvd_rw_blank_flags_mutual_exclusion() {
    let mut builder = RegistryBuilder::new();
    let dvd_rw = Media::DVD_RW | Media::CLOSED | Media::HAS_DATA;
    let mut blanker = Plugin::new("dvd-blanker", 0);
    blanker.set_blank_flags(dvd_rw, BurnFlags::FAST_BLANK, BurnFlags::empty());
    let blanker = builder.register_plugin(blanker);
    let disc = builder.get_or_create_disc_caps(dvd_rw);
    builder.register_blank(&disc, blanker);
    let registry = builder.build();

    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(dvd_rw))
        .with_flags(BurnFlags::FAST_BLANK | BurnFlags::MULTI);
    assert_eq!(registry.blank_flags(&session), Err(Error::NotSupported));

    let multi_only = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(dvd_rw))
        .with_flags(BurnFlags::MULTI);
    let set = registry.blank_flags(&multi_only).unwrap();
    assert!(!set.supported.contains(BurnFlags::FAST_BLANK));
}

/// Widening a data registration yields two nodes partitioning the space.
#[test]
fn test_registration_split_scenario() {
    let mut builder = RegistryBuilder::new();
    builder.get_or_create_data_caps(FsFlags::ISO);
    let ids = builder.get_or_create_data_caps(FsFlags::ISO | FsFlags::JOLIET);
    let registry = builder.build();

    let mut subtype_sets: Vec<u32> = ids
        .iter()
        .map(|&id| match registry.caps(id).track() {
            TrackType::Data(fs) => fs.bits(),
            other => panic!("unexpected caps type {other:?}"),
        })
        .collect();
    subtype_sets.sort_unstable();
    assert_eq!(
        subtype_sets,
        vec![FsFlags::ISO.bits(), FsFlags::JOLIET.bits()]
    );
}

/// The media the user could be told to insert is the union over every
/// reachable disc node.
#[test]
fn test_required_media_type() {
    let registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    let required = registry.required_media_type(&session);
    assert!(required.contains(Media::CD_R | Media::BLANK));
    assert!(required.contains(Media::CD_RW | Media::APPENDABLE));
    assert!(!required.intersects(Media::DVD));
}

/// Image output formats enumerate from the registry.
#[test]
fn test_possible_output_formats() {
    let registry = build_registry();
    let session = Session::new(
        TrackType::Data(FsFlags::ISO),
        TrackType::Image(ImageFormats::ISO),
    );
    let (formats, count) = registry.possible_output_formats(&session);
    assert_eq!(formats, ImageFormats::ISO);
    assert_eq!(count, 1);
    assert_eq!(
        registry.default_output_format(&session),
        Some(ImageFormats::ISO)
    );
}

/// Checksumming consults the checksum table directly, with a conversion
/// prefix when the input type is not accepted as-is.
#[test]
fn test_checksumming_task() {
    let registry = build_registry();

    // direct: the md5 table covers ISO images
    let session = Session::new(
        TrackType::Image(ImageFormats::ISO),
        TrackType::Image(ImageFormats::ISO),
    );
    let task = registry
        .new_checksumming_task(&session, ChecksumKind::Md5)
        .unwrap();
    assert_eq!(task.jobs.len(), 1);
    assert_eq!(task.jobs[0].input, TrackType::Image(ImageFormats::ISO));

    // indirect: data input needs an imaging stage first
    let session = Session::new(
        TrackType::Data(FsFlags::ISO),
        TrackType::Image(ImageFormats::ISO),
    );
    let task = registry
        .new_checksumming_task(&session, ChecksumKind::Md5)
        .unwrap();
    assert_eq!(task.jobs.len(), 2);

    // no sha256 implementation was registered
    assert_eq!(
        registry.new_checksumming_task(&session, ChecksumKind::Sha256),
        Err(Error::NotSupported)
    );

    // multi-track sessions are rejected
    let mut multi = session;
    multi.track_count = 3;
    assert_eq!(
        registry.new_checksumming_task(&multi, ChecksumKind::Md5),
        Err(Error::BadTrackCount(3))
    );
}

/// Deactivating the only recorder makes every disc plan unsupported; state
/// changes are picked up without rebuilding.
#[test]
fn test_plugin_state_changes_are_live() {
    let mut registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    assert!(registry.new_task(&session, None).is_ok());

    let cdrecord = registry
        .iter_plugins()
        .find(|(_, p)| p.name() == "cdrecord")
        .map(|(id, _)| id)
        .unwrap();
    registry.set_plugin_active(cdrecord, false);
    assert_eq!(registry.new_task(&session, None), Err(Error::NotSupported));

    registry.set_plugin_active(cdrecord, true);
    registry.push_plugin_error(cdrecord, "wodim binary missing");
    assert_eq!(registry.new_task(&session, None), Err(Error::NotSupported));

    registry.clear_plugin_errors(cdrecord);
    assert!(registry.new_task(&session, None).is_ok());
}

/// A broken plugin on the only viable chain is reported so the application
/// can offer an install.
#[test]
fn test_missing_plugin_reporting() {
    let mut registry = build_registry();
    let session = Session::new(TrackType::Data(FsFlags::ISO), TrackType::Disc(BLANK_CDR));
    let mkisofs = registry
        .iter_plugins()
        .find(|(_, p)| p.name() == "mkisofs")
        .map(|(id, _)| id)
        .unwrap();
    registry.push_plugin_error(mkisofs, "mkisofs binary missing");

    let mut reported = Vec::new();
    let result = registry.report_missing_plugins(&session, |plugin| {
        reported.push(plugin.name().to_string());
        scorch::negotiation::SearchControl::Continue
    });
    assert_eq!(result, Err(Error::NotSupported));
    assert_eq!(reported, vec!["mkisofs".to_string()]);
}
