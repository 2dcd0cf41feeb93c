//! Session description and the consumer-facing planning facade.
//!
//! A [`Session`] is what the application hands over: what it has, what it
//! wants, and under which options. The facade methods on
//! [`Registry`] answer the planning questions — can this be done, with which
//! options, through which ordered stages.

use crate::caps::{ChecksumKind, IoFlags, Registry};
use crate::error::{Error, Result};
use crate::flags::{BurnFlags, FlagSet};
use crate::medium::{Media, MediumInfo};
use crate::negotiation::{
    self, FeasibleCtx, ResolveCtx, SearchControl, SearchOutcome,
};
use crate::pipeline::{assemble_tasks, Job, Task};
use crate::plugin::{GroupId, Plugin, PluginId};
use crate::track::{ImageFormats, TrackType};

/// What a consumer wants planned: input artifact, desired output, options,
/// and preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// The artifact type the pipeline starts from.
    pub input: TrackType,
    /// The artifact type the pipeline must produce.
    pub output: TrackType,
    /// Requested options.
    pub flags: BurnFlags,
    /// Preferred plugin group, used as a tie-break, never a filter.
    pub group: Option<GroupId>,
    /// Number of input tracks the session carries.
    pub track_count: usize,
}

impl Session {
    /// A session with no flags and no group preference.
    pub fn new(input: TrackType, output: TrackType) -> Self {
        Self {
            input,
            output,
            flags: BurnFlags::empty(),
            group: None,
            track_count: 1,
        }
    }

    /// Set the requested options.
    pub fn with_flags(mut self, flags: BurnFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the preferred plugin group.
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// The destination medium, empty for file outputs.
    pub fn dest_media(&self) -> Media {
        match self.output {
            TrackType::Disc(media) => media,
            _ => Media::empty(),
        }
    }
}

impl Registry {
    /// Build the full pipeline for a session: the ordered task list whose
    /// last stage produces the session output (or `temp_output` when the
    /// caller wants to stop at an intermediate artifact).
    ///
    /// When the destination medium cannot be written in its current state
    /// but could be once blanked, and the session allows blanking, the
    /// search is retried against the blanked medium and a blanking task is
    /// scheduled right before the recording task — as late as possible,
    /// since blanking destroys data.
    pub fn new_task(&self, session: &Session, temp_output: Option<TrackType>) -> Result<Vec<Task>> {
        let output = temp_output.unwrap_or(session.output);
        if session.input.subtype_bits() == 0 || output.subtype_bits() == 0 {
            return Err(Error::EmptySession);
        }
        let start = self.find_start_caps(&output).ok_or(Error::NotSupported)?;
        let media = match output {
            TrackType::Disc(media) => media,
            _ => Media::empty(),
        };
        let ctx = ResolveCtx {
            group: session.group,
            session_flags: session.flags,
            media,
            input: session.input,
            io_flags: IoFlags::ACCEPT_FILE,
        };

        let mut blanking = false;
        let chain = match negotiation::find_best_link(self, &ctx, start, &[]) {
            Some(chain) => chain,
            None => {
                // maybe the medium is only unwritable in its current state
                let TrackType::Disc(media) = output else {
                    return Err(Error::NotSupported);
                };
                if !session.flags.contains(BurnFlags::BLANK_BEFORE_WRITE)
                    || !negotiation::can_blank(self, media, session.flags)
                {
                    return Err(Error::NotSupported);
                }
                let blanked = media.as_blanked();
                tracing::debug!("retrying resolution against a blanked medium");
                let start = self
                    .find_start_caps(&TrackType::Disc(blanked))
                    .ok_or(Error::NotSupported)?;
                let ctx = ResolveCtx {
                    media: blanked,
                    session_flags: session.flags - BurnFlags::BLANK_BEFORE_WRITE,
                    ..ctx
                };
                blanking = true;
                negotiation::find_best_link(self, &ctx, start, &[]).ok_or(Error::NotSupported)?
            }
        };

        let mut exec = chain;
        exec.reverse();
        let mut tasks = assemble_tasks(self, session, &exec, &output)?;

        if blanking {
            let blank_task = self.new_blanking_task(session)?;
            let at = tasks.len() - 1;
            tasks.insert(at, blank_task);
        }
        Ok(tasks)
    }

    /// Build the single task computing a checksum over the session input.
    ///
    /// Checksumming bypasses the general graph search: the checksum table is
    /// consulted directly, with at most a short resolution prefix when no
    /// algorithm implementation accepts the input type as-is.
    pub fn new_checksumming_task(&self, session: &Session, kind: ChecksumKind) -> Result<Task> {
        if session.track_count != 1 {
            return Err(Error::BadTrackCount(session.track_count));
        }
        let test = self.checksum_test(kind).ok_or(Error::NotSupported)?;

        // direct acceptance first
        for link in test.links() {
            let caps = self.caps(link.target());
            if !caps.track().is_compatible_with(&session.input) {
                continue;
            }
            if let Some(plugin) = self.best_active_plugin(link.plugins()) {
                return Ok(Task {
                    jobs: vec![Job {
                        plugin,
                        input: session.input,
                        output: session.input,
                    }],
                });
            }
        }

        // otherwise, convert the input into something checksummable
        for link in test.links() {
            let Some(plugin) = self.best_active_plugin(link.plugins()) else {
                continue;
            };
            let ctx = ResolveCtx {
                group: session.group,
                session_flags: session.flags,
                media: session.dest_media(),
                input: session.input,
                io_flags: IoFlags::ACCEPT_FILE,
            };
            let Some(chain) = negotiation::find_best_link(self, &ctx, link.target(), &[]) else {
                continue;
            };
            let mut exec = chain;
            exec.reverse();
            let checksummed = *self.caps(link.target()).track();
            let tasks = assemble_tasks(self, session, &exec, &checksummed)?;
            let mut jobs: Vec<Job> = tasks.into_iter().flat_map(|t| t.jobs).collect();
            jobs.push(Job {
                plugin,
                input: checksummed,
                output: checksummed,
            });
            return Ok(Task { jobs });
        }
        Err(Error::NotSupported)
    }

    /// Build the single task blanking the session's destination medium.
    pub fn new_blanking_task(&self, session: &Session) -> Result<Task> {
        let TrackType::Disc(media) = session.output else {
            return Err(Error::NotSupported);
        };
        let mut best: Option<(i32, PluginId)> = None;
        for (_, caps) in self.iter_caps() {
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
                    let plugin = self.plugin(id);
                    if !plugin.is_active(false) || !plugin.check_blank_flags(media, session.flags) {
                        continue;
                    }
                    let priority = plugin.effective_priority();
                    if best.map_or(true, |(best_priority, _)| priority > best_priority) {
                        best = Some((priority, id));
                    }
                }
            }
        }
        let (_, plugin) = best.ok_or(Error::NotSupported)?;
        Ok(Task {
            jobs: vec![Job {
                plugin,
                input: TrackType::Disc(media),
                output: TrackType::Disc(media.as_blanked()),
            }],
        })
    }

    /// Whether `input` could feed a pipeline producing the session output.
    /// With `check_flags`, the session's option set must be honoured too.
    pub fn is_input_supported(&self, session: &Session, input: &TrackType, check_flags: bool) -> bool {
        let Some(start) = self.find_start_caps(&session.output) else {
            return false;
        };
        let flags = if check_flags {
            session.flags
        } else {
            BurnFlags::empty()
        };
        let mut ctx = FeasibleCtx {
            session_flags: flags,
            media: session.dest_media(),
            input: *input,
            io_flags: IoFlags::ACCEPT_FILE,
            ignore_plugin_errors: false,
            broken_plugin: None,
        };
        negotiation::find_link(self, &mut ctx, start, &[]) == SearchOutcome::Found
    }

    /// Whether the session input could produce `output`.
    pub fn is_output_supported(&self, session: &Session, output: &TrackType) -> bool {
        let Some(start) = self.find_start_caps(output) else {
            return false;
        };
        let media = match output {
            TrackType::Disc(media) => *media,
            _ => Media::empty(),
        };
        let mut ctx = FeasibleCtx {
            session_flags: session.flags,
            media,
            input: session.input,
            io_flags: IoFlags::ACCEPT_FILE,
            ignore_plugin_errors: false,
            broken_plugin: None,
        };
        negotiation::find_link(self, &mut ctx, start, &[]) == SearchOutcome::Found
    }

    /// The recording option sets for the session's destination medium.
    pub fn burn_flags(&self, session: &Session) -> Result<FlagSet> {
        let TrackType::Disc(media) = session.output else {
            return Err(Error::NotSupported);
        };
        if media.is_empty() || session.input.subtype_bits() == 0 {
            return Err(Error::EmptySession);
        }
        negotiation::flags_for_medium(self, media, &session.input, session.flags)
    }

    /// The blanking option sets for the session's destination medium.
    pub fn blank_flags(&self, session: &Session) -> Result<FlagSet> {
        let TrackType::Disc(media) = session.output else {
            return Err(Error::NotSupported);
        };
        if media.is_empty() {
            return Err(Error::EmptySession);
        }
        negotiation::blank_flags(self, media, session.flags)
    }

    /// Whether the session's destination medium can be blanked under its
    /// flags.
    pub fn can_blank(&self, session: &Session) -> bool {
        match session.output {
            TrackType::Disc(media) => negotiation::can_blank(self, media, session.flags),
            _ => false,
        }
    }

    /// Union of every concrete medium the session input could be burnt to.
    ///
    /// Blanking-related flags are left out of the query: which medium the
    /// user should insert is independent of whether that medium would need
    /// blanking first.
    pub fn required_media_type(&self, session: &Session) -> Media {
        let flags = session.flags - (BurnFlags::BLANK_BEFORE_WRITE | BurnFlags::FAST_BLANK);
        let mut required = Media::empty();
        for (id, caps) in self.iter_caps() {
            let TrackType::Disc(caps_media) = caps.track() else {
                continue;
            };
            for atom in caps_media.expand() {
                let mut ctx = FeasibleCtx {
                    session_flags: flags,
                    media: atom,
                    input: session.input,
                    io_flags: IoFlags::ACCEPT_FILE,
                    ignore_plugin_errors: false,
                    broken_plugin: None,
                };
                if negotiation::find_link(self, &mut ctx, id, &[]) == SearchOutcome::Found {
                    required |= atom;
                }
            }
        }
        required
    }

    /// The image formats the session input can be turned into, and how many
    /// there are.
    pub fn possible_output_formats(&self, session: &Session) -> (ImageFormats, usize) {
        let mut formats = ImageFormats::empty();
        let mut count = 0;
        for format in ImageFormats::all().iter() {
            if self.is_output_supported(session, &TrackType::Image(format)) {
                formats |= format;
                count += 1;
            }
        }
        (formats, count)
    }

    /// The preferred image format for the session input, ISO first.
    pub fn default_output_format(&self, session: &Session) -> Option<ImageFormats> {
        [
            ImageFormats::ISO,
            ImageFormats::BIN,
            ImageFormats::CUE,
            ImageFormats::CDRDAO,
            ImageFormats::CLONE,
        ]
        .into_iter()
        .find(|&format| self.is_output_supported(session, &TrackType::Image(format)))
    }

    /// Post-filter a negotiated flag set against the drive that will write.
    pub fn flags_update_for_drive(&self, set: FlagSet, drive: &dyn MediumInfo) -> FlagSet {
        negotiation::flags_update_for_drive(set, drive)
    }

    /// Walk the feasibility graph for the session and report every plugin
    /// that would make it viable were its errors resolved (e.g. a missing
    /// backend the application could offer to install).
    ///
    /// Returns `Ok` when a fully working chain exists anyway,
    /// [`Error::NotSupported`] when nothing viable was found, and
    /// [`Error::Cancelled`] when the callback aborted the walk.
    pub fn report_missing_plugins(
        &self,
        session: &Session,
        mut on_broken: impl FnMut(&Plugin) -> SearchControl,
    ) -> Result<()> {
        let start = self
            .find_start_caps(&session.output)
            .ok_or(Error::NotSupported)?;
        let mut ctx = FeasibleCtx {
            session_flags: session.flags,
            media: session.dest_media(),
            input: session.input,
            io_flags: IoFlags::ACCEPT_FILE,
            ignore_plugin_errors: false,
            broken_plugin: Some(&mut on_broken),
        };
        match negotiation::find_link(self, &mut ctx, start, &[]) {
            SearchOutcome::Found => Ok(()),
            SearchOutcome::NotSupported => Err(Error::NotSupported),
            SearchOutcome::Cancelled => Err(Error::Cancelled),
        }
    }

    fn best_active_plugin(&self, plugins: &[PluginId]) -> Option<PluginId> {
        plugins
            .iter()
            .copied()
            .filter(|&id| self.plugin(id).is_active(false))
            .max_by_key(|&id| self.plugin(id).effective_priority())
    }
}
