//! Plugin capability facts.
//!
//! A [`Plugin`] here is not executable code: it is the planner's record of
//! what one backend can do — its priority, group membership, activation and
//! error state, and three independent flag tables consulted for recording,
//! imaging, and blanking decisions.

use super::facts::FlagTable;
use super::GroupId;
use crate::flags::{BurnFlags, FlagSet};
use crate::medium::Media;
use bitflags::bitflags;

bitflags! {
    /// When a modifier plugin runs relative to the stage it is attached to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProcessOrder: u8 {
        /// Before the very first stage of the pipeline.
        const PREPROCESSING = 1 << 0;
        /// Before any intermediate or final stage.
        const BEFORE_TARGET = 1 << 1;
        /// After the final stage produced the requested artifact.
        const AFTER_TARGET = 1 << 2;
    }
}

/// Capability record for one registered plugin.
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    priority: i32,
    user_priority: Option<i32>,
    group: Option<GroupId>,
    active: bool,
    errors: Vec<String>,
    process_order: ProcessOrder,
    burn_table: FlagTable,
    image_table: FlagTable,
    blank_table: FlagTable,
}

impl Plugin {
    /// Create a plugin record with its registration-time priority.
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            user_priority: None,
            group: None,
            active: true,
            errors: Vec::new(),
            process_order: ProcessOrder::empty(),
            burn_table: FlagTable::default(),
            image_table: FlagTable::default(),
            blank_table: FlagTable::default(),
        }
    }

    /// The plugin's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registration-time priority.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Override the priority (an operator preference). A negative value
    /// disables the plugin entirely.
    pub fn set_user_priority(&mut self, priority: i32) {
        self.user_priority = Some(priority);
    }

    /// The priority resolutions use: the user override when present, the
    /// registration value otherwise.
    pub fn effective_priority(&self) -> i32 {
        self.user_priority.unwrap_or(self.priority)
    }

    /// The group this plugin belongs to, if any.
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    /// Put the plugin in a group.
    pub fn set_group(&mut self, group: GroupId) {
        self.group = Some(group);
    }

    /// Enable or disable the plugin.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Record an unresolved problem (e.g. a missing external tool).
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Forget all recorded problems (e.g. after an install completed).
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// The recorded problems, most recent last.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Whether the plugin may take part in a resolution.
    ///
    /// A negative effective priority disables it; outstanding errors
    /// disable it too unless `ignore_errors` is set.
    pub fn is_active(&self, ignore_errors: bool) -> bool {
        if self.effective_priority() < 0 {
            return false;
        }
        if !ignore_errors && !self.errors.is_empty() {
            return false;
        }
        self.active
    }

    /// When this plugin runs if used as a modifier.
    pub fn process_order(&self) -> ProcessOrder {
        self.process_order
    }

    /// Declare when this plugin runs if used as a modifier.
    pub fn set_process_order(&mut self, order: ProcessOrder) {
        self.process_order = order;
    }

    /// Register a recording capability for a media class.
    pub fn set_record_flags(&mut self, media: Media, supported: BurnFlags, compulsory: BurnFlags) {
        self.burn_table.add(media, supported, compulsory);
    }

    /// Register an imaging capability for a media class.
    pub fn set_image_flags(&mut self, media: Media, supported: BurnFlags, compulsory: BurnFlags) {
        self.image_table.add(media, supported, compulsory);
    }

    /// Register a blanking capability for a media class.
    pub fn set_blank_flags(&mut self, media: Media, supported: BurnFlags, compulsory: BurnFlags) {
        self.blank_table.add(media, supported, compulsory);
    }

    /// Whether the plugin can record on `media` under the session flags.
    pub fn check_record_flags(&self, media: Media, current: BurnFlags) -> bool {
        let current = current & BurnFlags::BURN_MASK;
        if self.burn_table.is_empty() {
            return current.is_empty();
        }
        self.burn_table.supports(media, BurnFlags::BURN_MASK, current)
    }

    /// Whether the plugin can image for `media` under the session flags.
    pub fn check_image_flags(&self, media: Media, current: BurnFlags) -> bool {
        let current = current & BurnFlags::IMAGE_MASK;
        if self.image_table.is_empty() {
            return current.is_empty();
        }
        self.image_table
            .supports(media, BurnFlags::IMAGE_MASK, current)
    }

    /// Whether the plugin can blank `media` under the session flags.
    pub fn check_blank_flags(&self, media: Media, current: BurnFlags) -> bool {
        let current = current & BurnFlags::BLANK_MASK;
        if self.blank_table.is_empty() {
            return current.is_empty();
        }
        self.blank_table
            .supports(media, BurnFlags::BLANK_MASK, current)
    }

    /// Whether the plugin accepts `media` at all. A plugin that never
    /// registered recording facts is unrestricted.
    pub fn check_media_restrictions(&self, media: Media) -> bool {
        self.burn_table.is_empty() || self.burn_table.matches_media(media)
    }

    /// The merged recording flag set for `media` under the session flags.
    ///
    /// Unlike [`check_record_flags`](Self::check_record_flags) this does not
    /// require the session to already carry a pair's compulsory flags — the
    /// negotiation exists to discover them.
    pub fn record_flags(&self, media: Media, current: BurnFlags) -> Option<FlagSet> {
        self.burn_table.all_flags(
            media,
            BurnFlags::BURN_MASK,
            current & BurnFlags::BURN_MASK,
            false,
        )
    }

    /// The merged imaging flag set for `media` under the session flags.
    pub fn image_flags(&self, media: Media, current: BurnFlags) -> Option<FlagSet> {
        self.image_table.all_flags(
            media,
            BurnFlags::IMAGE_MASK,
            current & BurnFlags::IMAGE_MASK,
            false,
        )
    }

    /// The merged blanking flag set for `media` under the session flags.
    pub fn blank_flags(&self, media: Media, current: BurnFlags) -> Option<FlagSet> {
        self.blank_table.all_flags(
            media,
            BurnFlags::BLANK_MASK,
            current & BurnFlags::BLANK_MASK,
            false,
        )
    }
}
