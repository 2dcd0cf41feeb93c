//! # Scorch
//!
//! A constraint-driven pipeline planner for disc and image authoring.
//!
//! Scorch decides whether a requested transformation — "turn these input
//! tracks into a writable disc or image of this format, honouring these
//! flags" — is achievable given a registry of capability-providing plugins,
//! and assembles the concrete ordered stage list that performs it. It plans;
//! it never executes. Running the stages, talking to drives, and loading
//! plugin code are external concerns.
//!
//! ## Architecture
//!
//! - [`caps`]: the capability graph — artifact-class nodes with
//!   plugin-backed transformation edges, built once by plugin registration
//!   (with node splitting on partial overlaps), then frozen.
//! - [`plugin`]: per-plugin capability facts — priority, group, activation,
//!   and the three flag tables (recording, imaging, blanking).
//! - [`negotiation`]: the graph searches — best-path resolution,
//!   feasibility queries, and flag negotiation with medium- and
//!   drive-specific refinements.
//! - [`pipeline`]: the assembled output — jobs bound to input/output types,
//!   grouped into pipe-chainable tasks.
//! - [`session`]: the consumer facade tying it all together.
//!
//! ## Quick Start
//!
//! ```rust
//! use scorch::prelude::*;
//!
//! // registration phase: plugins declare what they can do
//! let mut builder = Registry::builder();
//! let mkisofs = builder.register_plugin(Plugin::new("mkisofs", 10));
//! let mut recorder = Plugin::new("recorder", 10);
//! recorder.set_record_flags(
//!     Media::CD_R | Media::BLANK,
//!     BurnFlags::DAO | BurnFlags::BURNPROOF,
//!     BurnFlags::empty(),
//! );
//! let recorder = builder.register_plugin(recorder);
//!
//! let data = builder.get_or_create_data_caps(FsFlags::ISO);
//! let image = builder.get_or_create_image_caps(IoFlags::ACCEPT_FILE, ImageFormats::ISO);
//! let disc = builder.get_or_create_disc_caps(Media::CD_R | Media::BLANK);
//! builder.register_link(&image, &data, mkisofs);
//! builder.register_link(&disc, &image, recorder);
//! let registry = builder.build();
//!
//! // query phase: plan a burn
//! let session = Session::new(
//!     TrackType::Data(FsFlags::ISO),
//!     TrackType::Disc(Media::CD_R | Media::BLANK),
//! );
//! let tasks = registry.new_task(&session, None).unwrap();
//! assert_eq!(tasks.len(), 2); // imaging task, then recording task
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod caps;
pub mod error;
pub mod flags;
pub mod medium;
pub mod negotiation;
pub mod pipeline;
pub mod plugin;
pub mod session;
pub mod track;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::caps::{ChecksumKind, IoFlags, Registry, RegistryBuilder};
    pub use crate::error::{Error, Result};
    pub use crate::flags::{BurnFlags, FlagSet};
    pub use crate::medium::{Media, MediumInfo};
    pub use crate::pipeline::{Job, Task};
    pub use crate::plugin::{GroupId, Plugin, PluginId, ProcessOrder};
    pub use crate::session::Session;
    pub use crate::track::{FsFlags, ImageFormats, StreamFormats, TrackType};
}

pub use error::{Error, Result};
