//! Track and artifact type descriptions.
//!
//! A [`TrackType`] names one class of artifact flowing through a pipeline: a
//! data filesystem, a disc image, an audio/video stream, or a physical
//! medium. The tag carries a subtype bitmask; compatibility between a
//! candidate and a requested type is a per-tag bitmask predicate, not plain
//! equality.

use crate::medium::Media;
use bitflags::bitflags;

bitflags! {
    /// Filesystem features a data track may carry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FsFlags: u32 {
        /// Plain ISO9660.
        const ISO = 1 << 0;
        /// UDF filesystem.
        const UDF = 1 << 1;
        /// Joliet extensions (long Unicode names).
        const JOLIET = 1 << 2;
        /// A VIDEO_TS directory layout.
        const VIDEO_DIR = 1 << 3;
        /// Symbolic links are present and must be preserved.
        const SYMLINK = 1 << 4;
        /// Directories nested deeper than ISO9660 level allows.
        const DEEP_DIRECTORY = 1 << 5;
    }
}

bitflags! {
    /// On-disk image container formats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageFormats: u32 {
        /// Raw BIN image.
        const BIN = 1 << 0;
        /// ISO9660 image.
        const ISO = 1 << 1;
        /// BIN plus a CUE sheet.
        const CUE = 1 << 2;
        /// A cdrdao TOC description.
        const CDRDAO = 1 << 3;
        /// Raw 2448-byte-sector clone image.
        const CLONE = 1 << 4;
    }
}

bitflags! {
    /// Audio/video stream formats.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamFormats: u32 {
        /// Audio in an unspecified container.
        const UNDEFINED_AUDIO = 1 << 0;
        /// Raw PCM audio.
        const RAW_AUDIO = 1 << 1;
        /// MP3 audio.
        const MP3 = 1 << 2;
        /// AAC audio.
        const AAC = 1 << 3;
        /// FLAC audio.
        const FLAC = 1 << 4;
        /// Ogg-contained audio.
        const OGG = 1 << 5;
        /// Video in an unspecified container.
        const UNDEFINED_VIDEO = 1 << 6;
        /// (Super) Video CD stream.
        const VCD = 1 << 7;
        /// DVD-Video stream.
        const VIDEO_DVD = 1 << 8;
        /// CD-TEXT style metadata is available for the stream.
        const METADATA_INFO = 1 << 9;
    }
}

impl StreamFormats {
    /// Bits that make a stream a video stream.
    pub const VIDEO_CLASS: Self = Self::UNDEFINED_VIDEO.union(Self::VCD).union(Self::VIDEO_DVD);

    /// Whether any video-class bit is set.
    pub fn has_video(self) -> bool {
        self.intersects(Self::VIDEO_CLASS)
    }
}

/// The kind of artifact a pipeline stage consumes or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// A set of files to become a filesystem.
    Data(FsFlags),
    /// A disc image in one or more container formats.
    Image(ImageFormats),
    /// An audio or video stream.
    Stream(StreamFormats),
    /// A physical medium in a drive.
    Disc(Media),
}

/// Discriminant of a [`TrackType`], ordered the way the capability registry
/// sorts its nodes: discs first, data last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrackTag {
    /// Physical media.
    Disc,
    /// Streams.
    Stream,
    /// Disc images.
    Image,
    /// Data filesystems.
    Data,
}

impl TrackType {
    /// The tag of this type, without its subtype payload.
    pub fn tag(&self) -> TrackTag {
        match self {
            TrackType::Disc(_) => TrackTag::Disc,
            TrackType::Stream(_) => TrackTag::Stream,
            TrackType::Image(_) => TrackTag::Image,
            TrackType::Data(_) => TrackTag::Data,
        }
    }

    /// The subtype bitmask as raw bits, whatever the tag.
    pub(crate) fn subtype_bits(&self) -> u32 {
        match self {
            TrackType::Data(fs) => fs.bits(),
            TrackType::Image(formats) => formats.bits(),
            TrackType::Stream(formats) => formats.bits(),
            TrackType::Disc(media) => media.bits(),
        }
    }

    /// The same tag carrying different subtype bits.
    pub(crate) fn with_subtype_bits(&self, bits: u32) -> TrackType {
        match self {
            TrackType::Data(_) => TrackType::Data(FsFlags::from_bits_truncate(bits)),
            TrackType::Image(_) => TrackType::Image(ImageFormats::from_bits_truncate(bits)),
            TrackType::Stream(_) => TrackType::Stream(StreamFormats::from_bits_truncate(bits)),
            TrackType::Disc(_) => TrackType::Disc(Media::from_bits_truncate(bits)),
        }
    }

    /// Whether this type, offered as a candidate, satisfies a request.
    ///
    /// Disc requests need a non-empty media mask and match exactly. The
    /// other tags match when the candidate's subtype is a superset of the
    /// requested bits, with one extra rule for streams: video and non-video
    /// streams never match each other, whatever their bit overlap.
    pub fn is_compatible_with(&self, requested: &TrackType) -> bool {
        match (self, requested) {
            (TrackType::Disc(candidate), TrackType::Disc(requested)) => {
                !requested.is_empty() && candidate == requested
            }
            (TrackType::Data(candidate), TrackType::Data(requested)) => {
                candidate.contains(*requested)
            }
            (TrackType::Image(candidate), TrackType::Image(requested)) => {
                candidate.contains(*requested)
            }
            (TrackType::Stream(candidate), TrackType::Stream(requested)) => {
                if candidate.has_video() != requested.has_video() {
                    return false;
                }
                candidate.contains(*requested)
            }
            _ => false,
        }
    }
}
