//! Technical media properties of a single video file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Parsed analysis-tool output for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCharacteristics {
    /// Analysed file.
    pub path: PathBuf,
    /// Lower-cased container format (`matroska`, `avi`, `mpeg-ps`).
    pub container: String,
    /// Lower-cased codec id; empty for some disc segments.
    pub codec: String,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
    /// Duration in seconds; `None` when the report carried no duration.
    pub duration_in_sec: Option<u64>,
    /// Report text with emphasised section headers.
    pub formatted_report: String,
}

impl MediaCharacteristics {
    /// Empty record for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// AVI container.
    #[must_use]
    pub fn is_avi(&self) -> bool {
        self.container == "avi"
    }

    /// Matroska container.
    #[must_use]
    pub fn is_mkv(&self) -> bool {
        self.container == "matroska"
    }

    /// MPEG program stream, as found in DVD VOB segments.
    #[must_use]
    pub fn is_vob(&self) -> bool {
        self.container == "mpeg-ps"
    }

    /// DivX 5 codec.
    #[must_use]
    pub fn is_divx(&self) -> bool {
        self.codec == "dx50"
    }

    /// XviD codec.
    #[must_use]
    pub fn is_xvid(&self) -> bool {
        self.codec == "xvid"
    }

    /// H.264 by Matroska codec id.
    #[must_use]
    pub fn is_x264(&self) -> bool {
        self.codec == "v_mpeg4/iso/avc"
    }
}
