//! Per-backend automation policy: which automatic jobs run and where they stop.
//!
//! # Design
//! - Policy only applies to jobs with [`JobOrigin::Automatic`](relgate_core::JobOrigin).
//! - Violations park the job with a [`ParkReason`]; they never fail it.

use globset::{GlobBuilder, GlobMatcher};
use relgate_config::{SourceSettings, parse_multiple_video_stop};
use relgate_core::{JobState, ParkReason, ReleaseJob, StopPoint};
use thiserror::Error;

/// Errors raised while reading automation settings.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A filter term is malformed.
    #[error("invalid automatic job filter")]
    InvalidFilter {
        /// Offending term.
        term: String,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// A stop setting names no known stop point.
    #[error("unknown stop point")]
    UnknownStopPoint {
        /// Settings key.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Job attribute a filter term tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    /// Movie title.
    Title,
    /// Release name.
    Release,
    /// Announced codec.
    Codec,
    /// Announced container.
    Container,
    /// Announced resolution.
    Resolution,
    /// Announced source medium.
    Source,
    /// Release year.
    Year,
    /// IMDb identifier.
    Imdb,
}

impl FilterField {
    fn parse(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "title" => Self::Title,
            "release" => Self::Release,
            "codec" => Self::Codec,
            "container" => Self::Container,
            "resolution" => Self::Resolution,
            "source" => Self::Source,
            "year" => Self::Year,
            "imdb" => Self::Imdb,
            _ => return None,
        })
    }

    fn value_of(self, job: &ReleaseJob) -> String {
        let text = match self {
            Self::Title => job.title.as_deref(),
            Self::Release => job.release_name.as_deref(),
            Self::Codec => job.codec.as_deref(),
            Self::Container => job.container.as_deref(),
            Self::Resolution => job.resolution.as_deref(),
            Self::Source => job.source.as_deref(),
            Self::Imdb => job.imdb_id.as_deref(),
            Self::Year => return job.year.map(|year| year.to_string()).unwrap_or_default(),
        };
        text.unwrap_or_default().to_string()
    }
}

/// Conjunction of `field=glob` terms; an empty filter accepts everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    expression: String,
    terms: Vec<(FilterField, GlobMatcher)>,
}

impl JobFilter {
    /// Parse a whitespace-separated filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidFilter`] for unknown fields, missing `=`
    /// or patterns that do not compile.
    pub fn parse(expression: &str) -> Result<Self, PolicyError> {
        let mut terms = Vec::new();
        for term in expression.split_whitespace() {
            let invalid = |reason| PolicyError::InvalidFilter {
                term: term.to_string(),
                reason,
            };
            let (field, pattern) = term.split_once('=').ok_or_else(|| invalid("missing_equals"))?;
            let field = FilterField::parse(field).ok_or_else(|| invalid("unknown_field"))?;
            if pattern.is_empty() {
                return Err(invalid("empty_pattern"));
            }
            let matcher = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(false)
                .build()
                .map_err(|_| invalid("bad_pattern"))?
                .compile_matcher();
            terms.push((field, matcher));
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            terms,
        })
    }

    /// Whether every term matches `job`.
    #[must_use]
    pub fn matches(&self, job: &ReleaseJob) -> bool {
        self.terms
            .iter()
            .all(|(field, matcher)| matcher.is_match(field.value_of(job)))
    }

    /// Whether the filter has no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Original expression text.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Filter and stop settings for one backend.
#[derive(Debug, Clone, Default)]
pub struct AutomationPolicy {
    filter: JobFilter,
    stop_at: Option<StopPoint>,
    park_on_multiple_videos: bool,
}

impl AutomationPolicy {
    /// Build a policy from explicit parts.
    #[must_use]
    pub const fn new(
        filter: JobFilter,
        stop_at: Option<StopPoint>,
        park_on_multiple_videos: bool,
    ) -> Self {
        Self {
            filter,
            stop_at,
            park_on_multiple_videos,
        }
    }

    /// Read the automation keys of a source's settings.
    ///
    /// # Errors
    ///
    /// Returns an error when the filter or a stop setting is invalid.
    pub fn from_settings(settings: &SourceSettings) -> Result<Self, PolicyError> {
        let filter = JobFilter::parse(&settings.automatic_job_filter)?;
        let stop = settings.stop_automatic_job.trim();
        let stop_at = if stop.is_empty() {
            None
        } else {
            Some(
                stop.parse::<StopPoint>()
                    .map_err(|err| PolicyError::UnknownStopPoint {
                        field: "StopAutomaticJob",
                        value: err.value,
                    })?,
            )
        };
        let park_on_multiple_videos =
            parse_multiple_video_stop(&settings.stop_automatic_job_if_there_are_multiple_videos)
                .map_err(|value| PolicyError::UnknownStopPoint {
                    field: "StopAutomaticJobIfThereAreMultipleVideos",
                    value,
                })?;
        Ok(Self::new(filter, stop_at, park_on_multiple_videos))
    }

    /// Reason to park `job` instead of starting it, if the filter rejects it.
    #[must_use]
    pub fn filter_rejection(&self, job: &ReleaseJob) -> Option<ParkReason> {
        if !job.is_automatic() || self.filter.matches(job) {
            return None;
        }
        Some(ParkReason::FilteredOut {
            expression: self.filter.expression().to_string(),
        })
    }

    /// Reason to park `job` before it enters `next`, if a stop point guards it.
    #[must_use]
    pub fn stop_before(&self, job: &ReleaseJob, next: JobState) -> Option<ParkReason> {
        let point = self.stop_at?;
        (job.is_automatic() && point.guarded_state() == next)
            .then_some(ParkReason::StopPoint { point })
    }

    /// Whether a multiple-video failure of `job` should park it instead.
    #[must_use]
    pub fn parks_on_multiple_videos(&self, job: &ReleaseJob) -> bool {
        self.park_on_multiple_videos && job.is_automatic()
    }

    /// Configured stop point.
    #[must_use]
    pub const fn stop_point(&self) -> Option<StopPoint> {
        self.stop_at
    }
}
