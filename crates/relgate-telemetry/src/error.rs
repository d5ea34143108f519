//! # Design
//!
//! - Metric failures name the family they came from; the families are the
//!   pipeline's own (`job_stage_total`, `downloads_in_flight`, ...).
//! - Logging setup can only fail one way: a subscriber is already installed.

use prometheus::Error as PrometheusError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while setting up logging or the pipeline metrics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed.
    #[error("tracing subscriber already installed")]
    SubscriberInstall {
        /// Underlying subscriber error.
        #[source]
        source: TryInitError,
    },
    /// A pipeline metric family could not be defined.
    #[error("metric family definition rejected")]
    FamilyDefinition {
        /// Family name.
        family: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// A pipeline metric family clashed with one already in the registry.
    #[error("metric family registration rejected")]
    FamilyRegistration {
        /// Family name.
        family: &'static str,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition could not be produced.
    #[error("metrics exposition failed")]
    Exposition {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition was not UTF-8.
    #[error("metrics exposition was not utf-8")]
    ExpositionEncoding {
        /// Underlying conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    pub(crate) const fn definition(family: &'static str, source: PrometheusError) -> Self {
        Self::FamilyDefinition { family, source }
    }

    pub(crate) const fn registration(family: &'static str, source: PrometheusError) -> Self {
        Self::FamilyRegistration { family, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn family_errors_keep_the_family_name() {
        let err = TelemetryError::definition(
            "downloads_in_flight",
            PrometheusError::Msg("bad labels".to_string()),
        );
        assert_eq!(err.to_string(), "metric family definition rejected");
        assert!(matches!(
            err,
            TelemetryError::FamilyDefinition {
                family: "downloads_in_flight",
                ..
            }
        ));
        assert!(err.source().is_some());
    }

    #[test]
    fn duplicate_family_registration_is_reported() -> anyhow::Result<()> {
        let registry = prometheus::Registry::new();
        let counter = prometheus::IntCounter::new("jobs_failed_total", "failed jobs")?;
        registry.register(Box::new(counter.clone()))?;
        let err = registry
            .register(Box::new(counter))
            .map_err(|source| TelemetryError::registration("jobs_failed_total", source))
            .err()
            .ok_or_else(|| anyhow::anyhow!("second registration should fail"))?;
        assert_eq!(err.to_string(), "metric family registration rejected");
        Ok(())
    }

    #[test]
    fn exposition_utf8_failures_render_constant_message() {
        let Err(source) = String::from_utf8(vec![0, 159]) else {
            return;
        };
        let err = TelemetryError::ExpositionEncoding { source };
        assert_eq!(err.to_string(), "metrics exposition was not utf-8");
    }
}
