//! Runtime configuration and the exam payload supplied by the housing page.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::Logger;
use crate::resources::{FullscreenApi, MediaConstraints};
use crate::violation::keys::{BlockedKeys, DEFAULT_BLOCKED_KEYS};
use crate::{ProctorError, Result};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_BATTERY_LOW_THRESHOLD: f32 = 0.20;

/// Configuration knobs for the proctoring runtime.
#[derive(Clone)]
pub struct ProctorConfig {
    /// Interval between liveness probes while in secure mode.
    pub heartbeat_interval: Duration,
    /// Upper bound on Setup. Zero waits forever for permission prompts.
    pub setup_timeout: Duration,
    /// Battery fraction below which an unplugged device raises a warning.
    pub battery_low_threshold: f32,
    pub blocked_keys: BlockedKeys,
    pub camera: MediaConstraints,
    /// Fullscreen entry points, tried in order.
    pub fullscreen_apis: Vec<FullscreenApi>,
    /// Interval between metrics snapshots. Zero disables snapshots.
    pub metrics_interval: Duration,
    pub logger: Option<Logger>,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            setup_timeout: DEFAULT_SETUP_TIMEOUT,
            battery_low_threshold: DEFAULT_BATTERY_LOW_THRESHOLD,
            blocked_keys: BlockedKeys::default(),
            camera: MediaConstraints::default(),
            fullscreen_apis: FullscreenApi::ALL.to_vec(),
            metrics_interval: Duration::from_secs(30),
            logger: None,
        }
    }
}

/// On-disk overrides. Durations are in milliseconds; absent keys keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    heartbeat_interval_ms: Option<u64>,
    setup_timeout_ms: Option<u64>,
    battery_low_threshold: Option<f32>,
    blocked_keys: Option<Vec<String>>,
    camera: Option<MediaConstraints>,
    fullscreen_apis: Option<Vec<FullscreenApi>>,
    metrics_interval_ms: Option<u64>,
}

impl ProctorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(raw)?;
        let mut config = Self::default();

        if let Some(ms) = file.heartbeat_interval_ms {
            if ms == 0 {
                return Err(ProctorError::Config(
                    "heartbeat_interval_ms must be greater than zero".into(),
                ));
            }
            config.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.setup_timeout_ms {
            config.setup_timeout = Duration::from_millis(ms);
        }
        if let Some(threshold) = file.battery_low_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ProctorError::Config(format!(
                    "battery_low_threshold {threshold} is outside 0.0..=1.0"
                )));
            }
            config.battery_low_threshold = threshold;
        }
        if let Some(keys) = file.blocked_keys {
            config.blocked_keys = BlockedKeys::try_from_chords(keys)?;
        }
        if let Some(camera) = file.camera {
            config.camera = camera;
        }
        if let Some(apis) = file.fullscreen_apis {
            if apis.is_empty() {
                return Err(ProctorError::Config(
                    "fullscreen_apis must name at least one entry point".into(),
                ));
            }
            config.fullscreen_apis = apis;
        }
        if let Some(ms) = file.metrics_interval_ms {
            config.metrics_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn default_blocked_keys() -> &'static [&'static str] {
        &DEFAULT_BLOCKED_KEYS
    }
}

/// Exam payload handed in by the housing page and returned when the exam starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamConfig {
    pub attempt_id: String,
    #[serde(default)]
    pub question_limit: Option<u32>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl ExamConfig {
    pub fn new(attempt_id: impl Into<String>) -> Self {
        Self {
            attempt_id: attempt_id.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_policy() {
        let config = ProctorConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.battery_low_threshold, 0.20);
        assert!(config.blocked_keys.contains("Ctrl+Shift+I"));
        assert_eq!(config.fullscreen_apis.first(), Some(&FullscreenApi::Standard));
        assert!(config.camera.audio);
    }

    #[test]
    fn json_overrides_selected_fields() {
        let config = ProctorConfig::from_json_str(
            r#"{"heartbeat_interval_ms": 5000, "blocked_keys": ["ctrl+c"], "setup_timeout_ms": 0}"#,
        )
        .unwrap();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.setup_timeout, Duration::ZERO);
        assert!(config.blocked_keys.contains("Ctrl+C"));
        assert!(!config.blocked_keys.contains("F12"));
        assert_eq!(config.battery_low_threshold, DEFAULT_BATTERY_LOW_THRESHOLD);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            ProctorConfig::from_json_str(r#"{"heartbeat_interval_ms": 0}"#),
            Err(ProctorError::Config(_))
        ));
        assert!(matches!(
            ProctorConfig::from_json_str(r#"{"battery_low_threshold": 1.5}"#),
            Err(ProctorError::Config(_))
        ));
        assert!(matches!(
            ProctorConfig::from_json_str(r#"{"blocked_keys": ["F12", "+"]}"#),
            Err(ProctorError::Config(_))
        ));
        assert!(matches!(
            ProctorConfig::from_json_str(r#"{"unknown": true}"#),
            Err(ProctorError::Json(_))
        ));
    }

    #[test]
    fn exam_payload_parses_with_optional_filters() {
        let exam: ExamConfig =
            serde_json::from_str(r#"{"attempt_id": "a-17", "subjects": ["math"]}"#).unwrap();
        assert_eq!(exam.attempt_id, "a-17");
        assert_eq!(exam.subjects, vec!["math"]);
        assert_eq!(exam.question_limit, None);
    }
}
