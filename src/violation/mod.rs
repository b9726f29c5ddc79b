//! Violation taxonomy.
//!
//! Classification is a pure lookup from [`ViolationKind`] to [`Severity`].
//! Whether a violation ends the session is decided elsewhere
//! (`runtime::termination::FatalityPolicy`), so the table here can be tested
//! without any side effects.

pub mod keys;

use std::fmt;

use serde::Serialize;

use crate::logging::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Stable identifiers for every violation the runtime can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    CameraDenied,
    FullscreenDenied,
    ScreenShareOptional,
    FullscreenExit,
    TabSwitch,
    FocusLoss,
    BlockedKey,
    ContextMenu,
    MouseLeave,
    NetworkLoss,
    NetworkUnstable,
    BatteryLow,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 12] = [
        ViolationKind::CameraDenied,
        ViolationKind::FullscreenDenied,
        ViolationKind::ScreenShareOptional,
        ViolationKind::FullscreenExit,
        ViolationKind::TabSwitch,
        ViolationKind::FocusLoss,
        ViolationKind::BlockedKey,
        ViolationKind::ContextMenu,
        ViolationKind::MouseLeave,
        ViolationKind::NetworkLoss,
        ViolationKind::NetworkUnstable,
        ViolationKind::BatteryLow,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ViolationKind::CameraDenied => "camera-denied",
            ViolationKind::FullscreenDenied => "fullscreen-denied",
            ViolationKind::ScreenShareOptional => "screen-share-optional",
            ViolationKind::FullscreenExit => "fullscreen-exit",
            ViolationKind::TabSwitch => "tab-switch",
            ViolationKind::FocusLoss => "focus-loss",
            ViolationKind::BlockedKey => "blocked-key",
            ViolationKind::ContextMenu => "context-menu",
            ViolationKind::MouseLeave => "mouse-leave",
            ViolationKind::NetworkLoss => "network-loss",
            ViolationKind::NetworkUnstable => "network-unstable",
            ViolationKind::BatteryLow => "battery-low",
        }
    }

    fn default_description(&self) -> &'static str {
        match self {
            ViolationKind::CameraDenied => "Camera and microphone access was denied",
            ViolationKind::FullscreenDenied => "Fullscreen mode could not be entered",
            ViolationKind::ScreenShareOptional => "Screen sharing is unavailable",
            ViolationKind::FullscreenExit => "Fullscreen mode was exited",
            ViolationKind::TabSwitch => "Switched tabs or hid the exam window",
            ViolationKind::FocusLoss => "Exam window lost focus",
            ViolationKind::BlockedKey => "Blocked key pressed",
            ViolationKind::ContextMenu => "Context menu requested",
            ViolationKind::MouseLeave => "Pointer left the exam window",
            ViolationKind::NetworkLoss => "Network connection lost",
            ViolationKind::NetworkUnstable => "Heartbeat to the exam service failed",
            ViolationKind::BatteryLow => "Battery is low and not charging",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Severity assigned to each violation kind.
pub fn classify(kind: ViolationKind) -> Severity {
    match kind {
        ViolationKind::CameraDenied
        | ViolationKind::FullscreenDenied
        | ViolationKind::FullscreenExit
        | ViolationKind::TabSwitch
        | ViolationKind::NetworkLoss => Severity::Critical,
        ViolationKind::ScreenShareOptional
        | ViolationKind::FocusLoss
        | ViolationKind::BlockedKey
        | ViolationKind::ContextMenu
        | ViolationKind::MouseLeave
        | ViolationKind::NetworkUnstable
        | ViolationKind::BatteryLow => Severity::Warning,
    }
}

/// A detected deviation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityViolation {
    #[serde(rename = "type")]
    kind: ViolationKind,
    timestamp_ms: u64,
    severity: Severity,
    description: String,
}

impl SecurityViolation {
    pub fn new(kind: ViolationKind) -> Self {
        Self::build(kind, kind.default_description().to_string())
    }

    /// Violation whose description carries extra context, e.g. the key pressed.
    pub fn with_detail(kind: ViolationKind, detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref();
        let description = if detail.is_empty() {
            kind.default_description().to_string()
        } else {
            format!("{}: {}", kind.default_description(), detail)
        };
        Self::build(kind, description)
    }

    fn build(kind: ViolationKind, description: String) -> Self {
        Self {
            kind,
            timestamp_ms: now_ms() as u64,
            severity: classify(kind),
            description,
        }
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViolationCounts {
    pub warnings: usize,
    pub criticals: usize,
}

impl ViolationCounts {
    pub fn total(&self) -> usize {
        self.warnings + self.criticals
    }
}

/// Append-only record in detection order. Entries are never reordered or merged.
#[derive(Debug, Clone, Default)]
pub struct ViolationLog {
    entries: Vec<SecurityViolation>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: SecurityViolation) {
        self.entries.push(violation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SecurityViolation] {
        &self.entries
    }

    pub fn last(&self) -> Option<&SecurityViolation> {
        self.entries.last()
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.entries.iter().filter(|v| v.kind == kind).count()
    }

    pub fn has_critical(&self) -> bool {
        self.entries.iter().any(SecurityViolation::is_critical)
    }

    pub fn counts(&self) -> ViolationCounts {
        self.entries
            .iter()
            .fold(ViolationCounts::default(), |mut acc, v| {
                match v.severity {
                    Severity::Warning => acc.warnings += 1,
                    Severity::Critical => acc.criticals += 1,
                }
                acc
            })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitored_signal_table_matches_policy() {
        let expected = [
            (ViolationKind::FullscreenExit, Severity::Critical),
            (ViolationKind::TabSwitch, Severity::Critical),
            (ViolationKind::FocusLoss, Severity::Warning),
            (ViolationKind::BlockedKey, Severity::Warning),
            (ViolationKind::ContextMenu, Severity::Warning),
            (ViolationKind::MouseLeave, Severity::Warning),
            (ViolationKind::NetworkLoss, Severity::Critical),
            (ViolationKind::NetworkUnstable, Severity::Warning),
            (ViolationKind::BatteryLow, Severity::Warning),
        ];
        for (kind, severity) in expected {
            assert_eq!(classify(kind), severity, "{kind}");
        }
    }

    #[test]
    fn acquisition_failures_split_mandatory_from_optional() {
        assert_eq!(classify(ViolationKind::CameraDenied), Severity::Critical);
        assert_eq!(classify(ViolationKind::FullscreenDenied), Severity::Critical);
        assert_eq!(
            classify(ViolationKind::ScreenShareOptional),
            Severity::Warning
        );
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = ViolationKind::ALL.iter().map(|k| k.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), ViolationKind::ALL.len());
    }

    #[test]
    fn log_keeps_duplicates_in_detection_order() {
        let mut log = ViolationLog::new();
        log.push(SecurityViolation::new(ViolationKind::FocusLoss));
        log.push(SecurityViolation::with_detail(ViolationKind::BlockedKey, "F12"));
        log.push(SecurityViolation::new(ViolationKind::FocusLoss));

        let kinds: Vec<_> = log.entries().iter().map(|v| v.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::FocusLoss,
                ViolationKind::BlockedKey,
                ViolationKind::FocusLoss
            ]
        );
        assert_eq!(log.count_of(ViolationKind::FocusLoss), 2);
        assert!(!log.has_critical());
        assert_eq!(log.counts().warnings, 3);
    }

    #[test]
    fn detail_is_appended_to_description() {
        let violation = SecurityViolation::with_detail(ViolationKind::BlockedKey, "Ctrl+U");
        assert_eq!(violation.description(), "Blocked key pressed: Ctrl+U");
        assert_eq!(violation.severity(), Severity::Warning);
    }

    #[test]
    fn serializes_type_id() {
        let violation = SecurityViolation::new(ViolationKind::TabSwitch);
        let value = serde_json::to_value(&violation).unwrap();
        assert_eq!(value["type"], "tab-switch");
        assert_eq!(value["severity"], "critical");
    }
}
