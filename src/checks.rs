//! Readiness flags gathered during Setup and refreshed by the monitors.

use serde::Serialize;

/// Boolean readiness record. Each flag is written only by the component that
/// owns the corresponding signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemChecks {
    pub camera: bool,
    pub microphone: bool,
    pub fullscreen: bool,
    pub screen_share: bool,
    pub network_stable: bool,
    pub battery_level: bool,
    pub no_other_apps: bool,
}

impl SystemChecks {
    /// Checks that must hold before the exam may start.
    pub fn ready_for_exam(&self) -> bool {
        self.camera && self.network_stable
    }

    /// Names of the required checks that are currently failing.
    pub fn missing_for_exam(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.camera {
            missing.push("camera");
        }
        if !self.network_stable {
            missing.push("network");
        }
        missing
    }

    pub fn any_set(&self) -> bool {
        *self != Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_gate_requires_camera_and_network_only() {
        let mut checks = SystemChecks {
            camera: true,
            ..SystemChecks::default()
        };
        assert!(!checks.ready_for_exam());
        assert_eq!(checks.missing_for_exam(), vec!["network"]);

        checks.network_stable = true;
        assert!(checks.ready_for_exam());
        assert!(checks.missing_for_exam().is_empty());
    }

    #[test]
    fn clear_resets_every_flag() {
        let mut checks = SystemChecks {
            camera: true,
            microphone: true,
            fullscreen: true,
            screen_share: true,
            network_stable: true,
            battery_level: true,
            no_other_apps: true,
        };
        assert!(checks.any_set());
        checks.clear();
        assert!(!checks.any_set());
    }
}
