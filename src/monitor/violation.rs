use serde_json::json;

use crate::Result;
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::violation::keys::BlockedKeys;
use crate::violation::{SecurityViolation, ViolationKind};

use super::{CheckUpdate, Monitor, MonitorContext, SignalEvent, SignalFlow, SignalKind};

const TARGET: &str = "vigil::monitor.violation";

/// Maps DOM-level environment signals to classified violations.
///
/// | signal                  | violation         |
/// |-------------------------|-------------------|
/// | fullscreen exited       | `fullscreen-exit` |
/// | document hidden         | `tab-switch`      |
/// | window blurred          | `focus-loss`      |
/// | blocked key or chord    | `blocked-key`     |
/// | context menu            | `context-menu`    |
/// | pointer left the window | `mouse-leave`     |
///
/// Blocked keys and the context menu are suppressed. The monitor does not
/// decide fatality.
pub struct ViolationMonitor {
    blocked_keys: BlockedKeys,
    logger: Option<Logger>,
}

impl ViolationMonitor {
    pub fn new(blocked_keys: BlockedKeys) -> Self {
        Self {
            blocked_keys,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn blocked_keys(&self) -> &BlockedKeys {
        &self.blocked_keys
    }
}

impl Default for ViolationMonitor {
    fn default() -> Self {
        Self::new(BlockedKeys::default())
    }
}

impl Monitor for ViolationMonitor {
    fn name(&self) -> &str {
        "monitor.violation"
    }

    fn subscriptions(&self) -> Vec<SignalKind> {
        vec![
            SignalKind::Visibility,
            SignalKind::Focus,
            SignalKind::Keyboard,
            SignalKind::ContextMenu,
            SignalKind::MouseLeave,
            SignalKind::Fullscreen,
        ]
    }

    fn on_session_start(&mut self, ctx: &mut MonitorContext<'_>) -> Result<()> {
        ctx.update_check(CheckUpdate::NoOtherApps(true));
        Ok(())
    }

    fn on_signal(
        &mut self,
        ctx: &mut MonitorContext<'_>,
        signal: &SignalEvent,
    ) -> Result<SignalFlow> {
        if !ctx.phase().is_secure() {
            return Ok(SignalFlow::Continue);
        }

        let flow = match signal {
            SignalEvent::Visibility { hidden: true } => {
                ctx.raise(SecurityViolation::new(ViolationKind::TabSwitch));
                SignalFlow::Continue
            }
            SignalEvent::FocusLost => {
                ctx.update_check(CheckUpdate::NoOtherApps(false));
                ctx.raise(SecurityViolation::new(ViolationKind::FocusLoss));
                SignalFlow::Continue
            }
            SignalEvent::FocusGained => {
                ctx.update_check(CheckUpdate::NoOtherApps(true));
                SignalFlow::Continue
            }
            SignalEvent::Key(key) => match self.blocked_keys.match_event(key) {
                Some(chord) => {
                    emit(
                        self.logger.as_ref(),
                        LogLevel::Debug,
                        TARGET,
                        "key_suppressed",
                        [json_kv("chord", json!(chord))],
                    );
                    ctx.raise(SecurityViolation::with_detail(ViolationKind::BlockedKey, chord));
                    SignalFlow::Suppress
                }
                None => SignalFlow::Continue,
            },
            SignalEvent::ContextMenu => {
                ctx.raise(SecurityViolation::new(ViolationKind::ContextMenu));
                SignalFlow::Suppress
            }
            SignalEvent::PointerLeft => {
                ctx.raise(SecurityViolation::new(ViolationKind::MouseLeave));
                SignalFlow::Continue
            }
            SignalEvent::Fullscreen { active: false } => {
                ctx.update_check(CheckUpdate::FullscreenLost);
                ctx.raise(SecurityViolation::new(ViolationKind::FullscreenExit));
                SignalFlow::Continue
            }
            _ => SignalFlow::Continue,
        };
        Ok(flow)
    }
}
