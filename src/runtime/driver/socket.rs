use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers, ModifierKeyCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::ExamConfig;
use crate::host::{AuditRecord, ExitReason, SessionHost};
use crate::monitor::{BatteryStatus, HeartbeatProbe, ProbeFailure, ProbeOutcome, SignalEvent, SignalFlow};
use crate::phase::Phase;
use crate::resources::{
    AcquireError, AcquireOutcome, FullscreenApi, MediaBackend, MediaConstraints, ResourceHandle,
    ResourceKind,
};
use crate::violation::{SecurityViolation, Severity};
use crate::{ProctorError, ProctorRuntime};

pub type DriverResult<T> = std::result::Result<T, SocketDriverError>;

#[derive(Debug, Error)]
pub enum SocketDriverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("runtime error: {0}")]
    Runtime(#[from] ProctorError),
}

/// Frames written back to the browser shim, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    RequestMedia { constraints: MediaConstraints },
    RequestDisplay,
    RequestFullscreen { api: FullscreenApi },
    StopTracks { handle: ResourceHandle },
    ExitFullscreen { api: FullscreenApi },
    BindPreview { handle: ResourceHandle },
    Probe,
    Report { description: String, severity: Severity },
    Violation { record: AuditRecord },
    Exit { exit: ExitReason },
    BeginExam { exam: ExamConfig },
    SetupFailed { violation: SecurityViolation },
    /// Sent after every inbound frame.
    State {
        phase: Phase,
        suppressed: bool,
        warnings: usize,
        criticals: usize,
    },
    Error { message: String },
}

#[derive(Default)]
struct OutboxState {
    frames: Vec<OutboundFrame>,
    fullscreen: bool,
}

/// Queue shared by the remote backend, probe and host. The driver drains it
/// after each inbound frame.
#[derive(Clone, Default)]
pub struct Outbox {
    inner: Arc<Mutex<OutboxState>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: OutboundFrame) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.frames.push(frame);
        }
    }

    pub fn drain(&self) -> Vec<OutboundFrame> {
        self.inner
            .lock()
            .map(|mut guard| std::mem::take(&mut guard.frames))
            .unwrap_or_default()
    }

    fn set_fullscreen(&self, active: bool) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.fullscreen = active;
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.inner.lock().map(|guard| guard.fullscreen).unwrap_or(false)
    }

    pub fn backend(&self) -> RemoteBackend {
        RemoteBackend {
            outbox: self.clone(),
        }
    }

    pub fn probe(&self) -> RemoteProbe {
        RemoteProbe {
            outbox: self.clone(),
        }
    }

    pub fn host(&self) -> RemoteHost {
        RemoteHost {
            outbox: self.clone(),
        }
    }
}

/// Media backend whose every request is answered later by a `resolved` frame.
pub struct RemoteBackend {
    outbox: Outbox,
}

impl MediaBackend for RemoteBackend {
    fn request_user_media(&mut self, constraints: &MediaConstraints) -> AcquireOutcome {
        self.outbox.push(OutboundFrame::RequestMedia {
            constraints: constraints.clone(),
        });
        AcquireOutcome::Pending
    }

    fn request_display_media(&mut self) -> AcquireOutcome {
        self.outbox.push(OutboundFrame::RequestDisplay);
        AcquireOutcome::Pending
    }

    fn request_fullscreen(&mut self, api: FullscreenApi) -> AcquireOutcome {
        self.outbox.push(OutboundFrame::RequestFullscreen { api });
        AcquireOutcome::Pending
    }

    fn bind_preview(&mut self, stream: &ResourceHandle) {
        self.outbox.push(OutboundFrame::BindPreview {
            handle: stream.clone(),
        });
    }

    fn stop_tracks(&mut self, stream: &ResourceHandle) {
        self.outbox.push(OutboundFrame::StopTracks {
            handle: stream.clone(),
        });
    }

    fn exit_fullscreen(&mut self, api: FullscreenApi) {
        self.outbox.set_fullscreen(false);
        self.outbox.push(OutboundFrame::ExitFullscreen { api });
    }

    fn is_fullscreen(&self) -> bool {
        self.outbox.is_fullscreen()
    }
}

/// Heartbeat probe answered later by a `heartbeat` frame.
pub struct RemoteProbe {
    outbox: Outbox,
}

impl HeartbeatProbe for RemoteProbe {
    fn probe(&mut self) -> ProbeOutcome {
        self.outbox.push(OutboundFrame::Probe);
        ProbeOutcome::Pending
    }
}

pub struct RemoteHost {
    outbox: Outbox,
}

impl SessionHost for RemoteHost {
    fn report_violation(&mut self, description: &str, severity: Severity) {
        self.outbox.push(OutboundFrame::Report {
            description: description.to_string(),
            severity,
        });
    }

    fn record_audit(&mut self, record: &AuditRecord) {
        self.outbox.push(OutboundFrame::Violation {
            record: record.clone(),
        });
    }

    fn exit_secure_mode(&mut self, reason: &ExitReason) {
        self.outbox.push(OutboundFrame::Exit {
            exit: reason.clone(),
        });
    }

    fn begin_exam(&mut self, exam: &ExamConfig) {
        self.outbox.push(OutboundFrame::BeginExam { exam: exam.clone() });
    }

    fn setup_failed(&mut self, violation: &SecurityViolation) {
        self.outbox.push(OutboundFrame::SetupFailed {
            violation: violation.clone(),
        });
    }
}

/// What one inbound frame asks of the runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    Signal(SignalEvent),
    Accept { accepted: bool },
    Confirm,
    Cancel,
    Complete,
}

/// Strategy trait used by SocketDriver to decode inbound payloads and encode outbound frames.
pub trait SocketStrategy {
    type Inbound: DeserializeOwned;

    fn decode(&self, payload: Self::Inbound) -> DriverResult<Vec<DriverCommand>>;
    fn encode(&self, frame: &OutboundFrame) -> DriverResult<String>;
}

/// Minimal TCP transport: JSON lines in, JSON lines out. Serves a single
/// connection and shuts the runtime down when it closes.
pub struct SocketDriver<S: SocketStrategy> {
    listener: TcpListener,
    runtime: ProctorRuntime,
    outbox: Outbox,
    strategy: S,
}

impl<S: SocketStrategy> SocketDriver<S> {
    /// `runtime` should be built over `outbox.backend()`, `outbox.host()` and,
    /// for heartbeats, `outbox.probe()`.
    pub fn bind<A>(addr: A, runtime: ProctorRuntime, outbox: Outbox, strategy: S) -> DriverResult<Self>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            runtime,
            outbox,
            strategy,
        })
    }

    pub fn runtime(&self) -> &ProctorRuntime {
        &self.runtime
    }

    pub fn run(mut self) -> DriverResult<()> {
        let (stream, _) = self.listener.accept()?;
        stream.set_nodelay(true).ok();

        let inbound = BufReader::new(stream.try_clone()?);
        let mut writer = stream;
        for line in inbound.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            for encoded in self.handle_line(&line)? {
                writer.write_all(encoded.as_bytes())?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        self.runtime.shutdown()?;
        Ok(())
    }

    /// Process one inbound line and return the encoded outbound lines.
    pub fn handle_line(&mut self, line: &str) -> DriverResult<Vec<String>> {
        let mut frames = match self.process(line) {
            Ok(suppressed) => {
                let mut frames = self.outbox.drain();
                let counts = self.runtime.counts();
                frames.push(OutboundFrame::State {
                    phase: self.runtime.phase(),
                    suppressed,
                    warnings: counts.warnings,
                    criticals: counts.criticals,
                });
                frames
            }
            Err(err) => {
                let mut frames = self.outbox.drain();
                frames.push(OutboundFrame::Error {
                    message: err.to_string(),
                });
                frames
            }
        };
        frames
            .drain(..)
            .map(|frame| self.strategy.encode(&frame))
            .collect()
    }

    fn process(&mut self, line: &str) -> DriverResult<bool> {
        let payload: S::Inbound =
            serde_json::from_str(line).map_err(|err| SocketDriverError::Decode(err.to_string()))?;
        let mut suppressed = false;
        for command in self.strategy.decode(payload)? {
            match command {
                DriverCommand::Signal(signal) => {
                    self.track_fullscreen(&signal);
                    if self.runtime.dispatch(signal)? == SignalFlow::Suppress {
                        suppressed = true;
                    }
                }
                DriverCommand::Accept { accepted } => {
                    self.runtime.accept_agreement(accepted)?;
                }
                DriverCommand::Confirm => {
                    self.runtime.confirm_start()?;
                }
                DriverCommand::Cancel => {
                    self.runtime.cancel()?;
                }
                DriverCommand::Complete => {
                    self.runtime.complete()?;
                }
            }
        }
        Ok(suppressed)
    }

    fn track_fullscreen(&self, signal: &SignalEvent) {
        match signal {
            SignalEvent::Fullscreen { active } => self.outbox.set_fullscreen(*active),
            SignalEvent::Resolved {
                kind: ResourceKind::Fullscreen,
                result: Ok(_),
            } => self.outbox.set_fullscreen(true),
            _ => {}
        }
    }
}

/// Default strategy: browser shim events as tagged JSON objects.
pub struct JsonSignalStrategy;

#[derive(serde::Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum JsonInbound {
    Tick {
        ms: u64,
    },
    Visibility {
        hidden: bool,
    },
    Focus {
        focused: bool,
    },
    Key {
        code: String,
        #[serde(default)]
        modifiers: Vec<String>,
        #[serde(default)]
        release: bool,
    },
    ContextMenu,
    MouseLeave,
    Fullscreen {
        active: bool,
    },
    Connectivity {
        online: bool,
    },
    Battery {
        level: f32,
        charging: bool,
    },
    Resolved {
        resource: ResourceKind,
        #[serde(default)]
        handle: Option<String>,
        #[serde(default)]
        error: Option<AcquireError>,
    },
    Heartbeat {
        ok: bool,
        #[serde(default)]
        status: Option<u16>,
        #[serde(default)]
        error: Option<String>,
    },
    Accept {
        #[serde(default = "accepted_default")]
        accepted: bool,
    },
    Confirm,
    Cancel,
    Complete,
}

fn accepted_default() -> bool {
    true
}

impl SocketStrategy for JsonSignalStrategy {
    type Inbound = JsonInbound;

    fn decode(&self, payload: Self::Inbound) -> DriverResult<Vec<DriverCommand>> {
        let signal = match payload {
            JsonInbound::Tick { ms } => SignalEvent::Tick {
                elapsed: Duration::from_millis(ms),
            },
            JsonInbound::Visibility { hidden } => SignalEvent::Visibility { hidden },
            JsonInbound::Focus { focused: true } => SignalEvent::FocusGained,
            JsonInbound::Focus { focused: false } => SignalEvent::FocusLost,
            JsonInbound::Key {
                code,
                modifiers,
                release,
            } => SignalEvent::Key(build_key_event(&code, &modifiers, release)),
            JsonInbound::ContextMenu => SignalEvent::ContextMenu,
            JsonInbound::MouseLeave => SignalEvent::PointerLeft,
            JsonInbound::Fullscreen { active } => SignalEvent::Fullscreen { active },
            JsonInbound::Connectivity { online } => SignalEvent::Connectivity { online },
            JsonInbound::Battery { level, charging } => {
                SignalEvent::Battery(BatteryStatus::new(level, charging))
            }
            JsonInbound::Resolved {
                resource,
                handle,
                error,
            } => {
                let result = match (handle, error) {
                    (_, Some(error)) => Err(error),
                    (Some(handle), None) => Ok(ResourceHandle::new(handle)),
                    (None, None) => Err(AcquireError::Failed("empty resolution".into())),
                };
                SignalEvent::Resolved {
                    kind: resource,
                    result,
                }
            }
            JsonInbound::Heartbeat { ok, status, error } => {
                let result = match (ok, status, error) {
                    (true, _, _) => Ok(()),
                    (false, Some(status), _) => Err(ProbeFailure::Status(status)),
                    (false, None, Some(error)) => Err(ProbeFailure::Transport(error)),
                    (false, None, None) => Err(ProbeFailure::Timeout),
                };
                SignalEvent::Heartbeat(result)
            }
            JsonInbound::Accept { accepted } => return Ok(vec![DriverCommand::Accept { accepted }]),
            JsonInbound::Confirm => return Ok(vec![DriverCommand::Confirm]),
            JsonInbound::Cancel => return Ok(vec![DriverCommand::Cancel]),
            JsonInbound::Complete => return Ok(vec![DriverCommand::Complete]),
        };
        Ok(vec![DriverCommand::Signal(signal)])
    }

    fn encode(&self, frame: &OutboundFrame) -> DriverResult<String> {
        serde_json::to_string(frame).map_err(|err| SocketDriverError::Encode(err.to_string()))
    }
}

fn build_key_event(code: &str, modifiers: &[String], release: bool) -> KeyEvent {
    KeyEvent {
        code: parse_key_code(code),
        modifiers: parse_modifiers(modifiers),
        kind: if release {
            KeyEventKind::Release
        } else {
            KeyEventKind::Press
        },
        state: KeyEventState::NONE,
    }
}

fn parse_modifiers(modifiers: &[String]) -> KeyModifiers {
    let mut result = KeyModifiers::empty();
    for m in modifiers {
        match m.to_ascii_lowercase().as_str() {
            "control" | "ctrl" => result |= KeyModifiers::CONTROL,
            "alt" => result |= KeyModifiers::ALT,
            "shift" => result |= KeyModifiers::SHIFT,
            "meta" | "os" | "super" => result |= KeyModifiers::META,
            _ => {}
        }
    }
    result
}

/// DOM `KeyboardEvent.key` values to key codes.
fn parse_key_code(code: &str) -> KeyCode {
    let lower = code.to_ascii_lowercase();
    match lower.as_str() {
        "enter" => KeyCode::Enter,
        "backspace" => KeyCode::Backspace,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "insert" => KeyCode::Insert,
        "delete" => KeyCode::Delete,
        "printscreen" => KeyCode::PrintScreen,
        "meta" | "os" => KeyCode::Modifier(ModifierKeyCode::LeftMeta),
        "control" => KeyCode::Modifier(ModifierKeyCode::LeftControl),
        "shift" => KeyCode::Modifier(ModifierKeyCode::LeftShift),
        "alt" => KeyCode::Modifier(ModifierKeyCode::LeftAlt),
        "arrowup" => KeyCode::Up,
        "arrowdown" => KeyCode::Down,
        "arrowleft" => KeyCode::Left,
        "arrowright" => KeyCode::Right,
        " " | "space" => KeyCode::Char(' '),
        f if f.len() > 1 && f.starts_with('f') && f[1..].chars().all(|c| c.is_ascii_digit()) => {
            f[1..].parse().map(KeyCode::F).unwrap_or(KeyCode::Null)
        }
        _ => match code.chars().next() {
            Some(ch) if code.chars().count() == 1 => KeyCode::Char(ch),
            _ => KeyCode::Null,
        },
    }
}
