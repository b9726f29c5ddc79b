use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque platform identifier for a stream or fullscreen element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why a platform request did not produce a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum AcquireError {
    #[error("permission denied")]
    Denied,
    #[error("not supported by this browser")]
    Unsupported,
    #[error("request timed out")]
    TimedOut,
    #[error("{0}")]
    Failed(String),
}

/// Immediate answer to a platform request.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    Ready(Result<ResourceHandle, AcquireError>),
    /// The platform is prompting; the answer arrives later as a resolution signal.
    Pending,
}

/// Fullscreen entry points, from the standard API to the vendor-prefixed ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullscreenApi {
    Standard,
    Webkit,
    Moz,
    Ms,
}

impl FullscreenApi {
    pub const ALL: [FullscreenApi; 4] = [
        FullscreenApi::Standard,
        FullscreenApi::Webkit,
        FullscreenApi::Moz,
        FullscreenApi::Ms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FullscreenApi::Standard => "standard",
            FullscreenApi::Webkit => "webkit",
            FullscreenApi::Moz => "moz",
            FullscreenApi::Ms => "ms",
        }
    }
}

/// Capture constraints for the camera+microphone request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            ideal_width: 320,
            ideal_height: 240,
        }
    }
}

/// Platform capture and fullscreen surface.
pub trait MediaBackend: Send {
    fn request_user_media(&mut self, constraints: &MediaConstraints) -> AcquireOutcome;
    fn request_display_media(&mut self) -> AcquireOutcome;
    fn request_fullscreen(&mut self, api: FullscreenApi) -> AcquireOutcome;
    /// Attach a granted camera stream to the live preview.
    fn bind_preview(&mut self, stream: &ResourceHandle);
    /// Stop every track of the stream.
    fn stop_tracks(&mut self, stream: &ResourceHandle);
    fn exit_fullscreen(&mut self, api: FullscreenApi);
    fn is_fullscreen(&self) -> bool;
}
