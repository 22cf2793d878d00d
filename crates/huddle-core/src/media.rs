use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::devices::DeviceKind;
use crate::errors::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

impl TrackSource {
    /// Source assumed for a track when only its kind is known.
    pub fn default_for(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Audio => Self::Microphone,
            TrackKind::Video => Self::Camera,
        }
    }
}

/// Transmission priority of a published track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackPriority {
    Low,
    #[default]
    Standard,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

/// An input or output device as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Handle on the platform capture feeding a local track.
pub trait CaptureHandle: Send + Sync {
    /// Release the underlying device. Must be idempotent.
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

/// Minimal [`CaptureHandle`] that only records whether it was stopped.
#[derive(Debug, Default)]
pub struct CaptureFlag {
    stopped: AtomicBool,
}

impl CaptureFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl CaptureHandle for CaptureFlag {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A locally captured track, not yet (or no longer) bound to a room.
#[derive(Clone)]
pub struct LocalTrack {
    name: String,
    kind: TrackKind,
    source: TrackSource,
    device_id: Option<String>,
    dimensions: Option<VideoDimensions>,
    capture: Arc<dyn CaptureHandle>,
}

impl LocalTrack {
    pub fn new(
        name: impl Into<String>,
        kind: TrackKind,
        source: TrackSource,
        capture: Arc<dyn CaptureHandle>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
            device_id: None,
            dimensions: None,
            capture,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: VideoDimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn dimensions(&self) -> Option<VideoDimensions> {
        self.dimensions
    }

    pub fn stop(&self) {
        self.capture.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.capture.is_stopped()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("device_id", &self.device_id)
            .field("dimensions", &self.dimensions)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Platform media access: device enumeration and local capture.
#[async_trait]
pub trait MediaAcquisition: Send + Sync {
    /// List input devices of the given kind.
    ///
    /// Returns `None` when enumeration is unsupported or denied.
    async fn enumerate_inputs(&self, kind: TrackKind) -> Option<Vec<DeviceDescriptor>>;

    async fn enumerate_outputs(&self) -> Option<Vec<DeviceDescriptor>> {
        None
    }

    async fn create_local_track(
        &self,
        kind: TrackKind,
        device_id: &str,
    ) -> Result<LocalTrack, MediaError>;

    fn supports_screen_capture(&self) -> bool;

    /// Acquire a display capture track.
    ///
    /// Fails with [`MediaError::Unsupported`] or [`MediaError::Cancelled`]
    /// when the platform cannot capture or the user dismisses the picker.
    async fn create_screen_track(
        &self,
        dimensions: VideoDimensions,
    ) -> Result<LocalTrack, MediaError>;
}
