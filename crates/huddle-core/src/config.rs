use serde::{Deserialize, Serialize};

use crate::media::VideoDimensions;

/// Default capture resolution.
const VIDEO_WIDTH: u32 = 1280;
const VIDEO_HEIGHT: u32 = 720;
const VIDEO_FRAME_RATE: u32 = 24;

/// Access credentials handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Signed access token.
    pub token: String,
    /// Server URL, for transports that need one (LiveKit).
    #[serde(default)]
    pub server_url: Option<String>,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            server_url: None,
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn is_present(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct VideoConstraints {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_width() -> u32 {
    VIDEO_WIDTH
}

fn default_height() -> u32 {
    VIDEO_HEIGHT
}

fn default_frame_rate() -> u32 {
    VIDEO_FRAME_RATE
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: VIDEO_WIDTH,
            height: VIDEO_HEIGHT,
            frame_rate: VIDEO_FRAME_RATE,
        }
    }
}

impl VideoConstraints {
    pub fn dimensions(&self) -> VideoDimensions {
        VideoDimensions {
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ScreenShareOptions {
    /// Lower camera tracks to low priority while a screen is shared.
    #[serde(default = "default_true")]
    pub demote_camera: bool,
}

impl Default for ScreenShareOptions {
    fn default() -> Self {
        Self { demote_camera: true }
    }
}

/// Options for [`SessionController::connect`](crate::SessionController::connect).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConnectOptions {
    /// Explicit microphone. Falls back to the stored preference.
    #[serde(default)]
    pub audio_device_id: Option<String>,
    /// Explicit camera. Falls back to the stored preference.
    #[serde(default)]
    pub video_device_id: Option<String>,
    #[serde(default)]
    pub video: VideoConstraints,
    #[serde(default = "default_true")]
    pub join_with_audio: bool,
    #[serde(default = "default_true")]
    pub join_with_video: bool,
    /// Ask the transport to report dominant speaker changes.
    #[serde(default = "default_true")]
    pub dominant_speaker: bool,
    #[serde(default)]
    pub screen_share: ScreenShareOptions,
}

fn default_true() -> bool {
    true
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            audio_device_id: None,
            video_device_id: None,
            video: VideoConstraints::default(),
            join_with_audio: true,
            join_with_video: true,
            dominant_speaker: true,
            screen_share: ScreenShareOptions::default(),
        }
    }
}

impl ConnectOptions {
    pub fn with_audio_device(mut self, device_id: impl Into<String>) -> Self {
        self.audio_device_id = Some(device_id.into());
        self
    }

    pub fn with_video_device(mut self, device_id: impl Into<String>) -> Self {
        self.video_device_id = Some(device_id.into());
        self
    }
}

/// Connect options after device resolution; what the transport sees.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportOptions {
    pub room_name: String,
    pub audio_device_id: String,
    pub video_device_id: String,
    pub video: VideoConstraints,
    pub dominant_speaker: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.audio_device_id, None);
        assert!(opts.join_with_audio);
        assert!(opts.join_with_video);
        assert!(opts.screen_share.demote_camera);
        assert_eq!(opts.video.dimensions(), VideoDimensions { width: 1280, height: 720 });
    }

    #[test]
    fn partial_json_uses_serde_defaults() {
        let opts: ConnectOptions =
            serde_json::from_str(r#"{"video_device_id":"cam-1","video":{"width":640}}"#).unwrap();
        assert_eq!(opts.video_device_id.as_deref(), Some("cam-1"));
        assert_eq!(opts.video.width, 640);
        assert_eq!(opts.video.height, 720);
        assert!(opts.dominant_speaker);
    }

    #[test]
    fn blank_token_is_absent() {
        assert!(!Credentials::new("  ").is_present());
        assert!(Credentials::new("jwt").is_present());
    }
}
