use thiserror::Error;

use crate::media::TrackKind;

/// Errors returned to callers of [`SessionController`](crate::SessionController).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("credentials are required to connect")]
    MissingCredentials,
    #[error("a room name is required to connect")]
    MissingRoomName,
    #[error("event handlers must be registered before connecting")]
    HandlersNotRegistered,
    #[error("no audio input device selected or stored")]
    NoAudioDevice,
    #[error("no video input device selected or stored")]
    NoVideoDevice,
    #[error("device acquisition failed: {0}")]
    DeviceAcquisition(String),
    #[error("no active session")]
    NoActiveSession,
    #[error("no local {0} track")]
    NoLocalTrack(TrackKind),
    #[error("a session is already active")]
    SessionAlreadyActive,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("screen share unsupported: {0}")]
    ScreenShareUnsupported(String),
}

/// Coarse classification used by hosts to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller misuse. Not retryable.
    Validation,
    /// The caller may retry with an explicit device.
    Device,
    /// Operation issued in the wrong lifecycle state.
    State,
    Transport,
    Unsupported,
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCredentials | Self::MissingRoomName | Self::HandlersNotRegistered => {
                ErrorCategory::Validation
            }
            Self::NoAudioDevice | Self::NoVideoDevice | Self::DeviceAcquisition(_) => {
                ErrorCategory::Device
            }
            Self::NoActiveSession | Self::NoLocalTrack(_) | Self::SessionAlreadyActive => {
                ErrorCategory::State
            }
            Self::Transport(_) => ErrorCategory::Transport,
            Self::ScreenShareUnsupported(_) => ErrorCategory::Unsupported,
        }
    }
}

/// Failures reported by the underlying conferencing transport.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("unpublish failed: {0}")]
    Unpublish(String),
    #[error("room error: {0}")]
    Room(String),
}

/// Failures reported by a [`MediaAcquisition`](crate::media::MediaAcquisition) backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediaError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(SessionError::MissingRoomName.category(), ErrorCategory::Validation);
        assert_eq!(SessionError::NoVideoDevice.category(), ErrorCategory::Device);
        assert_eq!(
            SessionError::NoLocalTrack(TrackKind::Audio).category(),
            ErrorCategory::State
        );
        assert_eq!(
            SessionError::Transport(TransportError::Connection("x".into())).category(),
            ErrorCategory::Transport
        );
    }

    #[test]
    fn transport_errors_surface_verbatim() {
        let err = SessionError::from(TransportError::Connection("token expired".into()));
        assert_eq!(err.to_string(), "connection failed: token expired");
    }
}
