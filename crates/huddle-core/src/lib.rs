//! Huddle core: a session facade over a real-time conferencing SDK.
//!
//! [`SessionController`] owns one call at a time. It talks to the network
//! through a [`transport::Transport`] and to capture hardware through a
//! [`media::MediaAcquisition`], and reports everything that happens through
//! an [`EventRouter`] configured with [`EventHandlers`].
//!
//! The `livekit` feature provides a LiveKit-backed transport; the `cpal`
//! feature adds desktop audio enumeration and microphone metering.

pub mod config;
pub mod devices;
pub mod errors;
pub mod events;
pub mod loopback;
pub mod media;
pub mod metering;
pub mod session;
pub mod tracker;
pub mod transport;

#[cfg(feature = "cpal")]
pub mod cpal_devices;
#[cfg(feature = "livekit")]
pub mod livekit_transport;

pub use config::{ConnectOptions, Credentials, ScreenShareOptions, VideoConstraints};
pub use devices::{DeviceKind, DeviceStore, FileDeviceStore, MemoryDeviceStore};
pub use errors::{ErrorCategory, MediaError, SessionError, TransportError};
pub use events::{
    EventHandlers, EventKind, EventRouter, ParticipantInfo, RoomInfo, SessionEvent,
    SessionEventListener, TrackDescriptor, TrackEvent,
};
pub use media::{DeviceDescriptor, LocalTrack, MediaAcquisition, TrackKind, TrackPriority};
pub use session::{SessionController, SessionState};
