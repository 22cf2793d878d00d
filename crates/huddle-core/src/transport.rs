//! Boundary with the underlying conferencing SDK.
//!
//! A [`Transport`] establishes a room and hands back a [`RoomHandle`] plus a
//! channel of native [`RoomEvent`]s. The session controller consumes that
//! channel from a single event loop task.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::{Credentials, TransportOptions};
use crate::errors::TransportError;
use crate::events::{ParticipantInfo, TrackDescriptor};
use crate::media::{LocalTrack, TrackKind, TrackPriority, TrackSource};

/// A live track as seen on a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub sid: String,
    pub name: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub enabled: bool,
}

impl TrackSnapshot {
    pub fn new(sid: impl Into<String>, kind: TrackKind) -> Self {
        let sid = sid.into();
        Self {
            name: sid.clone(),
            sid,
            kind,
            source: TrackSource::default_for(kind),
            enabled: true,
        }
    }

    pub fn with_source(mut self, source: TrackSource) -> Self {
        self.source = source;
        self
    }

    pub fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            sid: Some(self.sid.clone()),
            name: Some(self.name.clone()),
            kind: self.kind,
            source: self.source,
            enabled: self.enabled,
            synthetic: false,
        }
    }
}

/// A track publication; `track` is `None` until the track is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub sid: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub track: Option<TrackSnapshot>,
}

impl Publication {
    pub fn resolved(track: TrackSnapshot) -> Self {
        Self {
            sid: track.sid.clone(),
            kind: track.kind,
            source: track.source,
            track: Some(track),
        }
    }

    pub fn unresolved(sid: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            sid: sid.into(),
            kind,
            source: TrackSource::default_for(kind),
            track: None,
        }
    }

    /// Descriptor for notifications. An unresolved publication still
    /// reports its sid; it has no name and counts as disabled.
    pub fn descriptor(&self) -> TrackDescriptor {
        match &self.track {
            Some(track) => track.descriptor(),
            None => TrackDescriptor {
                sid: Some(self.sid.clone()),
                name: None,
                kind: self.kind,
                source: self.source,
                enabled: false,
                synthetic: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSnapshot {
    pub sid: String,
    pub identity: String,
    pub name: Option<String>,
    /// Tracks already published (local) or subscribed (remote).
    pub tracks: Vec<TrackSnapshot>,
}

impl ParticipantSnapshot {
    pub fn new(sid: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            identity: identity.into(),
            name: None,
            tracks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_track(mut self, track: TrackSnapshot) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn info(&self, is_remote: bool) -> ParticipantInfo {
        ParticipantInfo {
            sid: self.sid.clone(),
            identity: self.identity.clone(),
            name: self.name.clone(),
            is_remote,
        }
    }
}

/// Track lifecycle events scoped to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    TrackSubscribed(TrackSnapshot),
    TrackUnsubscribed(TrackSnapshot),
    TrackPublished(Publication),
    TrackUnpublished(Publication),
    TrackDisabled { track_sid: String },
    TrackEnabled { track_sid: String },
}

/// Native room events delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ParticipantConnected(ParticipantSnapshot),
    ParticipantDisconnected { identity: String },
    Participant {
        identity: String,
        event: ParticipantEvent,
    },
    DominantSpeakerChanged { identity: Option<String> },
    /// The room ended. Fired at most once.
    Disconnected { error: Option<TransportError> },
}

/// Result of publishing a local track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPublication {
    pub sid: String,
    pub name: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub priority: TrackPriority,
}

impl LocalPublication {
    /// The published track as the local participant now carries it.
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            sid: self.sid.clone(),
            name: self.name.clone(),
            kind: self.kind,
            source: self.source,
            enabled: true,
        }
    }
}

pub struct Connection {
    pub room: Arc<dyn RoomHandle>,
    pub events: mpsc::UnboundedReceiver<RoomEvent>,
    /// One entry per track passed to [`Transport::connect`], same order.
    pub local_publications: Vec<LocalPublication>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Join a room, publishing `tracks` as part of the join.
    async fn connect(
        &self,
        credentials: &Credentials,
        options: &TransportOptions,
        tracks: Vec<LocalTrack>,
    ) -> Result<Connection, TransportError>;
}

/// An established room.
///
/// Local publish and unpublish calls produce no event on the room channel;
/// the session reports them itself, in call order.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    fn name(&self) -> String;
    fn sid(&self) -> String;
    fn local_participant(&self) -> ParticipantSnapshot;
    fn remote_participants(&self) -> Vec<ParticipantSnapshot>;

    async fn publish_track(
        &self,
        track: &LocalTrack,
        priority: TrackPriority,
    ) -> Result<LocalPublication, TransportError>;

    async fn unpublish_track(&self, sid: &str) -> Result<(), TransportError>;

    async fn set_track_priority(
        &self,
        sid: &str,
        priority: TrackPriority,
    ) -> Result<(), TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;
}
