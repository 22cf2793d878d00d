use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::media::{TrackKind, TrackSource};

/// Events emitted by the session to registered handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RoomConnected(RoomInfo),
    RoomCompleted(RoomInfo),
    ParticipantConnected(ParticipantInfo),
    ParticipantDisconnected(ParticipantInfo),
    ParticipantSubscribedTrack(TrackEvent),
    ParticipantUnsubscribedTrack(TrackEvent),
    /// `None` when nobody is currently dominant.
    DominantSpeakerChanged(Option<ParticipantInfo>),
    /// Everyone present at connect time has been reported.
    ExistingParticipantsReportingComplete,
    ErrorOccured(String),
    Debug(String),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RoomConnected(_) => EventKind::RoomConnected,
            Self::RoomCompleted(_) => EventKind::RoomCompleted,
            Self::ParticipantConnected(_) => EventKind::ParticipantConnected,
            Self::ParticipantDisconnected(_) => EventKind::ParticipantDisconnected,
            Self::ParticipantSubscribedTrack(_) => EventKind::ParticipantSubscribedTrack,
            Self::ParticipantUnsubscribedTrack(_) => EventKind::ParticipantUnsubscribedTrack,
            Self::DominantSpeakerChanged(_) => EventKind::DominantSpeakerChanged,
            Self::ExistingParticipantsReportingComplete => {
                EventKind::ExistingParticipantsReportingComplete
            }
            Self::ErrorOccured(_) => EventKind::ErrorOccured,
            Self::Debug(_) => EventKind::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RoomConnected,
    RoomCompleted,
    ParticipantConnected,
    ParticipantDisconnected,
    ParticipantSubscribedTrack,
    ParticipantUnsubscribedTrack,
    DominantSpeakerChanged,
    ExistingParticipantsReportingComplete,
    ErrorOccured,
    Debug,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        Self::RoomConnected,
        Self::RoomCompleted,
        Self::ParticipantConnected,
        Self::ParticipantDisconnected,
        Self::ParticipantSubscribedTrack,
        Self::ParticipantUnsubscribedTrack,
        Self::DominantSpeakerChanged,
        Self::ExistingParticipantsReportingComplete,
        Self::ErrorOccured,
        Self::Debug,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub name: String,
    pub sid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub name: Option<String>,
    pub is_remote: bool,
}

/// Describes the track a notification is about.
///
/// Synthesized notifications carry the kind (and the source when known):
/// the native track object is no longer available, so `sid` and `name`
/// are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub sid: Option<String>,
    pub name: Option<String>,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub enabled: bool,
    /// Produced by the session rather than by the transport.
    pub synthetic: bool,
}

impl TrackDescriptor {
    /// Kind-only descriptor for forced unpublish notifications.
    pub fn synthetic(kind: TrackKind) -> Self {
        Self {
            sid: None,
            name: None,
            kind,
            source: TrackSource::default_for(kind),
            enabled: false,
            synthetic: true,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub track: TrackDescriptor,
    pub participant: ParticipantInfo,
}

/// Trait for receiving every session event.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait SessionEventListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

impl<F> SessionEventListener for F
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Handler configuration: at most one handler per event kind.
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: HashMap<EventKind, Handler>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `kind`, replacing any previous one.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    /// Route every kind to `listener`.
    pub fn listener(mut self, listener: Arc<dyn SessionEventListener>) -> Self {
        for kind in EventKind::ALL {
            let listener = listener.clone();
            self.handlers
                .insert(kind, Arc::new(move |event: &SessionEvent| listener.on_event(event)));
        }
        self
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn handler(&self, kind: EventKind) -> Option<Handler> {
        self.handlers.get(&kind).cloned()
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

/// Dispatches session events to the registered [`EventHandlers`].
///
/// Cloning yields another handle on the same configuration.
#[derive(Clone, Default)]
pub struct EventRouter {
    handlers: Arc<RwLock<Option<EventHandlers>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler configuration and return a bound dispatcher.
    pub fn register(&self, handlers: EventHandlers) -> EventRouter {
        tracing::debug!("registering event handlers: {handlers:?}");
        *self.handlers.write().unwrap_or_else(|e| e.into_inner()) = Some(handlers);
        self.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn clear(&self) {
        *self.handlers.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Invoke the handler registered for the event's kind, if any.
    pub fn notify(&self, event: SessionEvent) {
        let kind = event.kind();
        let handler = {
            let guard = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            guard.as_ref().and_then(|h| h.handler(kind))
        };
        match handler {
            Some(handler) => {
                tracing::debug!("dispatching {kind:?}");
                handler(&event);
            }
            None => tracing::trace!("no handler for {kind:?}, dropped"),
        }
    }
}
