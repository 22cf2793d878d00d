use std::collections::{HashMap, HashSet};

use crate::events::{EventRouter, ParticipantInfo, SessionEvent, TrackDescriptor, TrackEvent};
use crate::media::TrackKind;
use crate::transport::{ParticipantEvent, ParticipantSnapshot, TrackSnapshot};

/// Bridges one participant's native track events into normalized
/// subscribed/unsubscribed notifications.
///
/// Every native event produces exactly one notification. Mute (enable /
/// disable) events are only bridged for remote tracks, once the track has
/// been subscribed.
pub struct ParticipantTracker {
    info: ParticipantInfo,
    router: EventRouter,
    /// Currently bound tracks, keyed by sid.
    tracks: HashMap<String, TrackSnapshot>,
    /// Tracks with mute listeners installed.
    mute_watched: HashSet<String>,
    attached: bool,
}

impl ParticipantTracker {
    /// Start tracking `participant` and report the tracks it already has.
    pub fn attach(participant: ParticipantSnapshot, is_remote: bool, router: EventRouter) -> Self {
        let mut tracker = Self {
            info: participant.info(is_remote),
            router,
            tracks: HashMap::new(),
            mute_watched: HashSet::new(),
            attached: true,
        };

        for track in participant.tracks {
            tracker.bind(track.clone());
            if is_remote {
                tracker.watch_mute(&track.sid);
            }
            tracker.emit_subscribed(track.descriptor());
        }

        tracing::debug!(
            "tracking {} participant {} ({} tracks)",
            if is_remote { "remote" } else { "local" },
            tracker.info.identity,
            tracker.tracks.len()
        );
        tracker
    }

    pub fn info(&self) -> &ParticipantInfo {
        &self.info
    }

    pub fn identity(&self) -> &str {
        &self.info.identity
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn track_sids(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }

    pub fn track(&self, sid: &str) -> Option<&TrackSnapshot> {
        self.tracks.get(sid)
    }

    pub fn handle(&mut self, event: ParticipantEvent) {
        if !self.attached {
            tracing::debug!("ignoring {event:?} for detached {}", self.info.identity);
            return;
        }

        match event {
            ParticipantEvent::TrackSubscribed(track) => {
                self.bind(track.clone());
                if self.info.is_remote {
                    self.watch_mute(&track.sid);
                }
                self.emit_subscribed(track.descriptor());
            }
            ParticipantEvent::TrackUnsubscribed(track) => {
                self.unbind(&track.sid);
                self.emit_unsubscribed(track.descriptor());
            }
            ParticipantEvent::TrackPublished(publication) => {
                if let Some(track) = &publication.track {
                    self.bind(track.clone());
                }
                self.emit_subscribed(publication.descriptor());
            }
            ParticipantEvent::TrackUnpublished(publication) => {
                self.unbind(&publication.sid);
                self.emit_unsubscribed(publication.descriptor());
            }
            ParticipantEvent::TrackDisabled { track_sid } => {
                if let Some(descriptor) = self.set_enabled(&track_sid, false) {
                    self.emit_unsubscribed(descriptor);
                }
            }
            ParticipantEvent::TrackEnabled { track_sid } => {
                if let Some(descriptor) = self.set_enabled(&track_sid, true) {
                    self.emit_subscribed(descriptor);
                }
            }
        }
    }

    /// Report a forced unpublish of a local track.
    ///
    /// The transport does not notify local unpublishes, so the session
    /// calls this after removing a local track. The descriptor carries the
    /// kind, plus the source when the track was bound.
    pub fn synthesize_unpublished(&mut self, kind: TrackKind, sid: Option<&str>) {
        let mut descriptor = TrackDescriptor::synthetic(kind);
        if let Some(track) = sid.and_then(|sid| self.unbind(sid)) {
            descriptor.source = track.source;
        }
        self.emit_unsubscribed(descriptor);
    }

    /// Stop emitting and drop every listener.
    pub fn detach(&mut self) {
        self.attached = false;
        self.mute_watched.clear();
        self.tracks.clear();
    }

    fn bind(&mut self, track: TrackSnapshot) {
        self.tracks.insert(track.sid.clone(), track);
    }

    fn unbind(&mut self, sid: &str) -> Option<TrackSnapshot> {
        self.mute_watched.remove(sid);
        self.tracks.remove(sid)
    }

    fn watch_mute(&mut self, sid: &str) {
        self.mute_watched.insert(sid.to_string());
    }

    fn set_enabled(&mut self, sid: &str, enabled: bool) -> Option<TrackDescriptor> {
        if !self.mute_watched.contains(sid) {
            return None;
        }
        let track = self.tracks.get_mut(sid)?;
        track.enabled = enabled;
        Some(track.descriptor())
    }

    fn emit_subscribed(&self, track: TrackDescriptor) {
        self.router
            .notify(SessionEvent::ParticipantSubscribedTrack(self.track_event(track)));
    }

    fn emit_unsubscribed(&self, track: TrackDescriptor) {
        self.router
            .notify(SessionEvent::ParticipantUnsubscribedTrack(self.track_event(track)));
    }

    fn track_event(&self, track: TrackDescriptor) -> TrackEvent {
        TrackEvent {
            track,
            participant: self.info.clone(),
        }
    }
}
