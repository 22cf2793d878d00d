//! In-process transport and media backend.
//!
//! Rooms live entirely in memory. Remote activity is scripted through
//! [`LoopbackRoom`]; every call the session makes is recorded so it can be
//! inspected afterwards. Used by the test suite and by `huddle simulate`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{Credentials, TransportOptions};
use crate::devices::DeviceKind;
use crate::errors::{MediaError, TransportError};
use crate::media::{
    CaptureFlag, DeviceDescriptor, LocalTrack, MediaAcquisition, TrackKind, TrackPriority,
    TrackSource, VideoDimensions,
};
use crate::transport::{
    Connection, LocalPublication, ParticipantEvent, ParticipantSnapshot, RoomEvent, RoomHandle,
    TrackSnapshot, Transport,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn new_sid(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

struct TransportState {
    local_identity: String,
    roster: Vec<ParticipantSnapshot>,
    fail_next_connect: Option<TransportError>,
    last_room: Option<Arc<LoopbackRoom>>,
    connects: usize,
}

/// [`Transport`] whose rooms exist only in this process.
#[derive(Clone)]
pub struct LoopbackTransport {
    state: Arc<Mutex<TransportState>>,
}

impl LoopbackTransport {
    pub fn new(local_identity: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState {
                local_identity: local_identity.into(),
                roster: Vec::new(),
                fail_next_connect: None,
                last_room: None,
                connects: 0,
            })),
        }
    }

    /// Participants already present when a room is joined.
    pub fn with_remote(self, participant: ParticipantSnapshot) -> Self {
        lock(&self.state).roster.push(participant);
        self
    }

    pub fn fail_next_connect(&self, err: TransportError) {
        lock(&self.state).fail_next_connect = Some(err);
    }

    /// The most recently joined room.
    pub fn room(&self) -> Option<Arc<LoopbackRoom>> {
        lock(&self.state).last_room.clone()
    }

    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(
        &self,
        credentials: &Credentials,
        options: &TransportOptions,
        tracks: Vec<LocalTrack>,
    ) -> Result<Connection, TransportError> {
        let mut state = lock(&self.state);
        state.connects += 1;
        if let Some(err) = state.fail_next_connect.take() {
            return Err(err);
        }
        if !credentials.is_present() {
            return Err(TransportError::Connection("access token rejected".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut local = ParticipantSnapshot::new(new_sid("PA"), state.local_identity.clone());
        let mut publications = Vec::new();
        let mut priorities = HashMap::new();
        for track in &tracks {
            let publication = publication_for(track, TrackPriority::Standard);
            local.tracks.push(snapshot_for(track, &publication.sid));
            priorities.insert(publication.sid.clone(), publication.priority);
            publications.push(publication);
        }

        let room = Arc::new(LoopbackRoom {
            name: options.room_name.clone(),
            sid: new_sid("RM"),
            events: tx,
            state: Mutex::new(RoomState {
                local,
                remotes: state.roster.clone(),
                priorities,
                unpublished: Vec::new(),
                fail_next_publish: None,
                fail_next_unpublish: None,
                disconnected: false,
            }),
        });
        state.last_room = Some(room.clone());
        tracing::debug!("loopback room {} created", room.name);

        Ok(Connection {
            room,
            events: rx,
            local_publications: publications,
        })
    }
}

fn publication_for(track: &LocalTrack, priority: TrackPriority) -> LocalPublication {
    LocalPublication {
        sid: new_sid("TR"),
        name: track.name().to_string(),
        kind: track.kind(),
        source: track.source(),
        priority,
    }
}

fn snapshot_for(track: &LocalTrack, sid: &str) -> TrackSnapshot {
    TrackSnapshot {
        sid: sid.to_string(),
        name: track.name().to_string(),
        kind: track.kind(),
        source: track.source(),
        enabled: true,
    }
}

struct RoomState {
    local: ParticipantSnapshot,
    remotes: Vec<ParticipantSnapshot>,
    priorities: HashMap<String, TrackPriority>,
    unpublished: Vec<String>,
    fail_next_publish: Option<TransportError>,
    fail_next_unpublish: Option<TransportError>,
    disconnected: bool,
}

/// A joined loopback room. Doubles as the script for remote activity.
pub struct LoopbackRoom {
    name: String,
    sid: String,
    events: mpsc::UnboundedSender<RoomEvent>,
    state: Mutex<RoomState>,
}

impl LoopbackRoom {
    fn send(&self, event: RoomEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("loopback room {}: no event consumer", self.name);
        }
    }

    /// Deliver an arbitrary native event.
    pub fn emit(&self, event: RoomEvent) {
        self.send(event);
    }

    pub fn join(&self, participant: ParticipantSnapshot) {
        lock(&self.state).remotes.push(participant.clone());
        self.send(RoomEvent::ParticipantConnected(participant));
    }

    pub fn leave(&self, identity: &str) {
        lock(&self.state).remotes.retain(|p| p.identity != identity);
        self.send(RoomEvent::ParticipantDisconnected {
            identity: identity.to_string(),
        });
    }

    pub fn track_event(&self, identity: &str, event: ParticipantEvent) {
        self.send(RoomEvent::Participant {
            identity: identity.to_string(),
            event,
        });
    }

    pub fn subscribe(&self, identity: &str, track: TrackSnapshot) {
        self.track_event(identity, ParticipantEvent::TrackSubscribed(track));
    }

    pub fn unsubscribe(&self, identity: &str, track: TrackSnapshot) {
        self.track_event(identity, ParticipantEvent::TrackUnsubscribed(track));
    }

    pub fn disable(&self, identity: &str, track_sid: &str) {
        self.track_event(
            identity,
            ParticipantEvent::TrackDisabled {
                track_sid: track_sid.to_string(),
            },
        );
    }

    pub fn enable(&self, identity: &str, track_sid: &str) {
        self.track_event(
            identity,
            ParticipantEvent::TrackEnabled {
                track_sid: track_sid.to_string(),
            },
        );
    }

    pub fn set_dominant_speaker(&self, identity: Option<&str>) {
        self.send(RoomEvent::DominantSpeakerChanged {
            identity: identity.map(str::to_string),
        });
    }

    /// End the room from the server side.
    pub fn drop_connection(&self, error: Option<TransportError>) {
        lock(&self.state).disconnected = true;
        self.send(RoomEvent::Disconnected { error });
    }

    pub fn fail_next_publish(&self, err: TransportError) {
        lock(&self.state).fail_next_publish = Some(err);
    }

    pub fn fail_next_unpublish(&self, err: TransportError) {
        lock(&self.state).fail_next_unpublish = Some(err);
    }

    pub fn priority_of(&self, sid: &str) -> Option<TrackPriority> {
        lock(&self.state).priorities.get(sid).copied()
    }

    /// Local tracks currently published.
    pub fn published(&self) -> Vec<TrackSnapshot> {
        lock(&self.state).local.tracks.clone()
    }

    pub fn unpublished(&self) -> Vec<String> {
        lock(&self.state).unpublished.clone()
    }

    pub fn is_disconnected(&self) -> bool {
        lock(&self.state).disconnected
    }
}

#[async_trait]
impl RoomHandle for LoopbackRoom {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn local_participant(&self) -> ParticipantSnapshot {
        lock(&self.state).local.clone()
    }

    fn remote_participants(&self) -> Vec<ParticipantSnapshot> {
        lock(&self.state).remotes.clone()
    }

    async fn publish_track(
        &self,
        track: &LocalTrack,
        priority: TrackPriority,
    ) -> Result<LocalPublication, TransportError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_publish.take() {
            return Err(err);
        }
        if state.disconnected {
            return Err(TransportError::Publish("room is disconnected".into()));
        }
        let publication = publication_for(track, priority);
        state.local.tracks.push(snapshot_for(track, &publication.sid));
        state.priorities.insert(publication.sid.clone(), priority);
        Ok(publication)
    }

    async fn unpublish_track(&self, sid: &str) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_unpublish.take() {
            return Err(err);
        }
        state.local.tracks.retain(|t| t.sid != sid);
        state.priorities.remove(sid);
        state.unpublished.push(sid.to_string());
        Ok(())
    }

    async fn set_track_priority(
        &self,
        sid: &str,
        priority: TrackPriority,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        match state.priorities.get_mut(sid) {
            Some(current) => {
                *current = priority;
                Ok(())
            }
            None => Err(TransportError::Room(format!("unknown track {sid}"))),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        lock(&self.state).disconnected = true;
        self.send(RoomEvent::Disconnected { error: None });
        Ok(())
    }
}

struct MediaState {
    created: Vec<LocalTrack>,
    fail_next_track: Option<MediaError>,
    fail_next_screen: Option<MediaError>,
    enumeration_denied: bool,
}

/// [`MediaAcquisition`] over a fixed list of fake devices.
pub struct LoopbackMedia {
    devices: Vec<DeviceDescriptor>,
    screen_capture: bool,
    state: Mutex<MediaState>,
}

impl Default for LoopbackMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackMedia {
    /// One microphone (`mic-1`), one camera (`cam-1`) and one speaker
    /// (`speaker-1`), with screen capture available.
    pub fn new() -> Self {
        Self::with_devices(vec![
            device("mic-1", "Built-in Microphone", DeviceKind::AudioInput),
            device("cam-1", "FaceTime HD Camera", DeviceKind::VideoInput),
            device("speaker-1", "Built-in Output", DeviceKind::AudioOutput),
        ])
    }

    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices,
            screen_capture: true,
            state: Mutex::new(MediaState {
                created: Vec::new(),
                fail_next_track: None,
                fail_next_screen: None,
                enumeration_denied: false,
            }),
        }
    }

    pub fn without_screen_capture(mut self) -> Self {
        self.screen_capture = false;
        self
    }

    pub fn deny_enumeration(&self) {
        lock(&self.state).enumeration_denied = true;
    }

    pub fn fail_next_track(&self, err: MediaError) {
        lock(&self.state).fail_next_track = Some(err);
    }

    pub fn fail_next_screen(&self, err: MediaError) {
        lock(&self.state).fail_next_screen = Some(err);
    }

    /// Every track handed out so far, stopped or not.
    pub fn created_tracks(&self) -> Vec<LocalTrack> {
        lock(&self.state).created.clone()
    }

    pub fn live_tracks(&self) -> Vec<LocalTrack> {
        lock(&self.state)
            .created
            .iter()
            .filter(|t| !t.is_stopped())
            .cloned()
            .collect()
    }

    fn devices_of(&self, kind: DeviceKind) -> Vec<DeviceDescriptor> {
        self.devices
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }
}

pub fn device(id: &str, label: &str, kind: DeviceKind) -> DeviceDescriptor {
    DeviceDescriptor {
        device_id: id.to_string(),
        label: label.to_string(),
        kind,
        group_id: None,
    }
}

#[async_trait]
impl MediaAcquisition for LoopbackMedia {
    async fn enumerate_inputs(&self, kind: TrackKind) -> Option<Vec<DeviceDescriptor>> {
        if lock(&self.state).enumeration_denied {
            return None;
        }
        let kind = match kind {
            TrackKind::Audio => DeviceKind::AudioInput,
            TrackKind::Video => DeviceKind::VideoInput,
        };
        Some(self.devices_of(kind))
    }

    async fn enumerate_outputs(&self) -> Option<Vec<DeviceDescriptor>> {
        if lock(&self.state).enumeration_denied {
            return None;
        }
        Some(self.devices_of(DeviceKind::AudioOutput))
    }

    async fn create_local_track(
        &self,
        kind: TrackKind,
        device_id: &str,
    ) -> Result<LocalTrack, MediaError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_track.take() {
            return Err(err);
        }
        let device_kind = match kind {
            TrackKind::Audio => DeviceKind::AudioInput,
            TrackKind::Video => DeviceKind::VideoInput,
        };
        let known = self
            .devices
            .iter()
            .any(|d| d.kind == device_kind && d.device_id == device_id);
        if !known {
            return Err(MediaError::DeviceNotFound(device_id.to_string()));
        }

        let name = match kind {
            TrackKind::Audio => "microphone",
            TrackKind::Video => "camera",
        };
        let track = LocalTrack::new(name, kind, TrackSource::default_for(kind), CaptureFlag::new())
            .with_device_id(device_id);
        state.created.push(track.clone());
        Ok(track)
    }

    fn supports_screen_capture(&self) -> bool {
        self.screen_capture
    }

    async fn create_screen_track(
        &self,
        dimensions: VideoDimensions,
    ) -> Result<LocalTrack, MediaError> {
        if !self.screen_capture {
            return Err(MediaError::Unsupported("no display capture".into()));
        }
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_screen.take() {
            return Err(err);
        }
        let track = LocalTrack::new(
            "screen",
            TrackKind::Video,
            TrackSource::ScreenShare,
            CaptureFlag::new(),
        )
        .with_dimensions(dimensions);
        state.created.push(track.clone());
        Ok(track)
    }
}
