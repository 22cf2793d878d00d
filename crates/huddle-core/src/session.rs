use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{ConnectOptions, Credentials, TransportOptions};
use crate::devices::{DeviceKind, DeviceStore};
use crate::errors::{SessionError, TransportError};
use crate::events::{EventHandlers, EventRouter, ParticipantInfo, RoomInfo, SessionEvent};
use crate::media::{
    DeviceDescriptor, LocalTrack, MediaAcquisition, TrackKind, TrackPriority, VideoDimensions,
};
use crate::tracker::ParticipantTracker;
use crate::transport::{
    LocalPublication, ParticipantEvent, Publication, RoomEvent, RoomHandle, Transport,
};

/// Lifecycle of the controller's single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

/// Owns a spawned task; dropping the guard aborts it.
struct TaskGuard {
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Release without aborting. Used by the task itself when it exits.
    fn detach(mut self) {
        self.handle.take();
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// A local track together with its room publication.
struct PublishedTrack {
    track: LocalTrack,
    publication: LocalPublication,
    priority: TrackPriority,
    /// Priority to restore once a screen share ends.
    restore_priority: Option<TrackPriority>,
}

impl PublishedTrack {
    fn new(track: LocalTrack, publication: LocalPublication) -> Self {
        let priority = publication.priority;
        Self {
            track,
            publication,
            priority,
            restore_priority: None,
        }
    }
}

struct Session {
    id: Uuid,
    room: Arc<dyn RoomHandle>,
    info: RoomInfo,
    /// Options with resolved device identifiers.
    options: ConnectOptions,
    local: ParticipantTracker,
    /// Remote participants in join order.
    remotes: Vec<ParticipantTracker>,
    local_audio: Vec<PublishedTrack>,
    local_video: Vec<PublishedTrack>,
    screen: Option<PublishedTrack>,
    dominant_speaker: Option<String>,
    event_loop: Option<TaskGuard>,
}

impl Session {
    fn audio_device(&self) -> &str {
        self.options.audio_device_id.as_deref().unwrap_or_default()
    }

    fn video_device(&self) -> &str {
        self.options.video_device_id.as_deref().unwrap_or_default()
    }

    fn has_local(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => !self.local_audio.is_empty(),
            TrackKind::Video => !self.local_video.is_empty(),
        }
    }

    fn local_tracks_mut(&mut self, kind: TrackKind) -> &mut Vec<PublishedTrack> {
        match kind {
            TrackKind::Audio => &mut self.local_audio,
            TrackKind::Video => &mut self.local_video,
        }
    }

    fn tracker_mut(&mut self, identity: &str) -> Option<&mut ParticipantTracker> {
        if self.local.identity() == identity {
            return Some(&mut self.local);
        }
        self.remotes.iter_mut().find(|t| t.identity() == identity)
    }

    fn participant(&self, identity: &str) -> Option<ParticipantInfo> {
        std::iter::once(&self.local)
            .chain(self.remotes.iter())
            .find(|t| t.identity() == identity)
            .map(|t| t.info().clone())
    }

    /// Report every participant as gone, local first.
    fn disconnect_participants(&mut self, router: &EventRouter) {
        self.local.detach();
        router.notify(SessionEvent::ParticipantDisconnected(self.local.info().clone()));
        for remote in self.remotes.iter_mut() {
            remote.detach();
            router.notify(SessionEvent::ParticipantDisconnected(remote.info().clone()));
        }
        self.remotes.clear();
    }

    /// Stop every local capture without touching the room.
    fn stop_local_captures(&mut self) {
        for published in self
            .local_audio
            .drain(..)
            .chain(self.local_video.drain(..))
            .chain(self.screen.take())
        {
            published.track.stop();
        }
    }
}

struct Inner {
    state: SessionState,
    session: Option<Session>,
}

/// Records the first failure of a best-effort sequence and logs the rest.
#[derive(Default)]
struct FirstError(Option<SessionError>);

impl FirstError {
    fn record(&mut self, context: &str, err: impl Into<SessionError>) {
        let err = err.into();
        tracing::warn!("{context}: {err}");
        self.0.get_or_insert(err);
    }

    fn into_result(self) -> Result<(), SessionError> {
        match self.0 {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Owns the lifecycle of a single conferencing session.
///
/// Operations are meant to be issued sequentially by the caller. The
/// controller serializes access to its state but does not make overlapping
/// `connect`/`disconnect` or `turn_on_video`/`start_screen_share` calls
/// meaningful; issuing them concurrently is a caller bug.
pub struct SessionController {
    inner: Arc<Mutex<Inner>>,
    router: EventRouter,
    transport: Arc<dyn Transport>,
    media: Arc<dyn MediaAcquisition>,
    devices: Arc<dyn DeviceStore>,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        media: Arc<dyn MediaAcquisition>,
        devices: Arc<dyn DeviceStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
            })),
            router: EventRouter::new(),
            transport,
            media,
            devices,
        }
    }

    /// Install the handler configuration used for every notification.
    pub fn register_handlers(&self, handlers: EventHandlers) -> EventRouter {
        self.router.register(handlers)
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn room(&self) -> Option<RoomInfo> {
        self.inner.lock().await.session.as_ref().map(|s| s.info.clone())
    }

    /// Local participant first, then remotes in join order.
    pub async fn participants(&self) -> Vec<ParticipantInfo> {
        let inner = self.inner.lock().await;
        let Some(session) = inner.session.as_ref() else {
            return Vec::new();
        };
        std::iter::once(&session.local)
            .chain(session.remotes.iter())
            .map(|t| t.info().clone())
            .collect()
    }

    /// Current local publications (camera, microphone and screen).
    pub async fn local_publications(&self) -> Vec<LocalPublication> {
        let inner = self.inner.lock().await;
        let Some(session) = inner.session.as_ref() else {
            return Vec::new();
        };
        session
            .local_audio
            .iter()
            .chain(session.local_video.iter())
            .chain(session.screen.iter())
            .map(|p| LocalPublication {
                priority: p.priority,
                ..p.publication.clone()
            })
            .collect()
    }

    pub async fn has_screen_share(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.session.as_ref().is_some_and(|s| s.screen.is_some())
    }

    pub async fn dominant_speaker(&self) -> Option<ParticipantInfo> {
        let inner = self.inner.lock().await;
        let session = inner.session.as_ref()?;
        session
            .dominant_speaker
            .as_deref()
            .and_then(|identity| session.participant(identity))
    }

    // ── Device preferences ───────────────────────────────────────────

    pub fn assign_default_audio_input_device_id(&self, device_id: &str) {
        self.devices.set(DeviceKind::AudioInput, device_id);
    }

    pub fn assign_default_audio_output_device_id(&self, device_id: &str) {
        self.devices.set(DeviceKind::AudioOutput, device_id);
    }

    pub fn assign_default_video_input_device_id(&self, device_id: &str) {
        self.devices.set(DeviceKind::VideoInput, device_id);
    }

    pub fn default_audio_input_device_id(&self) -> Option<String> {
        self.devices.get(DeviceKind::AudioInput)
    }

    pub fn default_audio_output_device_id(&self) -> Option<String> {
        self.devices.get(DeviceKind::AudioOutput)
    }

    pub fn default_video_input_device_id(&self) -> Option<String> {
        self.devices.get(DeviceKind::VideoInput)
    }

    pub fn clear_device_preferences(&self) {
        self.devices.clear_all();
    }

    pub async fn audio_input_devices(&self) -> Option<Vec<DeviceDescriptor>> {
        self.media.enumerate_inputs(TrackKind::Audio).await
    }

    pub async fn video_input_devices(&self) -> Option<Vec<DeviceDescriptor>> {
        self.media.enumerate_inputs(TrackKind::Video).await
    }

    pub async fn audio_output_devices(&self) -> Option<Vec<DeviceDescriptor>> {
        self.media.enumerate_outputs().await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Join `room_name`.
    ///
    /// On success the caller has already received `RoomConnected`, a
    /// `ParticipantConnected` plus track notifications for everyone present,
    /// and `ExistingParticipantsReportingComplete`. Later joins arrive from
    /// the room event loop.
    pub async fn connect(
        &self,
        credentials: &Credentials,
        room_name: &str,
        options: ConnectOptions,
    ) -> Result<RoomInfo, SessionError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Idle {
                return Err(SessionError::SessionAlreadyActive);
            }
            if !credentials.is_present() {
                return Err(SessionError::MissingCredentials);
            }
            if room_name.trim().is_empty() {
                return Err(SessionError::MissingRoomName);
            }
            if !self.router.is_registered() {
                return Err(SessionError::HandlersNotRegistered);
            }
            inner.state = SessionState::Connecting;
        }

        tracing::info!("connecting to room {room_name}");
        let result = self.establish(credentials, room_name, options).await;
        if let Err(e) = &result {
            tracing::warn!("connect to {room_name} failed: {e}");
            self.inner.lock().await.state = SessionState::Idle;
        }
        result
    }

    async fn establish(
        &self,
        credentials: &Credentials,
        room_name: &str,
        options: ConnectOptions,
    ) -> Result<RoomInfo, SessionError> {
        let options = self.resolve_devices(options)?;
        let tracks = self.acquire_initial_tracks(&options).await?;

        let transport_options = TransportOptions {
            room_name: room_name.to_string(),
            audio_device_id: options.audio_device_id.clone().unwrap_or_default(),
            video_device_id: options.video_device_id.clone().unwrap_or_default(),
            video: options.video,
            dominant_speaker: options.dominant_speaker,
        };

        let connection = match self
            .transport
            .connect(credentials, &transport_options, tracks.clone())
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracks.iter().for_each(LocalTrack::stop);
                return Err(e.into());
            }
        };

        let room = connection.room;
        let info = RoomInfo {
            name: room.name(),
            sid: room.sid(),
        };

        let mut local_audio = Vec::new();
        let mut local_video = Vec::new();
        for (track, publication) in tracks.into_iter().zip(connection.local_publications) {
            let published = PublishedTrack::new(track, publication);
            match published.track.kind() {
                TrackKind::Audio => local_audio.push(published),
                TrackKind::Video => local_video.push(published),
            }
        }

        let mut inner = self.inner.lock().await;
        inner.state = SessionState::Connected;
        tracing::info!("connected to room {} ({})", info.name, info.sid);
        self.router.notify(SessionEvent::RoomConnected(info.clone()));

        let local_snapshot = room.local_participant();
        self.router
            .notify(SessionEvent::ParticipantConnected(local_snapshot.info(false)));
        let local = ParticipantTracker::attach(local_snapshot, false, self.router.clone());

        let mut remotes = Vec::new();
        for snapshot in room.remote_participants() {
            self.router
                .notify(SessionEvent::ParticipantConnected(snapshot.info(true)));
            remotes.push(ParticipantTracker::attach(snapshot, true, self.router.clone()));
        }
        self.router
            .notify(SessionEvent::ExistingParticipantsReportingComplete);

        let id = Uuid::new_v4();
        let handle = tokio::spawn(Self::event_loop(
            id,
            connection.events,
            self.inner.clone(),
            self.router.clone(),
        ));

        inner.session = Some(Session {
            id,
            room,
            info: info.clone(),
            options,
            local,
            remotes,
            local_audio,
            local_video,
            screen: None,
            dominant_speaker: None,
            event_loop: Some(TaskGuard::new(handle)),
        });

        Ok(info)
    }

    fn resolve_devices(&self, mut options: ConnectOptions) -> Result<ConnectOptions, SessionError> {
        options.audio_device_id = options
            .audio_device_id
            .filter(|id| !id.is_empty())
            .or_else(|| self.devices.get(DeviceKind::AudioInput));
        if options.audio_device_id.is_none() {
            return Err(SessionError::NoAudioDevice);
        }

        options.video_device_id = options
            .video_device_id
            .filter(|id| !id.is_empty())
            .or_else(|| self.devices.get(DeviceKind::VideoInput));
        if options.video_device_id.is_none() {
            return Err(SessionError::NoVideoDevice);
        }

        Ok(options)
    }

    async fn acquire_initial_tracks(
        &self,
        options: &ConnectOptions,
    ) -> Result<Vec<LocalTrack>, SessionError> {
        let mut wanted = Vec::new();
        if options.join_with_audio {
            wanted.push((TrackKind::Audio, options.audio_device_id.as_deref()));
        }
        if options.join_with_video {
            wanted.push((TrackKind::Video, options.video_device_id.as_deref()));
        }

        let mut tracks = Vec::new();
        for (kind, device_id) in wanted {
            let device_id = device_id.unwrap_or_default();
            match self.media.create_local_track(kind, device_id).await {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    tracks.iter().for_each(LocalTrack::stop);
                    return Err(SessionError::DeviceAcquisition(e.to_string()));
                }
            }
        }
        Ok(tracks)
    }

    /// Leave the current room.
    ///
    /// Local tracks are turned off (with their unsubscribed notifications),
    /// then every participant is reported disconnected, local first.
    /// Calling this while idle is a no-op. Cleanup always runs to the end;
    /// the first failure is returned.
    pub async fn disconnect(&self, room_name: &str) -> Result<(), SessionError> {
        let mut session = {
            let mut inner = self.inner.lock().await;
            let Some(session) = inner.session.take() else {
                tracing::debug!("disconnect({room_name}) with no active session");
                return Ok(());
            };
            inner.state = SessionState::Disconnecting;
            session
        };

        if session.info.name != room_name {
            tracing::warn!(
                "disconnect requested for {room_name} but active room is {}",
                session.info.name
            );
        }

        // Stop routing native events before tearing anything down.
        drop(session.event_loop.take());

        let mut first = FirstError::default();
        for kind in [TrackKind::Audio, TrackKind::Video] {
            if let Err(e) = Self::turn_off_local(&mut session, kind).await {
                first.record("turning off local tracks", e);
            }
        }
        if let Some(screen) = session.screen.take() {
            if let Err(e) = Self::release_screen(&mut session, screen).await {
                first.record("stopping screen share", e);
            }
        }

        session.disconnect_participants(&self.router);
        self.router.notify(SessionEvent::Debug(format!(
            "disconnected from room {}",
            session.info.name
        )));

        if let Err(e) = session.room.disconnect().await {
            first.record("disconnecting room", e);
        }

        self.inner.lock().await.state = SessionState::Idle;
        tracing::info!("session for room {} closed", session.info.name);
        first.into_result()
    }

    // ── Local media ──────────────────────────────────────────────────

    pub async fn turn_on_audio(&self, device_id: Option<&str>) -> Result<(), SessionError> {
        self.turn_on(TrackKind::Audio, device_id).await
    }

    pub async fn turn_on_video(&self, device_id: Option<&str>) -> Result<(), SessionError> {
        self.turn_on(TrackKind::Video, device_id).await
    }

    pub async fn turn_off_audio(&self) -> Result<(), SessionError> {
        self.turn_off(TrackKind::Audio).await
    }

    pub async fn turn_off_video(&self) -> Result<(), SessionError> {
        self.turn_off(TrackKind::Video).await
    }

    async fn turn_on(&self, kind: TrackKind, device_id: Option<&str>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let session = Self::connected(&mut inner)?;

        if let Some(device_id) = device_id.filter(|id| !id.is_empty()) {
            let slot = match kind {
                TrackKind::Audio => &mut session.options.audio_device_id,
                TrackKind::Video => &mut session.options.video_device_id,
            };
            *slot = Some(device_id.to_string());
        }
        let device_id = match kind {
            TrackKind::Audio => session.audio_device().to_string(),
            TrackKind::Video => session.video_device().to_string(),
        };

        let track = self
            .media
            .create_local_track(kind, &device_id)
            .await
            .map_err(|e| SessionError::DeviceAcquisition(e.to_string()))?;

        let sharing = session.screen.is_some() && session.options.screen_share.demote_camera;
        let priority = if kind == TrackKind::Video && sharing {
            TrackPriority::Low
        } else {
            TrackPriority::Standard
        };

        let publication = match session.room.publish_track(&track, priority).await {
            Ok(publication) => publication,
            Err(e) => {
                track.stop();
                return Err(e.into());
            }
        };

        tracing::info!("local {kind} track {} published on {device_id}", publication.sid);
        session.local.handle(ParticipantEvent::TrackPublished(Publication::resolved(
            publication.snapshot(),
        )));
        let mut published = PublishedTrack::new(track, publication);
        if priority == TrackPriority::Low {
            published.restore_priority = Some(TrackPriority::Standard);
        }
        session.local_tracks_mut(kind).push(published);
        Ok(())
    }

    async fn turn_off(&self, kind: TrackKind) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let session = inner.session.as_mut().filter(|s| s.has_local(kind));
        // Also covers the no-session case: there is no local track either way.
        let Some(session) = session else {
            return Err(SessionError::NoLocalTrack(kind));
        };
        Self::turn_off_local(session, kind).await
    }

    /// Unpublish and stop every local track of `kind`, synthesizing one
    /// unsubscribed notification per track.
    async fn turn_off_local(session: &mut Session, kind: TrackKind) -> Result<(), SessionError> {
        let published: Vec<PublishedTrack> = session.local_tracks_mut(kind).drain(..).collect();
        let mut first = FirstError::default();
        for p in published {
            if let Err(e) = session.room.unpublish_track(&p.publication.sid).await {
                first.record("unpublishing local track", e);
            }
            p.track.stop();
            session
                .local
                .synthesize_unpublished(kind, Some(&p.publication.sid));
            tracing::info!("local {kind} track {} turned off", p.publication.sid);
        }
        first.into_result()
    }

    // ── Screen share ─────────────────────────────────────────────────

    /// Publish a display capture at high priority.
    ///
    /// Omitted dimensions fall back to the connect-time video constraints.
    /// An active share is replaced.
    pub async fn start_screen_share(
        &self,
        height: Option<u32>,
        width: Option<u32>,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let session = Self::connected(&mut inner)?;

        if !self.media.supports_screen_capture() {
            return Err(SessionError::ScreenShareUnsupported(
                "display capture is not available on this platform".into(),
            ));
        }

        let dimensions = VideoDimensions {
            width: width.unwrap_or(session.options.video.width),
            height: height.unwrap_or(session.options.video.height),
        };

        if let Some(previous) = session.screen.take() {
            tracing::info!("replacing active screen share {}", previous.publication.sid);
            if let Err(e) = Self::release_screen(session, previous).await {
                if let Err(restore) = Self::restore_cameras(session).await {
                    tracing::warn!("restoring camera priority: {restore}");
                }
                return Err(e.into());
            }
        }

        let result = self.publish_screen(session, dimensions).await;
        if result.is_err() {
            if let Err(e) = Self::restore_cameras(session).await {
                tracing::warn!("restoring camera priority: {e}");
            }
        }
        result
    }

    async fn publish_screen(
        &self,
        session: &mut Session,
        dimensions: VideoDimensions,
    ) -> Result<(), SessionError> {
        let track = self
            .media
            .create_screen_track(dimensions)
            .await
            .map_err(|e| SessionError::ScreenShareUnsupported(e.to_string()))?;

        if session.options.screen_share.demote_camera {
            if let Err(e) = Self::demote_cameras(session).await {
                track.stop();
                return Err(e);
            }
        }

        let publication = match session
            .room
            .publish_track(&track, TrackPriority::High)
            .await
        {
            Ok(publication) => publication,
            Err(e) => {
                track.stop();
                return Err(e.into());
            }
        };

        tracing::info!(
            "screen share {} published at {}x{}",
            publication.sid,
            dimensions.width,
            dimensions.height
        );
        session.local.handle(ParticipantEvent::TrackPublished(Publication::resolved(
            publication.snapshot(),
        )));
        session.screen = Some(PublishedTrack::new(track, publication));
        Ok(())
    }

    /// Stop the active screen share, if any, and restore camera priority.
    pub async fn stop_screen_share(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.session.as_mut() else {
            return Ok(());
        };
        let Some(screen) = session.screen.take() else {
            return Ok(());
        };

        let mut first = FirstError::default();
        if let Err(e) = Self::release_screen(session, screen).await {
            first.record("unpublishing screen share", e);
        }
        if let Err(e) = Self::restore_cameras(session).await {
            first.record("restoring camera priority", e);
        }
        first.into_result()
    }

    /// Unpublish and stop a screen track, reporting it like a turned-off
    /// local track.
    async fn release_screen(
        session: &mut Session,
        screen: PublishedTrack,
    ) -> Result<(), TransportError> {
        let sid = &screen.publication.sid;
        let result = session.room.unpublish_track(sid).await;
        screen.track.stop();
        session.local.synthesize_unpublished(TrackKind::Video, Some(sid));
        tracing::info!("screen share {sid} stopped");
        result
    }

    async fn demote_cameras(session: &mut Session) -> Result<(), SessionError> {
        for camera in session.local_video.iter_mut() {
            camera.restore_priority.get_or_insert(camera.priority);
            if camera.priority != TrackPriority::Low {
                session
                    .room
                    .set_track_priority(&camera.publication.sid, TrackPriority::Low)
                    .await?;
                camera.priority = TrackPriority::Low;
            }
        }
        Ok(())
    }

    async fn restore_cameras(session: &mut Session) -> Result<(), SessionError> {
        let mut first = FirstError::default();
        for camera in session.local_video.iter_mut() {
            let Some(priority) = camera.restore_priority.take() else {
                continue;
            };
            if camera.priority == priority {
                continue;
            }
            match session
                .room
                .set_track_priority(&camera.publication.sid, priority)
                .await
            {
                Ok(()) => camera.priority = priority,
                Err(e) => first.record("restoring camera priority", e),
            }
        }
        first.into_result()
    }

    fn connected(inner: &mut Inner) -> Result<&mut Session, SessionError> {
        if inner.state != SessionState::Connected {
            return Err(SessionError::NoActiveSession);
        }
        inner.session.as_mut().ok_or(SessionError::NoActiveSession)
    }

    // ── Room event loop ──────────────────────────────────────────────

    async fn event_loop(
        session_id: Uuid,
        mut events: mpsc::UnboundedReceiver<RoomEvent>,
        inner: Arc<Mutex<Inner>>,
        router: EventRouter,
    ) {
        while let Some(event) = events.recv().await {
            let mut guard = inner.lock().await;
            if !guard.session.as_ref().is_some_and(|s| s.id == session_id) {
                break;
            }

            if let RoomEvent::Disconnected { error } = event {
                let Some(mut session) = guard.session.take() else {
                    break;
                };
                if let Some(task) = session.event_loop.take() {
                    task.detach();
                }
                Self::complete_room(&mut session, error, &router);
                guard.state = SessionState::Idle;
                break;
            }

            if let Some(session) = guard.session.as_mut() {
                Self::apply_room_event(session, event, &router);
            }
        }

        tracing::info!("room event loop ended");
    }

    fn apply_room_event(session: &mut Session, event: RoomEvent, router: &EventRouter) {
        match event {
            RoomEvent::ParticipantConnected(snapshot) => {
                if session.tracker_mut(&snapshot.identity).is_some() {
                    tracing::debug!("participant {} already tracked", snapshot.identity);
                    return;
                }
                tracing::info!("participant joined: {}", snapshot.identity);
                router.notify(SessionEvent::ParticipantConnected(snapshot.info(true)));
                session
                    .remotes
                    .push(ParticipantTracker::attach(snapshot, true, router.clone()));
            }

            RoomEvent::ParticipantDisconnected { identity } => {
                let Some(pos) = session.remotes.iter().position(|t| t.identity() == identity)
                else {
                    tracing::debug!("unknown participant left: {identity}");
                    return;
                };
                let mut tracker = session.remotes.remove(pos);
                tracker.detach();
                if session.dominant_speaker.as_deref() == Some(identity.as_str()) {
                    session.dominant_speaker = None;
                }
                tracing::info!("participant left: {identity}");
                router.notify(SessionEvent::ParticipantDisconnected(tracker.info().clone()));
            }

            RoomEvent::Participant { identity, event } => match session.tracker_mut(&identity) {
                Some(tracker) => tracker.handle(event),
                None => tracing::debug!("track event for unknown participant {identity}"),
            },

            RoomEvent::DominantSpeakerChanged { identity } => {
                let speaker = identity.as_deref().and_then(|id| session.participant(id));
                session.dominant_speaker = speaker.as_ref().map(|p| p.identity.clone());
                router.notify(SessionEvent::DominantSpeakerChanged(speaker));
            }

            RoomEvent::Disconnected { .. } => {}
        }
    }

    /// The room ended underneath us.
    fn complete_room(session: &mut Session, error: Option<TransportError>, router: &EventRouter) {
        session.stop_local_captures();
        session.disconnect_participants(router);
        match error {
            None => {
                tracing::info!("room {} completed", session.info.name);
                router.notify(SessionEvent::RoomCompleted(session.info.clone()));
            }
            Some(e) => {
                tracing::warn!("room {} ended with error: {e}", session.info.name);
                router.notify(SessionEvent::ErrorOccured(e.to_string()));
            }
        }
    }
}
