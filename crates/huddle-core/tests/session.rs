use std::sync::Arc;
use std::time::Duration;

use huddle_core::devices::DeviceKind;
use huddle_core::loopback::{LoopbackMedia, LoopbackTransport, device};
use huddle_core::media::TrackSource;
use huddle_core::transport::{ParticipantSnapshot, TrackSnapshot};
use huddle_core::{
    ConnectOptions, Credentials, ErrorCategory, EventHandlers, EventKind, MediaError,
    MemoryDeviceStore, SessionController, SessionError, SessionEvent, SessionEventListener,
    SessionState, TrackKind, TrackPriority, TransportError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

const ROOM: &str = "standup";

struct ChannelListener(mpsc::UnboundedSender<SessionEvent>);

impl SessionEventListener for ChannelListener {
    fn on_event(&self, event: &SessionEvent) {
        let _ = self.0.send(event.clone());
    }
}

struct Harness {
    controller: SessionController,
    transport: LoopbackTransport,
    media: Arc<LoopbackMedia>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    fn new(transport: LoopbackTransport) -> Self {
        Self::with_media(transport, LoopbackMedia::new())
    }

    fn with_media(transport: LoopbackTransport, media: LoopbackMedia) -> Self {
        let harness = Self::unregistered(transport, media);
        let (tx, rx) = mpsc::unbounded_channel();
        harness
            .controller
            .register_handlers(EventHandlers::new().listener(Arc::new(ChannelListener(tx))));
        Harness {
            events: rx,
            ..harness
        }
    }

    fn unregistered(transport: LoopbackTransport, media: LoopbackMedia) -> Self {
        let media = Arc::new(media);
        let controller = SessionController::new(
            Arc::new(transport.clone()),
            media.clone(),
            Arc::new(MemoryDeviceStore::new()),
        );
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            controller,
            transport,
            media,
            events: rx,
        }
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), SessionError> {
        self.controller
            .connect(&Credentials::new("token"), ROOM, options)
            .await
            .map(|_| ())
    }

    /// Everything emitted so far.
    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Collect events until one matches `pred`, inclusive.
    async fn wait_for(&mut self, pred: impl Fn(&SessionEvent) -> bool) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(2), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("event channel closed");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    fn room(&self) -> Arc<huddle_core::loopback::LoopbackRoom> {
        self.transport.room().expect("no room joined")
    }

    fn live_screens(&self) -> usize {
        self.media
            .live_tracks()
            .iter()
            .filter(|t| t.source() == TrackSource::ScreenShare)
            .count()
    }

    async fn camera_sid(&self) -> String {
        self.controller
            .local_publications()
            .await
            .into_iter()
            .find(|p| p.source == TrackSource::Camera)
            .map(|p| p.sid)
            .expect("no camera published")
    }
}

fn devices() -> ConnectOptions {
    ConnectOptions::default()
        .with_audio_device("mic-1")
        .with_video_device("cam-1")
}

fn kinds(events: &[SessionEvent]) -> Vec<EventKind> {
    events.iter().map(SessionEvent::kind).collect()
}

fn alice() -> ParticipantSnapshot {
    ParticipantSnapshot::new("PA_alice", "alice")
        .with_name("Alice")
        .with_track(TrackSnapshot::new("TR_alice_cam", TrackKind::Video))
}

fn disconnected_identity(event: &SessionEvent) -> Option<&str> {
    match event {
        SessionEvent::ParticipantDisconnected(p) => Some(p.identity.as_str()),
        _ => None,
    }
}

fn is_connected(identity: &'static str) -> impl Fn(&SessionEvent) -> bool {
    move |e| matches!(e, SessionEvent::ParticipantConnected(p) if p.identity == identity)
}

/// Local track notifications as `+sid` / `-kind`, with the source when it
/// is not the kind's default.
fn local_tracks(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ParticipantSubscribedTrack(ev) if ev.participant.identity == "me" => {
                Some(format!("+{}", ev.track.sid.clone().unwrap_or_default()))
            }
            SessionEvent::ParticipantUnsubscribedTrack(ev) if ev.participant.identity == "me" => {
                assert!(ev.track.is_synthetic());
                Some(format!("-{}/{:?}", ev.track.kind, ev.track.source))
            }
            _ => None,
        })
        .collect()
}

// ── connect ──────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_without_handlers_is_rejected() {
    let h = Harness::unregistered(LoopbackTransport::new("me"), LoopbackMedia::new());

    let err = h.connect(devices()).await.unwrap_err();

    assert_eq!(err, SessionError::HandlersNotRegistered);
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(h.controller.state().await, SessionState::Idle);
    assert_eq!(h.transport.connect_count(), 0);
    assert!(h.media.created_tracks().is_empty());
}

#[tokio::test]
async fn connect_validates_credentials_and_room_name() {
    let h = Harness::new(LoopbackTransport::new("me"));

    let err = h
        .controller
        .connect(&Credentials::new("  "), ROOM, devices())
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::MissingCredentials);

    let err = h
        .controller
        .connect(&Credentials::new("token"), "", devices())
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::MissingRoomName);
    assert_eq!(h.controller.state().await, SessionState::Idle);
}

#[tokio::test]
async fn connect_reports_existing_roster_in_order() {
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()));

    h.connect(devices()).await.unwrap();
    let events = h.drain();

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::RoomConnected,
            EventKind::ParticipantConnected,
            EventKind::ParticipantSubscribedTrack,
            EventKind::ParticipantSubscribedTrack,
            EventKind::ParticipantConnected,
            EventKind::ParticipantSubscribedTrack,
            EventKind::ExistingParticipantsReportingComplete,
        ]
    );
    match &events[1] {
        SessionEvent::ParticipantConnected(p) => {
            assert_eq!(p.identity, "me");
            assert!(!p.is_remote);
        }
        other => panic!("unexpected {other:?}"),
    }
    match &events[5] {
        SessionEvent::ParticipantSubscribedTrack(ev) => {
            assert_eq!(ev.participant.identity, "alice");
            assert_eq!(ev.track.sid.as_deref(), Some("TR_alice_cam"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.controller.state().await, SessionState::Connected);
    assert_eq!(h.controller.participants().await.len(), 2);
}

#[tokio::test]
async fn second_connect_is_rejected() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();

    let err = h.connect(devices()).await.unwrap_err();

    assert_eq!(err, SessionError::SessionAlreadyActive);
    assert_eq!(err.category(), ErrorCategory::State);
    assert_eq!(h.controller.state().await, SessionState::Connected);
    assert_eq!(h.transport.connect_count(), 1);
}

#[tokio::test]
async fn missing_devices_fail_before_acquisition() {
    let h = Harness::new(LoopbackTransport::new("me"));

    let err = h.connect(ConnectOptions::default()).await.unwrap_err();
    assert_eq!(err, SessionError::NoAudioDevice);

    let err = h
        .connect(ConnectOptions::default().with_audio_device("mic-1"))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::NoVideoDevice);

    assert!(h.media.created_tracks().is_empty());
    assert_eq!(h.controller.state().await, SessionState::Idle);
}

#[tokio::test]
async fn stored_default_devices_are_used() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.controller.assign_default_audio_input_device_id("mic-1");
    h.controller.assign_default_video_input_device_id("cam-1");

    h.connect(ConnectOptions::default()).await.unwrap();

    assert_eq!(
        h.controller.default_video_input_device_id().as_deref(),
        Some("cam-1")
    );
    let devices: Vec<_> = h
        .media
        .created_tracks()
        .iter()
        .map(|t| t.device_id().map(str::to_string))
        .collect();
    assert_eq!(
        devices,
        vec![Some("mic-1".to_string()), Some("cam-1".to_string())]
    );
}

#[tokio::test]
async fn acquisition_failure_leaves_session_idle() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.media
        .fail_next_track(MediaError::PermissionDenied("camera".into()));

    let err = h.connect(devices()).await.unwrap_err();

    assert!(matches!(err, SessionError::DeviceAcquisition(_)));
    assert_eq!(err.category(), ErrorCategory::Device);
    assert_eq!(h.transport.connect_count(), 0);
    assert_eq!(h.controller.state().await, SessionState::Idle);
}

#[tokio::test]
async fn transport_failure_stops_acquired_tracks() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.transport
        .fail_next_connect(TransportError::Connection("refused".into()));

    let err = h.connect(devices()).await.unwrap_err();

    assert_eq!(
        err,
        SessionError::Transport(TransportError::Connection("refused".into()))
    );
    assert_eq!(h.media.created_tracks().len(), 2);
    assert!(h.media.live_tracks().is_empty());
    assert_eq!(h.controller.state().await, SessionState::Idle);

    // A failed attempt does not block the next one.
    h.connect(devices()).await.unwrap();
    assert_eq!(h.controller.state().await, SessionState::Connected);
}

// ── disconnect ───────────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_reports_local_first_then_remotes() {
    let bob = ParticipantSnapshot::new("PA_bob", "bob");
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()).with_remote(bob));
    h.connect(devices()).await.unwrap();
    h.drain();

    h.controller.disconnect(ROOM).await.unwrap();
    let events = h.drain();

    let unsubscribed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::ParticipantUnsubscribedTrack(ev) => Some(ev),
            _ => None,
        })
        .collect();
    assert_eq!(unsubscribed.len(), 2);
    assert!(unsubscribed.iter().all(|ev| ev.track.is_synthetic()));
    assert!(unsubscribed.iter().all(|ev| ev.participant.identity == "me"));

    let order: Vec<_> = events.iter().filter_map(disconnected_identity).collect();
    assert_eq!(order, vec!["me", "alice", "bob"]);
    assert!(matches!(events.last(), Some(SessionEvent::Debug(_))));

    assert_eq!(h.controller.state().await, SessionState::Idle);
    assert!(h.room().is_disconnected());
    assert!(h.media.live_tracks().is_empty());

    // The room's own disconnect echo must not surface as a completion.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!kinds(&h.drain()).contains(&EventKind::RoomCompleted));
}

#[tokio::test]
async fn disconnect_while_idle_is_a_no_op() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    h.controller.disconnect(ROOM).await.unwrap();
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn disconnect_cleanup_continues_past_failures() {
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()));
    h.connect(devices()).await.unwrap();
    h.drain();
    h.room()
        .fail_next_unpublish(TransportError::Unpublish("gone".into()));

    let err = h.controller.disconnect(ROOM).await.unwrap_err();

    assert_eq!(
        err,
        SessionError::Transport(TransportError::Unpublish("gone".into()))
    );
    let events = h.drain();
    let unsubscribed = events
        .iter()
        .filter(|e| e.kind() == EventKind::ParticipantUnsubscribedTrack)
        .count();
    assert_eq!(unsubscribed, 2);
    let order: Vec<_> = events.iter().filter_map(disconnected_identity).collect();
    assert_eq!(order, vec!["me", "alice"]);
    assert!(matches!(events.last(), Some(SessionEvent::Debug(_))));

    assert_eq!(h.controller.state().await, SessionState::Idle);
    assert!(h.media.live_tracks().is_empty());
    assert!(h.room().is_disconnected());
    // Only the failed unpublish is missing.
    assert_eq!(h.room().unpublished().len(), 1);
}

#[tokio::test]
async fn disconnect_after_turn_on_reports_each_track_once() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    let options = ConnectOptions {
        join_with_video: false,
        ..devices()
    };
    h.connect(options).await.unwrap();
    h.drain();

    h.controller.turn_on_video(None).await.unwrap();
    let sid = h.camera_sid().await;
    h.controller.disconnect(ROOM).await.unwrap();

    assert_eq!(
        local_tracks(&h.drain()),
        vec![
            format!("+{sid}"),
            "-audio/Microphone".to_string(),
            "-video/Camera".to_string(),
        ]
    );
}

#[tokio::test]
async fn reconnect_after_disconnect() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    h.controller.disconnect(ROOM).await.unwrap();

    h.connect(devices()).await.unwrap();

    assert_eq!(h.transport.connect_count(), 2);
    assert_eq!(h.controller.state().await, SessionState::Connected);
}

// ── local media ──────────────────────────────────────────────────────

#[tokio::test]
async fn turn_off_video_without_track_emits_nothing() {
    let mut h = Harness::new(LoopbackTransport::new("me"));

    let err = h.controller.turn_off_video().await.unwrap_err();
    assert_eq!(err, SessionError::NoLocalTrack(TrackKind::Video));

    let options = ConnectOptions {
        join_with_video: false,
        ..devices()
    };
    h.connect(options).await.unwrap();
    h.drain();

    let err = h.controller.turn_off_video().await.unwrap_err();
    assert_eq!(err, SessionError::NoLocalTrack(TrackKind::Video));
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn turn_on_requires_connected_session() {
    let h = Harness::new(LoopbackTransport::new("me"));
    let err = h.controller.turn_on_video(None).await.unwrap_err();
    assert_eq!(err, SessionError::NoActiveSession);
}

#[tokio::test]
async fn turn_video_on_and_off() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    let options = ConnectOptions {
        join_with_video: false,
        ..devices()
    };
    h.connect(options).await.unwrap();
    h.drain();

    h.controller.turn_on_video(None).await.unwrap();
    let events = h.drain();
    assert_eq!(events.len(), 1);
    let sid = h.camera_sid().await;
    match &events[0] {
        SessionEvent::ParticipantSubscribedTrack(ev) => {
            assert_eq!(ev.participant.identity, "me");
            assert_eq!(ev.track.sid.as_deref(), Some(sid.as_str()));
            assert!(!ev.track.is_synthetic());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.room().priority_of(&sid), Some(TrackPriority::Standard));

    h.controller.turn_off_video().await.unwrap();
    let events = h.drain();
    assert_eq!(events.len(), 1);
    match &events[0] {
        SessionEvent::ParticipantUnsubscribedTrack(ev) => {
            assert!(ev.track.is_synthetic());
            assert_eq!(ev.track.kind, TrackKind::Video);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(h.room().unpublished(), vec![sid]);
    assert!(
        h.media
            .live_tracks()
            .iter()
            .all(|t| t.kind() == TrackKind::Audio)
    );
}

#[tokio::test]
async fn back_to_back_toggle_keeps_order() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    let options = ConnectOptions {
        join_with_video: false,
        ..devices()
    };
    h.connect(options).await.unwrap();
    h.drain();

    h.controller.turn_on_video(None).await.unwrap();
    let sid = h.camera_sid().await;
    h.controller.turn_off_video().await.unwrap();
    h.controller.turn_on_video(None).await.unwrap();
    let second = h.camera_sid().await;
    h.controller.turn_off_video().await.unwrap();

    let expected = vec![
        format!("+{sid}"),
        "-video/Camera".to_string(),
        format!("+{second}"),
        "-video/Camera".to_string(),
    ];
    assert_eq!(local_tracks(&h.drain()), expected);

    // Nothing trails in from the room afterwards.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(local_tracks(&h.drain()).is_empty());
}

#[tokio::test]
async fn explicit_device_overrides_session_device() {
    let media = LoopbackMedia::with_devices(vec![
        device("mic-1", "Mic", DeviceKind::AudioInput),
        device("cam-1", "Front", DeviceKind::VideoInput),
        device("cam-2", "Back", DeviceKind::VideoInput),
    ]);
    let h = Harness::with_media(LoopbackTransport::new("me"), media);
    let options = ConnectOptions {
        join_with_video: false,
        ..devices()
    };
    h.connect(options).await.unwrap();

    h.controller.turn_on_video(Some("cam-2")).await.unwrap();

    let last = h.media.created_tracks().pop().unwrap();
    assert_eq!(last.device_id(), Some("cam-2"));
}

#[tokio::test]
async fn unpublish_failure_still_stops_track() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    h.drain();
    h.room()
        .fail_next_unpublish(TransportError::Unpublish("gone".into()));

    let err = h.controller.turn_off_video().await.unwrap_err();

    assert!(matches!(err, SessionError::Transport(TransportError::Unpublish(_))));
    assert_eq!(kinds(&h.drain()), vec![EventKind::ParticipantUnsubscribedTrack]);
    assert!(
        h.media
            .live_tracks()
            .iter()
            .all(|t| t.kind() == TrackKind::Audio)
    );
}

#[tokio::test]
async fn device_enumeration() {
    let h = Harness::new(LoopbackTransport::new("me"));
    let cams = h.controller.video_input_devices().await.unwrap();
    assert_eq!(cams.len(), 1);
    assert_eq!(cams[0].device_id, "cam-1");

    h.media.deny_enumeration();
    assert!(h.controller.audio_input_devices().await.is_none());
    assert!(h.controller.audio_output_devices().await.is_none());
}

// ── screen share ─────────────────────────────────────────────────────

#[tokio::test]
async fn screen_share_demotes_camera_until_stopped() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    let cam = h.camera_sid().await;

    h.controller.start_screen_share(None, None).await.unwrap();
    assert_eq!(h.room().priority_of(&cam), Some(TrackPriority::Low));
    let screen = h
        .media
        .live_tracks()
        .into_iter()
        .find(|t| t.source() == TrackSource::ScreenShare)
        .unwrap();
    let dims = screen.dimensions().unwrap();
    assert_eq!((dims.width, dims.height), (1280, 720));

    // Starting again replaces the share; the camera stays demoted.
    h.controller
        .start_screen_share(Some(1080), Some(1920))
        .await
        .unwrap();
    assert_eq!(h.live_screens(), 1);
    assert_eq!(h.room().priority_of(&cam), Some(TrackPriority::Low));
    let screen_pub = h
        .controller
        .local_publications()
        .await
        .into_iter()
        .find(|p| p.source == TrackSource::ScreenShare)
        .unwrap();
    assert_eq!(screen_pub.priority, TrackPriority::High);

    h.controller.stop_screen_share().await.unwrap();
    assert_eq!(h.room().priority_of(&cam), Some(TrackPriority::Standard));
    assert_eq!(h.live_screens(), 0);
    assert!(!h.controller.has_screen_share().await);

    // Nothing to stop is fine.
    h.controller.stop_screen_share().await.unwrap();
}

#[tokio::test]
async fn screen_share_is_reported_like_a_local_track() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    h.drain();

    h.controller.start_screen_share(None, None).await.unwrap();
    let screen = h
        .controller
        .local_publications()
        .await
        .into_iter()
        .find(|p| p.source == TrackSource::ScreenShare)
        .map(|p| p.sid)
        .unwrap();
    // Replacing the share reports the old one gone before the new one.
    h.controller.start_screen_share(None, None).await.unwrap();
    let replacement = h
        .controller
        .local_publications()
        .await
        .into_iter()
        .find(|p| p.source == TrackSource::ScreenShare)
        .map(|p| p.sid)
        .unwrap();
    h.controller.stop_screen_share().await.unwrap();

    let events = h.drain();
    assert_eq!(
        local_tracks(&events),
        vec![
            format!("+{screen}"),
            "-video/ScreenShare".to_string(),
            format!("+{replacement}"),
            "-video/ScreenShare".to_string(),
        ]
    );
    match &events[0] {
        SessionEvent::ParticipantSubscribedTrack(ev) => {
            assert_eq!(ev.track.source, TrackSource::ScreenShare);
        }
        other => panic!("unexpected {other:?}"),
    }

    // The share is gone from the roster too: disconnect only reports the
    // microphone and camera.
    h.controller.disconnect(ROOM).await.unwrap();
    assert_eq!(
        local_tracks(&h.drain()),
        vec!["-audio/Microphone".to_string(), "-video/Camera".to_string()]
    );
}

#[tokio::test]
async fn disconnect_releases_active_screen_share() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    h.controller.start_screen_share(None, None).await.unwrap();
    h.drain();

    h.controller.disconnect(ROOM).await.unwrap();

    assert_eq!(
        local_tracks(&h.drain()),
        vec![
            "-audio/Microphone".to_string(),
            "-video/Camera".to_string(),
            "-video/ScreenShare".to_string(),
        ]
    );
    assert_eq!(h.live_screens(), 0);
}

#[tokio::test]
async fn camera_published_during_share_is_restored() {
    let h = Harness::new(LoopbackTransport::new("me"));
    let options = ConnectOptions {
        join_with_video: false,
        ..devices()
    };
    h.connect(options).await.unwrap();
    h.controller.start_screen_share(None, None).await.unwrap();

    h.controller.turn_on_video(None).await.unwrap();
    let cam = h.camera_sid().await;
    assert_eq!(h.room().priority_of(&cam), Some(TrackPriority::Low));

    h.controller.stop_screen_share().await.unwrap();
    assert_eq!(h.room().priority_of(&cam), Some(TrackPriority::Standard));
}

#[tokio::test]
async fn screen_share_unsupported() {
    let h = Harness::with_media(
        LoopbackTransport::new("me"),
        LoopbackMedia::new().without_screen_capture(),
    );
    h.connect(devices()).await.unwrap();

    let err = h.controller.start_screen_share(None, None).await.unwrap_err();

    assert!(matches!(err, SessionError::ScreenShareUnsupported(_)));
    assert_eq!(err.category(), ErrorCategory::Unsupported);
}

#[tokio::test]
async fn failed_screen_publish_restores_camera() {
    let h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    let cam = h.camera_sid().await;
    h.room()
        .fail_next_publish(TransportError::Publish("quota".into()));

    let err = h.controller.start_screen_share(None, None).await.unwrap_err();

    assert!(matches!(err, SessionError::Transport(TransportError::Publish(_))));
    assert_eq!(h.room().priority_of(&cam), Some(TrackPriority::Standard));
    assert_eq!(h.live_screens(), 0);
    assert!(!h.controller.has_screen_share().await);
}

#[tokio::test]
async fn start_screen_share_requires_session() {
    let h = Harness::new(LoopbackTransport::new("me"));
    let err = h.controller.start_screen_share(None, None).await.unwrap_err();
    assert_eq!(err, SessionError::NoActiveSession);
}

// ── remote activity ──────────────────────────────────────────────────

#[tokio::test]
async fn remote_track_events_map_one_to_one() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    h.drain();

    let room = h.room();
    room.join(ParticipantSnapshot::new("PA_alice", "alice"));
    h.wait_for(is_connected("alice")).await;

    let track = TrackSnapshot::new("TR_a", TrackKind::Audio);
    room.subscribe("alice", track.clone());
    room.unsubscribe("alice", track);
    let events = h
        .wait_for(|e| matches!(e, SessionEvent::ParticipantUnsubscribedTrack(_)))
        .await;

    assert_eq!(
        kinds(&events),
        vec![
            EventKind::ParticipantSubscribedTrack,
            EventKind::ParticipantUnsubscribedTrack,
        ]
    );
}

#[tokio::test]
async fn remote_mute_toggles_subscription_notifications() {
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()));
    h.connect(devices()).await.unwrap();
    h.drain();

    let room = h.room();
    room.disable("alice", "TR_alice_cam");
    room.enable("alice", "TR_alice_cam");
    let events = h
        .wait_for(|e| matches!(e, SessionEvent::ParticipantSubscribedTrack(_)))
        .await;

    match &events[..] {
        [
            SessionEvent::ParticipantUnsubscribedTrack(off),
            SessionEvent::ParticipantSubscribedTrack(on),
        ] => {
            assert!(!off.track.enabled);
            assert!(on.track.enabled);
            assert_eq!(on.track.sid.as_deref(), Some("TR_alice_cam"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn dominant_speaker_follows_room() {
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()));
    h.connect(devices()).await.unwrap();
    h.drain();

    let room = h.room();
    room.set_dominant_speaker(Some("alice"));
    let events = h
        .wait_for(|e| e.kind() == EventKind::DominantSpeakerChanged)
        .await;
    match events.last() {
        Some(SessionEvent::DominantSpeakerChanged(Some(p))) => assert_eq!(p.identity, "alice"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        h.controller.dominant_speaker().await.map(|p| p.identity),
        Some("alice".to_string())
    );

    room.leave("alice");
    h.wait_for(|e| disconnected_identity(e) == Some("alice")).await;
    assert!(h.controller.dominant_speaker().await.is_none());
    assert_eq!(h.controller.participants().await.len(), 1);
}

#[tokio::test]
async fn duplicate_join_is_ignored() {
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()));
    h.connect(devices()).await.unwrap();
    h.drain();

    let room = h.room();
    room.join(alice());
    room.set_dominant_speaker(None);
    let events = h
        .wait_for(|e| e.kind() == EventKind::DominantSpeakerChanged)
        .await;

    assert_eq!(kinds(&events), vec![EventKind::DominantSpeakerChanged]);
    assert_eq!(h.controller.participants().await.len(), 2);
}

#[tokio::test]
async fn remote_end_completes_room() {
    let mut h = Harness::new(LoopbackTransport::new("me").with_remote(alice()));
    h.connect(devices()).await.unwrap();
    h.drain();

    h.room().drop_connection(None);
    let events = h
        .wait_for(|e| e.kind() == EventKind::RoomCompleted)
        .await;

    let order: Vec<_> = events.iter().filter_map(disconnected_identity).collect();
    assert_eq!(order, vec!["me", "alice"]);
    assert_eq!(h.controller.state().await, SessionState::Idle);
    assert!(h.media.live_tracks().is_empty());

    // The session is free again.
    h.connect(devices()).await.unwrap();
}

#[tokio::test]
async fn remote_error_is_reported() {
    let mut h = Harness::new(LoopbackTransport::new("me"));
    h.connect(devices()).await.unwrap();
    h.drain();

    h.room()
        .drop_connection(Some(TransportError::Room("signal lost".into())));
    let events = h
        .wait_for(|e| e.kind() == EventKind::ErrorOccured)
        .await;

    match events.last() {
        Some(SessionEvent::ErrorOccured(msg)) => assert!(msg.contains("signal lost")),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!kinds(&events).contains(&EventKind::RoomCompleted));
    assert_eq!(h.controller.state().await, SessionState::Idle);
}

#[tokio::test]
async fn per_kind_handlers_only_receive_their_kind() {
    let h = Harness::unregistered(LoopbackTransport::new("me"), LoopbackMedia::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.controller.register_handlers(EventHandlers::new().on(
        EventKind::RoomConnected,
        move |event| {
            let _ = tx.send(event.clone());
        },
    ));

    h.connect(devices()).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = rx.try_recv() {
        received.push(event);
    }
    assert_eq!(kinds(&received), vec![EventKind::RoomConnected]);
}
