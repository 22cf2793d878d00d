//! [`Transport`] backed by a LiveKit server.
//!
//! Local tracks are published from native sources; the host feeds captured
//! frames into the sources returned by [`LiveKitRoom::audio_source`] and
//! [`LiveKitRoom::video_source`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use livekit::id::TrackSid;
use livekit::options::TrackPublishOptions;
use livekit::participant::Participant;
use livekit::prelude::{
    DisconnectReason, LocalAudioTrack, LocalTrack as LkLocalTrack, LocalVideoTrack,
    RemoteParticipant, Room, RoomEvent as LkRoomEvent, RoomOptions,
};
use livekit::track::{TrackKind as LkTrackKind, TrackSource as LkTrackSource};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::{AudioSourceOptions, RtcAudioSource, RtcVideoSource, VideoResolution};
use livekit::webrtc::video_source::native::NativeVideoSource;
use tokio::sync::mpsc;

use crate::config::{Credentials, TransportOptions};
use crate::errors::TransportError;
use crate::media::{LocalTrack, TrackKind, TrackPriority, TrackSource};
use crate::transport::{
    Connection, LocalPublication, ParticipantEvent, ParticipantSnapshot, Publication, RoomEvent,
    RoomHandle, TrackSnapshot, Transport,
};

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn kind_from_lk(kind: LkTrackKind) -> TrackKind {
    match kind {
        LkTrackKind::Audio => TrackKind::Audio,
        LkTrackKind::Video => TrackKind::Video,
    }
}

fn source_from_lk(source: LkTrackSource) -> TrackSource {
    match source {
        LkTrackSource::Microphone => TrackSource::Microphone,
        LkTrackSource::Camera => TrackSource::Camera,
        LkTrackSource::Screenshare => TrackSource::ScreenShare,
        _ => TrackSource::Unknown,
    }
}

fn source_to_lk(source: TrackSource) -> LkTrackSource {
    match source {
        TrackSource::Microphone => LkTrackSource::Microphone,
        TrackSource::Camera => LkTrackSource::Camera,
        TrackSource::ScreenShare => LkTrackSource::Screenshare,
        TrackSource::Unknown => LkTrackSource::Unknown,
    }
}

fn remote_snapshot(p: &RemoteParticipant) -> ParticipantSnapshot {
    let name = p.name().to_string();
    let tracks = p
        .track_publications()
        .values()
        .filter(|pub_| pub_.track().is_some())
        .map(|pub_| TrackSnapshot {
            sid: pub_.sid().to_string(),
            name: pub_.name().to_string(),
            kind: kind_from_lk(pub_.kind()),
            source: source_from_lk(pub_.source()),
            enabled: !pub_.is_muted(),
        })
        .collect();
    ParticipantSnapshot {
        sid: p.sid().to_string(),
        identity: p.identity().to_string(),
        name: if name.is_empty() { None } else { Some(name) },
        tracks,
    }
}

/// Connects to LiveKit using `Credentials::server_url` and the access token.
#[derive(Default)]
pub struct LiveKitTransport;

impl LiveKitTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LiveKitTransport {
    async fn connect(
        &self,
        credentials: &Credentials,
        options: &TransportOptions,
        tracks: Vec<LocalTrack>,
    ) -> Result<Connection, TransportError> {
        let url = credentials
            .server_url
            .as_deref()
            .ok_or_else(|| TransportError::Connection("LiveKit server url is required".into()))?;

        let mut room_options = RoomOptions::default();
        room_options.auto_subscribe = true;

        let (room, mut lk_events) = Room::connect(url, &credentials.token, room_options)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let sid = room.sid().await.to_string();
        let room = Arc::new(LiveKitRoom {
            sid,
            name: options.room_name.clone(),
            room,
            sources: Mutex::new(HashMap::new()),
            priorities: Mutex::new(HashMap::new()),
        });

        let mut local_publications = Vec::new();
        for track in &tracks {
            local_publications.push(room.publish_track(track, TrackPriority::Standard).await?);
        }

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = lk_events.recv().await {
                let Some(event) = translate(event) else {
                    continue;
                };
                let done = matches!(event, RoomEvent::Disconnected { .. });
                if tx.send(event).is_err() || done {
                    break;
                }
            }
            tracing::info!("livekit event forwarder ended");
        });

        Ok(Connection {
            room,
            events: rx,
            local_publications,
        })
    }
}

fn translate(event: LkRoomEvent) -> Option<RoomEvent> {
    let track_event =
        |identity: String, event: ParticipantEvent| RoomEvent::Participant { identity, event };

    match event {
        LkRoomEvent::ParticipantConnected(participant) => {
            Some(RoomEvent::ParticipantConnected(remote_snapshot(&participant)))
        }
        LkRoomEvent::ParticipantDisconnected(participant) => {
            Some(RoomEvent::ParticipantDisconnected {
                identity: participant.identity().to_string(),
            })
        }
        LkRoomEvent::TrackSubscribed { publication, participant, .. } => {
            let track = TrackSnapshot {
                sid: publication.sid().to_string(),
                name: publication.name().to_string(),
                kind: kind_from_lk(publication.kind()),
                source: source_from_lk(publication.source()),
                enabled: !publication.is_muted(),
            };
            Some(track_event(
                participant.identity().to_string(),
                ParticipantEvent::TrackSubscribed(track),
            ))
        }
        LkRoomEvent::TrackUnsubscribed { publication, participant, .. } => {
            let track = TrackSnapshot {
                sid: publication.sid().to_string(),
                name: publication.name().to_string(),
                kind: kind_from_lk(publication.kind()),
                source: source_from_lk(publication.source()),
                enabled: false,
            };
            Some(track_event(
                participant.identity().to_string(),
                ParticipantEvent::TrackUnsubscribed(track),
            ))
        }
        LkRoomEvent::TrackPublished { publication, participant } => Some(track_event(
            participant.identity().to_string(),
            ParticipantEvent::TrackPublished(Publication {
                sid: publication.sid().to_string(),
                kind: kind_from_lk(publication.kind()),
                source: source_from_lk(publication.source()),
                track: None,
            }),
        )),
        LkRoomEvent::TrackUnpublished { publication, participant } => Some(track_event(
            participant.identity().to_string(),
            ParticipantEvent::TrackUnpublished(Publication {
                sid: publication.sid().to_string(),
                kind: kind_from_lk(publication.kind()),
                source: source_from_lk(publication.source()),
                track: None,
            }),
        )),
        LkRoomEvent::TrackMuted { participant, publication } => match participant {
            Participant::Remote(remote) => Some(track_event(
                remote.identity().to_string(),
                ParticipantEvent::TrackDisabled {
                    track_sid: publication.sid().to_string(),
                },
            )),
            Participant::Local(_) => None,
        },
        LkRoomEvent::TrackUnmuted { participant, publication } => match participant {
            Participant::Remote(remote) => Some(track_event(
                remote.identity().to_string(),
                ParticipantEvent::TrackEnabled {
                    track_sid: publication.sid().to_string(),
                },
            )),
            Participant::Local(_) => None,
        },
        // The session reports its own publishes and unpublishes in call order.
        LkRoomEvent::LocalTrackPublished { .. } | LkRoomEvent::LocalTrackUnpublished { .. } => None,
        LkRoomEvent::ActiveSpeakersChanged { speakers } => Some(RoomEvent::DominantSpeakerChanged {
            identity: speakers.first().map(|p| p.identity().to_string()),
        }),
        LkRoomEvent::Disconnected { reason } => {
            tracing::info!("livekit room disconnected: {reason:?}");
            let error = match reason {
                DisconnectReason::ClientInitiated => None,
                other => Some(TransportError::Room(format!("{other:?}"))),
            };
            Some(RoomEvent::Disconnected { error })
        }
        other => {
            tracing::debug!("unhandled livekit event: {other:?}");
            None
        }
    }
}

/// Native source feeding a published track.
#[derive(Clone)]
pub enum NativeSource {
    Audio(NativeAudioSource),
    Video(NativeVideoSource),
}

pub struct LiveKitRoom {
    sid: String,
    name: String,
    room: Room,
    sources: Mutex<HashMap<String, NativeSource>>,
    /// LiveKit has no publisher-side track priority; kept for bookkeeping.
    priorities: Mutex<HashMap<String, TrackPriority>>,
}

impl LiveKitRoom {
    pub fn audio_source(&self, sid: &str) -> Option<NativeAudioSource> {
        match lock(&self.sources).get(sid) {
            Some(NativeSource::Audio(source)) => Some(source.clone()),
            _ => None,
        }
    }

    pub fn video_source(&self, sid: &str) -> Option<NativeVideoSource> {
        match lock(&self.sources).get(sid) {
            Some(NativeSource::Video(source)) => Some(source.clone()),
            _ => None,
        }
    }

    fn native_track(track: &LocalTrack) -> (LkLocalTrack, NativeSource) {
        match track.kind() {
            TrackKind::Audio => {
                let source = NativeAudioSource::new(
                    AudioSourceOptions {
                        echo_cancellation: true,
                        noise_suppression: true,
                        auto_gain_control: true,
                    },
                    AUDIO_SAMPLE_RATE,
                    AUDIO_CHANNELS,
                    AUDIO_QUEUE_SIZE_MS,
                );
                let lk_track = LocalAudioTrack::create_audio_track(
                    track.name(),
                    RtcAudioSource::Native(source.clone()),
                );
                (LkLocalTrack::Audio(lk_track), NativeSource::Audio(source))
            }
            TrackKind::Video => {
                let dims = track.dimensions().unwrap_or(crate::media::VideoDimensions {
                    width: 1280,
                    height: 720,
                });
                let source = NativeVideoSource::new(
                    VideoResolution {
                        width: dims.width,
                        height: dims.height,
                    },
                    track.source() == TrackSource::ScreenShare,
                );
                let lk_track = LocalVideoTrack::create_video_track(
                    track.name(),
                    RtcVideoSource::Native(source.clone()),
                );
                (LkLocalTrack::Video(lk_track), NativeSource::Video(source))
            }
        }
    }
}

#[async_trait]
impl RoomHandle for LiveKitRoom {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sid(&self) -> String {
        self.sid.clone()
    }

    fn local_participant(&self) -> ParticipantSnapshot {
        let local = self.room.local_participant();
        let name = local.name().to_string();
        let tracks = local
            .track_publications()
            .values()
            .map(|pub_| TrackSnapshot {
                sid: pub_.sid().to_string(),
                name: pub_.name().to_string(),
                kind: kind_from_lk(pub_.kind()),
                source: source_from_lk(pub_.source()),
                enabled: !pub_.is_muted(),
            })
            .collect();
        ParticipantSnapshot {
            sid: local.sid().to_string(),
            identity: local.identity().to_string(),
            name: if name.is_empty() { None } else { Some(name) },
            tracks,
        }
    }

    fn remote_participants(&self) -> Vec<ParticipantSnapshot> {
        self.room
            .remote_participants()
            .values()
            .map(remote_snapshot)
            .collect()
    }

    async fn publish_track(
        &self,
        track: &LocalTrack,
        priority: TrackPriority,
    ) -> Result<LocalPublication, TransportError> {
        let (lk_track, source) = Self::native_track(track);
        let publication = self
            .room
            .local_participant()
            .publish_track(
                lk_track,
                TrackPublishOptions {
                    source: source_to_lk(track.source()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        let sid = publication.sid().to_string();
        lock(&self.sources).insert(sid.clone(), source);
        lock(&self.priorities).insert(sid.clone(), priority);
        tracing::info!("livekit {} track {sid} published", track.kind());

        Ok(LocalPublication {
            sid,
            name: track.name().to_string(),
            kind: track.kind(),
            source: track.source(),
            priority,
        })
    }

    async fn unpublish_track(&self, sid: &str) -> Result<(), TransportError> {
        let track_sid = TrackSid::try_from(sid.to_string())
            .map_err(|e| TransportError::Unpublish(format!("invalid track sid {sid}: {e:?}")))?;
        self.room
            .local_participant()
            .unpublish_track(&track_sid)
            .await
            .map_err(|e| TransportError::Unpublish(e.to_string()))?;
        lock(&self.sources).remove(sid);
        lock(&self.priorities).remove(sid);
        Ok(())
    }

    async fn set_track_priority(
        &self,
        sid: &str,
        priority: TrackPriority,
    ) -> Result<(), TransportError> {
        tracing::debug!("track {sid} priority {priority:?} (not enforced by LiveKit)");
        lock(&self.priorities).insert(sid.to_string(), priority);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.room
            .close()
            .await
            .map_err(|e| TransportError::Room(e.to_string()))
    }
}
