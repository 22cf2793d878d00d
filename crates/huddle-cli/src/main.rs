//! `huddle`: manage device preferences and run scripted sessions.
//!
//! ```bash
//! huddle devices set video-input cam-1
//! huddle simulate --remotes 2 --share
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use huddle_core::loopback::{LoopbackMedia, LoopbackTransport};
use huddle_core::media::TrackSource;
use huddle_core::transport::{ParticipantSnapshot, TrackSnapshot};
use huddle_core::{
    ConnectOptions, Credentials, DeviceKind, DeviceStore, EventHandlers, FileDeviceStore,
    SessionController, SessionEvent, TrackKind,
};

#[derive(Parser)]
#[command(name = "huddle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding devices.json. Defaults to the platform data dir.
    #[arg(long, global = true, env = "HUDDLE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or change stored device preferences
    Devices {
        #[command(subcommand)]
        command: DevicesCommand,
    },

    /// Run a scripted session against the in-process loopback room
    Simulate(SimulateArgs),

    /// Print the live microphone level
    #[cfg(feature = "cpal")]
    Meter {
        /// Microphone name; the system default when omitted
        #[arg(long)]
        device: Option<String>,
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// Show stored preferences (and system audio devices when built with cpal)
    List {
        #[arg(long)]
        json: bool,
    },
    Set { kind: Kind, device_id: String },
    /// Clear one preference, or all of them
    Clear { kind: Option<Kind> },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

impl From<Kind> for DeviceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::AudioInput => DeviceKind::AudioInput,
            Kind::AudioOutput => DeviceKind::AudioOutput,
            Kind::VideoInput => DeviceKind::VideoInput,
        }
    }
}

#[derive(clap::Args)]
struct SimulateArgs {
    #[arg(long, default_value = "standup")]
    room: String,
    /// Participants already in the room
    #[arg(long, default_value_t = 1)]
    remotes: usize,
    /// Share the screen halfway through
    #[arg(long)]
    share: bool,
    /// Microphone id; falls back to the stored preference
    #[arg(long)]
    audio_device: Option<String>,
    /// Camera id; falls back to the stored preference
    #[arg(long)]
    video_device: Option<String>,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_core=info,huddle_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.data_dir {
        Some(dir) => Ok(dir.clone()),
        None => dirs::data_dir()
            .map(|d| d.join("huddle"))
            .context("no platform data directory; pass --data-dir"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let store = Arc::new(FileDeviceStore::new(data_dir(&cli)?));
    tracing::debug!("device preferences at {}", store.path().display());

    match cli.command {
        Commands::Devices { command } => devices(command, &store),
        Commands::Simulate(args) => simulate(args, store).await,
        #[cfg(feature = "cpal")]
        Commands::Meter { device, seconds } => meter(device.as_deref(), seconds).await,
    }
}

fn devices(command: DevicesCommand, store: &FileDeviceStore) -> Result<()> {
    match command {
        DevicesCommand::List { json } => {
            let prefs = store.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            } else {
                for kind in DeviceKind::ALL {
                    println!("{:<13} {}", kind.key(), prefs.get(kind).unwrap_or("-"));
                }
            }
            #[cfg(feature = "cpal")]
            print_system_devices();
        }
        DevicesCommand::Set { kind, device_id } => {
            store.set(kind.into(), &device_id);
            println!("{} = {device_id}", DeviceKind::from(kind).key());
        }
        DevicesCommand::Clear { kind: Some(kind) } => store.clear(kind.into()),
        DevicesCommand::Clear { kind: None } => store.clear_all(),
    }
    Ok(())
}

#[cfg(feature = "cpal")]
fn print_system_devices() {
    use huddle_core::cpal_devices;

    for (title, devices) in [
        ("inputs", cpal_devices::audio_input_devices()),
        ("outputs", cpal_devices::audio_output_devices()),
    ] {
        println!("\nsystem audio {title}:");
        match devices {
            Some(list) => list.iter().for_each(|d| println!("  {}", d.label)),
            None => println!("  (unavailable)"),
        }
    }
}

#[cfg(feature = "cpal")]
async fn meter(device: Option<&str>, seconds: u64) -> Result<()> {
    use huddle_core::cpal_devices::MicrophoneLevelMonitor;
    use huddle_core::metering::MAX_LEVEL;

    let monitor = MicrophoneLevelMonitor::start(device)?;
    let mut readings = monitor.subscribe();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    while tokio::time::timeout_at(deadline, readings.changed()).await.is_ok() {
        let reading = *readings.borrow_and_update();
        let filled = reading.level.round() as usize;
        let empty = MAX_LEVEL as usize - filled.min(MAX_LEVEL as usize);
        println!(
            "[{}{}] {:6.1} dBFS",
            "#".repeat(filled),
            " ".repeat(empty),
            reading.rms_dbfs
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

fn describe(event: &SessionEvent) -> String {
    let who = |p: &huddle_core::ParticipantInfo| {
        p.name.clone().unwrap_or_else(|| p.identity.clone())
    };
    match event {
        SessionEvent::RoomConnected(room) => format!("connected to {} ({})", room.name, room.sid),
        SessionEvent::RoomCompleted(room) => format!("room {} completed", room.name),
        SessionEvent::ParticipantConnected(p) => format!("+ {}", who(p)),
        SessionEvent::ParticipantDisconnected(p) => format!("- {}", who(p)),
        SessionEvent::ParticipantSubscribedTrack(ev) => format!(
            "  {} {} on",
            who(&ev.participant),
            ev.track.kind
        ),
        SessionEvent::ParticipantUnsubscribedTrack(ev) => format!(
            "  {} {} off",
            who(&ev.participant),
            ev.track.kind
        ),
        SessionEvent::DominantSpeakerChanged(Some(p)) => format!("speaking: {}", who(p)),
        SessionEvent::DominantSpeakerChanged(None) => "speaking: nobody".to_string(),
        SessionEvent::ExistingParticipantsReportingComplete => "roster complete".to_string(),
        SessionEvent::ErrorOccured(msg) => format!("error: {msg}"),
        SessionEvent::Debug(msg) => format!("debug: {msg}"),
    }
}

async fn pause() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn simulate(args: SimulateArgs, store: Arc<FileDeviceStore>) -> Result<()> {
    let mut transport = LoopbackTransport::new("you");
    for i in 1..=args.remotes {
        let identity = format!("guest-{i}");
        transport = transport.with_remote(
            ParticipantSnapshot::new(format!("PA_{identity}"), identity.clone())
                .with_name(format!("Guest {i}"))
                .with_track(TrackSnapshot::new(format!("TR_{identity}_mic"), TrackKind::Audio)),
        );
    }

    let controller = SessionController::new(
        Arc::new(transport.clone()),
        Arc::new(LoopbackMedia::new()),
        store,
    );
    controller.register_handlers(EventHandlers::new().listener(Arc::new(
        |event: &SessionEvent| println!("{}", describe(event)),
    )));

    let mut options = ConnectOptions::default();
    options.audio_device_id = args.audio_device;
    options.video_device_id = args.video_device;
    controller
        .connect(&Credentials::new("loopback"), &args.room, options)
        .await
        .context("connect failed (loopback devices are mic-1 and cam-1)")?;

    let room = transport.room().context("loopback room missing")?;
    room.join(ParticipantSnapshot::new("PA_late", "late").with_name("Latecomer"));
    pause().await;
    room.subscribe(
        "late",
        TrackSnapshot::new("TR_late_cam", TrackKind::Video).with_source(TrackSource::Camera),
    );
    room.set_dominant_speaker(Some("late"));
    pause().await;

    if args.share {
        controller.start_screen_share(None, None).await?;
        pause().await;
        controller.stop_screen_share().await?;
    }

    controller.turn_off_video().await?;
    room.leave("late");
    pause().await;

    controller.disconnect(&args.room).await?;
    Ok(())
}
