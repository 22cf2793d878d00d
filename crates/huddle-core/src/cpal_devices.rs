//! Desktop audio devices through cpal.
//!
//! cpal exposes no stable device identifiers, so the device name doubles
//! as the id stored in preferences.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::watch;

use crate::devices::DeviceKind;
use crate::errors::MediaError;
use crate::media::DeviceDescriptor;
use crate::metering::{LevelMeter, MeterReading};

// cpal::Stream is !Send + !Sync due to platform internals. The monitor only
// keeps it alive so the OS callback keeps firing; it is never used across
// threads.
struct SendSyncStream(cpal::Stream);
unsafe impl Send for SendSyncStream {}
unsafe impl Sync for SendSyncStream {}

fn describe(
    devices: impl Iterator<Item = cpal::Device>,
    kind: DeviceKind,
) -> Vec<DeviceDescriptor> {
    devices
        .filter_map(|d| d.name().ok())
        .map(|name| DeviceDescriptor {
            device_id: name.clone(),
            label: name,
            kind,
            group_id: None,
        })
        .collect()
}

/// Microphones on the default host. `None` when the host refuses to list them.
pub fn audio_input_devices() -> Option<Vec<DeviceDescriptor>> {
    match cpal::default_host().input_devices() {
        Ok(devices) => Some(describe(devices, DeviceKind::AudioInput)),
        Err(e) => {
            tracing::warn!("audio input enumeration failed: {e}");
            None
        }
    }
}

pub fn audio_output_devices() -> Option<Vec<DeviceDescriptor>> {
    match cpal::default_host().output_devices() {
        Ok(devices) => Some(describe(devices, DeviceKind::AudioOutput)),
        Err(e) => {
            tracing::warn!("audio output enumeration failed: {e}");
            None
        }
    }
}

fn find_input(device_id: Option<&str>) -> Result<cpal::Device, MediaError> {
    let host = cpal::default_host();
    match device_id {
        None => host
            .default_input_device()
            .ok_or_else(|| MediaError::DeviceNotFound("no default input device".into())),
        Some(id) => host
            .input_devices()
            .map_err(|e| MediaError::Capture(format!("input devices: {e}")))?
            .find(|d| d.name().is_ok_and(|n| n == id))
            .ok_or_else(|| MediaError::DeviceNotFound(id.to_string())),
    }
}

/// Live input level of a microphone, published on a watch channel.
///
/// Capture stops when the monitor is dropped.
pub struct MicrophoneLevelMonitor {
    _stream: SendSyncStream,
    running: Arc<AtomicBool>,
    readings: watch::Receiver<MeterReading>,
}

impl MicrophoneLevelMonitor {
    /// Open `device_id` (or the default microphone) and start metering.
    pub fn start(device_id: Option<&str>) -> Result<Self, MediaError> {
        let device = find_input(device_id)?;
        let default_cfg = device
            .default_input_config()
            .map_err(|e| MediaError::Capture(format!("default input config: {e}")))?;

        let channels = default_cfg.channels();
        tracing::info!(
            "level monitor: device={:?}, rate={}, channels={channels}",
            device.name(),
            default_cfg.sample_rate().0,
        );

        let config = cpal::StreamConfig {
            channels,
            sample_rate: default_cfg.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = watch::channel(MeterReading::default());
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = running.clone();
        let mut meter = LevelMeter::new();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !running_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    let reading = meter.process_f32(data);
                    let _ = tx.send(reading);
                },
                |err| {
                    tracing::error!("level monitor stream error: {err}");
                },
                None,
            )
            .map_err(|e| MediaError::Capture(format!("build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| MediaError::Capture(format!("play input stream: {e}")))?;

        Ok(Self {
            _stream: SendSyncStream(stream),
            running,
            readings: rx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<MeterReading> {
        self.readings.clone()
    }
}

impl Drop for MicrophoneLevelMonitor {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::info!("level monitor stopped");
    }
}
