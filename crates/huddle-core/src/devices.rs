use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Persisted device preference slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [Self::AudioInput, Self::AudioOutput, Self::VideoInput];

    /// Key under which the preference is persisted.
    pub fn key(&self) -> &'static str {
        match self {
            Self::AudioInput => "audio-input",
            Self::AudioOutput => "audio-output",
            Self::VideoInput => "video-input",
        }
    }
}

/// Process-wide key-value store for preferred device identifiers.
pub trait DeviceStore: Send + Sync {
    fn get(&self, kind: DeviceKind) -> Option<String>;
    fn set(&self, kind: DeviceKind, device_id: &str);
    fn clear(&self, kind: DeviceKind);
    fn clear_all(&self);
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DevicePreferences {
    #[serde(default, rename = "audio-input")]
    pub audio_input: Option<String>,
    #[serde(default, rename = "audio-output")]
    pub audio_output: Option<String>,
    #[serde(default, rename = "video-input")]
    pub video_input: Option<String>,
}

impl DevicePreferences {
    fn slot(&mut self, kind: DeviceKind) -> &mut Option<String> {
        match kind {
            DeviceKind::AudioInput => &mut self.audio_input,
            DeviceKind::AudioOutput => &mut self.audio_output,
            DeviceKind::VideoInput => &mut self.video_input,
        }
    }

    pub fn get(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::AudioInput => self.audio_input.as_deref(),
            DeviceKind::AudioOutput => self.audio_output.as_deref(),
            DeviceKind::VideoInput => self.video_input.as_deref(),
        }
    }
}

/// Non-persistent store, lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    prefs: Mutex<DevicePreferences>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn get(&self, kind: DeviceKind) -> Option<String> {
        let prefs = self.prefs.lock().unwrap_or_else(|e| e.into_inner());
        prefs.get(kind).map(str::to_string)
    }

    fn set(&self, kind: DeviceKind, device_id: &str) {
        let mut prefs = self.prefs.lock().unwrap_or_else(|e| e.into_inner());
        *prefs.slot(kind) = Some(device_id.to_string());
    }

    fn clear(&self, kind: DeviceKind) {
        let mut prefs = self.prefs.lock().unwrap_or_else(|e| e.into_inner());
        *prefs.slot(kind) = None;
    }

    fn clear_all(&self) {
        *self.prefs.lock().unwrap_or_else(|e| e.into_inner()) = DevicePreferences::default();
    }
}

/// JSON-file backed store (`devices.json` under a data directory).
///
/// A missing or unreadable file yields empty preferences. Writes are
/// best-effort and logged on failure.
pub struct FileDeviceStore {
    prefs: Mutex<DevicePreferences>,
    file_path: PathBuf,
}

impl FileDeviceStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("devices.json");
        let prefs = Self::load(&file_path);
        Self {
            prefs: Mutex::new(prefs),
            file_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn snapshot(&self) -> DevicePreferences {
        self.prefs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn update(&self, f: impl FnOnce(&mut DevicePreferences)) {
        let prefs = {
            let mut prefs = self.prefs.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut prefs);
            prefs.clone()
        };
        self.save(&prefs);
    }

    fn save(&self, prefs: &DevicePreferences) {
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(prefs) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("failed to persist device preferences: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to encode device preferences: {e}"),
        }
    }

    fn load(path: &Path) -> DevicePreferences {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => DevicePreferences::default(),
        }
    }
}

impl DeviceStore for FileDeviceStore {
    fn get(&self, kind: DeviceKind) -> Option<String> {
        let prefs = self.prefs.lock().unwrap_or_else(|e| e.into_inner());
        prefs.get(kind).map(str::to_string)
    }

    fn set(&self, kind: DeviceKind, device_id: &str) {
        self.update(|prefs| *prefs.slot(kind) = Some(device_id.to_string()));
    }

    fn clear(&self, kind: DeviceKind) {
        self.update(|prefs| *prefs.slot(kind) = None);
    }

    fn clear_all(&self) {
        self.update(|prefs| *prefs = DevicePreferences::default());
    }
}
