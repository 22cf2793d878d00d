/// Highest level reported by [`LevelMeter`].
pub const MAX_LEVEL: f32 = 10.0;

/// Anything quieter than this reads as silence.
const FLOOR_DBFS: f32 = -60.0;

const DEFAULT_SMOOTHING: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterReading {
    /// Smoothed level in `0..=MAX_LEVEL`.
    pub level: f32,
    /// Highest instantaneous level since the last reset.
    pub peak: f32,
    /// Loudness of the last frame.
    pub rms_dbfs: f32,
}

/// Turns microphone PCM frames into a display level.
///
/// The level rises immediately and decays by the smoothing factor, so short
/// syllables remain visible on a meter refreshed at frame rate.
#[derive(Debug, Clone)]
pub struct LevelMeter {
    smoothing: f32,
    level: f32,
    peak: f32,
    rms_dbfs: f32,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::with_smoothing(DEFAULT_SMOOTHING)
    }

    /// `smoothing` is clamped to `0.0..=1.0`; 0 disables decay smoothing.
    pub fn with_smoothing(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
            level: 0.0,
            peak: 0.0,
            rms_dbfs: FLOOR_DBFS,
        }
    }

    /// Feed interleaved or mono i16 samples.
    pub fn process(&mut self, samples: &[i16]) -> MeterReading {
        self.process_normalized(samples.iter().map(|&s| s as f32 / 32768.0), samples.len())
    }

    /// Feed samples already normalized to `-1.0..=1.0`.
    pub fn process_f32(&mut self, samples: &[f32]) -> MeterReading {
        self.process_normalized(samples.iter().copied(), samples.len())
    }

    pub fn reading(&self) -> MeterReading {
        MeterReading {
            level: self.level,
            peak: self.peak,
            rms_dbfs: self.rms_dbfs,
        }
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
        self.peak = 0.0;
        self.rms_dbfs = FLOOR_DBFS;
    }

    fn process_normalized(
        &mut self,
        samples: impl Iterator<Item = f32>,
        len: usize,
    ) -> MeterReading {
        if len == 0 {
            return self.reading();
        }

        let sum_sq: f32 = samples.map(|s| s * s).sum();
        let rms = (sum_sq / len as f32).sqrt();
        self.rms_dbfs = if rms > 0.0 {
            (20.0 * rms.log10()).max(FLOOR_DBFS)
        } else {
            FLOOR_DBFS
        };

        let instant = (self.rms_dbfs - FLOOR_DBFS) / -FLOOR_DBFS * MAX_LEVEL;
        self.level = if instant >= self.level {
            instant
        } else {
            self.smoothing * self.level + (1.0 - self.smoothing) * instant
        };
        self.peak = self.peak.max(instant);
        self.reading()
    }
}
