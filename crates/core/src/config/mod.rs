use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dmx::MIN_BREAK;
use crate::{AddressingMode, Fixture, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dmx: DmxConfig,
    pub fixtures: FixtureLayout,
    pub audio: AudioConfig,
    /// Initial effect speed in percent (1-100).
    pub speed: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dmx: DmxConfig::default(),
            fixtures: FixtureLayout::default(),
            audio: AudioConfig::default(),
            speed: 100,
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), fixtures = config.fixtures.count, "configuration loaded");
        Ok(config)
    }
}

/// Serial link and frame timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmxConfig {
    pub port: String,
    pub baud_rate: u32,
    pub break_us: u64,
    pub mark_after_break_us: u64,
    pub cycle_ms: u64,
}

impl DmxConfig {
    /// Frame timing for the transmitter. A break shorter than
    /// [`MIN_BREAK`] is raised to it.
    pub fn timing(&self) -> FrameTiming {
        let mut break_time = Duration::from_micros(self.break_us);
        if break_time < MIN_BREAK {
            tracing::warn!(
                requested_us = self.break_us,
                minimum_us = MIN_BREAK.as_micros() as u64,
                "break too short for DMX512, using the minimum"
            );
            break_time = MIN_BREAK;
        }

        FrameTiming {
            break_time,
            mark_after_break: Duration::from_micros(self.mark_after_break_us),
            cycle_period: Duration::from_millis(self.cycle_ms),
        }
    }
}

impl Default for DmxConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS0".to_string(),
            baud_rate: 250_000,
            break_us: 100,
            mark_after_break_us: 12,
            cycle_ms: 23,
        }
    }
}

/// Timing contract of one transmission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Line held low before the start code. DMX512 requires at least 88 µs.
    pub break_time: Duration,
    pub mark_after_break: Duration,
    /// Full cycle length including the time spent on the wire.
    pub cycle_period: Duration,
}

impl Default for FrameTiming {
    fn default() -> Self {
        DmxConfig::default().timing()
    }
}

/// Identical fixtures patched back to back from `start_address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureLayout {
    pub start_address: u16,
    pub mode: AddressingMode,
    pub count: usize,
}

impl FixtureLayout {
    pub fn fixtures(&self) -> Vec<Fixture> {
        let footprint = self.mode.channel_count();
        (0..self.count)
            .map(|index| {
                let address = self.start_address as usize + index * footprint;
                Fixture::new(address.min(u16::MAX as usize) as u16, self.mode)
            })
            .collect()
    }
}

impl Default for FixtureLayout {
    fn default() -> Self {
        Self {
            start_address: 1,
            mode: AddressingMode::Extended,
            count: 2,
        }
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples averaged into one loudness reading.
    pub window: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            window: 1024,
        }
    }
}
