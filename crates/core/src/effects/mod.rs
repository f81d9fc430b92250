//! Effect engine: time-varying attribute values for a set of fixtures.
//!
//! An effect is a plain state machine advanced one iteration at a time by
//! [`EffectState::step`]. [`run_effect`] drives it on the calling thread,
//! sleeping between iterations for an interval derived from the live
//! [`Speed`] value. A stop request is honoured at the next iteration
//! boundary; since the sleep itself wakes on stop, preemption latency never
//! exceeds one sleep interval.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

use crate::{Attribute, DmxError, Fixture, FrameBuffer, StopSignal};

pub const SPEED_MIN: u8 = 1;
pub const SPEED_MAX: u8 = 100;

/// Shortest dwell per colour of the chase.
pub const CHASE_FLOOR: Duration = Duration::from_millis(50);
/// Shortest on/off phase of the strobe.
pub const STROBE_FLOOR: Duration = Duration::from_millis(20);
/// Shortest pause between two rainbow hue steps.
pub const RAINBOW_FLOOR: Duration = Duration::from_millis(20);

/// How often a sleeping effect re-reads its speed.
pub const SPEED_POLL: Duration = Duration::from_millis(10);

/// Colours cycled by the chase, in order.
pub const CHASE_PALETTE: [(u8, u8, u8); 3] = [(255, 0, 0), (0, 255, 0), (0, 0, 255)];

/// The rainbow advances its hue by `1 / RAINBOW_STEPS` per iteration.
pub const RAINBOW_STEPS: u64 = 100;

/// Effect speed in percent, shared between the controller and the running
/// effect. Reads happen every iteration, so changes apply without a restart.
#[derive(Debug, Clone)]
pub struct Speed(Arc<AtomicU8>);

impl Speed {
    pub fn new(percent: i32) -> Self {
        Self(Arc::new(AtomicU8::new(clamp_speed(percent))))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    /// Stores `percent` clamped to 1..=100 and returns the stored value.
    pub fn set(&self, percent: i32) -> u8 {
        let speed = clamp_speed(percent);
        self.0.store(speed, Ordering::Relaxed);
        speed
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::new(SPEED_MAX as i32)
    }
}

fn clamp_speed(percent: i32) -> u8 {
    percent.clamp(SPEED_MIN as i32, SPEED_MAX as i32) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Steps every fixture through [`CHASE_PALETTE`].
    #[serde(alias = "color_chase", alias = "color-chase")]
    ColorChase,
    /// Alternates the dimmer between full and zero.
    #[serde(alias = "strobe")]
    Strobe,
    /// Walks the hue circle, all fixtures in lockstep.
    #[serde(alias = "rainbow")]
    Rainbow,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [
        EffectKind::ColorChase,
        EffectKind::Strobe,
        EffectKind::Rainbow,
    ];

    /// Pause between two iterations at the given speed. Faster means shorter,
    /// never below the effect's floor.
    pub fn interval(self, speed: u8) -> Duration {
        let speed = speed.clamp(SPEED_MIN, SPEED_MAX) as f64;
        let (seconds, floor) = match self {
            EffectKind::ColorChase => (1.0 - speed / 100.0, CHASE_FLOOR),
            EffectKind::Strobe => (0.5 - speed / 200.0, STROBE_FLOOR),
            EffectKind::Rainbow => (0.2 - speed / 200.0, RAINBOW_FLOOR),
        };
        Duration::from_secs_f64(seconds.max(0.0)).max(floor)
    }

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::ColorChase => "ColorChase",
            EffectKind::Strobe => "Strobe",
            EffectKind::Rainbow => "Rainbow",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = DmxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "colorchase" | "chase" => Ok(EffectKind::ColorChase),
            "strobe" => Ok(EffectKind::Strobe),
            "rainbow" => Ok(EffectKind::Rainbow),
            _ => Err(DmxError::msg(format!("unknown effect `{s}`"))),
        }
    }
}

/// Iteration state of one running effect.
#[derive(Debug, Clone)]
pub struct EffectState {
    kind: EffectKind,
    iterations: u64,
}

impl EffectState {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            iterations: 0,
        }
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Rainbow hue the next iteration will emit: `(n * step) mod 1.0` after
    /// `n` iterations.
    pub fn hue(&self) -> f32 {
        (self.iterations % RAINBOW_STEPS) as f32 / RAINBOW_STEPS as f32
    }

    /// Computes this iteration's values and writes them to every fixture.
    pub fn step(&mut self, fixtures: &[Fixture], buffer: &FrameBuffer) {
        match self.kind {
            EffectKind::ColorChase => {
                let index = (self.iterations % CHASE_PALETTE.len() as u64) as usize;
                let (red, green, blue) = CHASE_PALETTE[index];
                for fixture in fixtures {
                    fixture.set_color(buffer, red, green, blue);
                }
            }
            EffectKind::Strobe => {
                let value = if self.iterations % 2 == 0 { 255 } else { 0 };
                for fixture in fixtures {
                    fixture.set(buffer, Attribute::Dimmer, value);
                }
            }
            EffectKind::Rainbow => {
                let (red, green, blue) = hsv_to_rgb(self.hue());
                for fixture in fixtures {
                    fixture.set_color(buffer, red, green, blue);
                }
            }
        }
        self.iterations += 1;
    }
}

/// Fully saturated, full value colour for `hue` in [0, 1).
pub fn hsv_to_rgb(hue: f32) -> (u8, u8, u8) {
    let hsv: Hsv = Hsv::new(hue.rem_euclid(1.0) * 360.0, 1.0, 1.0);
    let rgb: Srgb = Srgb::from_color(hsv);
    (to_byte(rgb.red), to_byte(rgb.green), to_byte(rgb.blue))
}

fn to_byte(component: f32) -> u8 {
    (component.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Sleeps until the interval for the current speed has passed since the
/// call, re-reading the speed every [`SPEED_POLL`]. Returns `true` on stop.
fn pause(
    kind: EffectKind,
    speed: &Speed,
    signal: &StopSignal,
    deadline: Option<Instant>,
) -> bool {
    let started = Instant::now();
    loop {
        let mut remaining = kind.interval(speed.get()).saturating_sub(started.elapsed());
        if let Some(deadline) = deadline {
            remaining = remaining.min(deadline.saturating_duration_since(Instant::now()));
        }
        if remaining.is_zero() {
            return signal.is_stopped();
        }
        if signal.wait(remaining.min(SPEED_POLL)) {
            return true;
        }
    }
}

/// Runs `kind` on the calling thread until `signal` stops or `deadline`
/// passes. Returns the number of iterations performed.
pub fn run_effect(
    kind: EffectKind,
    fixtures: &[Fixture],
    buffer: &FrameBuffer,
    speed: &Speed,
    signal: &StopSignal,
    deadline: Option<Instant>,
) -> u64 {
    let mut state = EffectState::new(kind);
    tracing::debug!(effect = %kind, fixtures = fixtures.len(), "effect running");

    loop {
        if signal.is_stopped() || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        state.step(fixtures, buffer);
        if pause(kind, speed, signal, deadline) {
            break;
        }
    }

    tracing::debug!(effect = %kind, iterations = state.iterations(), "effect idle");
    state.iterations()
}
