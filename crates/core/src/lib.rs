//! Core library for the DMX moving-head controller.
//!
//! One [`FrameBuffer`] holds the 512 channel values of the universe. The
//! [`Transmitter`] drains it onto the serial link at a fixed cadence while
//! producers (manual writes, remote commands and the single active program
//! held by the [`ProgramSlot`]) write into it concurrently. Fixtures translate
//! logical attributes into buffer offsets through per-mode tables.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod controller;
pub mod dmx;
pub mod effects;
pub mod error;
pub mod frame;
pub mod mapping;
pub mod program;
pub mod remote;
pub mod scene;
pub mod sequence;
pub mod signal;

pub use analysis::{LevelFrame, LevelSummary};
#[cfg(feature = "cpal")]
pub use audio::CpalInput;
pub use audio::{AudioInput, AudioSource, UnavailableInput};
pub use config::{AppConfig, AudioConfig, DmxConfig, FixtureLayout, FrameTiming};
pub use controller::DmxController;
pub use dmx::{DmxTransport, NullTransport, SerialTransport, Transmitter, TransmitterStats};
pub use effects::{EffectKind, EffectState, Speed};
pub use error::{DmxError, Result};
pub use frame::{FrameBuffer, UNIVERSE_SIZE};
pub use mapping::{AddressingMode, Attribute, Fixture};
pub use program::{ProgramKind, ProgramSlot};
pub use remote::ChannelCommand;
pub use scene::Scene;
pub use sequence::{SequenceOutcome, SequenceStep};
pub use signal::StopSignal;
