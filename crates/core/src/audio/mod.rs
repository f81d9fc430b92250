//! Audio reactivity producer.
//!
//! Samples live audio one window at a time, measures its loudness and maps it
//! onto every active fixture. Device access sits behind [`AudioInput`] and
//! [`AudioSource`] so the producer loop does not care where samples come from.

use crate::analysis::{self, LevelFrame, LevelSummary};
use crate::{Attribute, AudioConfig, DmxError, Fixture, FrameBuffer, Result, StopSignal};

/// An open capture stream. Dropping it releases the device.
pub trait AudioSource {
    /// Blocks until `window` is completely filled with mono samples in
    /// [-1, 1].
    fn read_window(&mut self, window: &mut [f32]) -> Result<()>;
}

/// Factory for capture streams.
///
/// `open` is called on the program worker thread, because some backends
/// cannot move a live stream between threads.
pub trait AudioInput: Send + Sync {
    fn open(&self, config: &AudioConfig) -> Result<Box<dyn AudioSource>>;
}

/// Input used when no capture backend is compiled in. Opening always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableInput;

impl AudioInput for UnavailableInput {
    fn open(&self, _config: &AudioConfig) -> Result<Box<dyn AudioSource>> {
        Err(DmxError::audio(
            "no audio capture backend available (build with the `cpal` feature)",
        ))
    }
}

/// Maps a loudness level onto one fixture: red follows the level, green its
/// complement, blue half of it, and the dimmer tracks it directly.
pub fn apply_level(level: u8, fixture: &Fixture, buffer: &FrameBuffer) {
    let level = level as i32;
    fixture.set(buffer, Attribute::Red, level);
    fixture.set(buffer, Attribute::Green, 255 - level);
    fixture.set(buffer, Attribute::Blue, level / 2);
    fixture.set(buffer, Attribute::Dimmer, level);
}

/// Runs the producer loop on the calling thread until `signal` stops or the
/// device fails. Device errors end the session and are returned; they are
/// never retried here.
pub fn run_audio(
    input: &dyn AudioInput,
    config: &AudioConfig,
    fixtures: &[Fixture],
    buffer: &FrameBuffer,
    signal: &StopSignal,
) -> Result<LevelSummary> {
    let mut source = input.open(config)?;
    let mut window = vec![0.0_f32; config.window.max(1)];
    let mut summary = LevelSummary::default();
    tracing::info!(window = window.len(), sample_rate = config.sample_rate, "audio reactivity started");

    while !signal.is_stopped() {
        source.read_window(&mut window)?;

        let frame: LevelFrame = analysis::measure(&window);
        for fixture in fixtures {
            apply_level(frame.level, fixture, buffer);
        }
        summary.record(&frame);
        tracing::trace!(level = frame.level, "audio level");
    }

    tracing::info!(windows = summary.windows, peak = summary.peak, "audio reactivity stopped");
    Ok(summary)
}

#[cfg(feature = "cpal")]
pub use capture::CpalInput;

#[cfg(feature = "cpal")]
mod capture {
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::{Receiver, RecvTimeoutError};

    use super::{AudioInput, AudioSource};
    use crate::analysis::normalize_i16;
    use crate::{AudioConfig, DmxError, Result};

    /// Capture from the host's default input device (first channel only).
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CpalInput;

    struct CpalSource {
        _stream: cpal::Stream,
        samples: Receiver<Vec<f32>>,
        pending: Vec<f32>,
    }

    impl AudioInput for CpalInput {
        fn open(&self, config: &AudioConfig) -> Result<Box<dyn AudioSource>> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| DmxError::audio("no default input device"))?;
            let supported = device
                .default_input_config()
                .map_err(|err| DmxError::audio(err.to_string()))?;
            let channels = supported.channels().max(1) as usize;
            let stream_config: cpal::StreamConfig = supported.clone().into();
            if supported.sample_rate() != config.sample_rate {
                tracing::warn!(
                    device_rate = supported.sample_rate(),
                    configured = config.sample_rate,
                    "capturing at the device sample rate"
                );
            }

            let (sender, samples) = crossbeam_channel::bounded::<Vec<f32>>(64);
            let on_error = |err: cpal::StreamError| tracing::error!(error = %err, "audio stream error");

            let stream = match supported.sample_format() {
                cpal::SampleFormat::F32 => device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = data.iter().step_by(channels).copied().collect();
                        let _ = sender.try_send(mono);
                    },
                    on_error,
                    Some(Duration::from_millis(200)),
                ),
                cpal::SampleFormat::I16 => device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let mono = data.iter().step_by(channels).map(|s| normalize_i16(*s)).collect();
                        let _ = sender.try_send(mono);
                    },
                    on_error,
                    Some(Duration::from_millis(200)),
                ),
                other => {
                    return Err(DmxError::audio(format!("unsupported sample format {other:?}")));
                }
            }
            .map_err(|err| DmxError::audio(err.to_string()))?;

            stream.play().map_err(|err| DmxError::audio(err.to_string()))?;
            tracing::info!(channels, "audio capture opened");

            Ok(Box::new(CpalSource {
                _stream: stream,
                samples,
                pending: Vec::new(),
            }))
        }
    }

    impl AudioSource for CpalSource {
        fn read_window(&mut self, window: &mut [f32]) -> Result<()> {
            while self.pending.len() < window.len() {
                match self.samples.recv_timeout(Duration::from_secs(1)) {
                    Ok(block) => self.pending.extend(block),
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(DmxError::audio("input device stopped delivering samples"));
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(DmxError::audio("input stream closed"));
                    }
                }
            }

            window.copy_from_slice(&self.pending[..window.len()]);
            self.pending.drain(..window.len());
            Ok(())
        }
    }
}
