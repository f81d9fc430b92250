use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::effects::run_effect;
use crate::{Attribute, EffectKind, Fixture, FrameBuffer, Result, Speed, StopSignal};

fn default_duration() -> f64 {
    1.0
}

/// One entry of a sequence file. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceStep {
    /// Run an effect, then stop it before the next step.
    Effect {
        effect: EffectKind,
        #[serde(default = "default_duration")]
        duration: f64,
    },
    /// Apply explicit values, keyed by fixture index then attribute name, and
    /// hold them.
    Values {
        dmx: BTreeMap<String, BTreeMap<String, i32>>,
        #[serde(default = "default_duration")]
        duration: f64,
    },
}

impl SequenceStep {
    pub fn effect(effect: EffectKind, duration: Duration) -> Self {
        Self::Effect {
            effect,
            duration: duration.as_secs_f64(),
        }
    }

    pub fn values<I>(values: I, duration: Duration) -> Self
    where
        I: IntoIterator<Item = (usize, Attribute, i32)>,
    {
        let mut dmx: BTreeMap<String, BTreeMap<String, i32>> = BTreeMap::new();
        for (fixture, attribute, value) in values {
            dmx.entry(fixture.to_string())
                .or_default()
                .insert(attribute.name().to_string(), value);
        }
        Self::Values {
            dmx,
            duration: duration.as_secs_f64(),
        }
    }

    /// How long the step holds. Negative or non-numeric durations are zero.
    pub fn duration(&self) -> Duration {
        let seconds = match self {
            Self::Effect { duration, .. } | Self::Values { duration, .. } => *duration,
        };
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO)
    }
}

/// Sum of all step durations, saturating at [`Duration::MAX`].
pub fn total_duration(steps: &[SequenceStep]) -> Duration {
    steps
        .iter()
        .map(SequenceStep::duration)
        .fold(Duration::ZERO, Duration::saturating_add)
}

/// How a playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    Completed,
    Stopped,
}

/// Plays `steps` strictly in order on the calling thread.
///
/// A stop request ends the current step early and no further step starts.
/// Effect steps run inline, so an effect never outlives its step.
pub fn play(
    steps: &[SequenceStep],
    fixtures: &[Fixture],
    buffer: &FrameBuffer,
    speed: &Speed,
    signal: &StopSignal,
) -> SequenceOutcome {
    for (index, step) in steps.iter().enumerate() {
        if signal.is_stopped() {
            break;
        }

        let duration = step.duration();
        match step {
            SequenceStep::Effect { effect, .. } => {
                tracing::info!(step = index, effect = %effect, ?duration, "sequence step");
                // Past the end of the clock the step only ends on stop.
                let deadline = Instant::now().checked_add(duration);
                run_effect(*effect, fixtures, buffer, speed, signal, deadline);
            }
            SequenceStep::Values { dmx, .. } => {
                tracing::info!(step = index, fixtures = dmx.len(), ?duration, "sequence step");
                apply_values(dmx, fixtures, buffer);
                signal.wait(duration);
            }
        }
    }

    if signal.is_stopped() {
        SequenceOutcome::Stopped
    } else {
        SequenceOutcome::Completed
    }
}

/// Writes an explicit step. Unknown fixtures or attributes are skipped with a
/// warning; the remaining values are still applied.
pub fn apply_values(
    values: &BTreeMap<String, BTreeMap<String, i32>>,
    fixtures: &[Fixture],
    buffer: &FrameBuffer,
) {
    for (key, attributes) in values {
        let Some(fixture) = key.trim().parse::<usize>().ok().and_then(|i| fixtures.get(i)) else {
            tracing::warn!(fixture = %key, "sequence step names an unknown fixture");
            continue;
        };

        for (name, value) in attributes {
            match name.parse::<Attribute>() {
                Ok(attribute) => {
                    if !fixture.set(buffer, attribute, *value) {
                        tracing::warn!(
                            fixture = %key,
                            %attribute,
                            mode = ?fixture.mode(),
                            "attribute not supported by fixture"
                        );
                    }
                }
                Err(err) => tracing::warn!(fixture = %key, error = %err, "skipping attribute"),
            }
        }
    }
}

/// Reads a JSON sequence file.
pub fn load_steps(path: impl AsRef<Path>) -> Result<Vec<SequenceStep>> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&raw)?)
}

/// Like [`load_steps`], but logs failures and yields an empty sequence.
pub fn load_steps_or_empty(path: impl AsRef<Path>) -> Vec<SequenceStep> {
    let path = path.as_ref();
    match load_steps(path) {
        Ok(steps) => {
            tracing::info!(path = %path.display(), steps = steps.len(), "sequence loaded");
            steps
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to load sequence");
            Vec::new()
        }
    }
}

pub fn save_steps(path: impl AsRef<Path>, steps: &[SequenceStep]) -> Result<()> {
    let json = serde_json::to_string_pretty(steps)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AddressingMode;

    const UNIT: Duration = Duration::from_millis(60);

    fn fixtures() -> Vec<Fixture> {
        vec![
            Fixture::new(1, AddressingMode::Extended),
            Fixture::new(15, AddressingMode::Compact),
        ]
    }

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("dmx-seq-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_the_sequence_file_format() {
        let steps: Vec<SequenceStep> = serde_json::from_str(
            r#"[
                {"effect": "Rainbow", "duration": 5},
                {"dmx": {"0": {"set_dimmer": 255, "red": 10}}, "duration": 2.5},
                {"effect": "Strobe"}
            ]"#,
        )
        .unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], SequenceStep::effect(EffectKind::Rainbow, Duration::from_secs(5)));
        assert_eq!(steps[1].duration(), Duration::from_millis(2500));
        assert_eq!(steps[2].duration(), Duration::from_secs(1));
        assert_eq!(total_duration(&steps), Duration::from_millis(8500));
    }

    #[test]
    fn huge_durations_saturate_instead_of_overflowing() {
        let steps: Vec<SequenceStep> = serde_json::from_str(
            r#"[{"effect": "Strobe", "duration": 1e19}, {"effect": "Rainbow", "duration": 1e19}]"#,
        )
        .unwrap();
        assert_eq!(total_duration(&steps), Duration::MAX);

        let buffer = FrameBuffer::new();
        let signal = StopSignal::new();
        let worker = {
            let (buffer, signal) = (buffer.clone(), signal.clone());
            // Slowest strobe stays on its first, full phase.
            std::thread::spawn(move || {
                play(&steps, &fixtures(), &buffer, &Speed::new(1), &signal)
            })
        };
        std::thread::sleep(Duration::from_millis(40));
        signal.stop();

        assert_eq!(worker.join().unwrap(), SequenceOutcome::Stopped);
        assert_eq!(buffer.read(5), Some(255));
    }

    #[test]
    fn two_steps_run_back_to_back() {
        let buffer = FrameBuffer::new();
        let steps = vec![
            SequenceStep::effect(EffectKind::Strobe, UNIT),
            SequenceStep::values([(1, Attribute::Pan, 42)], UNIT * 2),
        ];

        let started = Instant::now();
        let outcome = play(&steps, &fixtures(), &buffer, &Speed::default(), &StopSignal::new());
        let elapsed = started.elapsed();

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert!(elapsed >= UNIT * 3, "{elapsed:?}");
        assert!(elapsed < UNIT * 3 + Duration::from_millis(150), "{elapsed:?}");
        assert_eq!(buffer.read(14), Some(42));
    }

    #[test]
    fn stop_during_first_step_skips_the_rest() {
        let buffer = FrameBuffer::new();
        let signal = StopSignal::new();
        let steps = vec![
            SequenceStep::values([(0, Attribute::Pan, 1)], Duration::from_secs(5)),
            SequenceStep::values([(0, Attribute::Tilt, 99)], Duration::from_secs(5)),
        ];

        let worker = {
            let (buffer, signal) = (buffer.clone(), signal.clone());
            std::thread::spawn(move || {
                play(&steps, &fixtures(), &buffer, &Speed::default(), &signal)
            })
        };
        std::thread::sleep(Duration::from_millis(40));
        signal.stop();

        assert_eq!(worker.join().unwrap(), SequenceOutcome::Stopped);
        assert_eq!(buffer.read(0), Some(1));
        assert_eq!(buffer.read(2), Some(0));
    }

    #[test]
    fn effect_step_is_stopped_before_the_next_step() {
        let buffer = FrameBuffer::new();
        let fixtures = vec![Fixture::new(1, AddressingMode::Extended)];
        let steps = vec![
            SequenceStep::effect(EffectKind::Strobe, UNIT),
            SequenceStep::values([(0, Attribute::Dimmer, 7)], UNIT * 2),
        ];

        let worker = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                play(&steps, &fixtures, &buffer, &Speed::default(), &StopSignal::new())
            })
        };

        std::thread::sleep(UNIT + UNIT / 2);
        // The strobe would have toggled the dimmer several times by now.
        assert_eq!(buffer.read(5), Some(7));
        std::thread::sleep(UNIT / 4);
        assert_eq!(buffer.read(5), Some(7));
        assert_eq!(worker.join().unwrap(), SequenceOutcome::Completed);
    }

    #[test]
    fn bad_fixture_or_attribute_does_not_abort_the_step() {
        let buffer = FrameBuffer::new();
        let values: BTreeMap<String, BTreeMap<String, i32>> = serde_json::from_str(
            r#"{
                "0": {"gobo": 1, "pan_fine": 33, "dimmer": 200},
                "1": {"white": 50, "red": 60},
                "7": {"dimmer": 255},
                "x": {"dimmer": 255}
            }"#,
        )
        .unwrap();

        apply_values(&values, &fixtures(), &buffer);

        assert_eq!(buffer.read(1), Some(33));
        assert_eq!(buffer.read(5), Some(200));
        assert_eq!(buffer.read(14 + 3), Some(60));
        let lit = buffer.snapshot().iter().filter(|value| **value > 0).count();
        assert_eq!(lit, 3);
    }

    #[test]
    fn unreadable_files_fall_back_to_an_empty_sequence() {
        let missing = std::env::temp_dir().join("dmx-seq-does-not-exist.json");
        assert!(load_steps_or_empty(&missing).is_empty());

        let malformed = temp_file("malformed.json", "[{\"effect\": ");
        assert!(load_steps(&malformed).is_err());
        assert!(load_steps_or_empty(&malformed).is_empty());
        std::fs::remove_file(malformed).ok();
    }

    #[test]
    fn saved_sequences_load_back() {
        let steps = vec![
            SequenceStep::effect(EffectKind::ColorChase, Duration::from_secs(3)),
            SequenceStep::values([(0, Attribute::Reset, 255)], Duration::from_millis(500)),
        ];
        let path = temp_file("saved.json", "");

        save_steps(&path, &steps).unwrap();
        assert_eq!(load_steps(&path).unwrap(), steps);
        std::fs::remove_file(path).ok();
    }
}
