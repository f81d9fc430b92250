//! The Program slot: at most one lighting behaviour owns the fixtures at a
//! time.
//!
//! Starting a program stops the previous one and joins its worker before the
//! new worker is spawned, so the old program can never write after the new
//! one has started. A program that ends on its own (a finished sequence or a
//! failed audio device) clears the slot itself.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{run_audio, AudioInput};
use crate::effects::run_effect;
use crate::sequence::{self, SequenceOutcome, SequenceStep};
use crate::{AudioConfig, EffectKind, Fixture, FrameBuffer, Result, Speed, StopSignal};

/// What currently occupies the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Effect(EffectKind),
    Sequence { steps: usize },
    Audio,
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramKind::Effect(kind) => write!(f, "effect {kind}"),
            ProgramKind::Sequence { steps } => write!(f, "sequence ({steps} steps)"),
            ProgramKind::Audio => f.write_str("audio reactivity"),
        }
    }
}

struct ActiveProgram {
    id: u64,
    kind: ProgramKind,
    signal: StopSignal,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    active: Mutex<Option<ActiveProgram>>,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn active(&self) -> MutexGuard<'_, Option<ActiveProgram>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_error(&self) -> MutexGuard<'_, Option<String>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the slot when a worker exits on its own, including by panic.
struct Finalizer {
    shared: Arc<Shared>,
    id: u64,
    kind: ProgramKind,
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let mut active = self.shared.active();
        if active.as_ref().is_some_and(|program| program.id == self.id) {
            // Dropping our own JoinHandle detaches it; nobody is waiting on it.
            active.take();
        }
        tracing::info!(program = %self.kind, "program finished");
    }
}

/// Owned handle to the single Program slot.
///
/// Created once at startup and handed to whatever needs to start or stop
/// programs. Dropping it stops the active program.
pub struct ProgramSlot {
    buffer: FrameBuffer,
    speed: Speed,
    audio_input: Arc<dyn AudioInput>,
    audio_config: AudioConfig,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    // Serialises stop-then-start so concurrent starts leave exactly one
    // program running.
    transition: Mutex<()>,
}

impl ProgramSlot {
    pub fn new(
        buffer: FrameBuffer,
        speed: Speed,
        audio_input: Arc<dyn AudioInput>,
        audio_config: AudioConfig,
    ) -> Self {
        Self {
            buffer,
            speed,
            audio_input,
            audio_config,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
            next_id: AtomicU64::new(1),
            transition: Mutex::new(()),
        }
    }

    pub fn start_effect(&self, kind: EffectKind, fixtures: Vec<Fixture>) -> Result<()> {
        let buffer = self.buffer.clone();
        let speed = self.speed.clone();
        self.start(ProgramKind::Effect(kind), move |signal| {
            run_effect(kind, &fixtures, &buffer, &speed, &signal, None);
            Ok(())
        })
    }

    pub fn start_sequence(&self, steps: Vec<SequenceStep>, fixtures: Vec<Fixture>) -> Result<()> {
        let buffer = self.buffer.clone();
        let speed = self.speed.clone();
        let kind = ProgramKind::Sequence { steps: steps.len() };
        self.start(kind, move |signal| {
            let outcome = sequence::play(&steps, &fixtures, &buffer, &speed, &signal);
            match outcome {
                SequenceOutcome::Completed => tracing::info!("sequence completed"),
                SequenceOutcome::Stopped => tracing::info!("sequence stopped"),
            }
            Ok(())
        })
    }

    pub fn start_audio(&self, fixtures: Vec<Fixture>) -> Result<()> {
        let buffer = self.buffer.clone();
        let input = self.audio_input.clone();
        let config = self.audio_config.clone();
        self.start(ProgramKind::Audio, move |signal| {
            run_audio(input.as_ref(), &config, &fixtures, &buffer, &signal).map(|_| ())
        })
    }

    /// Stops the active program, if any, and waits for its worker to exit.
    /// Calling this on an empty slot does nothing.
    pub fn stop_program(&self) {
        let _transition = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop_active();
    }

    /// Updates the live effect speed (clamped to 1..=100).
    pub fn set_speed(&self, percent: i32) -> u8 {
        let speed = self.speed.set(percent);
        tracing::debug!(speed, "effect speed changed");
        speed
    }

    pub fn speed(&self) -> u8 {
        self.speed.get()
    }

    pub fn current(&self) -> Option<ProgramKind> {
        self.shared.active().as_ref().map(|program| program.kind)
    }

    pub fn is_idle(&self) -> bool {
        self.current().is_none()
    }

    /// Most recent error reported by a program worker.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error().clone()
    }

    /// Polls until the slot is empty or `timeout` passes. Returns whether the
    /// slot emptied.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.is_idle() {
                return true;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn start<F>(&self, kind: ProgramKind, body: F) -> Result<()>
    where
        F: FnOnce(StopSignal) -> Result<()> + Send + 'static,
    {
        let _transition = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop_active();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let signal = StopSignal::new();
        let finalizer = Finalizer {
            shared: self.shared.clone(),
            id,
            kind,
        };

        // Register before spawning so a worker that ends immediately finds its
        // own entry when it finalises.
        *self.shared.active() = Some(ActiveProgram {
            id,
            kind,
            signal: signal.clone(),
            worker: None,
        });

        let shared = self.shared.clone();
        let worker = std::thread::Builder::new()
            .name("dmx-program".to_string())
            .spawn(move || {
                let _finalizer = finalizer;
                if let Err(err) = body(signal) {
                    tracing::error!(program = %kind, error = %err, "program failed");
                    *shared.last_error() = Some(err.to_string());
                }
            })?;

        tracing::info!(program = %kind, "program started");
        if let Some(program) = self.shared.active().as_mut().filter(|p| p.id == id) {
            program.worker = Some(worker);
        }
        Ok(())
    }

    fn stop_active(&self) {
        let Some(mut program) = self.shared.active().take() else {
            return;
        };

        program.signal.stop();
        if let Some(worker) = program.worker.take() {
            if worker.join().is_err() {
                tracing::error!(program = %program.kind, "program worker panicked");
            }
        }
        tracing::info!(program = %program.kind, "program stopped");
    }
}

impl Drop for ProgramSlot {
    fn drop(&mut self) {
        self.stop_program();
    }
}

impl fmt::Debug for ProgramSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramSlot")
            .field("current", &self.current())
            .field("speed", &self.speed())
            .finish()
    }
}
