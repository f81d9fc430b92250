//! DMX512 transmission engine.
//!
//! A dedicated worker drains the shared [`FrameBuffer`] onto the wire at a
//! fixed cadence: break, mark-after-break, start code `0x00`, 512 data slots,
//! then a sleep that fills the remainder of the cycle period. Producers never
//! wait on the transmitter; a channel written twice between two cycles only
//! ever shows its latest value.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{DmxConfig, DmxError, FrameBuffer, FrameTiming, Result, StopSignal, UNIVERSE_SIZE};

/// Start code of a dimmer-data packet.
pub const START_CODE: u8 = 0x00;

/// Shortest break a DMX512 receiver is required to recognise.
pub const MIN_BREAK: Duration = Duration::from_micros(88);

/// Physical link the transmitter writes frames to.
pub trait DmxTransport: Send {
    /// Holds the line in break for `break_time`, then releases it for
    /// `mark_after_break`.
    fn send_break(&mut self, break_time: Duration, mark_after_break: Duration) -> Result<()>;

    /// Writes a complete packet (start code followed by the slot data) and
    /// returns once it has been handed to the hardware.
    fn write_packet(&mut self, packet: &[u8]) -> Result<()>;
}

/// RS-485 serial link: 250 kbaud, 8 data bits, no parity, 2 stop bits.
///
/// The port is opened lazily and dropped after any failure, so a missing or
/// unplugged adapter costs one skipped cycle and is retried on the next.
pub struct SerialTransport {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(config: &DmxConfig) -> Self {
        Self {
            path: config.port.clone(),
            baud_rate: config.baud_rate,
            port: None,
        }
    }

    /// Opens the port immediately instead of on the first cycle.
    pub fn open(config: &DmxConfig) -> Result<Self> {
        let mut transport = Self::new(config);
        transport.port()?;
        Ok(transport)
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        if self.port.is_none() {
            let port = serialport::new(&self.path, self.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::Two)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(100))
                .open()?;
            tracing::info!(port = %self.path, baud = self.baud_rate, "serial port opened");
            self.port = Some(port);
        }

        self.port
            .as_mut()
            .ok_or_else(|| DmxError::msg("serial port unavailable"))
    }

    fn guarded<T>(&mut self, op: impl FnOnce(&mut Box<dyn SerialPort>) -> Result<T>) -> Result<T> {
        let result = self.port().and_then(op);
        if result.is_err() {
            self.port = None;
        }
        result
    }
}

impl DmxTransport for SerialTransport {
    fn send_break(&mut self, break_time: Duration, mark_after_break: Duration) -> Result<()> {
        self.guarded(|port| {
            port.set_break()?;
            std::thread::sleep(break_time);
            port.clear_break()?;
            std::thread::sleep(mark_after_break);
            Ok(())
        })
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.guarded(|port| {
            port.write_all(packet)?;
            port.flush()?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

/// Transport that accepts and discards every frame. Used for dry runs.
#[derive(Debug, Default)]
pub struct NullTransport {
    packets: u64,
}

impl DmxTransport for NullTransport {
    fn send_break(&mut self, _break_time: Duration, _mark_after_break: Duration) -> Result<()> {
        Ok(())
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.packets += 1;
        if self.packets % 440 == 0 {
            tracing::debug!(packets = self.packets, len = packet.len(), "dry-run frames");
        }
        Ok(())
    }
}

/// Counters published by the transmission worker.
#[derive(Debug, Default)]
pub struct TransmitterStats {
    frames_sent: AtomicU64,
    failed_cycles: AtomicU64,
}

impl TransmitterStats {
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.load(Ordering::Relaxed)
    }
}

/// Serialises one frame: snapshot under the buffer lock, then break,
/// mark-after-break and the start code plus 512 slots outside of it.
pub fn transmit_frame(
    transport: &mut dyn DmxTransport,
    buffer: &FrameBuffer,
    timing: &FrameTiming,
) -> Result<()> {
    let slots = buffer.snapshot();
    let mut packet = [0u8; UNIVERSE_SIZE + 1];
    packet[0] = START_CODE;
    packet[1..].copy_from_slice(&slots);

    transport.send_break(timing.break_time, timing.mark_after_break)?;
    transport.write_packet(&packet)
}

/// Handle to the running transmission worker.
///
/// Dropping the handle stops the worker and waits for the in-flight cycle.
pub struct Transmitter {
    signal: StopSignal,
    stats: Arc<TransmitterStats>,
    worker: Option<JoinHandle<()>>,
}

impl Transmitter {
    /// Spawns the worker thread.
    pub fn spawn(
        buffer: FrameBuffer,
        transport: Box<dyn DmxTransport>,
        timing: FrameTiming,
    ) -> Result<Self> {
        let signal = StopSignal::new();
        let stats = Arc::new(TransmitterStats::default());

        let worker = {
            let signal = signal.clone();
            let stats = stats.clone();
            std::thread::Builder::new()
                .name("dmx-transmitter".to_string())
                .spawn(move || run(transport, buffer, timing, signal, stats))?
        };

        tracing::info!(cycle = ?timing.cycle_period, "transmitter started");
        Ok(Self {
            signal,
            stats,
            worker: Some(worker),
        })
    }

    pub fn stats(&self) -> &TransmitterStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Stops the worker between cycles and joins it. Idempotent.
    pub fn stop(&mut self) {
        self.signal.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("transmitter worker panicked");
            }
            tracing::info!(
                frames = self.stats.frames_sent(),
                failures = self.stats.failed_cycles(),
                "transmitter stopped"
            );
        }
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Transmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transmitter")
            .field("running", &self.is_running())
            .field("stats", &self.stats)
            .finish()
    }
}

fn run(
    mut transport: Box<dyn DmxTransport>,
    buffer: FrameBuffer,
    timing: FrameTiming,
    signal: StopSignal,
    stats: Arc<TransmitterStats>,
) {
    let mut consecutive_failures = 0u64;

    while !signal.is_stopped() {
        let cycle_start = Instant::now();

        match transmit_frame(transport.as_mut(), &buffer, &timing) {
            Ok(()) => {
                stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                if consecutive_failures > 0 {
                    tracing::info!(skipped = consecutive_failures, "transport recovered");
                    consecutive_failures = 0;
                }
            }
            Err(err) => {
                stats.failed_cycles.fetch_add(1, Ordering::Relaxed);
                consecutive_failures += 1;
                if consecutive_failures == 1 {
                    tracing::warn!(error = %err, "frame transmission failed, skipping cycle");
                } else {
                    tracing::debug!(error = %err, consecutive_failures, "frame transmission failed");
                }
            }
        }

        let remaining = timing.cycle_period.saturating_sub(cycle_start.elapsed());
        signal.wait(remaining);
    }
}
