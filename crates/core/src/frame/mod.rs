use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of data slots in one DMX512 universe.
pub const UNIVERSE_SIZE: usize = 512;

/// Shared 512-channel frame buffer.
///
/// Index 0..=511 corresponds to DMX slot 1..=512. Clones share the same
/// storage, so every producer holds its own handle and writes through
/// [`FrameBuffer::write`]. The lock is held for a single store or for one
/// whole-frame copy and never across a sleep or any I/O.
#[derive(Clone)]
pub struct FrameBuffer {
    channels: Arc<Mutex<[u8; UNIVERSE_SIZE]>>,
}

impl FrameBuffer {
    /// Creates an all-zero universe.
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new([0; UNIVERSE_SIZE])),
        }
    }

    /// Stores `value` clamped to [0, 255] at the 0-based `channel`.
    ///
    /// Out-of-range channels are dropped without touching anything else.
    /// Returns whether the value was stored.
    pub fn write(&self, channel: usize, value: i32) -> bool {
        if channel >= UNIVERSE_SIZE {
            tracing::trace!(channel, value, "dropping write outside the universe");
            return false;
        }

        let value = value.clamp(0, u8::MAX as i32) as u8;
        self.lock()[channel] = value;
        true
    }

    /// Returns the value stored at the 0-based `channel`, if it exists.
    pub fn read(&self, channel: usize) -> Option<u8> {
        (channel < UNIVERSE_SIZE).then(|| self.lock()[channel])
    }

    /// Copies the whole universe in a single critical section.
    pub fn snapshot(&self) -> [u8; UNIVERSE_SIZE] {
        *self.lock()
    }

    /// Replaces the leading channels with `values`; extra values are ignored.
    pub fn load(&self, values: &[u8]) {
        let mut channels = self.lock();
        let len = values.len().min(UNIVERSE_SIZE);
        channels[..len].copy_from_slice(&values[..len]);
    }

    /// Zeroes every channel.
    pub fn clear(&self) {
        *self.lock() = [0; UNIVERSE_SIZE];
    }

    // A panicking producer cannot leave the array in an invalid state, so a
    // poisoned lock is simply taken over.
    fn lock(&self) -> MutexGuard<'_, [u8; UNIVERSE_SIZE]> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.snapshot().iter().filter(|value| **value > 0).count();
        f.debug_struct("FrameBuffer")
            .field("non_zero_channels", &lit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_values_into_byte_range() {
        let buffer = FrameBuffer::new();
        for (channel, input) in [-40, 0, 17, 255, 256, 10_000].into_iter().enumerate() {
            assert!(buffer.write(channel, input));
            let stored = buffer.read(channel).unwrap();
            assert_eq!(stored as i32, input.clamp(0, 255));
        }
    }

    #[test]
    fn ignores_channels_outside_the_universe() {
        let buffer = FrameBuffer::new();
        buffer.write(511, 9);

        assert!(!buffer.write(512, 200));
        assert!(!buffer.write(usize::MAX, 200));

        let frame = buffer.snapshot();
        assert_eq!(frame[511], 9);
        assert_eq!(frame.iter().filter(|value| **value != 0).count(), 1);
        assert_eq!(buffer.read(512), None);
    }

    #[test]
    fn last_write_wins() {
        let buffer = FrameBuffer::new();
        buffer.write(3, 10);
        buffer.write(3, 20);
        assert_eq!(buffer.read(3), Some(20));
    }

    #[test]
    fn clones_share_storage() {
        let buffer = FrameBuffer::new();
        let producer = buffer.clone();
        std::thread::spawn(move || {
            for channel in 0..UNIVERSE_SIZE {
                producer.write(channel, channel as i32);
            }
        })
        .join()
        .unwrap();

        let frame = buffer.snapshot();
        assert_eq!(frame[0], 0);
        assert_eq!(frame[200], 200);
        assert_eq!(frame[511], 255);
    }

    #[test]
    fn load_truncates_and_clear_zeroes() {
        let buffer = FrameBuffer::new();
        buffer.load(&[7; 600]);
        assert_eq!(buffer.snapshot(), [7; UNIVERSE_SIZE]);

        buffer.clear();
        assert_eq!(buffer.snapshot(), [0; UNIVERSE_SIZE]);
    }
}
