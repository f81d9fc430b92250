use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DmxError, FrameBuffer};

/// Single channel write received from a remote control surface.
///
/// `channel` is 1-based as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCommand {
    pub channel: i32,
    pub value: i32,
}

impl ChannelCommand {
    pub fn new(channel: i32, value: i32) -> Self {
        Self { channel, value }
    }

    /// 0-based buffer index, if the wire channel can address one.
    pub fn buffer_index(&self) -> Option<usize> {
        usize::try_from(self.channel).ok()?.checked_sub(1)
    }

    /// Writes the value through the buffer's write primitive. Returns whether
    /// a channel was written.
    pub fn apply(&self, buffer: &FrameBuffer) -> bool {
        let written = self
            .buffer_index()
            .is_some_and(|index| buffer.write(index, self.value));
        if written {
            tracing::info!(channel = self.channel, value = self.value, "remote channel set");
        } else {
            tracing::warn!(channel = self.channel, "remote command addresses no channel");
        }
        written
    }
}

impl FromStr for ChannelCommand {
    type Err = DmxError;

    /// Parses `"<channel> <value>"` or `"<channel>=<value>"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s
            .split(|c: char| c == '=' || c.is_whitespace())
            .filter(|part| !part.is_empty());

        let (Some(channel), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(DmxError::InvalidInput("expected `<channel> <value>`"));
        };
        let channel = channel
            .parse()
            .map_err(|_| DmxError::InvalidInput("channel is not an integer"))?;
        let value = value
            .parse()
            .map_err(|_| DmxError::InvalidInput("value is not an integer"))?;

        Ok(Self { channel, value })
    }
}
