//! Fixture channel map.
//!
//! A fixture is a start address plus an [`AddressingMode`]. Every mode owns a
//! static offset table; resolving an [`Attribute`] is a table lookup, so a new
//! fixture model is a new table rather than a new code path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DmxError, FrameBuffer, UNIVERSE_SIZE};

/// Logical fixture parameter that can be routed to a DMX channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Pan,
    PanFine,
    Tilt,
    TiltFine,
    /// Pan/tilt motor speed.
    Speed,
    Dimmer,
    Red,
    Green,
    Blue,
    White,
    /// RGBW colour mixing and random macros.
    ColorMacro,
    MixSpeed,
    /// Auto / sound-activated program selection.
    FunctionMode,
    ColorTemperature,
    InternalColor,
    Strobe,
    SpecialFunction,
    /// Momentary: any non-zero value triggers a physical reset.
    Reset,
}

impl Attribute {
    pub const ALL: [Attribute; 18] = [
        Attribute::Pan,
        Attribute::PanFine,
        Attribute::Tilt,
        Attribute::TiltFine,
        Attribute::Speed,
        Attribute::Dimmer,
        Attribute::Red,
        Attribute::Green,
        Attribute::Blue,
        Attribute::White,
        Attribute::ColorMacro,
        Attribute::MixSpeed,
        Attribute::FunctionMode,
        Attribute::ColorTemperature,
        Attribute::InternalColor,
        Attribute::Strobe,
        Attribute::SpecialFunction,
        Attribute::Reset,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Pan => "pan",
            Attribute::PanFine => "pan_fine",
            Attribute::Tilt => "tilt",
            Attribute::TiltFine => "tilt_fine",
            Attribute::Speed => "speed",
            Attribute::Dimmer => "dimmer",
            Attribute::Red => "red",
            Attribute::Green => "green",
            Attribute::Blue => "blue",
            Attribute::White => "white",
            Attribute::ColorMacro => "color_macro",
            Attribute::MixSpeed => "mix_speed",
            Attribute::FunctionMode => "function_mode",
            Attribute::ColorTemperature => "color_temperature",
            Attribute::InternalColor => "internal_color",
            Attribute::Strobe => "strobe",
            Attribute::SpecialFunction => "special_function",
            Attribute::Reset => "reset",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = DmxError;

    /// Accepts the snake_case name, optionally prefixed with `set_`
    /// (`set_dimmer`), in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let name = normalized.strip_prefix("set_").unwrap_or(normalized.as_str());
        let name = match name {
            "macro_mix" => "color_macro",
            "temp_color" => "color_temperature",
            other => other,
        };

        Attribute::ALL
            .into_iter()
            .find(|attribute| attribute.name() == name)
            .ok_or_else(|| DmxError::msg(format!("unknown fixture attribute `{s}`")))
    }
}

/// Channel layout of a fixture model. Each variant carries its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingMode {
    /// 9-channel wash layout.
    #[serde(alias = "9ch", alias = "9CH")]
    Compact,
    /// 14-channel wash layout with fine pan/tilt, white, macros and reset.
    #[serde(alias = "14ch", alias = "14CH")]
    Extended,
    /// 14-channel spot layout with colour temperature and strobe.
    Spot,
}

struct ModeTable {
    channels: usize,
    offsets: &'static [(Attribute, usize)],
}

// Slot 7 of the compact layout has no routable attribute.
const COMPACT: ModeTable = ModeTable {
    channels: 9,
    offsets: &[
        (Attribute::Pan, 0),
        (Attribute::Tilt, 1),
        (Attribute::Dimmer, 2),
        (Attribute::Red, 3),
        (Attribute::Green, 4),
        (Attribute::Blue, 5),
        (Attribute::Speed, 7),
        (Attribute::Reset, 8),
    ],
};

const EXTENDED: ModeTable = ModeTable {
    channels: 14,
    offsets: &[
        (Attribute::Pan, 0),
        (Attribute::PanFine, 1),
        (Attribute::Tilt, 2),
        (Attribute::TiltFine, 3),
        (Attribute::Speed, 4),
        (Attribute::Dimmer, 5),
        (Attribute::Red, 6),
        (Attribute::Green, 7),
        (Attribute::Blue, 8),
        (Attribute::White, 9),
        (Attribute::ColorMacro, 10),
        (Attribute::MixSpeed, 11),
        (Attribute::FunctionMode, 12),
        (Attribute::Reset, 13),
    ],
};

const SPOT: ModeTable = ModeTable {
    channels: 14,
    offsets: &[
        (Attribute::Pan, 0),
        (Attribute::PanFine, 1),
        (Attribute::Tilt, 2),
        (Attribute::TiltFine, 3),
        (Attribute::Speed, 4),
        (Attribute::Dimmer, 5),
        (Attribute::Red, 6),
        (Attribute::Green, 7),
        (Attribute::Blue, 8),
        (Attribute::White, 9),
        (Attribute::ColorTemperature, 10),
        (Attribute::InternalColor, 11),
        (Attribute::Strobe, 12),
        (Attribute::SpecialFunction, 13),
    ],
};

impl AddressingMode {
    fn table(self) -> &'static ModeTable {
        match self {
            AddressingMode::Compact => &COMPACT,
            AddressingMode::Extended => &EXTENDED,
            AddressingMode::Spot => &SPOT,
        }
    }

    /// Number of consecutive DMX slots a fixture in this mode occupies.
    pub fn channel_count(self) -> usize {
        self.table().channels
    }

    /// Offset of `attribute` relative to the fixture's first channel.
    pub fn offset(self, attribute: Attribute) -> Option<usize> {
        self.table()
            .offsets
            .iter()
            .find(|(candidate, _)| *candidate == attribute)
            .map(|(_, offset)| *offset)
    }

    pub fn supports(self, attribute: Attribute) -> bool {
        self.offset(attribute).is_some()
    }

    /// Attributes routable in this mode, in channel order.
    pub fn attributes(self) -> impl Iterator<Item = Attribute> {
        self.table().offsets.iter().map(|(attribute, _)| *attribute)
    }
}

impl FromStr for AddressingMode {
    type Err = DmxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "9ch" => Ok(AddressingMode::Compact),
            "extended" | "14ch" => Ok(AddressingMode::Extended),
            "spot" => Ok(AddressingMode::Spot),
            _ => Err(DmxError::msg(format!("unknown addressing mode `{s}`"))),
        }
    }
}

/// A patched fixture: 1-based start channel plus addressing mode.
///
/// Fixtures never own buffer data; they only translate attributes into
/// absolute offsets and write through the shared [`FrameBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    start_channel: u16,
    mode: AddressingMode,
}

impl Fixture {
    pub fn new(start_channel: u16, mode: AddressingMode) -> Self {
        Self {
            start_channel,
            mode,
        }
    }

    pub fn start_channel(&self) -> u16 {
        self.start_channel
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Absolute 0-based buffer offset for `attribute`, or `None` when the mode
    /// lacks it or the result would fall outside the universe.
    pub fn channel(&self, attribute: Attribute) -> Option<usize> {
        let relative = self.mode.offset(attribute)?;
        let start = (self.start_channel as usize).checked_sub(1)?;
        let absolute = start + relative;
        (absolute < UNIVERSE_SIZE).then_some(absolute)
    }

    /// Writes one attribute. Unsupported or out-of-range attributes are a
    /// no-op and return `false`.
    pub fn set(&self, buffer: &FrameBuffer, attribute: Attribute, value: i32) -> bool {
        match self.channel(attribute) {
            Some(channel) => buffer.write(channel, value),
            None => {
                tracing::trace!(
                    start = self.start_channel,
                    mode = ?self.mode,
                    %attribute,
                    "attribute not routable for fixture"
                );
                false
            }
        }
    }

    /// Writes an RGB colour. Modes with a white channel get white forced to 0.
    pub fn set_color(&self, buffer: &FrameBuffer, red: u8, green: u8, blue: u8) {
        self.set_rgbw(buffer, red, green, blue, 0);
    }

    pub fn set_rgbw(&self, buffer: &FrameBuffer, red: u8, green: u8, blue: u8, white: u8) {
        self.set(buffer, Attribute::Red, red as i32);
        self.set(buffer, Attribute::Green, green as i32);
        self.set(buffer, Attribute::Blue, blue as i32);
        self.set(buffer, Attribute::White, white as i32);
    }

    /// Pulses the reset channel. The fixture reacts to any non-zero value and
    /// the channel is not cleared afterwards.
    pub fn reset(&self, buffer: &FrameBuffer) -> bool {
        self.set(buffer, Attribute::Reset, 255)
    }

    /// Zeroes every slot of the fixture's footprint, routable or not.
    pub fn blackout(&self, buffer: &FrameBuffer) {
        let Some(start) = (self.start_channel as usize).checked_sub(1) else {
            return;
        };
        for channel in start..start + self.mode.channel_count() {
            buffer.write(channel, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit_channels(buffer: &FrameBuffer) -> Vec<usize> {
        buffer
            .snapshot()
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0)
            .map(|(channel, _)| channel)
            .collect()
    }

    #[test]
    fn dimmer_offsets_differ_per_mode() {
        let buffer = FrameBuffer::new();
        Fixture::new(1, AddressingMode::Compact).set(&buffer, Attribute::Dimmer, 200);
        assert_eq!(lit_channels(&buffer), vec![2]);

        buffer.clear();
        Fixture::new(1, AddressingMode::Extended).set(&buffer, Attribute::Dimmer, 200);
        assert_eq!(lit_channels(&buffer), vec![5]);
    }

    #[test]
    fn color_writes_land_on_mode_specific_channels() {
        let buffer = FrameBuffer::new();
        Fixture::new(1, AddressingMode::Compact).set_rgbw(&buffer, 10, 20, 30, 40);
        assert_eq!(lit_channels(&buffer), vec![3, 4, 5]);

        buffer.clear();
        Fixture::new(1, AddressingMode::Extended).set_rgbw(&buffer, 10, 20, 30, 40);
        assert_eq!(lit_channels(&buffer), vec![6, 7, 8, 9]);
        assert_eq!(&buffer.snapshot()[6..10], &[10, 20, 30, 40]);
    }

    #[test]
    fn unsupported_attribute_is_a_no_op() {
        let buffer = FrameBuffer::new();
        let fixture = Fixture::new(1, AddressingMode::Compact);

        assert!(!fixture.set(&buffer, Attribute::PanFine, 255));
        assert!(!fixture.set(&buffer, Attribute::White, 255));
        assert!(lit_channels(&buffer).is_empty());
    }

    #[test]
    fn offsets_past_the_universe_are_dropped() {
        let buffer = FrameBuffer::new();
        let fixture = Fixture::new(505, AddressingMode::Extended);

        assert_eq!(fixture.channel(Attribute::Dimmer), Some(509));
        assert_eq!(fixture.channel(Attribute::Red), Some(510));
        assert_eq!(fixture.channel(Attribute::Green), Some(511));
        assert_eq!(fixture.channel(Attribute::Blue), None);
        assert!(!fixture.set(&buffer, Attribute::Reset, 255));

        assert_eq!(Fixture::new(0, AddressingMode::Compact).channel(Attribute::Pan), None);
    }

    #[test]
    fn reset_is_a_momentary_full_value() {
        let buffer = FrameBuffer::new();
        assert!(Fixture::new(15, AddressingMode::Extended).reset(&buffer));
        assert_eq!(buffer.read(14 + 13), Some(255));
    }

    #[test]
    fn blackout_covers_the_whole_footprint() {
        let buffer = FrameBuffer::new();
        buffer.load(&[9; UNIVERSE_SIZE]);
        Fixture::new(1, AddressingMode::Compact).blackout(&buffer);

        let frame = buffer.snapshot();
        assert!(frame[..9].iter().all(|value| *value == 0));
        assert_eq!(frame[9], 9);
    }

    #[test]
    fn tables_stay_inside_their_footprint() {
        for mode in [
            AddressingMode::Compact,
            AddressingMode::Extended,
            AddressingMode::Spot,
        ] {
            let mut seen = Vec::new();
            for attribute in mode.attributes() {
                let offset = mode.offset(attribute).unwrap();
                assert!(offset < mode.channel_count(), "{mode:?} {attribute}");
                assert!(!seen.contains(&offset), "{mode:?} reuses offset {offset}");
                seen.push(offset);
            }
        }
    }

    #[test]
    fn parses_attribute_and_mode_names() {
        assert_eq!("set_dimmer".parse::<Attribute>().unwrap(), Attribute::Dimmer);
        assert_eq!("Pan_Fine".parse::<Attribute>().unwrap(), Attribute::PanFine);
        assert_eq!("set_macro_mix".parse::<Attribute>().unwrap(), Attribute::ColorMacro);
        assert!("gobo".parse::<Attribute>().is_err());

        assert_eq!("14CH".parse::<AddressingMode>().unwrap(), AddressingMode::Extended);
        assert_eq!("compact".parse::<AddressingMode>().unwrap(), AddressingMode::Compact);
        let mode: AddressingMode = serde_json::from_str("\"9ch\"").unwrap();
        assert_eq!(mode, AddressingMode::Compact);
    }
}
