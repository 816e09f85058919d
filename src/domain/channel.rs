// Sensor channel domain model
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// One logical sensor quantity tracked by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Temperature,
    Humidity,
    Light,
    DutyCycle,
}

/// Inclusive value range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Position of `value` inside the range as a 0-100 percentage
    pub fn percent_of(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / span * 100.0).clamp(0.0, 100.0)
    }
}

/// Static configuration for a channel
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChannelInfo {
    pub channel: Channel,
    pub name: &'static str,
    pub unit: &'static str,
    pub color: &'static str,
    pub precision: u32,
    pub display_range: ValueRange,
    #[serde(skip)]
    pub simulation: SimulationProfile,
    pub begin_at_zero: bool,
}

/// Random-walk parameters used when no external feed is connected
#[derive(Debug, Clone, Copy)]
pub struct SimulationProfile {
    pub range: ValueRange,
    pub max_step: f64,
    pub initial: f64,
}

static CHANNEL_INFO: [ChannelInfo; Channel::COUNT] = [
    ChannelInfo {
        channel: Channel::Temperature,
        name: "Temperature",
        unit: "°C",
        color: "#ff6b6b",
        precision: 1,
        display_range: ValueRange::new(0.0, 50.0),
        simulation: SimulationProfile {
            range: ValueRange::new(15.0, 35.0),
            max_step: 1.5,
            initial: 25.6,
        },
        begin_at_zero: false,
    },
    ChannelInfo {
        channel: Channel::Humidity,
        name: "Humidity",
        unit: "%",
        color: "#4ecdc4",
        precision: 1,
        display_range: ValueRange::new(0.0, 100.0),
        simulation: SimulationProfile {
            range: ValueRange::new(40.0, 80.0),
            max_step: 3.0,
            initial: 65.2,
        },
        begin_at_zero: true,
    },
    ChannelInfo {
        channel: Channel::Light,
        name: "Light",
        unit: "lux",
        color: "#ffe66d",
        precision: 0,
        display_range: ValueRange::new(0.0, 1000.0),
        simulation: SimulationProfile {
            range: ValueRange::new(200.0, 1000.0),
            max_step: 50.0,
            initial: 750.0,
        },
        begin_at_zero: false,
    },
    ChannelInfo {
        channel: Channel::DutyCycle,
        name: "Duty Cycle",
        unit: "%",
        color: "#a8e6cf",
        precision: 0,
        display_range: ValueRange::new(0.0, 100.0),
        simulation: SimulationProfile {
            range: ValueRange::new(0.0, 100.0),
            max_step: 5.0,
            initial: 85.0,
        },
        begin_at_zero: true,
    },
];

impl Channel {
    pub const COUNT: usize = 4;
    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Light,
        Channel::DutyCycle,
    ];

    pub const fn index(self) -> usize {
        match self {
            Channel::Temperature => 0,
            Channel::Humidity => 1,
            Channel::Light => 2,
            Channel::DutyCycle => 3,
        }
    }

    pub fn info(self) -> &'static ChannelInfo {
        &CHANNEL_INFO[self.index()]
    }

    /// Stable identifier used in URLs and JSON payloads
    pub fn id(self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Light => "light",
            Channel::DutyCycle => "duty_cycle",
        }
    }

    /// Parse a channel name coming from outside the process.
    /// "pwm" is accepted as a legacy name for the duty cycle.
    pub fn parse(name: &str) -> Option<Channel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "temperature" => Some(Channel::Temperature),
            "humidity" => Some(Channel::Humidity),
            "light" => Some(Channel::Light),
            "duty_cycle" | "duty-cycle" | "dutycycle" | "pwm" => Some(Channel::DutyCycle),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Fixed-size table holding one value per channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable<T>([T; Channel::COUNT]);

impl<T> ChannelTable<T> {
    pub fn from_fn(mut f: impl FnMut(Channel) -> T) -> Self {
        Self(Channel::ALL.map(&mut f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &T)> {
        Channel::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Channel, &mut T)> {
        Channel::ALL.into_iter().zip(self.0.iter_mut())
    }
}

impl<T: Default> Default for ChannelTable<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Channel> for ChannelTable<T> {
    type Output = T;

    fn index(&self, channel: Channel) -> &T {
        &self.0[channel.index()]
    }
}

impl<T> IndexMut<Channel> for ChannelTable<T> {
    fn index_mut(&mut self, channel: Channel) -> &mut T {
        &mut self.0[channel.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_aliases() {
        assert_eq!(Channel::parse("temperature"), Some(Channel::Temperature));
        assert_eq!(Channel::parse(" Humidity "), Some(Channel::Humidity));
        assert_eq!(Channel::parse("pwm"), Some(Channel::DutyCycle));
        assert_eq!(Channel::parse("duty-cycle"), Some(Channel::DutyCycle));
        assert_eq!(Channel::parse("pressure"), None);
    }

    #[test]
    fn test_id_round_trips_through_parse() {
        for channel in Channel::ALL {
            assert_eq!(Channel::parse(channel.id()), Some(channel));
            assert_eq!(channel.info().channel, channel);
        }
    }

    #[test]
    fn test_percent_of_is_clamped() {
        let range = ValueRange::new(0.0, 50.0);
        assert_eq!(range.percent_of(25.0), 50.0);
        assert_eq!(range.percent_of(-3.0), 0.0);
        assert_eq!(range.percent_of(80.0), 100.0);
    }

    #[test]
    fn test_channel_table_indexing() {
        let mut table: ChannelTable<u32> = ChannelTable::default();
        table[Channel::Light] = 7;
        assert_eq!(table[Channel::Light], 7);
        assert_eq!(table.iter().map(|(_, v)| *v).sum::<u32>(), 7);
        let collected: Vec<Channel> = table.iter().map(|(c, _)| c).collect();
        assert_eq!(collected, Channel::ALL.to_vec());
    }
}
