//! Sweep coordinates.

use std::fmt;
use std::str::FromStr;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::error::Error;
use crate::DEFAULT_SEED_LIMIT;

/// Radio physical layer simulated by the scenario.
///
/// Passed to the simulator as its integer code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum StandardPhy {
    /// 802.11a, 5 GHz
    A5GHz = 1,
    /// 802.11b, 2.4 GHz
    B24GHz = 2,
    /// 802.11g, 2.4 GHz
    G24GHz = 3,
}

impl StandardPhy {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Default for StandardPhy {
    fn default() -> Self {
        StandardPhy::A5GHz
    }
}

impl fmt::Display for StandardPhy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for StandardPhy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1" | "a" | "80211a" => Ok(StandardPhy::A5GHz),
            "2" | "b" | "80211b" => Ok(StandardPhy::B24GHz),
            "3" | "g" | "80211g" => Ok(StandardPhy::G24GHz),
            _ => Err(Error::ParsingError(format!(
                "unknown phy standard: {} (expected 1, 2 or 3)",
                s
            ))),
        }
    }
}

/// Current position of the sweep in parameter space.
///
/// There is no validation at this level. Whatever range checks are needed
/// are declared by the strategy that moves the state, see
/// [`Strategy::check_initial`].
///
/// [`Strategy::check_initial`]: ../strategy/enum.Strategy.html#method.check_initial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParameterState {
    /// Seconds between packets
    pub packet_interval: f64,
    /// Bytes per packet
    pub packet_size: u32,
    /// Grid nodes per row
    pub x_size: u32,
    /// Grid rows
    pub y_size: u32,
    /// Distance between neighbouring grid nodes, meters
    pub step: u32,
    pub num_flows: u32,
    /// Seed for the current trial, reset to 1 after each sweep point
    pub seed: u32,
    /// Exclusive upper bound for the seed loop
    pub seed_limit: u32,
    pub standard_phy: StandardPhy,
}

impl Default for ParameterState {
    fn default() -> Self {
        ParameterState {
            packet_interval: 0.1,
            packet_size: 512,
            x_size: 1,
            y_size: 2,
            step: 50,
            num_flows: 1,
            seed: 1,
            seed_limit: DEFAULT_SEED_LIMIT,
            standard_phy: StandardPhy::default(),
        }
    }
}

impl ParameterState {
    /// Number of trials launched at every sweep point.
    pub fn trials_per_point(&self) -> u32 {
        self.seed_limit.saturating_sub(1)
    }
}

impl fmt::Display for ParameterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid={}x{} step={} interval={} size={} flows={} phy={}",
            self.x_size,
            self.y_size,
            self.step,
            self.packet_interval,
            self.packet_size,
            self.num_flows,
            self.standard_phy
        )
    }
}
