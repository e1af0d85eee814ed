//! Sweep strategies.
//!
//! A strategy is a fixed trajectory through parameter space. Running it
//! mutates a [`ParameterState`] step by step and hands the state to a visitor
//! at every point where trials should be launched.
//!
//! Floating point bounds are compared with `<=` against an accumulating sum,
//! so rounding drift can add or drop an iteration near the upper bound. With
//! the constants used here the interval loops visit exactly ten values, the
//! last one being `0.09999999999999999`.
//!
//! [`ParameterState`]: ../state/struct.ParameterState.html

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::state::ParameterState;

const INTERVAL_START: f64 = 0.01;
const INTERVAL_END: f64 = 0.1;
const INTERVAL_STEP: f64 = 0.01;

const SIZE_START: u32 = 32;
const SIZE_END: u32 = 1024;
const SIZE_GRID_STEP: u32 = 100;

const NODES_START: u32 = 2;
const NODES_END: u32 = 10;

const FLOWS_X_SIZE_LIMIT: u32 = 20;

/// Closed set of available sweep strategies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Packet interval from 0.01 to 0.1, step 0.01
    Interval,
    /// Packet size doubling from 32 to 1024, with interval 0.01 and step 100
    Size,
    /// Packet interval from 0.01 to 0.1, crossed with square grids from 2x2
    /// to 10x10
    Nodes,
    /// Grid row length increased by one up to 20, starting wherever it is
    Flows,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Nodes
    }
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Interval,
        Strategy::Size,
        Strategy::Nodes,
        Strategy::Flows,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Interval => "interval",
            Strategy::Size => "size",
            Strategy::Nodes => "nodes",
            Strategy::Flows => "flows",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Strategy::Interval => "packet interval 0.01..=0.1 (step 0.01)",
            Strategy::Size => "packet size 32..=1024 (doubling), interval 0.01, step 100",
            Strategy::Nodes => "interval 0.01..=0.1 crossed with grid 2x2..=10x10",
            Strategy::Flows => "row length from its current value up to 20",
        }
    }

    /// Checks that the strategy can start from the given state.
    ///
    /// Strategies that reset every coordinate they move accept any state.
    /// `Flows` inherits `x_size`, so it requires a usable starting value
    /// that still lies within its bound.
    pub fn check_initial(&self, state: &ParameterState) -> Result<()> {
        match self {
            Strategy::Interval | Strategy::Size | Strategy::Nodes => Ok(()),
            Strategy::Flows => {
                if state.x_size < 1 || state.x_size > FLOWS_X_SIZE_LIMIT {
                    return Err(Error::PreconditionFailed {
                        strategy: self.name(),
                        reason: format!(
                            "x_size must be within 1..={}, got {}",
                            FLOWS_X_SIZE_LIMIT, state.x_size
                        ),
                    });
                }
                if state.y_size < 1 {
                    return Err(Error::PreconditionFailed {
                        strategy: self.name(),
                        reason: "y_size must be at least 1".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Moves `state` along the trajectory, calling `visit` at every point.
    ///
    /// An error returned by the visitor stops the sweep and is passed on to
    /// the caller. The state is left where the sweep stopped.
    pub fn sweep<F>(&self, state: &mut ParameterState, mut visit: F) -> Result<()>
    where
        F: FnMut(&mut ParameterState) -> Result<()>,
    {
        self.check_initial(state)?;
        match self {
            Strategy::Interval => {
                state.packet_interval = INTERVAL_START;
                while state.packet_interval <= INTERVAL_END {
                    visit(state)?;
                    state.packet_interval += INTERVAL_STEP;
                }
            }
            Strategy::Size => {
                state.packet_interval = INTERVAL_START;
                state.packet_size = SIZE_START;
                state.step = SIZE_GRID_STEP;
                while state.packet_size <= SIZE_END {
                    visit(state)?;
                    state.packet_size *= 2;
                }
            }
            Strategy::Nodes => {
                state.packet_interval = INTERVAL_START;
                while state.packet_interval <= INTERVAL_END {
                    state.x_size = NODES_START;
                    state.y_size = NODES_START;
                    while state.x_size <= NODES_END {
                        visit(state)?;
                        state.x_size += 1;
                        state.y_size += 1;
                    }
                    state.packet_interval += INTERVAL_STEP;
                }
            }
            Strategy::Flows => {
                while state.x_size <= FLOWS_X_SIZE_LIMIT {
                    visit(state)?;
                    state.x_size += 1;
                }
            }
        }
        Ok(())
    }

    /// Returns the snapshots visited when sweeping from `initial`.
    pub fn trajectory(&self, initial: &ParameterState) -> Result<Vec<ParameterState>> {
        let mut state = initial.clone();
        let mut points = Vec::new();
        self.sweep(&mut state, |s| {
            points.push(s.clone());
            Ok(())
        })?;
        Ok(points)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Strategy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .iter()
            .find(|strategy| strategy.name() == s.to_lowercase())
            .copied()
            .ok_or_else(|| Error::ParsingError(format!("unknown strategy: {}", s)))
    }
}
