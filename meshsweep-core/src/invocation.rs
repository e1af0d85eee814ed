//! Mapping from parameter state to a simulator command line.

use std::fmt;
use std::path::PathBuf;

use crate::state::ParameterState;
use crate::{DEFAULT_EXECUTABLE, DEFAULT_SCENARIO};

/// Simulation front-end and scenario that every trial runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Target {
    /// Path to the front-end executable, constant across trials
    pub executable: PathBuf,
    /// Scenario named in the run directive
    pub scenario: String,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            scenario: DEFAULT_SCENARIO.to_string(),
        }
    }
}

/// Program path and ordered argument list for a single trial.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    /// Builds the invocation for the given state snapshot.
    ///
    /// The front-end receives exactly two arguments: `--run` and a single
    /// compound string holding the scenario and its eight parameters, always
    /// in the same order.
    pub fn build(state: &ParameterState, target: &Target) -> Invocation {
        let directive = format!(
            "./{} --x-size={} --y-size={} --step={} --packet-interval={} \
             --packet-size={} --numFlows={} --seed={} --standardPhy={}",
            target.scenario,
            state.x_size,
            state.y_size,
            state.step,
            state.packet_interval,
            state.packet_size,
            state.num_flows,
            state.seed,
            state.standard_phy.code(),
        );
        Invocation {
            program: target.executable.clone(),
            args: vec!["--run".to_string(), directive],
        }
    }

    /// Creates an invocation from an arbitrary program and arguments.
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Invocation {
        Invocation {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}
