//! Sweep configuration.
//!
//! Everything has a built-in default, so an empty configuration runs the
//! nodes sweep serially against `../waf`. A `sweep.toml` file can override
//! any part of it:
//!
//! ```toml
//! [target]
//! executable = "../waf"
//! scenario = "mesh-RPG"
//!
//! [sweep]
//! strategy = "nodes"
//!
//! [initial]
//! packet_size = 512
//! seed_limit = 33
//! standard_phy = 1
//!
//! [dispatch]
//! mode = "pooled"
//! jobs = 4
//! on_failure = "halt"
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::invocation::Target;
use crate::state::ParameterState;
use crate::strategy::Strategy;

/// How trial processes are scheduled relative to each other.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Wait for every trial to exit before launching the next one
    Serial,
    /// Keep at most `jobs` trials running at once
    Pooled,
    /// Launch without waiting, collect everything at the end of the sweep
    Detached,
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Serial
    }
}

impl FromStr for DispatchMode {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "serial" => Ok(DispatchMode::Serial),
            "pooled" | "pool" => Ok(DispatchMode::Pooled),
            "detached" => Ok(DispatchMode::Detached),
            _ => Err(Error::ParsingError(format!("unknown dispatch mode: {}", s))),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchMode::Serial => "serial",
            DispatchMode::Pooled => "pooled",
            DispatchMode::Detached => "detached",
        };
        write!(f, "{}", s)
    }
}

/// What to do once a trial fails.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and keep sweeping
    Continue,
    /// Stop launching new trials
    Halt,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Continue
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "continue" => Ok(FailurePolicy::Continue),
            "halt" => Ok(FailurePolicy::Halt),
            _ => Err(Error::ParsingError(format!("unknown failure policy: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    /// Pool size, only used in pooled mode
    pub jobs: usize,
    pub on_failure: FailurePolicy,
    /// Prefix relayed output with the trial tag. Forced on for concurrent
    /// modes, see [`DispatchConfig::tags_output`].
    pub tag_output: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            mode: DispatchMode::default(),
            jobs: 4,
            on_failure: FailurePolicy::default(),
            tag_output: false,
        }
    }
}

impl DispatchConfig {
    /// Whether relayed lines should carry the trial tag.
    ///
    /// Concurrent trials interleave their output, so tagging can't be
    /// switched off for them.
    pub fn tags_output(&self) -> bool {
        self.tag_output || self.mode != DispatchMode::Serial
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    pub strategy: Strategy,
}

/// Complete configuration of a sweep run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SweepConfig {
    pub target: Target,
    pub sweep: SweepSection,
    pub initial: ParameterState,
    pub dispatch: DispatchConfig,
}

impl SweepConfig {
    pub fn parse(s: &str) -> Result<SweepConfig> {
        let config: SweepConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<SweepConfig> {
        let path = path.as_ref();
        let file_str = fs::read_to_string(path).map_err(|source| Error::ConfigReadError {
            path: path.to_path_buf(),
            source,
        })?;
        info!("using sweep config at {}", path.display());
        SweepConfig::parse(&file_str)
    }

    pub fn strategy(&self) -> Strategy {
        self.sweep.strategy
    }

    /// Fresh copy of the configured starting state.
    pub fn initial_state(&self) -> ParameterState {
        self.initial.clone()
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch.mode == DispatchMode::Pooled && self.dispatch.jobs == 0 {
            return Err(Error::ParsingError(
                "dispatch.jobs must be at least 1 in pooled mode".to_string(),
            ));
        }
        if self.target.scenario.trim().is_empty() {
            return Err(Error::ParsingError(
                "target.scenario can't be empty".to_string(),
            ));
        }
        Ok(())
    }
}
