//! This library implements parameter sweeps over the `mesh-RPG` network
//! simulation.
//!
//! Programming interface is centered around the [`Driver`] structure, which
//! walks a [`Strategy`] through parameter space and, at every point of the
//! trajectory, launches one trial per seed. Each trial is a separate
//! invocation of the simulation front-end (`waf --run ...`), launched through
//! an implementation of the [`Launch`] trait.
//!
//! # Parameter state
//!
//! All sweep coordinates live in a single [`ParameterState`] value owned by
//! the caller. Strategies receive it by mutable reference and move it along
//! their trajectory. Trials only ever see a snapshot of it, turned into an
//! [`Invocation`].
//!
//! # Dispatch
//!
//! Trials can be run one after another, through a bounded pool of child
//! processes, or fully detached. See [`DispatchMode`].
//!
//! ## Example
//!
//! ```no_run
//! extern crate meshsweep;
//! use meshsweep::{Driver, ProcessRunner, SweepConfig};
//!
//! pub fn main() {
//!     let config = SweepConfig::default();
//!     let mut state = config.initial_state();
//!     let runner = ProcessRunner::new(config.dispatch.tag_output);
//!     let mut driver = Driver::new(config, runner);
//!     let report = driver.run(&mut state).unwrap();
//!     println!("{} trials", report.outcomes.len());
//! }
//! ```
//!
//! [`Driver`]: driver/struct.Driver.html
//! [`Strategy`]: strategy/enum.Strategy.html
//! [`Launch`]: runner/trait.Launch.html
//! [`ParameterState`]: state/struct.ParameterState.html
//! [`Invocation`]: invocation/struct.Invocation.html
//! [`DispatchMode`]: config/enum.DispatchMode.html

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

// reexports
pub use config::{DispatchConfig, DispatchMode, FailurePolicy, SweepConfig};
pub use driver::{Driver, StopReason, SweepReport};
pub use error::{Error, Result};
pub use invocation::{Invocation, Target};
pub use runner::{Launch, OutputSink, ProcessRunner, Trial, TrialHandle, TrialOutcome, TrialStatus};
pub use state::{ParameterState, StandardPhy};
pub use strategy::Strategy;

pub mod config;
pub mod driver;
pub mod error;
pub mod invocation;
pub mod runner;
pub mod state;
pub mod strategy;

/// Default path to the simulation front-end, relative to the working
/// directory the sweep is started from.
pub const DEFAULT_EXECUTABLE: &str = "../waf";
/// Name of the simulation scenario passed to the front-end's run directive.
pub const DEFAULT_SCENARIO: &str = "mesh-RPG";
/// Exclusive upper bound of the inner seed loop.
pub const DEFAULT_SEED_LIMIT: u32 = 33;

/// Name of the configuration file looked up by the command line tool.
pub const CONFIG_FILE_NAME: &str = "sweep.toml";
