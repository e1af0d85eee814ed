//! Sweep driver.
//!
//! The driver runs the configured strategy and, at every point of its
//! trajectory, the inner seed loop: one trial for each seed from 1 up to but
//! excluding the seed limit. How the resulting trials are scheduled is
//! decided by the [`DispatchMode`], what happens after a failed trial by the
//! [`FailurePolicy`].
//!
//! [`DispatchMode`]: ../config/enum.DispatchMode.html
//! [`FailurePolicy`]: ../config/enum.FailurePolicy.html

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DispatchConfig, DispatchMode, FailurePolicy, SweepConfig};
use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::runner::{Launch, Trial, TrialHandle, TrialOutcome, TrialStatus};
use crate::state::ParameterState;
use crate::strategy::Strategy;

/// Why the sweep stopped launching trials.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Trajectory exhausted
    Completed,
    /// A trial failed under the `halt` policy
    Halted,
    /// The interrupt flag was cleared
    Interrupted,
}

/// Everything that happened during a sweep run.
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub strategy: Strategy,
    /// Number of trajectory points visited
    pub points: usize,
    /// Outcomes of all launched trials, in launch order
    pub outcomes: Vec<TrialOutcome>,
    pub stop: StopReason,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TrialOutcome> {
        self.outcomes.iter().filter(|o| !o.success())
    }
}

/// Runs the seed loop at the current sweep point.
///
/// Calls `each` with seeds `1..seed_limit` in ascending order and resets the
/// seed to 1 afterwards, also when `each` fails.
pub fn for_each_seed<F>(state: &mut ParameterState, mut each: F) -> Result<()>
where
    F: FnMut(&ParameterState) -> Result<()>,
{
    state.seed = 1;
    let mut result = Ok(());
    while state.seed < state.seed_limit {
        result = each(state);
        if result.is_err() {
            break;
        }
        state.seed += 1;
    }
    state.seed = 1;
    result
}

/// Drives a sweep, launching trials through `L`.
pub struct Driver<L: Launch> {
    config: SweepConfig,
    launcher: L,
    running: Option<Arc<AtomicBool>>,
}

impl<L: Launch> Driver<L> {
    pub fn new(config: SweepConfig, launcher: L) -> Driver<L> {
        Driver {
            config,
            launcher,
            running: None,
        }
    }

    /// Makes the driver stop launching new trials once `running` is set to
    /// false. Trials already launched are still waited for.
    pub fn with_interrupt(mut self, running: Arc<AtomicBool>) -> Driver<L> {
        self.running = Some(running);
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Lists the trials a run starting from `state` would launch, in order,
    /// without launching anything.
    pub fn plan(&self, state: &ParameterState) -> Result<Vec<Trial>> {
        let target = &self.config.target;
        let mut state = state.clone();
        let mut trials = Vec::new();
        let mut point = 0;
        self.config.strategy().sweep(&mut state, |state| {
            for_each_seed(state, |state| {
                trials.push(Trial {
                    number: trials.len(),
                    point,
                    state: state.clone(),
                    invocation: Invocation::build(state, target),
                });
                Ok(())
            })?;
            point += 1;
            Ok(())
        })?;
        Ok(trials)
    }

    /// Runs the full sweep, moving `state` along the trajectory.
    ///
    /// Returns once every launched trial has exited. Errors other than a
    /// halt or an interrupt are returned after outstanding trials are
    /// reaped.
    pub fn run(&mut self, state: &mut ParameterState) -> Result<SweepReport> {
        let strategy = self.config.strategy();
        let target = self.config.target.clone();
        let running = self.running.clone();
        let launcher = &mut self.launcher;
        let mut batch = Batch::new(self.config.dispatch.clone());

        info!(
            "starting {} sweep ({} dispatch, {} trials per point)",
            strategy,
            self.config.dispatch.mode,
            state.trials_per_point()
        );
        let started = Instant::now();
        let mut points = 0;
        let mut number = 0;
        let result = strategy.sweep(state, |state| {
            let point = points;
            points += 1;
            info!("sweep point {}: {}", point, state);
            for_each_seed(state, |state| {
                if let Some(running) = &running {
                    if !running.load(Ordering::SeqCst) {
                        return Err(Error::Interrupted);
                    }
                }
                let trial = Trial {
                    number,
                    point,
                    state: state.clone(),
                    invocation: Invocation::build(state, &target),
                };
                number += 1;
                batch.launch(launcher, trial)
            })
        });

        let stop = match result {
            Ok(()) => StopReason::Completed,
            Err(Error::Halted(reason)) => {
                warn!("halting sweep: {}", reason);
                StopReason::Halted
            }
            Err(Error::Interrupted) => {
                warn!("sweep interrupted, waiting for running trials");
                StopReason::Interrupted
            }
            Err(e) => {
                if let Err(drain_err) = batch.drain() {
                    error!("failed reaping trials: {}", drain_err);
                }
                return Err(e);
            }
        };
        batch.drain()?;

        let mut outcomes = batch.outcomes;
        outcomes.sort_by_key(|o| o.trial.number);
        Ok(SweepReport {
            strategy,
            points,
            outcomes,
            stop,
            elapsed: started.elapsed(),
        })
    }
}

/// Trials in flight together with the outcomes collected so far.
struct Batch {
    config: DispatchConfig,
    running: VecDeque<TrialHandle>,
    outcomes: Vec<TrialOutcome>,
    first_failure: Option<String>,
}

impl Batch {
    fn new(config: DispatchConfig) -> Batch {
        Batch {
            config,
            running: VecDeque::new(),
            outcomes: Vec::new(),
            first_failure: None,
        }
    }

    fn launch<L: Launch>(&mut self, launcher: &mut L, trial: Trial) -> Result<()> {
        match self.config.mode {
            DispatchMode::Serial => (),
            DispatchMode::Pooled => {
                self.reap_finished()?;
                while self.running.len() >= self.config.jobs.max(1) {
                    self.reap_oldest()?;
                }
            }
            DispatchMode::Detached => self.reap_finished()?,
        }
        self.check_halt()?;

        match launcher.launch(trial.clone()) {
            Ok(handle) => self.running.push_back(handle),
            Err(e @ Error::LaunchError { .. }) => {
                error!("trial {}: {}", trial.tag(), e);
                self.record(TrialOutcome {
                    trial,
                    status: TrialStatus::LaunchFailed(e.to_string()),
                    duration: Duration::from_secs(0),
                });
            }
            Err(e) => return Err(e),
        }

        if self.config.mode == DispatchMode::Serial {
            self.reap_oldest()?;
        }
        self.check_halt()
    }

    fn check_halt(&self) -> Result<()> {
        if self.config.on_failure == FailurePolicy::Halt {
            if let Some(failure) = &self.first_failure {
                return Err(Error::Halted(failure.clone()));
            }
        }
        Ok(())
    }

    fn record(&mut self, outcome: TrialOutcome) {
        if outcome.success() {
            info!(
                "trial {} finished in {:.2}s",
                outcome.trial.tag(),
                outcome.duration.as_secs_f32()
            );
        } else {
            warn!("trial {} failed: {}", outcome.trial.tag(), outcome.status);
            if self.first_failure.is_none() {
                self.first_failure =
                    Some(format!("trial {}: {}", outcome.trial.tag(), outcome.status));
            }
        }
        self.outcomes.push(outcome);
    }

    fn reap_oldest(&mut self) -> Result<()> {
        if let Some(handle) = self.running.pop_front() {
            let outcome = handle.wait()?;
            self.record(outcome);
        }
        Ok(())
    }

    /// Collects every trial that has already exited, without blocking.
    fn reap_finished(&mut self) -> Result<()> {
        let mut still_running = VecDeque::with_capacity(self.running.len());
        while let Some(mut handle) = self.running.pop_front() {
            if handle.try_status()?.is_some() {
                let outcome = handle.wait()?;
                self.record(outcome);
            } else {
                still_running.push_back(handle);
            }
        }
        self.running = still_running;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if !self.running.is_empty() {
            debug!("waiting for {} running trial(s)", self.running.len());
        }
        while !self.running.is_empty() {
            self.reap_oldest()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessRunner;
    use std::io;
    use std::path::PathBuf;

    /// Records every trial and finishes it immediately.
    #[derive(Default)]
    struct Recorder {
        trials: Vec<Trial>,
        failing_seeds: Vec<u32>,
        unlaunchable: bool,
        /// Clears the flag once this many trials were launched
        interrupt_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl Launch for Recorder {
        fn launch(&mut self, trial: Trial) -> Result<TrialHandle> {
            self.trials.push(trial.clone());
            if let Some((after, running)) = &self.interrupt_after {
                if self.trials.len() == *after {
                    running.store(false, Ordering::SeqCst);
                }
            }
            if self.unlaunchable {
                return Err(Error::LaunchError {
                    program: trial.invocation.program,
                    source: io::Error::new(io::ErrorKind::NotFound, "not found"),
                });
            }
            let status = if self.failing_seeds.contains(&trial.state.seed) {
                TrialStatus::Exited(1)
            } else {
                TrialStatus::Exited(0)
            };
            Ok(TrialHandle::finished(trial, status))
        }
    }

    fn sweep_config(strategy: Strategy, mode: DispatchMode, on_failure: FailurePolicy) -> SweepConfig {
        let mut config = SweepConfig::default();
        config.sweep.strategy = strategy;
        config.dispatch.mode = mode;
        config.dispatch.on_failure = on_failure;
        config
    }

    fn nodes_start() -> ParameterState {
        ParameterState {
            x_size: 2,
            y_size: 2,
            packet_interval: 0.01,
            ..Default::default()
        }
    }

    #[test]
    fn seed_loop_covers_range_and_resets() {
        let mut state = ParameterState {
            seed: 17,
            ..Default::default()
        };
        let mut seeds = Vec::new();
        for_each_seed(&mut state, |s| {
            seeds.push(s.seed);
            Ok(())
        })
        .unwrap();
        assert_eq!(seeds, (1..=32).collect::<Vec<u32>>());
        assert_eq!(state.seed, 1);
    }

    #[test]
    fn seed_loop_resets_after_error() {
        let mut state = ParameterState::default();
        let result = for_each_seed(&mut state, |s| {
            if s.seed == 4 {
                Err(Error::Interrupted)
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(state.seed, 1);
    }

    #[test]
    fn nodes_sweep_launches_2880_trials() {
        let config = sweep_config(Strategy::Nodes, DispatchMode::Serial, FailurePolicy::Continue);
        let mut driver = Driver::new(config, Recorder::default());
        let mut state = nodes_start();
        let report = driver.run(&mut state).unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.points, 90);
        assert_eq!(report.outcomes.len(), 2880);
        assert_eq!(report.succeeded(), 2880);
        assert_eq!(state.seed, 1);

        let trials = &driver.launcher().trials;
        for (point, chunk) in trials.chunks(32).enumerate() {
            let seeds: Vec<u32> = chunk.iter().map(|t| t.state.seed).collect();
            assert_eq!(seeds, (1..=32).collect::<Vec<u32>>());
            assert!(chunk.iter().all(|t| t.point == point));
        }
        for (i, trial) in trials.iter().enumerate() {
            assert_eq!(trial.number, i);
        }
    }

    #[test]
    fn runs_are_deterministic_and_match_plan() {
        let config = sweep_config(Strategy::Size, DispatchMode::Serial, FailurePolicy::Continue);
        let plan = Driver::new(config.clone(), Recorder::default())
            .plan(&ParameterState::default())
            .unwrap();
        assert_eq!(plan.len(), 6 * 32);

        let mut first = Driver::new(config.clone(), Recorder::default());
        first.run(&mut ParameterState::default()).unwrap();
        let mut second = Driver::new(config, Recorder::default());
        second.run(&mut ParameterState::default()).unwrap();

        let invocations = |trials: &[Trial]| {
            trials
                .iter()
                .map(|t| t.invocation.clone())
                .collect::<Vec<Invocation>>()
        };
        assert_eq!(invocations(&first.launcher().trials), invocations(&plan));
        assert_eq!(
            invocations(&first.launcher().trials),
            invocations(&second.launcher().trials)
        );
        assert_eq!(plan[0].invocation.program, PathBuf::from("../waf"));
        assert!(plan[33].invocation.args[1].contains("--packet-size=64 "));
        assert!(plan[33].invocation.args[1].contains("--seed=2 "));
    }

    #[test]
    fn halt_policy_stops_after_first_failure() {
        let config = sweep_config(Strategy::Interval, DispatchMode::Serial, FailurePolicy::Halt);
        let recorder = Recorder {
            failing_seeds: vec![3],
            ..Default::default()
        };
        let mut driver = Driver::new(config, recorder);
        let mut state = ParameterState::default();
        let report = driver.run(&mut state).unwrap();

        assert_eq!(report.stop, StopReason::Halted);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(state.seed, 1);
    }

    #[test]
    fn continue_policy_runs_everything() {
        let config = sweep_config(Strategy::Interval, DispatchMode::Pooled, FailurePolicy::Continue);
        let recorder = Recorder {
            failing_seeds: vec![3],
            ..Default::default()
        };
        let mut driver = Driver::new(config, recorder);
        let report = driver.run(&mut ParameterState::default()).unwrap();

        assert_eq!(report.stop, StopReason::Completed);
        assert_eq!(report.outcomes.len(), 320);
        assert_eq!(report.failures().count(), 10);
        assert!(report.failures().all(|o| o.trial.state.seed == 3));
    }

    #[test]
    fn launch_failures_follow_policy() {
        let recorder = Recorder {
            unlaunchable: true,
            ..Default::default()
        };
        let config = sweep_config(Strategy::Size, DispatchMode::Serial, FailurePolicy::Continue);
        let report = Driver::new(config, recorder)
            .run(&mut ParameterState::default())
            .unwrap();
        assert_eq!(report.outcomes.len(), 192);
        assert!(report.outcomes.iter().all(|o| match &o.status {
            TrialStatus::LaunchFailed(reason) => reason.contains("not found"),
            _ => false,
        }));

        let recorder = Recorder {
            unlaunchable: true,
            ..Default::default()
        };
        let config = sweep_config(Strategy::Size, DispatchMode::Serial, FailurePolicy::Halt);
        let report = Driver::new(config, recorder)
            .run(&mut ParameterState::default())
            .unwrap();
        assert_eq!(report.stop, StopReason::Halted);
        assert_eq!(report.outcomes.len(), 1);
    }

    #[test]
    fn cleared_flag_prevents_launches() {
        let config = sweep_config(Strategy::Nodes, DispatchMode::Serial, FailurePolicy::Continue);
        let running = Arc::new(AtomicBool::new(false));
        let mut driver = Driver::new(config, Recorder::default()).with_interrupt(running);
        let report = driver.run(&mut nodes_start()).unwrap();
        assert_eq!(report.stop, StopReason::Interrupted);
        assert!(report.outcomes.is_empty());
        assert!(driver.launcher().trials.is_empty());
    }

    #[test]
    fn clearing_flag_mid_sweep_stops_launching() {
        let config = sweep_config(Strategy::Nodes, DispatchMode::Serial, FailurePolicy::Continue);
        let running = Arc::new(AtomicBool::new(true));
        let recorder = Recorder {
            interrupt_after: Some((40, running.clone())),
            ..Default::default()
        };
        let mut driver = Driver::new(config, recorder).with_interrupt(running);
        let mut state = nodes_start();
        let report = driver.run(&mut state).unwrap();

        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.points, 2);
        assert_eq!(report.outcomes.len(), 40);
        assert_eq!(report.succeeded(), 40);
        assert_eq!(driver.launcher().trials.len(), 40);
        assert_eq!(state.seed, 1);
    }

    #[test]
    fn precondition_failure_launches_nothing() {
        let config = sweep_config(Strategy::Flows, DispatchMode::Serial, FailurePolicy::Continue);
        let mut driver = Driver::new(config, Recorder::default());
        let mut state = ParameterState {
            x_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            driver.run(&mut state),
            Err(Error::PreconditionFailed { .. })
        ));
        assert!(driver.launcher().trials.is_empty());
    }

    /// Runs every trial as a shell script instead of the simulator.
    #[cfg(unix)]
    struct Sleeper {
        runner: ProcessRunner,
        launched_at: Vec<Instant>,
        script: fn(&Trial) -> String,
    }

    #[cfg(unix)]
    impl Sleeper {
        fn new(script: fn(&Trial) -> String) -> Sleeper {
            Sleeper {
                runner: ProcessRunner::new(true),
                launched_at: Vec::new(),
                script,
            }
        }
    }

    #[cfg(unix)]
    impl Launch for Sleeper {
        fn launch(&mut self, mut trial: Trial) -> Result<TrialHandle> {
            let script = (self.script)(&trial);
            trial.invocation = Invocation::new("sh", vec!["-c".to_string(), script]);
            self.launched_at.push(Instant::now());
            self.runner.launch(trial)
        }
    }

    #[cfg(unix)]
    #[test]
    fn detached_dispatch_does_not_wait_for_children() {
        let config = sweep_config(Strategy::Size, DispatchMode::Detached, FailurePolicy::Continue);
        let sleeper = Sleeper::new(|_| "sleep 1; echo finished".to_string());
        let mut driver = Driver::new(config, sleeper);
        let mut state = ParameterState {
            seed_limit: 3,
            ..Default::default()
        };
        let report = driver.run(&mut state).unwrap();

        let launched_at = &driver.launcher().launched_at;
        assert_eq!(launched_at.len(), 12);
        // every trial was launched before the first one could have exited
        let spread = launched_at[11].duration_since(launched_at[0]);
        assert!(spread < Duration::from_millis(900), "spread: {:?}", spread);
        // but the driver still waited for all of them
        assert_eq!(report.succeeded(), 12);
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.duration >= Duration::from_millis(900)));
    }

    #[cfg(unix)]
    fn pool_dir() -> PathBuf {
        std::env::temp_dir().join(format!("meshsweep-pool-{}", std::process::id()))
    }

    #[cfg(unix)]
    #[test]
    fn pooled_dispatch_bounds_live_children() {
        // each child marks itself live in a shared directory and exits with
        // the number of other live children it saw on start
        let dir = pool_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = sweep_config(Strategy::Size, DispatchMode::Pooled, FailurePolicy::Continue);
        config.dispatch.jobs = 2;
        let sleeper = Sleeper::new(|trial| {
            let dir = pool_dir();
            format!(
                "n=$(ls {dir} | wc -l); touch {dir}/{id}; sleep 0.3; rm {dir}/{id}; exit $n",
                dir = dir.display(),
                id = trial.number
            )
        });
        let mut driver = Driver::new(config, sleeper);
        let mut state = ParameterState {
            seed_limit: 2,
            ..Default::default()
        };
        let report = driver.run(&mut state).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(report.outcomes.len(), 6);
        let seen: Vec<TrialStatus> = report.outcomes.iter().map(|o| o.status.clone()).collect();
        assert!(
            seen.iter()
                .all(|s| *s == TrialStatus::Exited(0) || *s == TrialStatus::Exited(1)),
            "{:?}",
            seen
        );
        // the pool was actually used
        assert!(seen.contains(&TrialStatus::Exited(1)), "{:?}", seen);
    }
}
