//! Application definition.

extern crate simplelog;

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Error, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use meshsweep::{
    DispatchMode, Driver, FailurePolicy, ProcessRunner, StandardPhy, StopReason, Strategy,
    SweepConfig,
};

use self::simplelog::LevelFilter;
use crate::plan;
use crate::summary;
use crate::util;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &'static str = env!("CARGO_PKG_AUTHORS");

/// How many parent directories are searched for a config file.
const CONFIG_SEARCH_LEVELS: usize = 4;

fn sweep_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("strategy")
            .long("strategy")
            .short("s")
            .takes_value(true)
            .value_name("name")
            .possible_values(&["interval", "size", "nodes", "flows"])
            .help("Select the sweep strategy (defaults to nodes)"),
        Arg::with_name("executable")
            .long("executable")
            .short("e")
            .takes_value(true)
            .value_name("path")
            .help("Path to the simulation front-end (defaults to ../waf)"),
        Arg::with_name("seed-limit")
            .long("seed-limit")
            .takes_value(true)
            .value_name("n")
            .help("Exclusive upper bound of the seed loop run at every sweep point"),
        Arg::with_name("phy")
            .long("phy")
            .takes_value(true)
            .value_name("standard")
            .possible_values(&["1", "2", "3", "a", "b", "g"])
            .help("PHY standard: 1/a = 802.11a, 2/b = 802.11b, 3/g = 802.11g"),
    ]
}

pub fn app<'a, 'b>() -> App<'a, 'b> {
    let app = App::new("meshsweep")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .version(VERSION)
        .author(AUTHORS)
        .about("Run parameter sweeps over the mesh-RPG ns-3 scenario.")
        .arg(Arg::with_name("verbosity")
            .long("verbosity")
            .short("v")
            .takes_value(true)
            .default_value("info")
            .value_name("verb")
            .global(true)
            .help("Set the verbosity of the log output"))
        .arg(Arg::with_name("config")
            .long("config")
            .short("c")
            .takes_value(true)
            .value_name("path")
            .global(true)
            .help("Path to the sweep config file (defaults to the nearest sweep.toml)"))

        // run subcommand
        .subcommand(SubCommand::with_name("run")
            .display_order(10)
            .about("Run the sweep, launching one simulation per trial")
            .args(&sweep_args())
            .arg(Arg::with_name("dispatch")
                .long("dispatch")
                .short("d")
                .takes_value(true)
                .value_name("mode")
                .possible_values(&["serial", "pooled", "detached"])
                .help("How trial processes are scheduled"))
            .arg(Arg::with_name("jobs")
                .long("jobs")
                .short("j")
                .takes_value(true)
                .value_name("n")
                .help("Number of concurrent trials in pooled mode"))
            .arg(Arg::with_name("on-failure")
                .long("on-failure")
                .takes_value(true)
                .value_name("policy")
                .possible_values(&["continue", "halt"])
                .help("Keep sweeping or stop after a failed trial"))
            .arg(Arg::with_name("tag")
                .long("tag")
                .short("t")
                .help("Prefix relayed output with the trial number and seed"))
        )

        // plan subcommand
        .subcommand(SubCommand::with_name("plan")
            .display_order(11)
            .about("Print the invocations a run would launch, without launching anything")
            .args(&sweep_args())
            .arg(Arg::with_name("count")
                .long("count")
                .help("Only print the number of points and trials"))
        )

        // strategies subcommand
        .subcommand(SubCommand::with_name("strategies")
            .display_order(12)
            .about("List available sweep strategies")
        );

    app
}

pub fn init() -> ArgMatches<'static> {
    app().get_matches()
}

/// Runs based on specified subcommand, returning the process exit code.
pub fn start(matches: ArgMatches) -> Result<i32> {
    match matches.subcommand() {
        ("run", Some(m)) => start_run(m),
        ("plan", Some(m)) => start_plan(m),
        ("strategies", Some(_)) => {
            for strategy in Strategy::ALL.iter() {
                let default = if *strategy == Strategy::default() { " (default)" } else { "" };
                println!("{:<10}{}{}", strategy.name(), strategy.description(), default);
            }
            Ok(0)
        }
        _ => Ok(0),
    }
}

fn start_run(matches: &ArgMatches) -> Result<i32> {
    setup_log_verbosity(matches);
    let config = build_config(matches)?;
    let mut state = config.initial_state();

    // stop launching new trials on ctrl-c, let running ones finish
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let runner = ProcessRunner::new(config.dispatch.tags_output());
    let mut driver = Driver::new(config, runner).with_interrupt(running);
    let report = driver.run(&mut state)?;
    summary::print(&report);

    match report.stop {
        StopReason::Halted => Ok(1),
        StopReason::Completed | StopReason::Interrupted => Ok(0),
    }
}

fn start_plan(matches: &ArgMatches) -> Result<i32> {
    setup_log_verbosity(matches);
    let config = build_config(matches)?;
    let state = config.initial_state();
    let driver = Driver::new(config, ProcessRunner::default());
    let trials = driver.plan(&state)?;
    plan::print(driver.config(), &trials, matches.is_present("count"));
    Ok(0)
}

/// Loads the config file, if there is one, and applies command line
/// overrides on top of it.
pub(crate) fn build_config(matches: &ArgMatches) -> Result<SweepConfig> {
    let current_dir = env::current_dir()?;
    let mut config = match matches.value_of("config") {
        Some(p_str) => SweepConfig::from_file(util::resolve_path(&current_dir, p_str))?,
        None => match util::find_config_file(current_dir, CONFIG_SEARCH_LEVELS) {
            Some(path) => SweepConfig::from_file(path)?,
            None => {
                debug!("no config file found, using defaults");
                SweepConfig::default()
            }
        },
    };

    if let Some(s) = matches.value_of("strategy") {
        config.sweep.strategy = s.parse::<Strategy>()?;
    }
    if let Some(path) = matches.value_of("executable") {
        config.target.executable = path.into();
    }
    if let Some(n) = matches.value_of("seed-limit") {
        config.initial.seed_limit = n
            .parse::<u32>()
            .map_err(|e| Error::msg(format!("invalid seed limit `{}`: {}", n, e)))?;
    }
    if let Some(phy) = matches.value_of("phy") {
        config.initial.standard_phy = phy.parse::<StandardPhy>()?;
    }
    if let Some(mode) = matches.value_of("dispatch") {
        config.dispatch.mode = mode.parse::<DispatchMode>()?;
    }
    if let Some(n) = matches.value_of("jobs") {
        config.dispatch.jobs = n
            .parse::<usize>()
            .map_err(|e| Error::msg(format!("invalid job count `{}`: {}", n, e)))?;
    }
    if let Some(policy) = matches.value_of("on-failure") {
        config.dispatch.on_failure = policy.parse::<FailurePolicy>()?;
    }
    if matches.is_present("tag") {
        config.dispatch.tag_output = true;
    }

    config.validate()?;
    Ok(config)
}

fn setup_log_verbosity(matches: &ArgMatches) {
    use self::simplelog::TermLogger;
    let level_filter = match matches.value_of("verbosity") {
        Some(s) => match s {
            "0" | "none" => LevelFilter::Off,
            "1" | "err" | "error" | "min" => LevelFilter::Error,
            "2" | "warn" | "warning" | "default" => LevelFilter::Warn,
            "3" | "info" => LevelFilter::Info,
            "4" | "debug" => LevelFilter::Debug,
            "5" | "trace" | "max" | "all" => LevelFilter::Trace,
            _ => LevelFilter::Warn,
        },
        _ => LevelFilter::Warn,
    };
    let mut config_builder = simplelog::ConfigBuilder::new();
    let logger_conf = config_builder
        .set_time_level(LevelFilter::Error)
        .set_target_level(LevelFilter::Debug)
        .set_location_level(LevelFilter::Error)
        .set_time_format_str("%H:%M:%S%.6f")
        .build();
    if TermLogger::init(level_filter, logger_conf, simplelog::TerminalMode::Mixed).is_err() {
        eprintln!("failed initializing terminal logger");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub_matches(args: &[&str]) -> ArgMatches<'static> {
        let mut full = vec!["meshsweep"];
        full.extend_from_slice(args);
        let matches = app().get_matches_from_safe(full).unwrap();
        let (_, sub) = matches.subcommand();
        sub.cloned().unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let matches = sub_matches(&[
            "run",
            "--config",
            "/nonexistent/sweep.toml",
            "--strategy",
            "size",
        ]);
        assert!(build_config(&matches).is_err());

        let matches = sub_matches(&[
            "run",
            "-s",
            "flows",
            "-d",
            "pooled",
            "-j",
            "2",
            "--on-failure",
            "halt",
            "--seed-limit",
            "5",
            "--phy",
            "g",
            "-e",
            "/opt/ns3/waf",
        ]);
        let config = build_config(&matches).unwrap();
        assert_eq!(config.strategy(), Strategy::Flows);
        assert_eq!(config.dispatch.mode, DispatchMode::Pooled);
        assert_eq!(config.dispatch.jobs, 2);
        assert_eq!(config.dispatch.on_failure, FailurePolicy::Halt);
        assert_eq!(config.initial.seed_limit, 5);
        assert_eq!(config.initial.standard_phy, StandardPhy::G24GHz);
        assert_eq!(config.target.executable.to_str(), Some("/opt/ns3/waf"));
    }

    #[test]
    fn zero_jobs_rejected() {
        let matches = sub_matches(&["run", "-d", "pooled", "-j", "0"]);
        assert!(build_config(&matches).is_err());
    }

    #[test]
    fn unknown_strategy_rejected_by_parser() {
        let result = app().get_matches_from_safe(vec!["meshsweep", "plan", "-s", "experience"]);
        assert!(result.is_err());
    }
}
