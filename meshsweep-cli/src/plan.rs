//! Dry run of a sweep.

use meshsweep::{SweepConfig, Trial};

pub fn print(config: &SweepConfig, trials: &[Trial], count_only: bool) {
    print!("{}", render(config, trials, count_only));
}

fn render(config: &SweepConfig, trials: &[Trial], count_only: bool) -> String {
    let points = trials.last().map(|t| t.point + 1).unwrap_or(0);
    let mut out = format!(
        "\n\
         Sweep plan (strategy: {})\n\
         -----------------------------------------\n\
         Executable: {}\n\
         Sweep points: {}\n\
         Trials: {} ({} per point)\n",
        config.strategy(),
        config.target.executable.display(),
        points,
        trials.len(),
        config.initial.trials_per_point(),
    );
    if !count_only {
        out.push('\n');
        for trial in trials {
            out.push_str(&format!("{:>6}  {}\n", trial.number, trial.invocation));
        }
    }
    out
}
