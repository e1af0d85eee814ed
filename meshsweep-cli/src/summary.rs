//! End of sweep summary.

use colored::*;
use meshsweep::{StopReason, SweepReport};

/// Maximum number of failed trials listed individually.
const FAILURE_LIST_LIMIT: usize = 10;

pub fn print(report: &SweepReport) {
    println!("{}", render(report));
}

fn render(report: &SweepReport) -> String {
    let failed = report.outcomes.len() - report.succeeded();
    let stop = match report.stop {
        StopReason::Completed => "completed".green(),
        StopReason::Halted => "halted".red(),
        StopReason::Interrupted => "interrupted".yellow(),
    };
    let mut out = format!(
        "\n\
         Sweep {} (strategy: {})\n\
         -----------------------------------------\n\
         Sweep points visited: {}\n\
         Trials launched: {}\n\
         Succeeded: {}, failed: {}\n\
         Elapsed: {}.{:03}s",
        stop,
        report.strategy,
        report.points,
        report.outcomes.len(),
        report.succeeded(),
        if failed > 0 {
            failed.to_string().red()
        } else {
            failed.to_string().normal()
        },
        report.elapsed.as_secs(),
        report.elapsed.subsec_millis(),
    );
    for outcome in report.failures().take(FAILURE_LIST_LIMIT) {
        out.push_str(&format!(
            "\n   [{}] {} ({})",
            outcome.trial.tag(),
            outcome.status,
            outcome.trial.state
        ));
    }
    if failed > FAILURE_LIST_LIMIT {
        out.push_str(&format!("\n   ... and {} more", failed - FAILURE_LIST_LIMIT));
    }
    out
}
