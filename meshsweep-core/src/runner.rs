//! Launching trials as child processes.
//!
//! [`ProcessRunner`] starts the simulator and returns right away. The child's
//! output streams are relayed line by line from dedicated threads, so the
//! sweep loop is never blocked by a running trial unless it explicitly waits
//! on the returned [`TrialHandle`].
//!
//! [`ProcessRunner`]: struct.ProcessRunner.html
//! [`TrialHandle`]: struct.TrialHandle.html

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::invocation::Invocation;
use crate::state::ParameterState;

/// Single invocation of the simulator with a fixed parameter snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    /// Launch order within the sweep, starting at 0
    pub number: usize,
    /// Index of the sweep point the trial belongs to
    pub point: usize,
    pub state: ParameterState,
    pub invocation: Invocation,
}

impl Trial {
    /// Short label used to tell relayed output of concurrent trials apart.
    pub fn tag(&self) -> String {
        format!("#{} seed={}", self.number, self.state.seed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialStatus {
    /// Process exited on its own with the given code
    Exited(i32),
    /// Process was terminated by a signal
    Signaled,
    /// Process could not be started
    LaunchFailed(String),
}

impl TrialStatus {
    fn from_exit_status(status: ExitStatus) -> TrialStatus {
        match status.code() {
            Some(code) => TrialStatus::Exited(code),
            None => TrialStatus::Signaled,
        }
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialStatus::Exited(code) => write!(f, "exit code {}", code),
            TrialStatus::Signaled => write!(f, "terminated by signal"),
            TrialStatus::LaunchFailed(reason) => write!(f, "launch failed: {}", reason),
        }
    }
}

/// Result of a finished trial.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub trial: Trial,
    pub status: TrialStatus,
    /// Wall-clock time between launch and exit
    pub duration: Duration,
}

impl TrialOutcome {
    pub fn success(&self) -> bool {
        self.status == TrialStatus::Exited(0)
    }
}

/// Something that can start trials.
///
/// The driver only talks to this trait, which allows swapping the process
/// runner for a recording double in tests.
pub trait Launch {
    /// Starts the trial and returns without waiting for it to finish.
    fn launch(&mut self, trial: Trial) -> Result<TrialHandle>;
}

enum Running {
    Process {
        child: Child,
        relays: Vec<JoinHandle<()>>,
    },
    Finished(TrialStatus),
}

/// Handle to a launched trial.
pub struct TrialHandle {
    trial: Trial,
    started: Instant,
    running: Running,
}

impl TrialHandle {
    /// Creates a handle for a trial that has already completed.
    pub fn finished(trial: Trial, status: TrialStatus) -> TrialHandle {
        TrialHandle {
            trial,
            started: Instant::now(),
            running: Running::Finished(status),
        }
    }

    pub fn trial(&self) -> &Trial {
        &self.trial
    }

    /// Checks whether the trial has finished, without blocking.
    pub fn try_status(&mut self) -> Result<Option<TrialStatus>> {
        match &mut self.running {
            Running::Process { child, .. } => {
                Ok(child.try_wait()?.map(TrialStatus::from_exit_status))
            }
            Running::Finished(status) => Ok(Some(status.clone())),
        }
    }

    /// Blocks until the trial exits and its output has been fully relayed.
    pub fn wait(self) -> Result<TrialOutcome> {
        let status = match self.running {
            Running::Process { mut child, relays } => {
                let exit = child.wait()?;
                for relay in relays {
                    if relay.join().is_err() {
                        warn!("output relay for trial {} panicked", self.trial.tag());
                    }
                }
                TrialStatus::from_exit_status(exit)
            }
            Running::Finished(status) => status,
        };
        Ok(TrialOutcome {
            trial: self.trial,
            status,
            duration: self.started.elapsed(),
        })
    }
}

/// Creates the writer a relay thread forwards child output to.
pub type OutputSink = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

fn stdout_sink() -> OutputSink {
    Arc::new(|| Box::new(io::stdout()))
}

/// Launches trials as child processes of the current process.
///
/// Both child streams end up on our own stdout, each line prefixed with the
/// stream it came from. On unix every child gets its own process group, so a
/// ctrl-c at the terminal reaches the sweep but not the running trials.
#[derive(Clone)]
pub struct ProcessRunner {
    /// Prefix relayed lines with the trial tag
    pub tag_output: bool,
    sink: OutputSink,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        ProcessRunner::new(false)
    }
}

impl fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("tag_output", &self.tag_output)
            .finish()
    }
}

impl ProcessRunner {
    pub fn new(tag_output: bool) -> ProcessRunner {
        ProcessRunner {
            tag_output,
            sink: stdout_sink(),
        }
    }

    /// Relays child output to writers made by `sink` instead of stdout.
    pub fn with_sink<F>(mut self, sink: F) -> ProcessRunner
    where
        F: Fn() -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        self.sink = Arc::new(sink);
        self
    }

    fn prefix(&self, trial: &Trial, stream: &str) -> String {
        if self.tag_output {
            format!("[{}] {}: ", trial.tag(), stream)
        } else {
            format!("{}: ", stream)
        }
    }

    fn spawn_relay<R: Read + Send + 'static>(
        &self,
        trial: &Trial,
        stream: &'static str,
        reader: R,
    ) -> io::Result<JoinHandle<()>> {
        let prefix = self.prefix(trial, stream);
        let mut out = (self.sink)();
        thread::Builder::new()
            .name(format!("relay-{}-{}", trial.number, stream))
            .spawn(move || {
                if let Err(e) = relay_lines(BufReader::new(reader), &prefix, &mut out) {
                    error!("failed relaying child {}: {}", stream, e);
                }
            })
    }
}

#[cfg(unix)]
fn detach_from_terminal(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn detach_from_terminal(_command: &mut Command) {}

impl Launch for ProcessRunner {
    fn launch(&mut self, trial: Trial) -> Result<TrialHandle> {
        let invocation = &trial.invocation;
        debug!("launching trial {}: {}", trial.tag(), invocation);
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        detach_from_terminal(&mut command);
        let mut child = command.spawn().map_err(|source| Error::LaunchError {
            program: invocation.program.clone(),
            source,
        })?;
        let started = Instant::now();

        let mut relays = Vec::with_capacity(2);
        let streams: Vec<(&'static str, Option<Box<dyn Read + Send>>)> = vec![
            (
                "stdout",
                child.stdout.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
            ),
            (
                "stderr",
                child.stderr.take().map(|s| Box::new(s) as Box<dyn Read + Send>),
            ),
        ];
        for (stream, reader) in streams {
            if let Some(reader) = reader {
                match self.spawn_relay(&trial, stream, reader) {
                    Ok(relay) => relays.push(relay),
                    Err(e) => {
                        error!("trial {}: can't start output relay: {}", trial.tag(), e);
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(Error::IoError(e));
                    }
                }
            }
        }

        Ok(TrialHandle {
            trial,
            started,
            running: Running::Process { child, relays },
        })
    }
}

/// Copies `reader` to `out` line by line, prefixing every line.
///
/// Invalid UTF-8 is replaced rather than rejected. Returns the number of
/// lines written.
pub fn relay_lines<R: Read, W: Write>(
    mut reader: BufReader<R>,
    prefix: &str,
    out: &mut W,
) -> io::Result<usize> {
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        writeln!(out, "{}{}", prefix, line.trim_end_matches(&['\r', '\n'][..]))?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}
