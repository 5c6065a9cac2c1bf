//! Concurrent stage runner
//!
//! Spawns a chain of external processes and waits for all of them together.
//! Between two stages a relay thread copies the producer's stdout into the
//! consumer's stdin through a fixed buffer, counting the bytes as they pass.
//! Bytes reach the consumer (and finally the destination file) in the order
//! they are emitted. Failure is decided by inspecting every stage, never
//! just the last.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, ExitStatus, Stdio};
use std::thread;

use serde::Serialize;
use tracing::{debug, info};

use super::command::CommandSpec;
use crate::error::{VaultError, VaultResult};

/// Diagnostic lines kept per stage when reporting a failure
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Longest stderr line kept; longer lines are split
const MAX_DIAGNOSTIC_LINE_BYTES: u64 = 4096;

const RELAY_BUFFER_SIZE: usize = 64 * 1024;

/// Termination status of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    /// Stage name (program basename)
    pub stage: String,
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed
    pub signal: Option<i32>,
    /// Bytes handed to the next stage (unset for the last stage)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_out: Option<u64>,
    /// The last non-blank lines the stage wrote to stderr
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl StageStatus {
    /// Status of a stage that exited with `code`
    pub fn exited(stage: impl Into<String>, code: i32) -> Self {
        Self {
            stage: stage.into(),
            code: Some(code),
            signal: None,
            bytes_out: None,
            stderr: String::new(),
        }
    }

    fn from_exit(stage: String, status: ExitStatus, stderr: String) -> Self {
        Self {
            stage,
            code: status.code(),
            signal: exit_signal(&status),
            bytes_out: None,
            stderr,
        }
    }

    /// Whether the stage exited with status zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit status as a shell would report it (128 + signal when killed)
    pub fn exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }

    /// The last few stderr lines, each tagged with the stage name
    pub fn diagnostics(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
        lines[start..]
            .iter()
            .map(|line| format!("[{}] {}", self.stage, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// The stage that decides a pipeline's outcome: the rightmost failed stage
///
/// A producer failure leaves the consumer reading a clean EOF (exit 0), so
/// the producer is reported; a consumer failure kills the producer with
/// SIGPIPE, so the consumer is reported.
pub fn deciding_failure(stages: &[StageStatus]) -> Option<&StageStatus> {
    stages.iter().rev().find(|s| !s.success())
}

/// Turn a failed stage into a `Stage` error carrying every stage's diagnostics
pub fn stage_error(failed: &StageStatus, stages: &[StageStatus]) -> VaultError {
    let diagnostics = stages
        .iter()
        .map(StageStatus::diagnostics)
        .filter(|d| !d.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    VaultError::Stage {
        stage: failed.stage.clone(),
        code: failed.exit_code(),
        diagnostics,
    }
}

/// A chain of stages connected stdout-to-stdin
#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<CommandSpec>,
}

impl Pipeline {
    /// Start a pipeline with its first stage
    pub fn new(first: CommandSpec) -> Self {
        Self {
            stages: vec![first],
        }
    }

    /// Append a stage, or nothing for a passthrough
    pub fn then(mut self, next: Option<CommandSpec>) -> Self {
        self.stages.extend(next);
        self
    }

    /// The configured stages, in data-flow order
    pub fn stages(&self) -> &[CommandSpec] {
        &self.stages
    }

    /// Run every stage concurrently and wait for all of them
    ///
    /// `input` feeds the first stage and `output` receives the last stage's
    /// stdout. The tail of every stage's stderr is captured. If any stage
    /// cannot be spawned, stages already started are killed and reaped
    /// before the `Spawn` error is returned.
    pub fn run(&self, input: Stdio, output: Stdio) -> VaultResult<Vec<StageStatus>> {
        let mut children: Vec<(String, Child)> = Vec::with_capacity(self.stages.len());
        let mut input = Some(input);
        let mut output = Some(output);
        let last = self.stages.len().saturating_sub(1);

        for (i, spec) in self.stages.iter().enumerate() {
            info!(stage = %spec.stage_name(), command = %spec, "starting stage");

            let stdin = if i == 0 {
                input.take().unwrap_or_else(Stdio::null)
            } else {
                Stdio::piped()
            };
            let stdout = if i == last {
                output.take().unwrap_or_else(Stdio::null)
            } else {
                Stdio::piped()
            };

            // `cmd` owns the caller's file handles and is dropped at the end
            // of this iteration, so only the child keeps them open
            let mut cmd = spec.to_command();
            cmd.stdin(stdin).stdout(stdout).stderr(Stdio::piped());

            let child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    abort(children);
                    return Err(VaultError::Spawn {
                        program: spec.program().to_string(),
                        message: e.to_string(),
                    });
                }
            };

            debug!(stage = %spec.stage_name(), pid = child.id(), "stage spawned");
            children.push((spec.stage_name(), child));
        }

        wait_all(children)
    }
}

/// Relay between neighbouring stages and wait for every stage at once
///
/// Each stage gets a thread that keeps the tail of its stderr and then reaps
/// it; each pair of neighbours gets a relay thread. All of them run together.
fn wait_all(mut children: Vec<(String, Child)>) -> VaultResult<Vec<StageStatus>> {
    let links: Vec<(Option<ChildStdout>, Option<ChildStdin>)> = (1..children.len())
        .map(|i| {
            let reader = children[i - 1].1.stdout.take();
            let writer = children[i].1.stdin.take();
            (reader, writer)
        })
        .collect();

    thread::scope(|scope| -> VaultResult<Vec<StageStatus>> {
        let relays: Vec<_> = links
            .into_iter()
            .map(|link| {
                scope.spawn(move || match link {
                    (Some(reader), Some(writer)) => relay(reader, writer),
                    _ => 0,
                })
            })
            .collect();

        let waiters: Vec<_> = children
            .into_iter()
            .map(|(stage, mut child)| {
                scope.spawn(move || -> VaultResult<StageStatus> {
                    let stderr = child.stderr.take().map(stderr_tail).unwrap_or_default();
                    let status = child.wait().map_err(|e| {
                        VaultError::Io(format!("Failed to wait for {}: {}", stage, e))
                    })?;
                    Ok(StageStatus::from_exit(stage, status, stderr))
                })
            })
            .collect();

        let counts: Vec<u64> = relays
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .collect();

        let mut statuses = waiters
            .into_iter()
            .map(|handle| -> VaultResult<StageStatus> {
                handle
                    .join()
                    .map_err(|_| VaultError::Io("Stage watcher thread panicked".into()))?
            })
            .collect::<VaultResult<Vec<_>>>()?;

        for (status, count) in statuses.iter_mut().zip(counts) {
            status.bytes_out = Some(count);
        }
        Ok(statuses)
    })
}

/// Copy producer output into the consumer, returning the bytes delivered
///
/// Ends at producer EOF or when the consumer stops reading. Both pipe ends
/// are closed on return, so the consumer sees EOF and a still-writing
/// producer gets SIGPIPE.
fn relay(mut reader: ChildStdout, mut writer: ChildStdin) -> u64 {
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "relay read failed");
                break;
            }
        };
        if let Err(e) = writer.write_all(&buf[..n]) {
            debug!(error = %e, delivered = total, "consumer stopped reading");
            break;
        }
        total += n as u64;
    }

    total
}

/// Drain a stage's stderr, keeping only the last non-blank lines
fn stderr_tail(stderr: ChildStderr) -> String {
    let mut reader = BufReader::new(stderr);
    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader
            .by_ref()
            .take(MAX_DIAGNOSTIC_LINE_BYTES)
            .read_until(b'\n', &mut line)
        {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end();
        if text.trim().is_empty() {
            continue;
        }
        if tail.len() == DIAGNOSTIC_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(text.to_string());
    }

    Vec::from(tail).join("\n")
}

/// Kill and reap stages that were already started
fn abort(children: Vec<(String, Child)>) {
    for (stage, mut child) in children {
        if let Err(e) = child.kill() {
            debug!(stage = %stage, error = %e, "kill failed, stage already exited");
        }
        let _ = child.wait();
    }
}
