// src/exec/supervisor.rs

use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::RunStatus;
use crate::errors::EngineError;
use crate::progress::{ProgressParser, ProgressSnapshot};

/// The tool's well-known "partial transfer" exit code.
const PARTIAL_TRANSFER_EXIT_CODE: i32 = 23;

/// Upper bound on waiting for in-flight output chunks after process exit.
/// Bounds finalization latency, not operation latency.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const OUTPUT_CHANNEL_CAPACITY: usize = 64;

/// Outcome of one tool invocation.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub stdout: String,
    pub stderr: String,
    /// Non-empty stderr lines, in arrival order.
    pub errors: Vec<String>,
}

/// One chunk of captured output, tagged by stream.
#[derive(Debug)]
enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// Spawns the external tool and captures both output streams.
///
/// Capture design: one reader task per stream pushes line chunks into a
/// single bounded channel; one collector task exclusively owns the output
/// buffers and the progress parser, so no lock guards the buffers. The
/// channel closing (both readers done) is the signal that every in-flight
/// chunk has been applied; [`ProcessSupervisor::run`] waits for the
/// collector, bounded by [`DRAIN_TIMEOUT`], before reading the final
/// buffers. Reading earlier could tear a buffer still being appended to.
pub struct ProcessSupervisor {
    running: AtomicBool,
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
    progress_tx: watch::Sender<ProgressSnapshot>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        let (progress_tx, _) = watch::channel(ProgressSnapshot::default());
        Self {
            running: AtomicBool::new(false),
            cancel_tx: Mutex::new(None),
            progress_tx,
        }
    }

    /// Subscribe to progress snapshots for the current (or next) run.
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress_tx.subscribe()
    }

    /// Terminate the running subprocess, if any. Cooperative: the run
    /// resolves with a `Cancelled` status once the process is gone. No
    /// guarantee is made about partial-file state left behind.
    pub fn cancel(&self) {
        let sender = self.cancel_tx.lock().expect("cancel lock poisoned").take();
        if let Some(tx) = sender {
            debug!("cancellation requested");
            let _ = tx.send(());
        }
    }

    /// Run the tool with the given argv (index 0 is the binary) and resolve
    /// to a structured outcome. Fails with `AlreadyRunning` when a prior run
    /// on this supervisor has not completed.
    pub async fn run(&self, argv: &[String]) -> Result<InvocationOutcome, EngineError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }

        let result = self.run_inner(argv).await;

        *self.cancel_tx.lock().expect("cancel lock poisoned") = None;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, argv: &[String]) -> Result<InvocationOutcome, EngineError> {
        let (binary, args) = argv.split_first().ok_or_else(|| {
            EngineError::InvalidConfiguration("empty argv for tool invocation".to_string())
        })?;

        info!(binary = %binary, args = args.len(), "spawning sync tool");

        let mut child = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::ExecutionFailed { source })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (chunk_tx, chunk_rx) = mpsc::channel::<OutputChunk>(OUTPUT_CHANNEL_CAPACITY);

        if let Some(stdout) = stdout {
            let tx = chunk_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(OutputChunk::Stdout(line)).await.is_err() {
                        break;
                    }
                }
            });
        }

        if let Some(stderr) = stderr {
            let tx = chunk_tx.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if tx.send(OutputChunk::Stderr(line)).await.is_err() {
                        break;
                    }
                }
            });
        }

        // The readers hold the only remaining senders; the channel closes
        // when both streams hit EOF.
        drop(chunk_tx);

        let collector = self.spawn_collector(chunk_rx);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        *self.cancel_tx.lock().expect("cancel lock poisoned") = Some(cancel_tx);

        let (exit_code, cancelled) = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| EngineError::ExecutionFailed { source })?;
                (status.code(), false)
            }
            _ = cancel_rx => {
                warn!("terminating subprocess on cancellation");
                let _ = child.start_kill();
                let _ = child.wait().await;
                (None, true)
            }
        };

        // Drain-before-finalize: the readers see EOF once the process is
        // gone, the channel closes, and the collector returns the buffers it
        // owns. Only then are summary statistics computed.
        let (stdout_buf, stderr_buf) = match timeout(DRAIN_TIMEOUT, collector).await {
            Ok(Ok(buffers)) => buffers,
            Ok(Err(err)) => {
                warn!(error = %err, "output collector task failed; buffers lost");
                (String::new(), String::new())
            }
            Err(_) => {
                warn!(
                    timeout_secs = DRAIN_TIMEOUT.as_secs(),
                    "output drain timed out; finalizing with empty buffers"
                );
                (String::new(), String::new())
            }
        };

        let (files, bytes) = scan_summary(&stdout_buf);

        let status = if cancelled {
            RunStatus::Cancelled
        } else {
            match exit_code {
                Some(0) => RunStatus::Success,
                Some(PARTIAL_TRANSFER_EXIT_CODE) => RunStatus::PartialSuccess,
                Some(_) => RunStatus::Failed,
                // Abnormal termination without an exit code (signaled).
                None => RunStatus::Cancelled,
            }
        };

        let errors: Vec<String> = stderr_buf
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        info!(
            ?exit_code,
            %status,
            files,
            bytes,
            "sync tool exited"
        );

        Ok(InvocationOutcome {
            status,
            exit_code,
            files_transferred: files,
            bytes_transferred: bytes,
            stdout: stdout_buf,
            stderr: stderr_buf,
            errors,
        })
    }

    /// Single owner of the output buffers and the progress parser.
    fn spawn_collector(
        &self,
        mut chunk_rx: mpsc::Receiver<OutputChunk>,
    ) -> tokio::task::JoinHandle<(String, String)> {
        let progress_tx = self.progress_tx.clone();
        tokio::spawn(async move {
            let mut stdout_buf = String::new();
            let mut stderr_buf = String::new();
            let mut parser = ProgressParser::new();

            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    OutputChunk::Stdout(line) => {
                        // The reader splits on LF only; in-place progress
                        // updates are CR-separated inside one such line, and
                        // the latest update must win.
                        parser.feed(&line);
                        progress_tx.send_replace(parser.snapshot());
                        stdout_buf.push_str(&line);
                        stdout_buf.push('\n');
                    }
                    OutputChunk::Stderr(line) => {
                        stderr_buf.push_str(&line);
                        stderr_buf.push('\n');
                    }
                }
            }

            (stdout_buf, stderr_buf)
        })
    }
}

/// Scan captured output for the tool's summary-line markers and compute
/// total files/bytes transferred for this invocation.
fn scan_summary(output: &str) -> (u64, u64) {
    // "Number of regular files transferred: 42" (newer tools) or
    // "Number of files transferred: 42" (older), then
    // "Total transferred file size: 1,234 bytes", with
    // "sent 1,234 bytes  received 56 bytes" as the fallback byte source.
    let files_re = Regex::new(r"Number of (?:regular )?files transferred:\s*([\d,]+)").unwrap();
    let size_re = Regex::new(r"Total transferred file size:\s*([\d,]+)").unwrap();
    let sent_re = Regex::new(r"sent\s+([\d,]+)\s+bytes").unwrap();

    let mut files = 0u64;
    let mut bytes = 0u64;

    if let Some(caps) = files_re.captures(output) {
        files = parse_grouped_number(&caps[1]);
    }
    if let Some(caps) = size_re.captures(output) {
        bytes = parse_grouped_number(&caps[1]);
    } else if let Some(caps) = sent_re.captures(output) {
        bytes = parse_grouped_number(&caps[1]);
    }

    (files, bytes)
}

fn parse_grouped_number(s: &str) -> u64 {
    s.replace(',', "").parse().unwrap_or(0)
}
