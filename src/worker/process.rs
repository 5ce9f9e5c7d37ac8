//! Supervision of the synthesis worker subprocess.
//!
//! `WorkerProcess` owns the child and its channel. The worker is started on
//! the first call, restarted on the next call after a crash or timeout, and
//! always reaped on `stop`.

use crate::config::WorkerConfig;
use crate::defaults;
use crate::error::{NarratorError, Result};
use crate::worker::channel::WorkerChannel;
use crate::worker::protocol::{Payload, SynthesisRequest, SynthesisResponse};
use crate::worker::synthesizer::{SynthesizedSegment, Synthesizer};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

/// Program and arguments that launch the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `<interpreter> <script> <args...>`
    pub fn from_config(worker: &WorkerConfig) -> Self {
        let mut args = vec![worker.script.display().to_string()];
        args.extend(worker.args.iter().cloned());
        Self::new(worker.interpreter.clone(), args)
    }
}

impl fmt::Display for WorkerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Lifecycle of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running,
    Exited,
}

struct RunningWorker {
    child: Child,
    channel: WorkerChannel,
    stderr_task: Option<JoinHandle<()>>,
}

/// Handle to the worker subprocess.
pub struct WorkerProcess {
    command: WorkerCommand,
    request_timeout: Option<Duration>,
    quit_timeout: Duration,
    exit_grace: Duration,
    running: Option<RunningWorker>,
    state: WorkerState,
    starts: usize,
}

impl WorkerProcess {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            command,
            request_timeout: None,
            quit_timeout: Duration::from_secs(defaults::WORKER_QUIT_TIMEOUT_SECS),
            exit_grace: Duration::from_secs(defaults::WORKER_EXIT_GRACE_SECS),
            running: None,
            state: WorkerState::NotStarted,
            starts: 0,
        }
    }

    /// Fail a call that gets no reply within `timeout`. `None` waits forever.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// How long `stop` waits for the quit acknowledgement and then for the exit.
    pub fn with_shutdown_timeouts(mut self, quit: Duration, exit_grace: Duration) -> Self {
        self.quit_timeout = quit;
        self.exit_grace = exit_grace;
        self
    }

    pub fn command(&self) -> &WorkerCommand {
        &self.command
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// How many times the worker has been spawned.
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// OS process id of the running worker.
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|w| w.child.id())
    }

    /// Start the worker unless a live one is already running.
    pub async fn start(&mut self) -> Result<()> {
        self.ensure_started().await.map(|_| ())
    }

    /// Send one request and wait for its reply.
    ///
    /// # Errors
    /// - `WorkerSpawn` if the worker could not be started
    /// - `WorkerExited` if it died before answering; the next call restarts it
    /// - `WorkerTimeout` if the request timeout elapsed; the worker is killed
    pub async fn call(&mut self, payload: Payload) -> Result<SynthesisResponse> {
        let request_timeout = self.request_timeout;
        let worker = self.ensure_started().await?;

        let result = match request_timeout {
            Some(limit) => tokio::time::timeout(limit, worker.channel.call(payload))
                .await
                .unwrap_or(Err(NarratorError::WorkerTimeout { timeout: limit })),
            None => worker.channel.call(payload).await,
        };

        match &result {
            Err(NarratorError::WorkerTimeout { timeout }) => {
                tracing::warn!(
                    "Worker unresponsive after {}, killing it",
                    humantime::format_duration(*timeout)
                );
                self.kill().await;
            }
            Err(NarratorError::WorkerExited | NarratorError::WorkerWrite { .. }) => {
                self.reap().await;
            }
            _ => {}
        }
        result
    }

    /// Ask the worker to quit, then make sure it is gone.
    ///
    /// Never started is a no-op. A worker that ignores `quit` or keeps
    /// running after its input closes is killed.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut worker) = self.running.take() else {
            return Ok(());
        };

        if !worker.channel.is_closed() {
            match tokio::time::timeout(self.quit_timeout, worker.channel.call(Payload::Quit)).await
            {
                Ok(Ok(ack)) => tracing::debug!(command = ?ack.command, "Worker acknowledged quit"),
                Ok(Err(e)) => tracing::debug!("Quit not acknowledged: {e}"),
                Err(_) => tracing::warn!(
                    "Worker did not acknowledge quit within {}s",
                    self.quit_timeout.as_secs()
                ),
            }
        }
        worker.channel.close_input().await;

        let status = wait_or_kill(&mut worker.child, self.exit_grace).await;
        log_exit(status);
        finish_stderr(worker.stderr_task).await;
        self.state = WorkerState::Exited;
        Ok(())
    }

    async fn ensure_started(&mut self) -> Result<&mut RunningWorker> {
        let worker = match self.running.take() {
            Some(worker) if !worker.channel.is_closed() => worker,
            Some(crashed) => {
                self.reap_worker(crashed).await;
                tracing::info!("Restarting synthesis worker");
                self.spawn()?
            }
            None => self.spawn()?,
        };
        Ok(self.running.insert(worker))
    }

    fn spawn(&mut self) -> Result<RunningWorker> {
        let spawn_error = |message: String| NarratorError::WorkerSpawn {
            message: format!("{}: {}", self.command, message),
        };

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|s| tokio::spawn(forward_stderr(s)));

        tracing::info!(pid = child.id(), command = %self.command, "Synthesis worker started");
        self.starts += 1;
        self.state = WorkerState::Running;

        Ok(RunningWorker {
            child,
            channel: WorkerChannel::new(stdout, stdin),
            stderr_task,
        })
    }

    async fn reap(&mut self) {
        if let Some(worker) = self.running.take() {
            self.reap_worker(worker).await;
        }
    }

    async fn reap_worker(&mut self, mut worker: RunningWorker) {
        drop(worker.channel);
        let status = wait_or_kill(&mut worker.child, self.exit_grace).await;
        log_exit(status);
        finish_stderr(worker.stderr_task).await;
        self.state = WorkerState::Exited;
    }

    async fn kill(&mut self) {
        let Some(mut worker) = self.running.take() else {
            return;
        };
        drop(worker.channel);
        if let Err(e) = worker.child.kill().await {
            tracing::warn!("Failed to kill synthesis worker: {e}");
        }
        log_exit(worker.child.try_wait().ok().flatten());
        finish_stderr(worker.stderr_task).await;
        self.state = WorkerState::Exited;
    }
}

#[async_trait::async_trait]
impl Synthesizer for WorkerProcess {
    async fn synthesize(&mut self, request: SynthesisRequest) -> Result<SynthesizedSegment> {
        let response = self.call(Payload::Synthesize(request.clone())).await?;
        SynthesizedSegment::from_response(&request, response)
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stop().await
    }
}

async fn wait_or_kill(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            tracing::warn!("Failed to wait for synthesis worker: {e}");
            None
        }
        Err(_) => {
            tracing::warn!(
                "Synthesis worker still running after {}s, killing it",
                grace.as_secs()
            );
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill synthesis worker: {e}");
            }
            child.try_wait().ok().flatten()
        }
    }
}

fn log_exit(status: Option<ExitStatus>) {
    match status {
        Some(status) if status.success() => tracing::info!("Synthesis worker exited"),
        Some(status) => tracing::warn!(code = status.code(), "Synthesis worker exited with {status}"),
        None => tracing::warn!("Synthesis worker exit status unknown"),
    }
}

async fn finish_stderr(task: Option<JoinHandle<()>>) {
    let Some(task) = task else {
        return;
    };
    // A grandchild may still hold stderr open
    if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
        tracing::debug!("Worker stderr still open, detaching");
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "narrator::worker", "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: "narrator::worker", "stderr read failed: {e}");
                break;
            }
        }
    }
}
