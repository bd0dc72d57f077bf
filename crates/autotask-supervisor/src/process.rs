//! Worker process control.
//!
//! The supervisor only talks to [`ProcessManager`]; [`CommandProcessManager`]
//! is the OS implementation that re-executes a binary in worker mode.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use autotask_core::{config::WORKER_PROCESS_ENV, AutotaskConfig};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{Result, SupervisorError};

/// Spawns, probes and stops worker processes.
#[async_trait]
pub trait ProcessManager: Send + Sync + 'static {
    type Process: Send;

    async fn spawn(&self) -> Result<Self::Process>;

    /// False once the process has exited.
    async fn is_alive(&self, process: &mut Self::Process) -> bool;

    /// Ask the process to stop and wait for it to exit.
    async fn terminate(&self, process: &mut Self::Process);
}

/// Runs workers as child processes of the current one.
#[derive(Debug, Clone)]
pub struct CommandProcessManager {
    executable: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    grace: Duration,
}

impl CommandProcessManager {
    pub fn new(executable: impl Into<PathBuf>, args: Vec<String>, grace: Duration) -> Self {
        Self {
            executable: executable.into(),
            args,
            working_dir: None,
            grace,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Put `args` in front of the configured worker arguments.
    pub fn with_leading_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        let mut all: Vec<String> = args.into_iter().collect();
        all.append(&mut self.args);
        self.args = all;
        self
    }

    /// Build from `[worker]` and `[supervisor]`; without an explicit
    /// executable the current binary is re-executed.
    pub fn from_config(config: &AutotaskConfig) -> Result<Self> {
        let executable = match &config.worker.executable {
            Some(path) => PathBuf::from(path),
            None => std::env::current_exe()?,
        };
        let mut manager = Self::new(
            executable,
            config.worker.args.clone(),
            config.supervisor.terminate_grace(),
        );
        if let Some(dir) = &config.worker.working_dir {
            manager = manager.with_working_dir(dir);
        }
        Ok(manager)
    }
}

#[async_trait]
impl ProcessManager for CommandProcessManager {
    type Process = Child;

    async fn spawn(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&self.args)
            .env(WORKER_PROCESS_ENV, "1")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let child = cmd.spawn().map_err(|e| {
            SupervisorError::Spawn(format!("{}: {e}", self.executable.display()))
        })?;
        info!(pid = child.id(), executable = %self.executable.display(), "worker spawned");
        Ok(child)
    }

    async fn is_alive(&self, child: &mut Child) -> bool {
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(pid = child.id(), %status, "worker exited");
                false
            }
            Err(e) => {
                warn!("cannot poll worker: {e}");
                false
            }
        }
    }

    async fn terminate(&self, child: &mut Child) {
        let Some(pid) = child.id() else {
            // already reaped
            return;
        };
        send_sigterm(pid);
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => debug!(pid, %status, "worker stopped"),
            Ok(Err(e)) => warn!(pid, "waiting for worker failed: {e}"),
            Err(_) => {
                warn!(pid, grace_ms = self.grace.as_millis() as u64, "worker ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    warn!(pid, "kill failed: {e}");
                }
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    // Safety: pid is a child we have not reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        warn!(pid, "SIGTERM failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {
    // No SIGTERM; the grace timeout falls through to a hard kill.
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Default)]
    pub struct FakeState {
        pub spawned: usize,
        /// Liveness by process id; flip to false to simulate a crash.
        pub alive: Vec<bool>,
        pub terminated: Vec<usize>,
    }

    /// In-memory stand-in: processes are indices into `FakeState::alive`.
    #[derive(Clone, Default)]
    pub struct FakeProcessManager {
        pub state: Arc<Mutex<FakeState>>,
    }

    #[async_trait]
    impl ProcessManager for FakeProcessManager {
        type Process = usize;

        async fn spawn(&self) -> Result<usize> {
            let mut state = self.state.lock().unwrap();
            state.spawned += 1;
            state.alive.push(true);
            Ok(state.alive.len() - 1)
        }

        async fn is_alive(&self, process: &mut usize) -> bool {
            self.state.lock().unwrap().alive[*process]
        }

        async fn terminate(&self, process: &mut usize) {
            let mut state = self.state.lock().unwrap();
            state.alive[*process] = false;
            state.terminated.push(*process);
        }
    }
}
