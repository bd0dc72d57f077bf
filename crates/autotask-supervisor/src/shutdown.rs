//! OS signal wiring for the two process roles.
//!
//! | Role       | Stops on                  | Ignores |
//! |------------|---------------------------|---------|
//! | supervisor | SIGINT, SIGHUP, SIGTERM   |         |
//! | worker     | SIGTERM                   | SIGINT  |
//!
//! Workers share the terminal's process group, so a Ctrl-C reaches them too;
//! they ignore it and wait for the supervisor's SIGTERM instead.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Supervisor,
    Worker,
}

/// Cancel `token` when a stop signal for `role` arrives.
pub fn listen(role: Role, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = wait_for_signal(role) => match res {
                Ok(signal) => info!(?role, signal, "received stop signal, shutting down"),
                Err(e) => {
                    error!(?role, "cannot install signal handlers: {e}");
                    return;
                }
            },
            _ = token.cancelled() => return,
        }
        token.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal(role: Role) -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    match role {
        Role::Supervisor => {
            let mut hup = signal(SignalKind::hangup())?;
            tokio::select! {
                _ = int.recv() => Ok("SIGINT"),
                _ = hup.recv() => Ok("SIGHUP"),
                _ = term.recv() => Ok("SIGTERM"),
            }
        }
        Role::Worker => loop {
            tokio::select! {
                _ = term.recv() => return Ok("SIGTERM"),
                _ = int.recv() => info!("worker ignoring SIGINT, waiting for supervisor"),
            }
        },
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(_role: Role) -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn listener_exits_when_token_is_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let listener = listen(Role::Worker, token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener did not exit")
            .unwrap();
    }
}
