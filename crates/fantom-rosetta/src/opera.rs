// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Supervision of a local Opera node
//!
//! Each output stream of the node is drained by its own task and forwarded to the log.  Draining
//! carries on after shutdown is requested, as the node keeps logging while it exits.

use anyhow::{bail, Context};
use std::{path::Path, process::ExitStatus};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const OPERA_LOGGER: &str = "opera";
pub const OPERA_STDERR_LOGGER: &str = "opera err";

/// Runs `binary` with the space separated `arguments` until it exits or `shutdown` is cancelled
///
/// On cancellation the node is sent an interrupt, and this waits for it to exit and for both
/// of its streams to be drained.
pub async fn start_opera(
    binary: &Path,
    arguments: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<ExitStatus> {
    let mut child = Command::new(binary)
        .args(arguments.split_whitespace())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("unable to start Opera {}", binary.display()))?;

    let mut drains = JoinSet::new();
    let stdout = child.stdout.take().context("Opera stdout is not piped")?;
    let stderr = child.stderr.take().context("Opera stderr is not piped")?;
    drains.spawn(log_pipe(stdout, OPERA_LOGGER));
    drains.spawn(log_pipe(stderr, OPERA_STDERR_LOGGER));

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = shutdown.cancelled() => {
            info!("sending interrupt to Opera");
            interrupt(&mut child)?;
            child.wait().await?
        },
    };

    while let Some(drained) = drains.join_next().await {
        drained?;
    }
    info!("Opera exited with {}", status);
    Ok(status)
}

async fn log_pipe<R: AsyncRead + Unpin>(pipe: R, identifier: &'static str) {
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!("{} {}", identifier, line),
            Ok(None) => {
                info!("closing {}", identifier);
                return;
            },
            Err(err) => {
                warn!("closing {} {}", identifier, err);
                return;
            },
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> anyhow::Result<()> {
    // No id means the process was already reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if result != 0 {
        bail!(
            "unable to interrupt Opera: {}",
            std::io::Error::last_os_error()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> anyhow::Result<()> {
    child.start_kill().context("unable to stop Opera")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{os::unix::process::ExitStatusExt, time::Duration};

    #[tokio::test]
    async fn test_runs_until_exit() {
        let status = start_opera(Path::new("echo"), "hello from opera", CancellationToken::new())
            .await
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_interrupt_on_shutdown() {
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(start_opera(
            Path::new("sleep"),
            "30",
            shutdown.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();
        let status = tokio::time::timeout(Duration::from_secs(10), supervisor)
            .await
            .expect("Opera should stop after an interrupt")
            .unwrap()
            .unwrap();
        assert_eq!(status.signal(), Some(libc::SIGINT));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let error = start_opera(
            Path::new("/nonexistent/opera"),
            "",
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(error.to_string().contains("unable to start Opera"));
    }
}
