// src/runner.rs

//! Build step execution
//!
//! A build step is one shell command run inside the package source tree.
//! `ShellBuildRunner` runs it through bash, streaming stdout/stderr lines to
//! the progress tracker as they arrive.
//!
//! Each step runs in its own process group. If the step's future is dropped
//! before the command exits (another package in the batch failed), the
//! whole group is killed so no build keeps writing into the output
//! directories after the operation has ended.

use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;

/// Trait for running a package's build commands
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run one build step of `package` in `workdir`
    ///
    /// `env` is added on top of the inherited environment. A non-zero exit
    /// is [`Error::BuildFailed`].
    async fn run_step(
        &self,
        package: &str,
        command: &str,
        workdir: &Path,
        env: &[(String, String)],
        progress: &dyn ProgressTracker,
    ) -> Result<()>;
}

/// Runs steps with `/bin/bash -c`
#[derive(Debug, Default)]
pub struct ShellBuildRunner;

impl ShellBuildRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Width of one streamed output line in the status display
const STATUS_WIDTH: usize = 64;

async fn pump<R: AsyncRead + Unpin>(
    reader: R,
    prefix: &str,
    progress: &dyn ProgressTracker,
) -> std::io::Result<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Some(line) = lines.next_line().await? {
        let shown: String = line.trim().chars().take(STATUS_WIDTH).collect();
        progress.set_message(&format!("{prefix}{shown}"));
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}

#[async_trait]
impl BuildRunner for ShellBuildRunner {
    async fn run_step(
        &self,
        package: &str,
        command: &str,
        workdir: &Path,
        env: &[(String, String)],
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        debug!("{}: running '{}' in {}", package, command, workdir.display());
        progress.set_message(&format!("==> {command}"));

        let mut cmd = Command::new("/bin/bash");
        cmd.arg("-c")
            .arg(command)
            .current_dir(workdir)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| Error::BuildFailed {
            package: package.to_string(),
            stderr: format!("failed to start '{command}': {e}"),
        })?;
        let mut group = GroupKiller::new(package, child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CommandFailed("build stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::CommandFailed("build stderr not captured".to_string()))?;

        let (out, err) = tokio::try_join!(pump(stdout, "", progress), pump(stderr, "! ", progress))?;
        let status = child.wait().await?;
        group.disarm();
        debug!("{}: '{}' exited with {} ({} bytes of output)", package, command, status, out.len());

        if !status.success() {
            return Err(Error::BuildFailed {
                package: package.to_string(),
                stderr: err,
            });
        }

        Ok(())
    }
}

/// Kills a step's process group when dropped before the step exits
struct GroupKiller {
    package: String,
    pgid: Option<u32>,
}

impl GroupKiller {
    fn new(package: &str, pgid: Option<u32>) -> Self {
        Self {
            package: package.to_string(),
            pgid,
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKiller {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        debug!("{}: build interrupted, killing process group {}", self.package, pgid);

        #[cfg(unix)]
        if let Ok(raw) = i32::try_from(pgid) {
            match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!("{}: failed to kill build processes: {}", self.package, e),
            }
        }
    }
}
