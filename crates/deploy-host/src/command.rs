//! Running host commands with their output forwarded to tracing.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Builds and runs host commands, optionally through `sudo`.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    sudo: bool,
}

impl CommandRunner {
    /// Creates a runner. With `sudo` set, every command is prefixed with `sudo`.
    #[must_use]
    pub const fn new(sudo: bool) -> Self {
        Self { sudo }
    }

    /// Runs `program` with `args`, returning its standard output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits unsuccessfully.
    pub async fn run<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<String> {
        self.run_with_env(program, args, &[]).await
    }

    /// Like `run`, with extra environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits unsuccessfully.
    pub async fn run_with_env<S: AsRef<str>>(
        &self,
        program: &str,
        args: &[S],
        env: &[(&str, &str)],
    ) -> Result<String> {
        let mut cmd = if self.sudo {
            let mut cmd = Command::new("sudo");
            // Keep the environment we pass in.
            if !env.is_empty() {
                cmd.arg("--preserve-env");
            }
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        };

        cmd.args(args.iter().map(AsRef::as_ref));
        cmd.envs(env.iter().copied());

        let command_line = command_line(program, args);
        debug!("running `{}`", command_line);

        let output = cmd
            .output()
            .await
            .map_err(|e| Error::Io("failed to spawn host command", e))?;

        let target = Path::new(program)
            .file_name()
            .map_or_else(|| program.to_string(), |n| n.to_string_lossy().to_string());
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);

        for line in stdout.lines() {
            debug!(target: "placement_deploy_host::command", "{}: {}", target, line);
        }

        if !output.status.success() {
            for line in stderr.lines() {
                error!(target: "placement_deploy_host::command", "{}: {}", target, line);
            }

            return Err(Error::CommandFailed {
                command: command_line,
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// Writes `content` to `path`, through `sudo tee` when running with sudo.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if !self.sudo {
            return tokio::fs::write(path, content)
                .await
                .map_err(|e| Error::Io("failed to write file", e));
        }

        let mut child = Command::new("sudo")
            .arg("tee")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Io("failed to spawn sudo tee", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .await
                .map_err(|e| Error::Io("failed to write to sudo tee", e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::Io("failed to wait for sudo tee", e))?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: format!("sudo tee {}", path.display()),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

// Values following these flags never reach logs or errors.
const SECRET_FLAGS: &[&str] = &["--password"];

fn command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut parts = vec![program];
    let mut redact = false;

    for arg in args.iter().map(AsRef::as_ref) {
        parts.push(if redact { "****" } else { arg });
        redact = SECRET_FLAGS.contains(&arg);
    }

    parts.join(" ")
}
