use std::process::Stdio;

use tokio::process::Command;

use crate::error::{FleetError, Result};

/// Thin adapter over process spawn and PID inspection. This is the only
/// place that asks the OS about a process; the scheduler consumes its
/// verdicts.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Launch `argv` detached in `dir` (empty inherits) and hand back the
    /// child PID. The child is never waited on here; the scheduler checks
    /// on it by PID at the next tick, and the runtime reaps it once it
    /// exits.
    pub fn spawn(&self, argv: &[String], dir: &str) -> Result<u32> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            FleetError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            }
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if !dir.is_empty() {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| FleetError::Spawn {
            command: argv.join(" "),
            source,
        })?;
        child.id().ok_or_else(|| FleetError::Spawn {
            command: argv.join(" "),
            source: std::io::Error::new(std::io::ErrorKind::Other, "pid unavailable"),
        })
    }

    /// First character of the OS status field for `pid`, via
    /// `ps -o stat= -p`. An absent PID (or a failed `ps`) is an empty
    /// string, not an error.
    pub async fn probe_state(&self, pid: u32) -> String {
        let output = match Command::new("ps")
            .args(["-o", "stat=", "-p", &pid.to_string()])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "ps invocation failed");
                return String::new();
            }
        };
        if !output.status.success() {
            return String::new();
        }

        let text = String::from_utf8_lossy(&output.stdout);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.eq_ignore_ascii_case("stat") {
                continue;
            }
            return line.chars().take(1).collect();
        }
        String::new()
    }

    /// A tracked child only counts as alive while running or in
    /// interruptible sleep; zombies and vanished PIDs are finished.
    pub async fn is_alive(&self, pid: u32) -> bool {
        matches!(self.probe_state(pid).await.as_str(), "R" | "S")
    }
}
