//! Bounded-timeout runners for the external transport programs.
//!
//! Everything that leaves this machine goes through `ssh`, `scp`, or a
//! `wget` launched on the remote host. Every invocation runs under a
//! timeout; a timeout is a transport failure, never a hang. The command
//! builders are plain functions so their quoting can be tested without a
//! network.

use crate::fingerprint::QUICK_WHOLE_LIMIT;
use crate::utils::MODEL_SUFFIXES;
use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{program} failed: {stderr}")]
    CommandFailed { program: String, stderr: String },

    #[error("{program} produced non-UTF-8 output")]
    InvalidUtf8 { program: String },

    #[error("Required program not found on PATH: {0}")]
    MissingProgram(String),
}

/// Timeouts for remote operations. Cheap to clone; one per run.
#[derive(Debug, Clone)]
pub struct Transport {
    /// TCP connect budget for ssh/scp.
    pub connect_timeout: Duration,
    /// Budget for one remote command (stat, digest, rm).
    pub command_timeout: Duration,
    /// Budget for one file download on the remote host.
    pub download_timeout: Duration,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(600),
            download_timeout: Duration::from_secs(3600),
        }
    }
}

impl Transport {
    /// Verify the external programs this tool shells out to are installed.
    pub fn preflight() -> Result<(), TransportError> {
        for program in ["ssh", "scp"] {
            which::which(program)
                .map_err(|_| TransportError::MissingProgram(program.to_string()))?;
        }
        Ok(())
    }

    /// Run a command on a remote host and return its stdout.
    pub async fn ssh(&self, target: &str, command: &str) -> Result<String, TransportError> {
        run("ssh", &self.ssh_args(target, command), self.command_timeout).await
    }

    /// Run a long-lived download command on a remote host.
    pub async fn ssh_download(&self, target: &str, command: &str) -> Result<String, TransportError> {
        run("ssh", &self.ssh_args(target, command), self.download_timeout).await
    }

    /// Copy a file between here and a remote host. Either side of the
    /// transfer may be a `host:path` spec, as with plain scp.
    pub async fn scp(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            from.to_string(),
            to.to_string(),
        ];
        run("scp", &args, self.command_timeout).await?;
        Ok(())
    }

    fn ssh_args(&self, target: &str, command: &str) -> Vec<String> {
        vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            target.to_string(),
            command.to_string(),
        ]
    }
}

async fn run(program: &str, args: &[String], budget: Duration) -> Result<String, TransportError> {
    let invocation = Command::new(program).args(args).kill_on_drop(true).output();
    let output = match timeout(budget, invocation).await {
        Ok(result) => result.map_err(|e| TransportError::Spawn {
            program: program.to_string(),
            source: e,
        })?,
        Err(_) => {
            return Err(TransportError::Timeout {
                program: program.to_string(),
                seconds: budget.as_secs(),
            })
        }
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(TransportError::CommandFailed {
            program: program.to_string(),
            stderr,
        });
    }
    String::from_utf8(output.stdout).map_err(|_| TransportError::InvalidUtf8 {
        program: program.to_string(),
    })
}

/// Quote a path for a remote POSIX shell. Remote hosts are always Linux,
/// whatever this machine is.
fn quote(path: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(path))
}

/// List model files directly inside a remote directory, one basename per
/// line.
#[must_use]
pub fn list_command(dir: &str) -> String {
    let names = MODEL_SUFFIXES
        .iter()
        .map(|suffix| format!("-name '*{suffix}'"))
        .collect::<Vec<_>>()
        .join(" -o ");
    format!(
        r"find {} -maxdepth 1 -type f \( {names} \) -printf '%f\n'",
        quote(dir)
    )
}

/// List files with one suffix directly inside a remote directory.
#[must_use]
pub fn list_suffix_command(dir: &str, suffix: &str) -> String {
    format!(
        r"find {} -maxdepth 1 -type f -name '*{suffix}' -printf '%f\n'",
        quote(dir)
    )
}

/// Count files with one suffix directly inside a remote directory.
#[must_use]
pub fn count_command(dir: &str, suffix: &str) -> String {
    format!(
        "find {} -maxdepth 1 -type f -name '*{suffix}' | wc -l",
        quote(dir)
    )
}

/// Size probe for one remote file.
#[must_use]
pub fn stat_size_command(path: &str) -> String {
    format!("stat -c %s {}", quote(path))
}

/// Full SHA-256 of one remote file.
#[must_use]
pub fn full_digest_command(path: &str) -> String {
    format!("sha256sum {}", quote(path))
}

/// Quick SHA-256 of one remote file: whole content up to the whole-file
/// limit, first and last 4096 bytes beyond it, matching the local
/// definition byte for byte.
#[must_use]
pub fn quick_digest_command(path: &str, size: u64) -> String {
    let path = quote(path);
    if size <= QUICK_WHOLE_LIMIT {
        format!("sha256sum {path}")
    } else {
        format!("{{ head -c 4096 {path}; tail -c 4096 {path}; }} | sha256sum")
    }
}

/// Batched removal of remote files.
#[must_use]
pub fn remove_command(paths: &[String]) -> String {
    let quoted: Vec<String> = paths.iter().map(|p| quote(p).into_owned()).collect();
    format!("rm -f {}", quoted.join(" "))
}

/// Existence probe, used before pulling a remote ledger. Exits zero either
/// way so absence is an answer rather than a command failure.
#[must_use]
pub fn exists_command(path: &str) -> String {
    format!("test -f {} && echo exists || true", quote(path))
}

/// Download of one file onto the remote host from the distribution
/// endpoint, overwriting any previous copy. Dot progress keeps remote
/// logs readable.
#[must_use]
pub fn download_command(url: &str, dest: &str) -> String {
    format!("wget --progress=dot:mega {} -O {}", quote(url), quote(dest))
}
