use std::ffi::OsStr;
use std::future::Future;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tokio::time;

/// Result of a bounded subprocess run.
#[derive(Debug)]
pub struct RunOutput {
    /// `None` when the child was killed on timeout.
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunOutput {
    fn timed_out_run() -> Self {
        RunOutput {
            status: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn timed_out(&self) -> bool {
        self.status.is_none()
    }

    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

impl From<Output> for RunOutput {
    fn from(output: Output) -> Self {
        RunOutput {
            status: Some(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Runs `program` with `args`, capturing both streams. Once `timeout`
/// elapses the child is killed and the call returns at once, even if
/// descendants of the child still hold its pipes open. Only spawn and wait
/// errors are returned as `Err`.
///
/// Blocking: call from a plain thread or a `spawn_blocking` task, never from
/// async code.
pub fn run_with_timeout<I, S>(program: &Path, args: I, timeout: Duration) -> io::Result<RunOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    block_on(async move {
        let child = command.spawn()?;
        // dropping the timed-out future drops the child, which kills it
        match time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map(RunOutput::from),
            Err(_) => Ok(RunOutput::timed_out_run()),
        }
    })
}

fn block_on<F: Future<Output = io::Result<RunOutput>>>(fut: F) -> io::Result<RunOutput> {
    match Handle::try_current() {
        Ok(handle) => handle.block_on(fut),
        Err(_) => Builder::new_current_thread().enable_all().build()?.block_on(fut),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn captures_exit_status_and_streams() {
        let out = run_with_timeout(
            Path::new("/bin/sh"),
            ["-c", "echo out; echo err >&2; exit 3"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!out.success());
        assert!(!out.timed_out());
        assert_eq!(out.status.and_then(|s| s.code()), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "out");
        assert_eq!(out.stderr_lossy(), "err");
    }

    #[test]
    fn kills_child_after_timeout() {
        let started = Instant::now();
        let out = run_with_timeout(
            Path::new("/bin/sh"),
            ["-c", "exec sleep 10"],
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(out.timed_out());
        assert!(!out.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn timeout_does_not_wait_for_grandchildren() {
        let started = Instant::now();
        let out = run_with_timeout(
            Path::new("/bin/sh"),
            ["-c", "sleep 5; true"],
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(out.timed_out());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_with_timeout(
            Path::new("/definitely/not/here"),
            ["-v"],
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
