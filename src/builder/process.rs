//! Subprocess helpers for build tools
//!
//! All build-tool invocations block the calling thread with a bounded
//! timeout and capture combined stdout/stderr so diagnostic files can be
//! written on failure.

use std::env;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{BuildToolError, CapturedOutput};

/// How often a waited-on child is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a command to completion, capturing combined output.
///
/// On timeout the child is killed and reaped before returning, so no zombie
/// outlives the call. A non-zero exit is reported in the returned
/// [`CapturedOutput`], never as an error.
pub fn run_captured(
    cmd: Command,
    tool: &str,
    timeout: Duration,
) -> Result<CapturedOutput, BuildToolError> {
    run_inner(cmd, tool, timeout, true)
}

/// Like [`run_captured`] but with stderr discarded, for callers that parse
/// stdout and must not see diagnostic chatter mixed in.
pub fn run_stdout_only(
    cmd: Command,
    tool: &str,
    timeout: Duration,
) -> Result<CapturedOutput, BuildToolError> {
    run_inner(cmd, tool, timeout, false)
}

fn run_inner(
    mut cmd: Command,
    tool: &str,
    timeout: Duration,
    merge_stderr: bool,
) -> Result<CapturedOutput, BuildToolError> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(
        if merge_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        },
    );

    let mut child = cmd.spawn().map_err(|source| BuildToolError::Launch {
        tool: tool.to_string(),
        source,
    })?;

    let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
    let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BuildToolError::Timeout {
                        tool: tool.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    };

    let mut text = join_reader(stdout_reader);
    text.push_str(&join_reader(stderr_reader));

    Ok(CapturedOutput {
        text,
        status: status.code(),
    })
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Locate a program on PATH, like `which(1)`.
pub fn which(program: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
