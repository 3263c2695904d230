// ctx-assist-core/src/invocation/process.rs

//! [`Launcher`] backed by `tokio::process`.

use super::{Completion, InvocationRequest, LaunchedProcess, Launcher, Terminate};
use crate::errors::InvocationError;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Spawns the executable with piped stdout/stderr and no stdin.
///
/// Both streams are drained concurrently against one shared byte budget;
/// going over it kills the child and reports [`InvocationError::OutputLimit`].
/// A termination request kills the child and stops reading, so descendants
/// that inherited the pipes cannot hold the call open. The child is killed
/// on drop, so abandoning the completion future never leaves a process
/// behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl Launcher for TokioLauncher {
    fn launch(&self, request: &InvocationRequest<'_>) -> Result<LaunchedProcess, InvocationError> {
        let program = request.program_name();

        let mut command = Command::new(&request.executable);
        command
            .args(&request.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_directory {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| InvocationError::Spawn {
            program: program.clone(),
            source,
        })?;
        debug!(program = %program, pid = ?child.id(), "Process started.");

        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let completion =
            run_to_completion(program, child, kill_rx, request.limits.max_output_bytes);

        Ok(LaunchedProcess {
            completion: Box::pin(completion),
            terminator: Arc::new(KillSwitch { tx: kill_tx }),
        })
    }
}

struct KillSwitch {
    tx: mpsc::UnboundedSender<()>,
}

impl Terminate for KillSwitch {
    fn terminate(&self) {
        // The receiver is gone once the process has been reaped.
        let _ = self.tx.send(());
    }
}

async fn run_to_completion(
    program: String,
    mut child: Child,
    mut kill_rx: mpsc::UnboundedReceiver<()>,
    max_output_bytes: usize,
) -> Completion {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let budget = AtomicUsize::new(0);
    let overflow = CancellationToken::new();
    // Cancelled by overflow or by a kill request; ends both readers.
    let halt = overflow.child_token();

    let readers = async {
        tokio::join!(
            read_bounded(stdout_pipe, &budget, max_output_bytes, &overflow, &halt),
            read_bounded(stderr_pipe, &budget, max_output_bytes, &overflow, &halt),
        )
    };
    tokio::pin!(readers);

    let (stdout, stderr) = loop {
        tokio::select! {
            captured = &mut readers => break captured,
            Some(()) = kill_rx.recv() => {
                kill(&program, &mut child);
                halt.cancel();
            }
        }
    };

    if overflow.is_cancelled() {
        warn!(
            program = %program,
            limit = max_output_bytes,
            "Output limit exceeded; killing process."
        );
        kill(&program, &mut child);
    }

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(()) = kill_rx.recv() => kill(&program, &mut child),
        }
    };

    let (stdout, stdout_err) = split_read(stdout);
    let (stderr, stderr_err) = split_read(stderr);

    let exit_code = status.as_ref().ok().and_then(ExitStatus::code);
    let error = if overflow.is_cancelled() {
        Some(InvocationError::OutputLimit {
            program: program.clone(),
            limit: max_output_bytes,
        })
    } else {
        match (status, stdout_err.or(stderr_err)) {
            (Err(source), _) | (Ok(_), Some(source)) => Some(InvocationError::Io {
                program: program.clone(),
                source,
            }),
            (Ok(status), None) => exit_failure(&program, status),
        }
    };

    Completion {
        status: exit_code,
        error,
        stdout,
        stderr,
    }
}

fn kill(program: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        // Already exited; the wait below still reaps it.
        debug!(program = %program, error = %e, "Kill request failed.");
    }
}

fn split_read(read: io::Result<Vec<u8>>) -> (String, Option<io::Error>) {
    match read {
        Ok(bytes) => (String::from_utf8_lossy(&bytes).into_owned(), None),
        Err(e) => (String::new(), Some(e)),
    }
}

fn exit_failure(program: &str, status: ExitStatus) -> Option<InvocationError> {
    if status.success() {
        return None;
    }
    Some(match status.code() {
        Some(code) => InvocationError::Exit {
            program: program.to_string(),
            code,
        },
        None => InvocationError::Terminated {
            program: program.to_string(),
            signal: exit_signal(&status),
        },
    })
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Reads `reader` to EOF or until `halt` is cancelled, charging every byte
/// to `budget`. Once the budget passes `limit` the excess is dropped and
/// `overflow` is cancelled, which also halts the sibling reader. The pipe is
/// closed on return.
async fn read_bounded<R: AsyncRead + Unpin>(
    reader: Option<R>,
    budget: &AtomicUsize,
    limit: usize,
    overflow: &CancellationToken,
    halt: &CancellationToken,
) -> io::Result<Vec<u8>> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut buffer = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            _ = halt.cancelled() => break,
        };
        if read == 0 {
            break;
        }
        let total = budget.fetch_add(read, Ordering::SeqCst) + read;
        if total > limit {
            let keep = read.saturating_sub(total - limit);
            buffer.extend_from_slice(&chunk[..keep]);
            overflow.cancel();
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    Ok(buffer)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::cancellation::TokenCancellation;
    use crate::invocation::{invoke, InvocationLimits};
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn sh<'a>(script: &str) -> InvocationRequest<'a> {
        InvocationRequest::new("/bin/sh", ["-c", script])
    }

    #[tokio::test]
    async fn test_echo_success() {
        let output = invoke(&TokioLauncher, sh("echo hello world")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello world\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_stderr_is_success() {
        let output = invoke(&TokioLauncher, sh("echo '2 files drifted' >&2; exit 1"))
            .await
            .unwrap();
        assert_eq!(output.status, Some(1));
        assert_eq!(output.stdout, "");
        assert_eq!(output.stderr, "2 files drifted\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_output_fails() {
        let err = invoke(&TokioLauncher, sh("exit 4")).await.unwrap_err();
        assert!(matches!(err, InvocationError::Exit { code: 4, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let request = InvocationRequest::new("this_command_does_not_exist_qwertyuiop", ["status"]);
        let err = invoke(&TokioLauncher, request).await.unwrap_err();
        assert!(matches!(err, InvocationError::Spawn { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempdir().unwrap();
        let expected: PathBuf = dir.path().canonicalize().unwrap();
        let output = invoke(&TokioLauncher, sh("pwd -P").current_dir(dir.path()))
            .await
            .unwrap();
        assert_eq!(PathBuf::from(output.stdout.trim()), expected);
    }

    #[tokio::test]
    async fn test_output_limit_kills_process() {
        let request = sh("while true; do echo aaaaaaaaaaaaaaaaaaaa; done").limits(InvocationLimits {
            max_output_bytes: 4096,
            ..Default::default()
        });
        let err = invoke(&TokioLauncher, request).await.unwrap_err();
        assert!(matches!(err, InvocationError::OutputLimit { limit: 4096, .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let request = sh("exec sleep 10").limits(InvocationLimits {
            timeout: Duration::from_millis(200),
            ..Default::default()
        });
        let started = Instant::now();
        let err = invoke(&TokioLauncher, request).await.unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_is_not_held_open_by_grandchild() {
        // Without `exec`, `sleep` outlives the killed shell and keeps both pipes open.
        let request = sh("sleep 3; echo done").limits(InvocationLimits {
            timeout: Duration::from_millis(200),
            ..Default::default()
        });
        let started = Instant::now();
        let err = invoke(&TokioLauncher, request).await.unwrap_err();
        let elapsed = started.elapsed();
        assert!(matches!(err, InvocationError::Timeout { .. }), "{:?}", err);
        assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_held_open_by_grandchild() {
        let source = TokenCancellation::new();
        let canceller = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = invoke(&TokioLauncher, sh("sleep 3; echo done").cancellation(Some(&source)))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, InvocationError::Terminated { .. }), "{:?}", err);
        assert!(elapsed < Duration::from_secs(1), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_cancellation_terminates_running_process() {
        let source = TokenCancellation::new();
        let canceller = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = invoke(&TokioLauncher, sh("exec sleep 10").cancellation(Some(&source)))
            .await
            .unwrap_err();

        assert!(matches!(err, InvocationError::Terminated { .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_spawn() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("spawned");
        let source = TokenCancellation::new();
        source.cancel();

        let script = format!("touch '{}'", marker.display());
        let err = invoke(&TokioLauncher, sh(&script).cancellation(Some(&source)))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!marker.exists());
    }
}
