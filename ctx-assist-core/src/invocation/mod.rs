// ctx-assist-core/src/invocation/mod.rs

//! Runs one external command with bounded time and output, and supports
//! mid-flight cancellation.
//!
//! [`invoke`] is a single attempt: it never retries, never streams partial
//! output, and always resolves to an [`InvocationOutcome`]. Process creation
//! sits behind the [`Launcher`] trait so hosts and tests can substitute it;
//! [`process::TokioLauncher`] is the real one.

pub mod process;

use crate::cancellation::{CancellationRegistration, CancellationSource};
use crate::errors::InvocationError;
use crate::utils::preview_lines;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use process::TokioLauncher;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Bounds applied to every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationLimits {
    /// Hard wall-clock limit, after which the process is killed.
    pub timeout: Duration,
    /// Maximum combined size of captured stdout and stderr, in bytes.
    pub max_output_bytes: usize,
}

impl Default for InvocationLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Captured output of a process that is considered to have succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Checks if the command exited with status code 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// `stdout` followed by `stderr`, trimmed. This is what handlers render.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// Result of one invocation: the success arm carries both streams verbatim.
pub type InvocationOutcome = Result<CommandOutput, InvocationError>;

/// One call to the external tool. Built fresh per call.
pub struct InvocationRequest<'a> {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub cancellation: Option<&'a dyn CancellationSource>,
    pub limits: InvocationLimits,
}

impl<'a> InvocationRequest<'a> {
    pub fn new<I, S>(executable: impl Into<PathBuf>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            working_directory: None,
            cancellation: None,
            limits: InvocationLimits::default(),
        }
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_directory = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn cancellation(mut self, source: Option<&'a dyn CancellationSource>) -> Self {
        self.cancellation = source;
        self
    }

    pub fn limits(mut self, limits: InvocationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Name used in log lines and error messages.
    pub fn program_name(&self) -> String {
        self.executable.display().to_string()
    }
}

/// What a launched process reports when it finishes: the exit failure (if
/// any) plus everything captured from both streams.
#[derive(Debug)]
pub struct Completion {
    pub status: Option<i32>,
    pub error: Option<InvocationError>,
    pub stdout: String,
    pub stderr: String,
}

pub type CompletionFuture = Pin<Box<dyn Future<Output = Completion> + Send + 'static>>;

/// Best-effort request to stop a running process.
pub trait Terminate: Send + Sync {
    fn terminate(&self);
}

/// A started process: its eventual completion and a way to ask it to stop.
pub struct LaunchedProcess {
    pub completion: CompletionFuture,
    pub terminator: Arc<dyn Terminate>,
}

/// Starts processes for [`invoke`].
///
/// After [`Terminate::terminate`] the completion must resolve promptly, even
/// if descendants of the process still hold its output pipes open.
pub trait Launcher: Send + Sync {
    fn launch(&self, request: &InvocationRequest<'_>) -> Result<LaunchedProcess, InvocationError>;
}

/// Runs `request` to completion.
///
/// A request whose cancellation source is already cancelled resolves to
/// [`InvocationError::Cancelled`] without spawning or subscribing. Otherwise
/// the process is started, cancellation is wired to a single termination
/// request, and the process completion (never the cancellation itself)
/// retires the call: the registration is disposed, the outcome normalized
/// with [`normalize`], and returned.
pub async fn invoke(launcher: &dyn Launcher, request: InvocationRequest<'_>) -> InvocationOutcome {
    let program = request.program_name();

    if request.cancellation.is_some_and(|source| source.is_cancelled()) {
        debug!(program = %program, "Cancellation already requested; not spawning.");
        return Err(InvocationError::Cancelled);
    }

    debug!(
        program = %program,
        args = ?request.arguments,
        cwd = ?request.working_directory,
        "Spawning external command."
    );
    let LaunchedProcess {
        mut completion,
        terminator,
    } = launcher.launch(&request).map_err(|e| {
        warn!(program = %program, error = %e, "Failed to spawn command process");
        e
    })?;

    let termination = Arc::new(TerminateOnce::new(program.clone(), terminator));
    let mut registration = request.cancellation.map(|source| {
        let termination = termination.clone();
        CancellationRegistration::new(source.subscribe(Box::new(move || {
            termination.request("Cancellation requested");
        })))
    });

    let timeout = request.limits.timeout;
    let waited = tokio::time::timeout(timeout, &mut completion).await;
    let (completion, timed_out) = match waited {
        Ok(done) => (done, false),
        Err(_) => {
            termination.request("Command timed out");
            (completion.await, true)
        }
    };

    if let Some(registration) = registration.as_mut() {
        registration.dispose();
    }

    debug!(
        program = %program,
        status = ?completion.status,
        stdout_len = completion.stdout.len(),
        stderr_len = completion.stderr.len(),
        "Command finished. Output preview:\n{}",
        preview_lines(&completion.stdout, 3)
    );

    if timed_out {
        return Err(InvocationError::Timeout { program, timeout });
    }
    normalize(completion)
}

/// Forwards at most one termination request to the process, however many
/// times cancellation fires and whether or not the timeout also elapses.
struct TerminateOnce {
    program: String,
    requested: AtomicBool,
    terminator: Arc<dyn Terminate>,
}

impl TerminateOnce {
    fn new(program: String, terminator: Arc<dyn Terminate>) -> Self {
        Self {
            program,
            requested: AtomicBool::new(false),
            terminator,
        }
    }

    fn request(&self, reason: &str) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            warn!(program = %self.program, "{}; terminating process.", reason);
            self.terminator.terminate();
        }
    }
}

/// Decides success or failure for a finished process.
///
/// The wrapped tool signals some valid findings (e.g. drift) with a nonzero
/// exit code, so an exit-status failure only counts when both streams are
/// empty. Timeouts, output overflow and I/O errors always fail.
pub fn normalize(completion: Completion) -> InvocationOutcome {
    let Completion {
        status,
        error,
        stdout,
        stderr,
    } = completion;

    match error {
        None => Ok(CommandOutput {
            status,
            stdout,
            stderr,
        }),
        Some(err) if err.is_exit_status() && (!stdout.is_empty() || !stderr.is_empty()) => {
            debug!(error = %err, "Nonzero exit with output; treating as success.");
            Ok(CommandOutput {
                status,
                stdout,
                stderr,
            })
        }
        Some(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::{CancelCallback, Subscription};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn exit_failure(code: i32) -> Option<InvocationError> {
        Some(InvocationError::Exit {
            program: "ctx".to_string(),
            code,
        })
    }

    fn completion(error: Option<InvocationError>, stdout: &str, stderr: &str) -> Completion {
        Completion {
            status: match &error {
                None => Some(0),
                Some(InvocationError::Exit { code, .. }) => Some(*code),
                Some(_) => None,
            },
            error,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    // --- Scripted launcher: the test decides when and how the process completes ---

    #[derive(Default)]
    struct CountingTerminator {
        calls: AtomicUsize,
    }

    impl Terminate for CountingTerminator {
        fn terminate(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct ScriptedLauncher {
        launches: AtomicUsize,
        terminator: Arc<CountingTerminator>,
        completion: Mutex<Option<oneshot::Receiver<Completion>>>,
    }

    impl ScriptedLauncher {
        fn new() -> (Self, oneshot::Sender<Completion>) {
            let (tx, rx) = oneshot::channel();
            let launcher = Self {
                launches: AtomicUsize::new(0),
                terminator: Arc::new(CountingTerminator::default()),
                completion: Mutex::new(Some(rx)),
            };
            (launcher, tx)
        }
    }

    impl Launcher for ScriptedLauncher {
        fn launch(
            &self,
            _request: &InvocationRequest<'_>,
        ) -> Result<LaunchedProcess, InvocationError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            let rx = self.completion.lock().unwrap().take().expect("launched twice");
            Ok(LaunchedProcess {
                completion: Box::pin(async move {
                    rx.await.unwrap_or_else(|_| completion(exit_failure(1), "", ""))
                }),
                terminator: self.terminator.clone(),
            })
        }
    }

    // --- Manual cancellation source that can fire any number of times ---

    #[derive(Default)]
    struct ManualSource {
        cancelled: bool,
        callbacks: Mutex<Vec<CancelCallback>>,
        subscribes: AtomicUsize,
        disposals: Arc<AtomicUsize>,
    }

    impl ManualSource {
        fn fire(&self) {
            for callback in self.callbacks.lock().unwrap().iter() {
                callback();
            }
        }
    }

    struct ManualSubscription {
        disposals: Arc<AtomicUsize>,
    }

    impl Subscription for ManualSubscription {
        fn unsubscribe(self: Box<Self>) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CancellationSource for ManualSource {
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }

        fn subscribe(&self, callback: CancelCallback) -> Box<dyn Subscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            self.callbacks.lock().unwrap().push(callback);
            Box::new(ManualSubscription {
                disposals: self.disposals.clone(),
            })
        }
    }

    #[test]
    fn test_normalize_success() {
        let outcome = normalize(completion(None, "output", "errors"));
        let output = outcome.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "output");
        assert_eq!(output.stderr, "errors");
    }

    #[test]
    fn test_normalize_nonzero_exit_with_output_is_success() {
        let output = normalize(completion(exit_failure(1), "", "drift detected\n")).unwrap();
        assert_eq!(output.status, Some(1));
        assert_eq!(output.stdout, "");
        assert_eq!(output.stderr, "drift detected\n");
    }

    #[test]
    fn test_normalize_nonzero_exit_without_output_fails() {
        let err = normalize(completion(exit_failure(3), "", "")).unwrap_err();
        assert!(matches!(err, InvocationError::Exit { code: 3, .. }));
    }

    #[test]
    fn test_normalize_output_limit_always_fails() {
        let err = normalize(completion(
            Some(InvocationError::OutputLimit {
                program: "ctx".to_string(),
                limit: 4,
            }),
            "abcd",
            "",
        ))
        .unwrap_err();
        assert!(matches!(err, InvocationError::OutputLimit { limit: 4, .. }));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_launches() {
        let (launcher, _tx) = ScriptedLauncher::new();
        let source = ManualSource {
            cancelled: true,
            ..Default::default()
        };
        let request = InvocationRequest::new("ctx", ["status"])
            .current_dir("/test")
            .cancellation(Some(&source));

        let err = invoke(&launcher, request).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Cancelled");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert_eq!(source.subscribes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completion_disposes_registration() {
        let (launcher, tx) = ScriptedLauncher::new();
        let source = ManualSource::default();
        tx.send(completion(None, "done", "")).unwrap();

        let output = invoke(
            &launcher,
            InvocationRequest::new("ctx", ["status"]).cancellation(Some(&source)),
        )
        .await
        .unwrap();

        assert_eq!(output.stdout, "done");
        assert_eq!(source.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(source.disposals.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.terminator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_after_spawn_terminates_once_and_disposes_at_completion() {
        let (launcher, tx) = ScriptedLauncher::new();
        let launcher = Arc::new(launcher);
        let source = Arc::new(ManualSource::default());

        let task = {
            let launcher = launcher.clone();
            let source = source.clone();
            tokio::spawn(async move {
                let request =
                    InvocationRequest::new("ctx", ["agent"]).cancellation(Some(source.as_ref()));
                invoke(launcher.as_ref(), request).await
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        source.fire();
        source.fire();
        assert_eq!(launcher.terminator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.disposals.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(completion(
            Some(InvocationError::Terminated {
                program: "ctx".to_string(),
                signal: Some(9),
            }),
            "",
            "",
        ))
        .unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Command failed: ctx was terminated by signal 9");
        assert_eq!(launcher.terminator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.disposals.load(Ordering::SeqCst), 1);

        source.fire();
        assert_eq!(launcher.terminator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_process_with_output_still_normalizes_to_success() {
        let (launcher, tx) = ScriptedLauncher::new();
        let source = ManualSource::default();

        let request = InvocationRequest::new("ctx", ["load"]).cancellation(Some(&source));
        let pending = invoke(&launcher, request);
        tokio::pin!(pending);

        tokio::select! {
            _ = &mut pending => panic!("resolved before completion"),
            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
        }
        source.fire();
        tx.send(completion(
            Some(InvocationError::Terminated {
                program: "ctx".to_string(),
                signal: Some(9),
            }),
            "partial context\n",
            "",
        ))
        .unwrap();

        let output = pending.await.unwrap();
        assert_eq!(output.stdout, "partial context\n");
        assert_eq!(launcher.terminator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.disposals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_terminates_and_reports_bound() {
        let (launcher, tx) = ScriptedLauncher::new();
        let terminator = launcher.terminator.clone();
        let source = ManualSource::default();

        // Complete only once the wrapper has asked for termination.
        tokio::spawn(async move {
            while terminator.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let _ = tx.send(completion(
                Some(InvocationError::Terminated {
                    program: "ctx".to_string(),
                    signal: Some(9),
                }),
                "some output",
                "",
            ));
        });

        let request = InvocationRequest::new("ctx", ["sync"])
            .cancellation(Some(&source))
            .limits(InvocationLimits {
                timeout: Duration::from_secs(2),
                ..Default::default()
            });
        let err = invoke(&launcher, request).await.unwrap_err();

        assert!(matches!(
            err,
            InvocationError::Timeout { timeout, .. } if timeout == Duration::from_secs(2)
        ));
        assert_eq!(launcher.terminator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.disposals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_combined_output_is_trimmed_concatenation() {
        let output = CommandOutput {
            status: Some(0),
            stdout: "  3 tasks pending\n".to_string(),
            stderr: "warning\n\n".to_string(),
        };
        assert_eq!(output.combined(), "3 tasks pending\nwarning");
    }
}
