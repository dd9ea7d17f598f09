//! Registry of spawned external processes.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::exit::ProcessExit;
use crate::converter::ConvertError;
use crate::metrics;

/// Grace period between a graceful terminate and a forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// How long to wait for output pipes to drain after the process exits.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// What to run.
#[derive(Debug, Default)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Chunks written to stdin, which is closed afterwards. `None` means null stdin.
    pub stdin: Option<Arc<Vec<Vec<u8>>>>,
    pub capture_stdout: bool,
    /// Receives every stderr line as it arrives.
    pub stderr_lines: Option<mpsc::UnboundedSender<String>>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_chunks(mut self, chunks: Arc<Vec<Vec<u8>>>) -> Self {
        self.stdin = Some(chunks);
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn stderr_lines(mut self, tx: mpsc::UnboundedSender<String>) -> Self {
        self.stderr_lines = Some(tx);
        self
    }
}

/// Public view of a tracked process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub id: u64,
    pub command: String,
    pub args: Vec<String>,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessControl {
    /// Graceful stop, escalating to a kill after the grace period.
    Terminate,
    Kill,
}

struct Entry {
    info: ProcessInfo,
    control: mpsc::UnboundedSender<ProcessControl>,
}

struct RegistryInner {
    entries: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
    grace_period: Duration,
}

impl RegistryInner {
    fn entries(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single owner of every external process handle.
///
/// Each spawned process gets a supervisor task that owns the child, so no
/// other component can hold a process reference past spawn. Entries are
/// removed when the process exits.
#[derive(Clone)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                grace_period,
            }),
        }
    }

    /// Spawns and registers a process. Must be called inside a tokio runtime.
    pub fn spawn(&self, spec: ProcessSpec) -> Result<ProcessHandle, ConvertError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if spec.capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConvertError::ToolNotFound {
                    tool: tool_name(&spec.program),
                    path: spec.program.clone(),
                }
            } else {
                ConvertError::Io(e)
            }
        })?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let pid = child.id();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let info = ProcessInfo {
            id,
            command: spec.program.display().to_string(),
            args: spec.args.clone(),
            pid,
        };
        debug!(id, pid, command = %info.command, "Spawned process");

        self.inner.entries().insert(
            id,
            Entry {
                info,
                control: control_tx.clone(),
            },
        );
        metrics::PROCESSES_SPAWNED.inc();

        let (exit_tx, exit_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let exit = supervise(child, spec, control_rx, inner.grace_period).await;
            inner.entries().remove(&id);
            debug!(id, code = ?exit.code, "Process exited");
            let _ = exit_tx.send(exit);
        });

        Ok(ProcessHandle {
            id,
            pid,
            control: control_tx,
            exit: exit_rx,
        })
    }

    /// Spawns, waits for exit, and terminates gracefully if `cancel` fires first.
    pub async fn run(
        &self,
        spec: ProcessSpec,
        cancel: &CancellationToken,
    ) -> Result<ProcessExit, ConvertError> {
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }

        let handle = self.spawn(spec)?;
        let terminator = handle.terminator();
        let wait = handle.wait();
        tokio::pin!(wait);

        tokio::select! {
            exit = &mut wait => return Ok(exit),
            _ = cancel.cancelled() => {
                debug!(id = terminator.id(), "Cancellation requested, terminating process");
                terminator.terminate();
            }
        }

        Ok(wait.await)
    }

    /// [`run`](Self::run) for helper tools: cancellation and non-zero exits
    /// become errors.
    pub async fn run_tool(
        &self,
        tool: &str,
        spec: ProcessSpec,
        cancel: &CancellationToken,
    ) -> Result<ProcessExit, ConvertError> {
        let exit = self.run(spec, cancel).await?;
        if cancel.is_cancelled() {
            return Err(ConvertError::Cancelled);
        }
        if !exit.success() {
            return Err(ConvertError::external_tool(tool, exit.code, exit.stderr.trim()));
        }
        Ok(exit)
    }

    pub fn get(&self, id: u64) -> Option<ProcessInfo> {
        self.inner.entries().get(&id).map(|e| e.info.clone())
    }

    /// Every tracked process, ordered by id.
    pub fn list(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<_> = self
            .inner
            .entries()
            .values()
            .map(|e| e.info.clone())
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.inner.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forcefully kills one process. Returns false for unknown ids.
    pub fn kill_by_id(&self, id: u64) -> bool {
        let entry = self.inner.entries().remove(&id);
        match entry {
            Some(entry) => {
                send_control(&entry, ProcessControl::Kill);
                true
            }
            None => false,
        }
    }

    /// Gracefully terminates one process, escalating after the grace period.
    pub fn terminate_by_id(&self, id: u64) -> bool {
        let entries = self.inner.entries();
        match entries.get(&id) {
            Some(entry) => {
                send_control(entry, ProcessControl::Terminate);
                true
            }
            None => false,
        }
    }

    /// Forcefully kills every tracked process. Returns how many were signalled.
    pub fn kill_all(&self) -> usize {
        let drained: Vec<Entry> = self.inner.entries().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            send_control(entry, ProcessControl::Kill);
        }
        drained.len()
    }
}

fn send_control(entry: &Entry, control: ProcessControl) {
    if entry.control.send(control).is_err() {
        warn!(id = entry.info.id, ?control, "Process supervisor already gone");
    } else if control == ProcessControl::Kill {
        metrics::PROCESSES_KILLED.inc();
    }
}

fn tool_name(program: &std::path::Path) -> String {
    program
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string())
}

/// Handle returned by [`ProcessRegistry::spawn`].
#[derive(Debug)]
pub struct ProcessHandle {
    id: u64,
    pid: Option<u32>,
    control: mpsc::UnboundedSender<ProcessControl>,
    exit: oneshot::Receiver<ProcessExit>,
}

impl ProcessHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn terminator(&self) -> ProcessTerminator {
        ProcessTerminator {
            id: self.id,
            control: self.control.clone(),
        }
    }

    /// Waits for the process to exit.
    pub async fn wait(self) -> ProcessExit {
        self.exit.await.unwrap_or_else(|_| ProcessExit {
            code: None,
            stdout: Vec::new(),
            stderr: "process supervisor exited unexpectedly".to_string(),
        })
    }
}

/// Cloneable stop handle for one process.
#[derive(Debug, Clone)]
pub struct ProcessTerminator {
    id: u64,
    control: mpsc::UnboundedSender<ProcessControl>,
}

impl ProcessTerminator {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// SIGTERM now, SIGKILL after the grace period. False if already exited.
    pub fn terminate(&self) -> bool {
        self.control.send(ProcessControl::Terminate).is_ok()
    }

    pub fn kill(&self) -> bool {
        let sent = self.control.send(ProcessControl::Kill).is_ok();
        if sent {
            metrics::PROCESSES_KILLED.inc();
        }
        sent
    }
}

enum Action {
    Exited(std::io::Result<std::process::ExitStatus>),
    Control(ProcessControl),
    Escalate,
}

async fn supervise(
    mut child: Child,
    spec: ProcessSpec,
    mut control_rx: mpsc::UnboundedReceiver<ProcessControl>,
    grace_period: Duration,
) -> ProcessExit {
    if let (Some(mut stdin), Some(chunks)) = (child.stdin.take(), spec.stdin) {
        tokio::spawn(async move {
            for chunk in chunks.iter() {
                if let Err(e) = stdin.write_all(chunk).await {
                    debug!(error = %e, "Stdin closed early");
                    return;
                }
            }
            let _ = stdin.shutdown().await;
        });
    }

    let stdout_task: Option<JoinHandle<Vec<u8>>> = child.stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf).await;
            buf
        })
    });

    let forward = spec.stderr_lines;
    let stderr_task: Option<JoinHandle<String>> = child.stderr.take().map(|mut err| {
        tokio::spawn(async move {
            let mut collected = String::new();
            let mut pending = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match err.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        drain_lines(&mut pending, &mut collected, forward.as_ref());
                    }
                }
            }
            if !pending.is_empty() {
                pending.push(b'\n');
                drain_lines(&mut pending, &mut collected, forward.as_ref());
            }
            collected
        })
    });

    let mut escalate_at: Option<Instant> = None;
    let status = loop {
        let action = tokio::select! {
            status = child.wait() => Action::Exited(status),
            Some(control) = control_rx.recv() => Action::Control(control),
            _ = wait_deadline(escalate_at) => Action::Escalate,
        };

        match action {
            Action::Exited(status) => break status,
            Action::Control(ProcessControl::Terminate) => {
                if escalate_at.is_none() {
                    send_terminate(&mut child);
                    escalate_at = Some(Instant::now() + grace_period);
                }
            }
            Action::Control(ProcessControl::Kill) | Action::Escalate => {
                escalate_at = None;
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Kill failed, process likely gone");
                }
            }
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "Failed to wait for process");
            None
        }
    };

    let stdout = match stdout_task {
        Some(task) => timeout(PIPE_DRAIN_TIMEOUT, task)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr = match stderr_task {
        Some(task) => timeout(PIPE_DRAIN_TIMEOUT, task)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default(),
        None => String::new(),
    };

    ProcessExit {
        code,
        stdout,
        stderr,
    }
}

/// Splits complete lines (on `\n` or `\r`) out of `pending`.
fn drain_lines(
    pending: &mut Vec<u8>,
    collected: &mut String,
    forward: Option<&mpsc::UnboundedSender<String>>,
) {
    while let Some(pos) = pending.iter().position(|b| *b == b'\n' || *b == b'\r') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
        if line.is_empty() {
            continue;
        }
        if let Some(tx) = forward {
            let _ = tx.send(line.clone());
        }
        collected.push_str(&line);
        collected.push('\n');
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed, process likely gone");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Terminate failed, process likely gone");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::classify_exit;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_exit_code_and_stderr() {
        let registry = ProcessRegistry::new();
        let handle = registry.spawn(sh("echo boom 1>&2; exit 3")).unwrap();
        let exit = handle.wait().await;
        assert_eq!(exit.code, Some(3));
        assert_eq!(exit.stderr.trim(), "boom");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let registry = ProcessRegistry::new();
        let a = registry.spawn(sh("exit 0")).unwrap();
        let b = registry.spawn(sh("exit 0")).unwrap();
        assert!(b.id() > a.id());
        a.wait().await;
        b.wait().await;
    }

    #[tokio::test]
    async fn test_list_and_kill_by_id() {
        let registry = ProcessRegistry::new();
        let handle = registry.spawn(ProcessSpec::new("sleep").args(["5"])).unwrap();
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].command, "sleep");
        assert_eq!(listed[0].args, vec!["5".to_string()]);

        assert!(registry.kill_by_id(handle.id()));
        assert!(!registry.kill_by_id(handle.id()));
        let exit = handle.wait().await;
        assert_eq!(exit.code, None);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_kill_all() {
        let registry = ProcessRegistry::new();
        let a = registry.spawn(ProcessSpec::new("sleep").args(["5"])).unwrap();
        let b = registry.spawn(ProcessSpec::new("sleep").args(["5"])).unwrap();
        assert_eq!(registry.kill_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(a.wait().await.code, None);
        assert_eq!(b.wait().await.code, None);
    }

    #[tokio::test]
    async fn test_run_cancelled_terminates() {
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let exit = registry
            .run(ProcessSpec::new("sleep").args(["5"]), &cancel)
            .await
            .unwrap();
        assert!(matches!(
            classify_exit("sleep", &exit),
            Err(ConvertError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let registry = ProcessRegistry::with_grace_period(Duration::from_millis(100));
        let handle = registry
            .spawn(sh("trap '' TERM; while true; do sleep 0.05; done"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.terminate_by_id(handle.id()));
        let exit = timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn test_terminate_sends_sigterm_first() {
        let registry = ProcessRegistry::new();
        let handle = registry
            .spawn(sh("trap 'exit 7' TERM; while true; do sleep 0.05; done"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.terminate_by_id(handle.id()));
        let exit = timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        assert_eq!(exit.code, Some(7));
    }

    #[tokio::test]
    async fn test_run_refuses_when_already_cancelled() {
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry.run(sh("exit 0"), &cancel).await;
        assert!(matches!(result, Err(ConvertError::Cancelled)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stdin_and_stdout() {
        let registry = ProcessRegistry::new();
        let chunks = Arc::new(vec![b"abc".to_vec(), b"def".to_vec()]);
        let exit = registry
            .run(
                ProcessSpec::new("cat").stdin_chunks(chunks).capture_stdout(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(exit.success());
        assert_eq!(exit.stdout, b"abcdef".to_vec());
    }

    #[tokio::test]
    async fn test_stderr_lines_forwarded() {
        let registry = ProcessRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let exit = registry
            .run(
                sh("printf 'a=1\\rb=2\\n' 1>&2").stderr_lines(tx),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(exit.success());
        assert_eq!(rx.recv().await.as_deref(), Some("a=1"));
        assert_eq!(rx.recv().await.as_deref(), Some("b=2"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let registry = ProcessRegistry::new();
        let result = registry.spawn(ProcessSpec::new("/nonexistent/convertino-tool"));
        assert!(matches!(result, Err(ConvertError::ToolNotFound { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_tool_maps_failure() {
        let registry = ProcessRegistry::new();
        let cancel = CancellationToken::new();
        let err = registry
            .run_tool("helper", sh("echo nope 1>&2; exit 2"), &cancel)
            .await
            .unwrap_err();
        match err {
            ConvertError::ExternalToolFailure { tool, code, stderr } => {
                assert_eq!(tool, "helper");
                assert_eq!(code, Some(2));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }

        let exit = registry.run_tool("helper", sh("exit 0"), &cancel).await.unwrap();
        assert!(exit.success());
    }
}
