//! External tool command builder and streaming runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use subsync_models::StreamTag;

use crate::error::{MediaError, MediaResult};

/// Number of stderr lines kept for failure diagnostics.
pub const STDERR_TAIL_LINES: usize = 20;

/// How long output may stay open once the tool has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Receives tool output as soon as each line is read.
pub trait LogSink: Send + Sync {
    fn line(&self, stream: StreamTag, text: &str);
}

impl<F> LogSink for F
where
    F: Fn(StreamTag, &str) + Send + Sync,
{
    fn line(&self, stream: StreamTag, text: &str) {
        self(stream, text)
    }
}

/// Builder for external tool commands.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Program name or path
    program: String,
    /// Arguments, in order
    args: Vec<String>,
    /// Working directory for the child
    current_dir: Option<PathBuf>,
}

impl ToolCommand {
    /// Create a new command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Add one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument.
    pub fn path_arg(self, path: impl AsRef<Path>) -> Self {
        let arg = path.as_ref().to_string_lossy().to_string();
        self.arg(arg)
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        self.args.clone()
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Output collected from a successful tool run.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    /// Every stdout line
    pub stdout: Vec<String>,
    /// Last [`STDERR_TAIL_LINES`] stderr lines
    pub stderr_tail: Vec<String>,
}

/// Runner for external tools with line-by-line output capture.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    /// Upper bound on a single invocation
    timeout: Option<Duration>,
}

impl ToolRunner {
    /// Create a runner without a timeout.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run a command, forwarding every output line to `sink` as it arrives.
    ///
    /// Both pipes are drained concurrently with the wait for exit, so a chatty
    /// child can never block on a full pipe. A non-zero exit becomes
    /// [`MediaError::ToolFailed`] carrying the stderr tail.
    pub async fn run(&self, cmd: &ToolCommand, sink: &dyn LogSink) -> MediaResult<ToolOutput> {
        let program = check_tool(cmd.program())?;

        debug!("Running tool: {}", cmd.display());

        let mut command = Command::new(&program);
        command
            .args(cmd.build_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.current_dir {
            command.current_dir(dir);
        }
        // Own group so a timeout also reaches helpers the tool spawned
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MediaError::ToolNotFound(cmd.program().to_string()),
            _ => MediaError::Io(e),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stderr not captured")))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(StreamTag, String)>();
        let (exited_tx, exited_rx) = oneshot::channel::<()>();

        let drain = async move {
            let readers = async {
                tokio::join!(
                    forward_lines(stdout, StreamTag::Out, tx.clone()),
                    forward_lines(stderr, StreamTag::Err, tx),
                );
            };
            tokio::pin!(readers);

            tokio::select! {
                _ = &mut readers => return,
                _ = exited_rx => {}
            }

            // Anything still holding the pipes after exit gets a short grace
            if tokio::time::timeout(DRAIN_GRACE, readers).await.is_err() {
                warn!(
                    "{} output still open {:?} after exit, closing",
                    cmd.program(),
                    DRAIN_GRACE
                );
            }
        };

        let collect = async {
            let mut output = ToolOutput::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Some((stream, line)) = rx.recv().await {
                sink.line(stream, &line);
                match stream {
                    StreamTag::Out => output.stdout.push(line),
                    StreamTag::Err => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
            }
            output.stderr_tail = tail.into_iter().collect();
            output
        };

        let wait = async {
            let status = self.wait_for_exit(&mut child, cmd.program()).await;
            let _ = exited_tx.send(());
            status
        };

        let (_, mut output, status) = tokio::join!(drain, collect, wait);

        let status = status?;
        output.exit_code = status.code();

        if status.success() {
            Ok(output)
        } else {
            Err(MediaError::tool_failed(
                cmd.program(),
                status.code(),
                output.stderr_tail,
            ))
        }
    }

    /// Wait for child process with optional timeout.
    async fn wait_for_exit(&self, child: &mut Child, tool: &str) -> MediaResult<ExitStatus> {
        let Some(limit) = self.timeout else {
            return Ok(child.wait().await?);
        };

        match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                warn!("{} timed out after {:?}, killing process group", tool, limit);
                kill_process_group(child);
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(MediaError::Timeout {
                    tool: tool.to_string(),
                    limit,
                })
            }
        }
    }
}

/// Kill every process in the child's group. The child leads its own group.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!("killpg({}) failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Read `reader` line by line and forward each line tagged with `stream`.
///
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn forward_lines<R>(reader: R, stream: StreamTag, tx: mpsc::UnboundedSender<(StreamTag, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(|c| c == '\n' || c == '\r')
                    .to_string();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to read tool {} stream: {}", stream.as_str(), e);
                break;
            }
        }
    }
}

/// Check that a tool is available, returning its resolved path.
pub fn check_tool(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|_| MediaError::ToolNotFound(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_command_builder() {
        let cmd = ToolCommand::new("ffsubsync")
            .path_arg("/jobs/a/video.mp4")
            .args(["-i", "in.srt"])
            .arg("-o")
            .path_arg("out.srt");

        assert_eq!(cmd.program(), "ffsubsync");
        assert_eq!(
            cmd.build_args(),
            vec!["/jobs/a/video.mp4", "-i", "in.srt", "-o", "out.srt"]
        );
        assert_eq!(cmd.display(), "ffsubsync /jobs/a/video.mp4 -i in.srt -o out.srt");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let cmd = ToolCommand::new("definitely-not-a-real-subsync-tool");
        let err = ToolRunner::new()
            .run(&cmd, &|_: StreamTag, _: &str| {})
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_streams_both_outputs() {
        let seen = Mutex::new(Vec::new());
        let sink = |stream: StreamTag, text: &str| {
            seen.lock().unwrap().push((stream, text.to_string()));
        };

        let cmd = ToolCommand::new("sh").args(["-c", "echo one; echo two >&2; echo three"]);
        let output = ToolRunner::new().run(&cmd, &sink).await.unwrap();

        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, vec!["one", "three"]);
        assert_eq!(output.stderr_tail, vec!["two"]);

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&(StreamTag::Err, "two".to_string())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr_tail() {
        let script = "for i in $(seq 1 30); do echo line$i >&2; done; exit 3";
        let cmd = ToolCommand::new("sh").args(["-c", script]);
        let err = ToolRunner::new()
            .run(&cmd, &|_: StreamTag, _: &str| {})
            .await
            .unwrap_err();

        match err {
            MediaError::ToolFailed {
                exit_code,
                stderr_tail,
                ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr_tail.len(), STDERR_TAIL_LINES);
                assert_eq!(stderr_tail.first().map(String::as_str), Some("line11"));
                assert_eq!(stderr_tail.last().map(String::as_str), Some("line30"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        // Well past a 64 KiB pipe buffer on both streams.
        let script = "i=0; while [ $i -lt 5000 ]; do echo xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; echo yyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyy >&2; i=$((i+1)); done";
        let cmd = ToolCommand::new("sh").args(["-c", script]);
        let output = ToolRunner::new()
            .with_timeout(Duration::from_secs(30))
            .run(&cmd, &|_: StreamTag, _: &str| {})
            .await
            .unwrap();
        assert_eq!(output.stdout.len(), 5000);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_tool() {
        let cmd = ToolCommand::new("sh").args(["-c", "exec sleep 5"]);
        let err = ToolRunner::new()
            .with_timeout(Duration::from_millis(200))
            .run(&cmd, &|_: StreamTag, _: &str| {})
            .await
            .unwrap_err();
        match err {
            MediaError::Timeout { tool, limit } => {
                assert_eq!(tool, "sh");
                assert_eq!(limit, Duration::from_millis(200));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_reaches_grandchildren() {
        // The shell forks sleep, which inherits both pipes
        let cmd = ToolCommand::new("sh").args(["-c", "sleep 4; echo late"]);
        let started = std::time::Instant::now();
        let seen = Mutex::new(Vec::new());
        let sink = |_: StreamTag, text: &str| {
            seen.lock().unwrap().push(text.to_string());
        };

        let err = ToolRunner::new()
            .with_timeout(Duration::from_millis(300))
            .run(&cmd, &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Timeout { .. }));
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "run took {:?}",
            started.elapsed()
        );
        assert!(seen.into_inner().unwrap().is_empty());
    }
}
