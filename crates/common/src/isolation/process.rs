//! Isolation in a child process
//!
//! The child is started with its launch parameters in the environment. Both
//! sides speak line-delimited JSON envelopes:
//!
//! - child stdout: `{"spectree":"ready"}` once it has resolved its test
//! - child stdin: `{"spectree":"channel","path":...}` naming a Unix socket
//! - socket: `{"spectree":"result","result":{...}}`, exactly once
//!
//! Any other stdout line is the test's own output and is skipped.

use super::{IsolatedContext, IsolationHost, IsolationLink, ResultPort, ResultPoster};
use crate::config::{IsolationSettings, LaunchParams};
use crate::error::{Error, Result};
use crate::result::TestResult;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, trace, warn};
use uuid::Uuid;

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "spectree", rename_all = "snake_case")]
enum Envelope {
    Ready,
    Channel { path: PathBuf },
    Result { result: TestResult },
}

impl Envelope {
    fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Read lines until one parses as an envelope.
async fn next_envelope<R>(lines: &mut FramedRead<R, LinesCodec>, waiting_for: &'static str) -> Result<Envelope>
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(Error::Protocol(format!("failed reading {}: {}", waiting_for, e))),
            None => return Err(Error::ChannelClosed(waiting_for)),
        };
        match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => return Ok(envelope),
            Err(_) => trace!(line = %line, "skipping non-protocol output"),
        }
    }
}

async fn send_envelope<W>(sink: &mut FramedWrite<W, LinesCodec>, envelope: &Envelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.send(envelope.encode()?)
        .await
        .map_err(|e| Error::Protocol(format!("failed writing envelope: {}", e)))
}

/// Starts isolated contexts by executing a program, by default the current
/// executable.
#[derive(Debug, Clone)]
pub struct ProcessHost {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessHost {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the running binary with `args`.
    pub fn current_exe(args: Vec<String>) -> Result<Self> {
        Ok(Self::new(std::env::current_exe()?, args))
    }

    pub fn from_settings(settings: &IsolationSettings) -> Result<Self> {
        match &settings.program {
            Some(program) => Ok(Self::new(program.clone(), settings.args.clone())),
            None => Self::current_exe(settings.args.clone()),
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl IsolationHost for ProcessHost {
    async fn spawn(&self, params: LaunchParams) -> Result<Box<dyn IsolatedContext>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(params.env_vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Spawn(format!("{}: {}", self.program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("child stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("child stdout was not captured".to_string()))?;
        debug!(program = %self.program.display(), pid = ?child.id(), "spawned isolated process");

        Ok(Box::new(ProcessContext {
            child,
            output: FramedRead::new(stdout, LinesCodec::new()),
            commands: FramedWrite::new(stdin, LinesCodec::new()),
            socket_dir: None,
        }))
    }
}

struct ProcessContext {
    child: Child,
    output: FramedRead<ChildStdout, LinesCodec>,
    commands: FramedWrite<ChildStdin, LinesCodec>,
    socket_dir: Option<TempDir>,
}

#[async_trait]
impl IsolatedContext for ProcessContext {
    async fn wait_ready(&mut self) -> Result<()> {
        match next_envelope(&mut self.output, "readiness").await? {
            Envelope::Ready => Ok(()),
            other => Err(Error::Protocol(format!("expected readiness, got {:?}", other))),
        }
    }

    async fn open_channel(&mut self) -> Result<Box<dyn ResultPort>> {
        let dir = tempfile::Builder::new().prefix("spectree-").tempdir()?;
        let path = dir.path().join(format!("{}.sock", Uuid::new_v4()));
        let listener = UnixListener::bind(&path)?;
        self.socket_dir = Some(dir);

        send_envelope(&mut self.commands, &Envelope::Channel { path: path.clone() }).await?;
        // A child that exits before connecting never will.
        let stream = tokio::select! {
            biased;
            accepted = listener.accept() => accepted?.0,
            status = self.child.wait() => {
                debug!(?status, "isolated process exited before connecting");
                return Err(Error::ChannelClosed("channel transfer"));
            }
        };
        debug!(path = %path.display(), "isolated process connected");

        Ok(Box::new(SocketPort {
            lines: FramedRead::new(stream, LinesCodec::new()),
        }))
    }

    async fn teardown(self: Box<Self>) -> Result<()> {
        let ProcessContext {
            mut child,
            output,
            commands,
            socket_dir,
        } = *self;
        drop((output, commands));

        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM not delivered");
            }
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(?status, "isolated process exited");
            }
            Err(_) => {
                warn!("isolated process ignored SIGTERM, killing");
                child.kill().await?;
            }
        }

        drop(socket_dir);
        Ok(())
    }
}

struct SocketPort {
    lines: FramedRead<UnixStream, LinesCodec>,
}

#[async_trait]
impl ResultPort for SocketPort {
    async fn receive(&mut self) -> Result<TestResult> {
        match next_envelope(&mut self.lines, "result").await? {
            Envelope::Result { result } => Ok(result),
            other => Err(Error::Protocol(format!("expected result, got {:?}", other))),
        }
    }
}

/// Isolated side of the process transport, over this process's stdio.
pub struct ProcessLink {
    announcements: FramedWrite<tokio::io::Stdout, LinesCodec>,
    commands: FramedRead<tokio::io::Stdin, LinesCodec>,
}

impl ProcessLink {
    pub fn stdio() -> Self {
        Self {
            announcements: FramedWrite::new(tokio::io::stdout(), LinesCodec::new()),
            commands: FramedRead::new(tokio::io::stdin(), LinesCodec::new()),
        }
    }
}

#[async_trait]
impl IsolationLink for ProcessLink {
    async fn signal_ready(&mut self) -> Result<()> {
        send_envelope(&mut self.announcements, &Envelope::Ready).await
    }

    async fn accept_channel(&mut self) -> Result<Box<dyn ResultPoster>> {
        let path = match next_envelope(&mut self.commands, "channel transfer").await? {
            Envelope::Channel { path } => path,
            other => return Err(Error::Protocol(format!("expected channel, got {:?}", other))),
        };
        let stream = UnixStream::connect(&path).await?;
        debug!(path = %path.display(), "connected result channel");
        Ok(Box::new(SocketPoster {
            sink: FramedWrite::new(stream, LinesCodec::new()),
        }))
    }
}

struct SocketPoster {
    sink: FramedWrite<UnixStream, LinesCodec>,
}

#[async_trait]
impl ResultPoster for SocketPoster {
    async fn post(self: Box<Self>, result: &TestResult) -> Result<()> {
        let mut sink = self.sink;
        let envelope = Envelope::Result { result: result.clone() };
        send_envelope(&mut sink, &envelope).await
    }
}
