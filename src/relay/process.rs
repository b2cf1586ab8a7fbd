//! Lifecycle of one helper process.
//!
//! The helper's stdout and stderr are the same pipe, so the relay sees the
//! combined output in the order it was written. A background thread does
//! blocking reads on that pipe and forwards raw chunks through a bounded
//! queue; the relay loop only ever polls the queue, so it never blocks on
//! the pipe itself.

use std::io::{ErrorKind, Read};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::invocation::Invocation;
use crate::errors::{RelayError, SpawnError};

const READ_CHUNK: usize = 8 * 1024;
const QUEUE_DEPTH: usize = 64;
const READER_BACKOFF: Duration = Duration::from_millis(10);

type Chunk = std::io::Result<Vec<u8>>;

pub struct ProcessRunner {
    child: Option<Child>,
    pid: Option<u32>,
    output: mpsc::Receiver<Chunk>,
    deferred_error: Option<std::io::Error>,
    /// The reader hit end-of-file: nothing holds the write end any more.
    output_closed: bool,
    exited: bool,
    exit_code: Option<i32>,
}

impl ProcessRunner {
    /// Spawn the helper for `invocation`.
    ///
    /// The helper leads its own process group so that [`terminate`] can take
    /// down anything it started as well.
    ///
    /// [`terminate`]: ProcessRunner::terminate
    pub fn start(invocation: &Invocation) -> Result<Self, SpawnError> {
        let program = invocation.program();
        let is_path = program.components().count() > 1;
        if is_path && !program.exists() {
            return Err(SpawnError::HelperMissing {
                path: program.to_path_buf(),
            });
        }

        let (reader, writer) = std::io::pipe().map_err(SpawnError::Pipe)?;
        let child = {
            let stderr_writer = writer.try_clone().map_err(SpawnError::Pipe)?;
            let mut cmd = Command::new(program);
            cmd.args(invocation.args())
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(stderr_writer)
                .kill_on_drop(true);
            #[cfg(unix)]
            cmd.process_group(0);

            cmd.spawn().map_err(|source| {
                if source.kind() == ErrorKind::NotFound {
                    SpawnError::HelperMissing {
                        path: program.to_path_buf(),
                    }
                } else {
                    SpawnError::Spawn {
                        path: program.to_path_buf(),
                        source,
                    }
                }
            })?
            // `cmd` drops here with our copies of the write end, so the
            // reader sees EOF once the helper and its children are gone.
        };
        let pid = child.id();
        debug!(pid, program = %program.display(), "helper started");

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        std::thread::Builder::new()
            .name(format!("helper-output-{}", pid.unwrap_or_default()))
            .spawn(move || pump_output(reader, tx))
            .map_err(SpawnError::Reader)?;

        Ok(Self {
            child: Some(child),
            pid,
            output: rx,
            deferred_error: None,
            output_closed: false,
            exited: false,
            exit_code: None,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code, once the helper has been observed to exit.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether every holder of the output pipe has closed it.
    pub fn output_closed(&self) -> bool {
        self.output_closed
    }

    /// Non-blocking exit check.
    pub fn is_alive(&mut self) -> Result<bool, RelayError> {
        if self.exited {
            return Ok(false);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(false);
        };
        match child.try_wait().map_err(RelayError::Poll)? {
            Some(status) => {
                self.exited = true;
                self.exit_code = status.code();
                debug!(pid = self.pid, exit_code = ?self.exit_code, "helper exited");
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Whatever output has arrived since the last call. Never blocks.
    ///
    /// An empty result means "no data yet". A read failure is reported after
    /// the bytes that preceded it have been handed out.
    pub fn read_available(&mut self) -> Result<Vec<u8>, RelayError> {
        if let Some(err) = self.deferred_error.take() {
            return Err(RelayError::Read(err));
        }
        let mut bytes = Vec::new();
        for _ in 0..QUEUE_DEPTH {
            match self.output.try_recv() {
                Ok(Ok(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(Err(err)) => {
                    if bytes.is_empty() {
                        return Err(RelayError::Read(err));
                    }
                    self.deferred_error = Some(err);
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.output_closed = true;
                    break;
                }
            }
        }
        Ok(bytes)
    }

    /// Read what is left in the pipe after the helper exited.
    ///
    /// Waits for end-of-file, but no longer than `limit`: a background job
    /// the helper left behind could otherwise hold the pipe open forever.
    /// Check [`output_closed`] to tell the two apart.
    ///
    /// [`output_closed`]: ProcessRunner::output_closed
    pub async fn drain_remaining(&mut self, limit: Duration) -> Result<Vec<u8>, RelayError> {
        if let Some(err) = self.deferred_error.take() {
            return Err(RelayError::Read(err));
        }
        let deadline = tokio::time::Instant::now() + limit;
        let mut bytes = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Ok(Some(Ok(chunk))) => bytes.extend_from_slice(&chunk),
                Ok(Some(Err(err))) => return Err(RelayError::Read(err)),
                Ok(None) => {
                    self.output_closed = true;
                    break;
                }
                Err(_) => break,
            }
        }
        Ok(bytes)
    }

    /// Kill and reap the helper if it is still running, along with anything
    /// it left behind in its process group. Safe to call twice.
    pub async fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if !self.exited
            && let Ok(Some(status)) = child.try_wait()
        {
            self.exited = true;
            self.exit_code = status.code();
        }
        if self.exited {
            // A reaped leader's PGID stays reserved while any group member
            // lives, and a held pipe means one does.
            if !self.poll_output_closed()
                && let Some(pid) = self.pid
            {
                debug!(pid, "helper exited but its output is still open; killing group");
                kill_process_group(pid);
            }
            self.output.close();
            return;
        }
        self.output.close();

        if let Some(pid) = self.pid {
            kill_process_group(pid);
        }
        if let Err(e) = child.start_kill() {
            debug!(pid = self.pid, "start_kill after group kill: {}", e);
        }
        match child.wait().await {
            Ok(status) => {
                self.exited = true;
                self.exit_code = status.code();
                debug!(pid = self.pid, "helper terminated");
            }
            Err(e) => warn!(pid = self.pid, "failed to reap helper: {}", e),
        }
    }
}

impl ProcessRunner {
    /// Discard queued output and report whether the pipe has reached EOF.
    fn poll_output_closed(&mut self) -> bool {
        while !self.output_closed {
            match self.output.try_recv() {
                Ok(_) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.output_closed = true,
            }
        }
        self.output_closed
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        // `kill_on_drop` covers the helper itself; this covers its children.
        if self.child.is_some()
            && (!self.exited || !self.poll_output_closed())
            && let Some(pid) = self.pid
        {
            kill_process_group(pid);
        }
    }
}

fn pump_output(mut reader: std::io::PipeReader, tx: mpsc::Sender<Chunk>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(READER_BACKOFF);
            }
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, "failed to kill helper process group: {}", e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
impl ProcessRunner {
    /// Queue a read failure as if the background reader had hit it.
    pub(crate) fn inject_read_error(&mut self, err: std::io::Error) {
        self.deferred_error = Some(err);
    }
}
