use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::types::{CommandOutput, CommandSpec, ExitSummary};
use crate::logging;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long a killed command gets to exit and release its pipes.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Something that can run commands. The controller only talks to
/// processes through this trait, so tests can swap in [`super::MockRunner`].
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion and capture its output.
    ///
    /// Returns `Err` only when the process could not be started or polled.
    /// A non-zero exit or a timeout is reported through [`CommandOutput`].
    fn output(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;

    /// Start a long-running process. Its output is forwarded to the log
    /// sink, each line prefixed with `tag`.
    fn spawn(&self, spec: &CommandSpec, tag: &str) -> io::Result<Box<dyn ManagedChild>>;
}

/// Handle to a process started with [`CommandRunner::spawn`].
pub trait ManagedChild: Send {
    fn id(&self) -> u32;

    /// Non-blocking: `Some` once the process has exited.
    fn try_wait(&mut self) -> io::Result<Option<ExitSummary>>;

    fn wait(&mut self) -> io::Result<ExitSummary>;
}

/// [`CommandRunner`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn output(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout can take down grandchildren too.
            command.process_group(0);
        }
        let mut child = command.spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let combined = Arc::new(Mutex::new(String::new()));
        let stdout_buf = Arc::new(Mutex::new(String::new()));

        let stdout_handle = {
            let combined = combined.clone();
            let stdout_buf = stdout_buf.clone();
            thread::spawn(move || {
                pump(stdout, |chunk| {
                    append(&combined, chunk);
                    append(&stdout_buf, chunk);
                })
            })
        };
        let stderr_handle = {
            let combined = combined.clone();
            thread::spawn(move || pump(stderr, |chunk| append(&combined, chunk)))
        };

        let start = Instant::now();
        let mut timed_out = false;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(ExitSummary::from(status));
            }
            if let Some(limit) = spec.timeout
                && start.elapsed() > limit
            {
                timed_out = true;
                kill_group(&child);
                let _ = child.kill();
                reap_within(&mut child, KILL_GRACE);
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        if timed_out {
            // Anything that survived the kill (e.g. root processes behind
            // sudo) may hold the pipes open indefinitely; keep what arrived.
            let drain_until = Instant::now() + KILL_GRACE;
            while !(stdout_handle.is_finished() && stderr_handle.is_finished())
                && Instant::now() < drain_until
            {
                thread::sleep(POLL_INTERVAL);
            }
        } else {
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
        }

        Ok(CommandOutput {
            status,
            stdout: take(&stdout_buf),
            combined: take(&combined),
            timed_out,
        })
    }

    fn spawn(&self, spec: &CommandSpec, tag: &str) -> io::Result<Box<dyn ManagedChild>> {
        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let forwarders = vec![forward(stdout, tag), forward(stderr, tag)];

        Ok(Box::new(SystemChild { child, forwarders }))
    }
}

struct SystemChild {
    child: Child,
    forwarders: Vec<JoinHandle<()>>,
}

impl SystemChild {
    fn join_forwarders(&mut self) {
        for handle in self.forwarders.drain(..) {
            let _ = handle.join();
        }
    }
}

impl ManagedChild for SystemChild {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitSummary>> {
        Ok(self.child.try_wait()?.map(ExitSummary::from))
    }

    fn wait(&mut self) -> io::Result<ExitSummary> {
        let status = self.child.wait()?;
        self.join_forwarders();
        Ok(status.into())
    }
}

#[cfg(unix)]
fn kill_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: killpg only sends a signal. The child was spawned with
    // process_group(0), so its pid is the group id.
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Poll until `child` is reaped or `grace` runs out. A child that cannot be
/// signalled is left behind rather than blocking the caller.
fn reap_within(child: &mut Child, grace: Duration) {
    let until = Instant::now() + grace;
    while Instant::now() < until {
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => return,
            Ok(None) => thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Read `reader` line by line until EOF, handing each chunk (newline
/// included) to `sink`. Invalid UTF-8 is replaced rather than aborting.
fn pump(reader: impl Read, mut sink: impl FnMut(&str)) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => sink(&String::from_utf8_lossy(&line)),
        }
    }
}

fn forward(reader: impl Read + Send + 'static, tag: &str) -> JoinHandle<()> {
    let tag = tag.to_string();
    thread::spawn(move || pump(reader, |chunk| logging::log_with_prefix(&tag, chunk)))
}

fn append(buf: &Mutex<String>, chunk: &str) {
    if let Ok(mut buf) = buf.lock() {
        buf.push_str(chunk);
    }
}

fn take(buf: &Mutex<String>) -> String {
    buf.lock().map(|mut b| std::mem::take(&mut *b)).unwrap_or_default()
}
