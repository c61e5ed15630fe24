use std::fs::DirBuilder;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::bridge::ensure_bridge;
use super::error::DaemonError;
use super::invoke::run_checked;
use super::parse::parse_container_ids;
use super::readiness::{Backoff, Probe, wait_until_ready};
use super::types::{CancelToken, ContainerRef, Operation};
use crate::config::DaemonConfig;
use crate::exec::{
    CommandOutput, CommandRunner, CommandSpec, ManagedChild, PrivilegedExecutor, SystemRunner,
};
use crate::logging;

/// Origin tag for output of `docker` CLI calls.
const DOCKER_TAG: &str = "docker";
/// Origin tag for output of a managed daemon.
const DAEMON_TAG: &str = "dockerd";

/// The daemon process started by [`DaemonController::start`].
pub struct ManagedProcess {
    pid: u32,
    child: Box<dyn ManagedChild>,
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Shim over the `docker` CLI for end-to-end tests.
///
/// Every call runs one subprocess (or, for `pull`, one per image) against
/// a single socket. With `manage_daemon` set the controller also owns a
/// private daemon between [`start`](Self::start) and [`stop`](Self::stop).
/// Nothing here is synchronised: drive one controller from one thread.
pub struct DaemonController {
    config: DaemonConfig,
    socket: String,
    runner: Arc<dyn CommandRunner>,
    privileged: PrivilegedExecutor,
    daemon: Option<ManagedProcess>,
}

impl DaemonController {
    pub fn new(config: DaemonConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner::new()))
    }

    /// The host's own daemon on the stock socket.
    pub fn host_default() -> Self {
        Self::new(DaemonConfig::host_default())
    }

    pub fn with_runner(config: DaemonConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let privileged = PrivilegedExecutor::from_privilege(config.privilege);
        Self {
            socket: config.socket.clone(),
            config,
            runner,
            privileged,
            daemon: None,
        }
    }

    /// Replace how root-only commands are prefixed.
    pub fn with_privileged(mut self, privileged: PrivilegedExecutor) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Endpoint every CLI call is pointed at with `-H`.
    pub fn socket(&self) -> &str {
        &self.socket
    }

    pub fn is_running(&self) -> bool {
        self.daemon.is_some()
    }

    pub fn daemon_pid(&self) -> Option<u32> {
        self.daemon.as_ref().map(ManagedProcess::pid)
    }

    /// [`start_cancellable`](Self::start_cancellable) with a token nobody cancels.
    pub fn start(&mut self) -> Result<(), DaemonError> {
        self.start_cancellable(&CancelToken::new())
    }

    /// Launch the private daemon and block until it answers `docker info`.
    ///
    /// Does nothing when the controller uses a pre-existing daemon. The wait
    /// is bounded by the readiness config; on any readiness failure the
    /// spawned daemon is stopped again before the error is returned. If it
    /// cannot be signalled it stays registered, so `stop` can retry, but
    /// [`socket`](Self::socket) only switches to it after a successful start.
    pub fn start_cancellable(&mut self, cancel: &CancelToken) -> Result<(), DaemonError> {
        if !self.config.manage_daemon {
            return Ok(());
        }
        if let Some(pid) = self.daemon_pid() {
            return Err(DaemonError::AlreadyRunning { pid });
        }

        let exec_root = self.config.exec_root();
        let graph_root = self.config.graph_root();
        create_dir(&exec_root)?;
        create_dir(&graph_root)?;

        let bridge = ensure_bridge(
            self.runner.as_ref(),
            &self.privileged,
            &self.config.bridge,
            &self.config.cidr,
            self.config.command_timeout(),
        )?;
        debug!(?bridge, name = %self.config.bridge, "bridge ready");

        let socket = self.config.managed_socket();

        let spec = self.privileged.command(
            &self.config.docker_exec,
            [
                "daemon".to_string(),
                format!("--bridge={}", self.config.bridge),
                format!("--exec-root={}", exec_root.display()),
                format!("--graph={}", graph_root.display()),
                format!("--host={socket}"),
                format!("--pidfile={}", self.config.pidfile().display()),
            ],
        );
        info!(command = %spec, "starting docker daemon");

        let child = self
            .runner
            .spawn(&spec, DAEMON_TAG)
            .map_err(|source| DaemonError::Spawn {
                op: Operation::Start,
                command: spec.display(),
                source,
            })?;
        let mut process = ManagedProcess {
            pid: child.id(),
            child,
        };

        match self.wait_for_daemon(&socket, &mut process, cancel) {
            Ok(attempts) => {
                info!(pid = process.pid, attempts, %socket, "docker daemon started");
                self.socket = socket;
                self.daemon = Some(process);
                Ok(())
            }
            Err(err) => {
                if !matches!(err, DaemonError::DaemonExited { .. })
                    && let Err(stop_err) = self.terminate(&mut process)
                {
                    warn!(
                        pid = process.pid,
                        error = %stop_err,
                        "failed to stop docker daemon after failed start"
                    );
                    self.daemon = Some(process);
                }
                Err(err)
            }
        }
    }

    /// Signal the managed daemon and wait for it to exit.
    ///
    /// Does nothing for a pre-existing daemon. If the signal cannot be
    /// delivered the daemon stays registered so `stop` can be retried.
    pub fn stop(&mut self) -> Result<(), DaemonError> {
        if !self.config.manage_daemon {
            return Ok(());
        }
        let Some(mut process) = self.daemon.take() else {
            return Err(DaemonError::NotRunning);
        };
        if let Err(err) = self.terminate(&mut process) {
            self.daemon = Some(process);
            return Err(err);
        }
        Ok(())
    }

    /// Pull each image in order, stopping at the first failure.
    pub fn pull<I, S>(&self, images: I) -> Result<(), DaemonError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for image in images {
            let spec = self.docker(["pull", image.as_ref()]);
            self.run_docker(Operation::Pull, &spec)?;
        }
        Ok(())
    }

    /// `docker run args...`, returning the trimmed stdout: the container ID
    /// for detached runs.
    pub fn run<I, S>(&self, args: I) -> Result<ContainerRef, DaemonError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args = args.into_iter().map(|a| a.as_ref().to_string());
        let spec = self.docker(std::iter::once("run".to_string()).chain(args));
        let output = self.run_docker(Operation::Run, &spec)?;
        logging::log_with_prefix(DOCKER_TAG, &output.combined);
        Ok(ContainerRef::new(output.stdout.trim()))
    }

    /// Force-remove a container.
    pub fn remove(&self, container: impl AsRef<str>) -> Result<(), DaemonError> {
        let spec = self.docker(["rm", "-f", container.as_ref()]);
        self.run_docker(Operation::Remove, &spec).map(drop)
    }

    pub fn kill(&self, container: impl AsRef<str>) -> Result<(), DaemonError> {
        let spec = self.docker(["kill", container.as_ref()]);
        self.run_docker(Operation::Kill, &spec).map(drop)
    }

    /// IDs of running containers, optionally restricted by a `--filter`
    /// expression. An empty filter lists everything.
    pub fn list(&self, filter: &str) -> Result<Vec<ContainerRef>, DaemonError> {
        let mut args = vec!["ps", "-q"];
        if !filter.is_empty() {
            args.extend(["--filter", filter]);
        }
        let output = self.run_docker(Operation::List, &self.docker(args))?;
        Ok(parse_container_ids(&output.stdout))
    }

    /// One `docker info` call against the current socket.
    pub fn info(&self) -> Result<CommandOutput, DaemonError> {
        self.run_docker(Operation::Probe, &self.docker(["info"]))
    }

    /// `docker -H <socket> args...` with the configured timeout.
    fn docker<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.docker_at(&self.socket, args)
    }

    fn docker_at<I, S>(&self, socket: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new(self.config.docker_exec.as_str())
            .args(["-H", socket])
            .args(args)
            .with_timeout(self.config.command_timeout())
    }

    fn run_docker(&self, op: Operation, spec: &CommandSpec) -> Result<CommandOutput, DaemonError> {
        run_checked(self.runner.as_ref(), op, DOCKER_TAG, spec)
    }

    fn wait_for_daemon(
        &self,
        socket: &str,
        process: &mut ManagedProcess,
        cancel: &CancelToken,
    ) -> Result<u32, DaemonError> {
        let readiness = &self.config.readiness;
        let command_timeout = self.config.command_timeout();

        wait_until_ready(
            Backoff::from_config(readiness),
            readiness.timeout(),
            cancel,
            |remaining| {
                match process.child.try_wait() {
                    Ok(Some(status)) => return Probe::Fatal(DaemonError::DaemonExited { status }),
                    Ok(None) => {}
                    Err(err) => warn!(error = %err, "failed to poll docker daemon"),
                }
                // A hung `info` must not outlive the readiness deadline.
                let probe_spec = self
                    .docker_at(socket, ["info"])
                    .with_timeout(command_timeout.min(remaining));
                match self.runner.output(&probe_spec) {
                    Ok(out) if out.success() => Probe::Ready,
                    // Covers a probe killed at its timeout as well.
                    Ok(out) => Probe::NotReady(out.combined),
                    // The CLI itself is missing; retrying cannot help.
                    Err(source) => Probe::Fatal(DaemonError::Spawn {
                        op: Operation::Probe,
                        command: probe_spec.display(),
                        source,
                    }),
                }
            },
        )
    }

    fn terminate(&self, process: &mut ManagedProcess) -> Result<(), DaemonError> {
        // The daemon runs as root, so the signal has to be sent the same way.
        let spec = self
            .privileged
            .command("kill", [process.pid.to_string()])
            .with_timeout(self.config.command_timeout());
        run_checked(self.runner.as_ref(), Operation::Stop, "kill", &spec)?;

        match process.child.wait() {
            Ok(status) => info!(pid = process.pid, %status, "docker daemon exited"),
            Err(err) => warn!(pid = process.pid, error = %err, "waiting for docker daemon failed"),
        }
        Ok(())
    }
}

impl Drop for DaemonController {
    fn drop(&mut self) {
        if let Some(mut process) = self.daemon.take() {
            warn!(pid = process.pid, "controller dropped with daemon running; stopping it");
            if let Err(err) = self.terminate(&mut process) {
                warn!(error = %err, "failed to stop docker daemon");
            }
        }
    }
}

fn create_dir(path: &Path) -> Result<(), DaemonError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path).map_err(|source| DaemonError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
