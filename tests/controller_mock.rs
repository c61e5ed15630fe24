//! Controller behaviour against a scripted runner. No docker, root or
//! network bridge required.

use std::io;
use std::path::Path;
use std::sync::Arc;

use e2e_docker::config::{DaemonConfig, Privilege, ReadinessConfig};
use e2e_docker::exec::{
    CommandSpec, ExitSummary, MockResponse, MockRunner, PrivilegedExecutor, args_contain,
};
use e2e_docker::{CancelToken, DaemonController, DaemonError, Operation};

const HOST_SOCKET: &str = "unix:///var/run/docker.sock";

fn argv(spec: &CommandSpec) -> Vec<String> {
    spec.argv().into_iter().map(String::from).collect()
}

fn argvs(runner: &MockRunner) -> Vec<Vec<String>> {
    runner.calls().iter().map(argv).collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn host_controller() -> (Arc<MockRunner>, DaemonController) {
    let runner = Arc::new(MockRunner::new());
    let ctl = DaemonController::with_runner(DaemonConfig::host_default(), runner.clone());
    (runner, ctl)
}

fn managed_config(base: &Path) -> DaemonConfig {
    DaemonConfig {
        manage_daemon: true,
        base_dir: base.to_path_buf(),
        bridge: "e2ebr0".into(),
        cidr: "10.123.0.0/24".into(),
        privilege: Privilege::Sudo,
        readiness: ReadinessConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            multiplier: 2.0,
            timeout_secs: 5,
        },
        ..DaemonConfig::default()
    }
}

fn managed_controller(base: &Path) -> (Arc<MockRunner>, DaemonController) {
    let runner = Arc::new(MockRunner::new());
    let ctl = DaemonController::with_runner(managed_config(base), runner.clone());
    (runner, ctl)
}

fn kill_calls(runner: &MockRunner) -> Vec<Vec<String>> {
    argvs(runner)
        .into_iter()
        .filter(|a| a.get(1).map(String::as_str) == Some("kill"))
        .collect()
}

// ── pull ────────────────────────────────────────────────────────────

#[test]
fn pull_single_image() {
    let (runner, ctl) = host_controller();
    ctl.pull(["busybox"]).unwrap();
    assert_eq!(
        argvs(&runner),
        vec![words(&["docker", "-H", HOST_SOCKET, "pull", "busybox"])]
    );
}

#[test]
fn pull_issues_one_call_per_image_in_order() {
    let (runner, ctl) = host_controller();
    ctl.pull(["alpine", "busybox:1.36", "nginx"]).unwrap();

    let pulled: Vec<String> = runner
        .calls()
        .iter()
        .map(|c| c.args.last().cloned().unwrap_or_default())
        .collect();
    assert_eq!(pulled, words(&["alpine", "busybox:1.36", "nginx"]));
}

#[test]
fn pull_stops_at_first_failure() {
    let (runner, ctl) = host_controller();
    runner.on(
        args_contain(&["pull", "missing"]),
        MockResponse::fail(1, "Error response from daemon: manifest unknown"),
    );

    let err = ctl.pull(["alpine", "missing", "nginx"]).unwrap_err();
    match &err {
        DaemonError::CommandFailed { op, status, output, .. } => {
            assert_eq!(*op, Operation::Pull);
            assert_eq!(status.code(), Some(1));
            assert!(output.contains("manifest unknown"));
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
    assert_eq!(runner.calls().len(), 2, "nginx must not be pulled");
}

#[test]
fn pull_nothing_runs_nothing() {
    let (runner, ctl) = host_controller();
    ctl.pull(Vec::<String>::new()).unwrap();
    assert!(runner.calls().is_empty());
}

// ── run / remove / kill ─────────────────────────────────────────────

#[test]
fn run_returns_trimmed_stdout() {
    let (runner, ctl) = host_controller();
    runner.on(args_contain(&["run"]), MockResponse::stdout("abc123\n"));

    let id = ctl.run(["--rm", "busybox", "echo", "hi"]).unwrap();
    assert_eq!(id, "abc123");
    assert_eq!(
        argvs(&runner),
        vec![words(&["docker", "-H", HOST_SOCKET, "run", "--rm", "busybox", "echo", "hi"])]
    );
}

#[test]
fn run_failure_carries_combined_output() {
    let (runner, ctl) = host_controller();
    runner.on(
        args_contain(&["run"]),
        MockResponse::fail(125, "docker: invalid reference format."),
    );

    let err = ctl.run(["BAD IMAGE"]).unwrap_err();
    assert_eq!(err.operation(), Some(Operation::Run));
    assert_eq!(err.output(), Some("docker: invalid reference format."));
}

#[test]
fn run_timeout_is_distinct_from_failure() {
    let (runner, ctl) = host_controller();
    runner.on(args_contain(&["run"]), MockResponse::timed_out(""));

    let err = ctl.run(["busybox", "sleep", "9999"]).unwrap_err();
    assert!(matches!(err, DaemonError::CommandTimedOut { op: Operation::Run, .. }));
}

#[test]
fn remove_forces() {
    let (runner, ctl) = host_controller();
    ctl.remove("abc123").unwrap();
    assert_eq!(
        argvs(&runner),
        vec![words(&["docker", "-H", HOST_SOCKET, "rm", "-f", "abc123"])]
    );
}

#[test]
fn kill_accepts_container_ref() {
    let (runner, ctl) = host_controller();
    runner.on(args_contain(&["run"]), MockResponse::stdout("deadbeef\n"));

    let id = ctl.run(["-d", "busybox", "sleep", "60"]).unwrap();
    ctl.kill(&id).unwrap();
    assert_eq!(
        argv(&runner.calls()[1]),
        words(&["docker", "-H", HOST_SOCKET, "kill", "deadbeef"])
    );
}

#[test]
fn missing_docker_binary_is_spawn_error() {
    let (runner, ctl) = host_controller();
    runner.on(args_contain(&["docker"]), MockResponse::SpawnError(io::ErrorKind::NotFound));

    let err = ctl.remove("x").unwrap_err();
    match err {
        DaemonError::Spawn { op, source, .. } => {
            assert_eq!(op, Operation::Remove);
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("expected Spawn, got {other:?}"),
    }
}

// ── list ────────────────────────────────────────────────────────────

#[test]
fn list_without_filter_drops_blank_lines() {
    let (runner, ctl) = host_controller();
    runner.on(args_contain(&["ps"]), MockResponse::stdout("id1\n\nid2\n"));

    let ids = ctl.list("").unwrap();
    assert_eq!(ids, vec!["id1", "id2"]);
    assert_eq!(
        argvs(&runner),
        vec![words(&["docker", "-H", HOST_SOCKET, "ps", "-q"])]
    );
}

#[test]
fn list_with_filter_passes_flag() {
    let (runner, ctl) = host_controller();
    runner.on(args_contain(&["ps"]), MockResponse::stdout("  web1 \nweb2\n"));

    let ids = ctl.list("name=web").unwrap();
    assert_eq!(ids, vec!["web1", "web2"]);
    assert_eq!(
        argvs(&runner),
        vec![words(&["docker", "-H", HOST_SOCKET, "ps", "-q", "--filter", "name=web"])]
    );
}

#[test]
fn list_with_no_containers_is_empty() {
    let (_runner, ctl) = host_controller();
    assert!(ctl.list("").unwrap().is_empty());
}

#[test]
fn list_failure_is_error_not_empty() {
    let (runner, ctl) = host_controller();
    runner.on(
        args_contain(&["ps"]),
        MockResponse::fail(1, "Cannot connect to the Docker daemon"),
    );
    assert!(matches!(
        ctl.list("").unwrap_err(),
        DaemonError::CommandFailed { op: Operation::List, .. }
    ));
}

// ── start / stop ────────────────────────────────────────────────────

#[test]
fn start_with_existing_daemon_does_nothing() {
    let (runner, mut ctl) = host_controller();
    ctl.start().unwrap();

    assert!(runner.calls().is_empty());
    assert!(runner.spawned().is_empty());
    assert!(!ctl.is_running());
    assert_eq!(ctl.socket(), HOST_SOCKET);
}

#[test]
fn managed_start_launches_daemon_and_waits() {
    let base = tempfile::tempdir().unwrap();
    let root = base.path().display().to_string();
    let (runner, mut ctl) = managed_controller(base.path());
    runner
        .on(args_contain(&["link", "show"]), MockResponse::fail(1, "does not exist"))
        .on_times(2, args_contain(&["info"]), MockResponse::fail(1, "Cannot connect"));

    ctl.start().unwrap();

    assert!(base.path().join("var/run/docker").is_dir());
    assert!(base.path().join("var/lib/docker").is_dir());

    let socket = format!("unix://{root}/var/run/docker.sock");
    assert_eq!(ctl.socket(), socket);
    assert!(ctl.is_running());

    let spawned = runner.spawned();
    assert_eq!(spawned.len(), 1);
    assert_eq!(
        argv(&spawned[0]),
        vec![
            "sudo".to_string(),
            "docker".into(),
            "daemon".into(),
            "--bridge=e2ebr0".into(),
            format!("--exec-root={root}/var/run/docker"),
            format!("--graph={root}/var/lib/docker"),
            format!("--host={socket}"),
            format!("--pidfile={root}/pid"),
        ]
    );

    let calls = argvs(&runner);
    assert_eq!(calls[0], words(&["ip", "link", "show", "e2ebr0"]));
    assert_eq!(calls[1], words(&["sudo", "brctl", "addbr", "e2ebr0"]));
    assert_eq!(calls[2], words(&["sudo", "ip", "addr", "add", "10.123.0.0/24", "dev", "e2ebr0"]));
    assert_eq!(calls[3], words(&["sudo", "ip", "link", "set", "dev", "e2ebr0", "up"]));

    let probes = &calls[4..];
    assert_eq!(probes.len(), 3, "two refused probes, then ready");
    for probe in probes {
        assert_eq!(probe, &words(&["docker", "-H", socket.as_str(), "info"]));
    }

    // Later calls go to the managed daemon.
    ctl.list("").unwrap();
    assert_eq!(argvs(&runner).last().unwrap()[2], socket);
}

#[test]
fn managed_start_skips_setup_for_existing_bridge() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());

    ctl.start().unwrap();

    let calls = argvs(&runner);
    assert!(!calls.iter().any(|c| c.contains(&"brctl".to_string())));
    assert_eq!(calls[0], words(&["ip", "link", "show", "e2ebr0"]));
}

#[test]
fn bridge_failure_aborts_before_daemon_launch() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    runner
        .on(args_contain(&["link", "show"]), MockResponse::fail(1, ""))
        .on(
            args_contain(&["brctl"]),
            MockResponse::fail(1, "add bridge failed: Operation not permitted"),
        );

    let err = ctl.start().unwrap_err();
    assert_eq!(err.operation(), Some(Operation::Bridge));
    assert!(runner.spawned().is_empty());
    assert!(!ctl.is_running());
}

#[test]
fn second_start_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    ctl.start().unwrap();
    let pid = ctl.daemon_pid().unwrap();

    match ctl.start().unwrap_err() {
        DaemonError::AlreadyRunning { pid: running } => assert_eq!(running, pid),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(runner.spawned().len(), 1);
}

#[test]
fn readiness_timeout_stops_daemon() {
    let base = tempfile::tempdir().unwrap();
    let mut cfg = managed_config(base.path());
    cfg.readiness.timeout_secs = 0;
    let runner = Arc::new(MockRunner::new());
    runner.on(
        args_contain(&["info"]),
        MockResponse::fail(1, "Cannot connect to the Docker daemon"),
    );
    let mut ctl = DaemonController::with_runner(cfg, runner.clone());

    let err = ctl.start().unwrap_err();
    match &err {
        DaemonError::ReadinessTimeout { attempts, last_output, .. } => {
            assert_eq!(*attempts, 1);
            assert!(last_output.contains("Cannot connect"));
        }
        other => panic!("expected ReadinessTimeout, got {other:?}"),
    }
    assert!(err.is_timeout());
    assert!(!ctl.is_running());
    assert_eq!(kill_calls(&runner).len(), 1);
}

#[test]
fn readiness_probe_cannot_outlast_deadline() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    ctl.start().unwrap();

    let deadline = ctl.config().readiness.timeout();
    assert!(deadline < ctl.config().command_timeout());
    let probes: Vec<CommandSpec> = runner
        .calls()
        .into_iter()
        .filter(|c| c.args.last().map(String::as_str) == Some("info"))
        .collect();
    assert!(!probes.is_empty());
    for probe in probes {
        let timeout = probe.timeout.expect("probe has a timeout");
        assert!(timeout <= deadline, "probe timeout {timeout:?} > deadline {deadline:?}");
    }
}

#[test]
fn hung_probe_is_retried() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    runner.on_times(1, args_contain(&["info"]), MockResponse::timed_out(""));

    ctl.start().unwrap();
    assert!(ctl.is_running());
    let probes = argvs(&runner)
        .iter()
        .filter(|c| c.last().map(String::as_str) == Some("info"))
        .count();
    assert_eq!(probes, 2);
}

#[test]
fn failed_start_keeps_original_socket() {
    let base = tempfile::tempdir().unwrap();
    let mut cfg = managed_config(base.path());
    cfg.readiness.timeout_secs = 0;
    let runner = Arc::new(MockRunner::new());
    runner.on(args_contain(&["info"]), MockResponse::fail(1, "Cannot connect"));
    let mut ctl = DaemonController::with_runner(cfg, runner.clone());

    assert!(ctl.start().unwrap_err().is_timeout());
    assert_eq!(ctl.socket(), HOST_SOCKET);

    ctl.list("").unwrap();
    assert_eq!(argvs(&runner).last().unwrap()[2], HOST_SOCKET);
}

#[test]
fn daemon_that_survives_failed_start_stays_registered() {
    let base = tempfile::tempdir().unwrap();
    let mut cfg = managed_config(base.path());
    cfg.readiness.timeout_secs = 0;
    let runner = Arc::new(MockRunner::new());
    runner
        .on(args_contain(&["info"]), MockResponse::fail(1, "Cannot connect"))
        .on_times(
            1,
            args_contain(&["kill"]),
            MockResponse::fail(1, "kill: Operation not permitted"),
        );
    let mut ctl = DaemonController::with_runner(cfg, runner.clone());

    let err = ctl.start().unwrap_err();
    assert!(matches!(err, DaemonError::ReadinessTimeout { .. }));
    assert!(ctl.is_running());
    let pid = ctl.daemon_pid().unwrap();

    match ctl.start().unwrap_err() {
        DaemonError::AlreadyRunning { pid: running } => assert_eq!(running, pid),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(runner.spawned().len(), 1);

    ctl.stop().unwrap();
    assert!(!ctl.is_running());
    assert_eq!(kill_calls(&runner).len(), 2);
}

#[test]
fn cancelled_start_stops_daemon() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = ctl.start_cancellable(&cancel).unwrap_err();
    assert!(matches!(err, DaemonError::Cancelled { op: Operation::Start }));
    assert!(!ctl.is_running());
    assert_eq!(kill_calls(&runner).len(), 1);
}

#[test]
fn daemon_dying_during_startup_is_reported() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    runner.exit_spawned_immediately(ExitSummary::from_code(1));

    match ctl.start().unwrap_err() {
        DaemonError::DaemonExited { status } => assert_eq!(status.code(), Some(1)),
        other => panic!("expected DaemonExited, got {other:?}"),
    }
    assert!(kill_calls(&runner).is_empty(), "nothing left to signal");
    assert!(!ctl.is_running());
}

#[test]
fn daemon_spawn_failure() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    runner.fail_spawns(io::ErrorKind::PermissionDenied);

    let err = ctl.start().unwrap_err();
    assert!(matches!(err, DaemonError::Spawn { op: Operation::Start, .. }));
    assert!(!ctl.is_running());
}

#[test]
fn unwritable_base_dir_fails_start() {
    let base = tempfile::tempdir().unwrap();
    let blocker = base.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let (runner, mut ctl) = managed_controller(&blocker);

    let err = ctl.start().unwrap_err();
    assert!(matches!(err, DaemonError::CreateDir { .. }));
    assert!(runner.calls().is_empty());
}

#[test]
fn stop_signals_daemon_pid() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    ctl.start().unwrap();
    let pid = ctl.daemon_pid().unwrap();

    ctl.stop().unwrap();

    assert!(!ctl.is_running());
    assert_eq!(
        kill_calls(&runner),
        vec![vec!["sudo".to_string(), "kill".into(), pid.to_string()]]
    );
}

#[test]
fn failed_signal_keeps_daemon_registered() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    ctl.start().unwrap();
    runner.on_times(
        1,
        args_contain(&["kill"]),
        MockResponse::fail(1, "kill: Operation not permitted"),
    );

    let err = ctl.stop().unwrap_err();
    assert_eq!(err.operation(), Some(Operation::Stop));
    assert!(ctl.is_running());

    ctl.stop().unwrap();
    assert!(!ctl.is_running());
}

#[test]
fn stop_before_start_is_not_running() {
    let base = tempfile::tempdir().unwrap();
    let (_runner, mut ctl) = managed_controller(base.path());
    assert!(matches!(ctl.stop().unwrap_err(), DaemonError::NotRunning));
}

#[test]
fn dropping_controller_stops_daemon() {
    let base = tempfile::tempdir().unwrap();
    let (runner, mut ctl) = managed_controller(base.path());
    ctl.start().unwrap();
    drop(ctl);
    assert_eq!(kill_calls(&runner).len(), 1);
}

#[test]
fn direct_privilege_runs_without_sudo() {
    let base = tempfile::tempdir().unwrap();
    let runner = Arc::new(MockRunner::new());
    let mut ctl = DaemonController::with_runner(managed_config(base.path()), runner.clone())
        .with_privileged(PrivilegedExecutor::direct());

    ctl.start().unwrap();
    ctl.stop().unwrap();

    assert_eq!(argv(&runner.spawned()[0])[0], "docker");
    assert_eq!(kill_calls(&runner).len(), 0);
    let last = argvs(&runner).pop().unwrap();
    assert_eq!(last[0], "kill");
}
