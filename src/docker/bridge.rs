use std::time::Duration;

use tracing::info;

use super::error::DaemonError;
use super::invoke::run_checked;
use super::types::Operation;
use crate::exec::{CommandRunner, CommandSpec, PrivilegedExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BridgeState {
    Existing,
    Created,
}

/// Make sure the bridge device `bridge` exists, creating it with `cidr` and
/// bringing it up when it does not.
///
/// Any failure of the `ip link show` probe, including `ip` itself being
/// missing, counts as "absent".
pub(crate) fn ensure_bridge(
    runner: &dyn CommandRunner,
    privileged: &PrivilegedExecutor,
    bridge: &str,
    cidr: &str,
    timeout: Duration,
) -> Result<BridgeState, DaemonError> {
    let probe = CommandSpec::new("ip")
        .args(["link", "show", bridge])
        .with_timeout(timeout);
    if runner.output(&probe).is_ok_and(|out| out.success()) {
        info!(bridge, "bridge device exists");
        return Ok(BridgeState::Existing);
    }

    info!(bridge, cidr, "creating bridge device");
    let steps = [
        ("brctl", vec!["addbr", bridge]),
        ("ip", vec!["addr", "add", cidr, "dev", bridge]),
        ("ip", vec!["link", "set", "dev", bridge, "up"]),
    ];
    for (program, args) in steps {
        let spec = privileged.command(program, args).with_timeout(timeout);
        run_checked(runner, Operation::Bridge, program, &spec)?;
    }

    Ok(BridgeState::Created)
}
