use tracing::debug;

use super::error::DaemonError;
use super::types::Operation;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::logging;

/// Run `spec` and turn anything but a clean zero exit into a [`DaemonError`].
///
/// On failure the combined output goes to the log sink under `tag` before
/// the error is returned.
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    op: Operation,
    tag: &str,
    spec: &CommandSpec,
) -> Result<CommandOutput, DaemonError> {
    debug!(%op, command = %spec, "exec");

    let output = runner.output(spec).map_err(|source| DaemonError::Spawn {
        op,
        command: spec.display(),
        source,
    })?;

    if output.timed_out {
        logging::log_with_prefix(tag, &output.combined);
        return Err(DaemonError::CommandTimedOut {
            op,
            command: spec.display(),
            timeout: spec.timeout.unwrap_or_default(),
            output: output.combined,
        });
    }

    if !output.success() {
        logging::log_with_prefix(tag, &output.combined);
        return Err(DaemonError::CommandFailed {
            op,
            command: spec.display(),
            status: output.status.unwrap_or_default(),
            output: output.combined,
        });
    }

    Ok(output)
}
