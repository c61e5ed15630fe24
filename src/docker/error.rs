use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::types::Operation;
use crate::exec::ExitSummary;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("{op}: failed to invoke `{command}`: {source}")]
    Spawn {
        op: Operation,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{op}: `{command}` failed with {status}")]
    CommandFailed {
        op: Operation,
        command: String,
        status: ExitSummary,
        output: String,
    },

    #[error("{op}: `{command}` timed out after {timeout:?}")]
    CommandTimedOut {
        op: Operation,
        command: String,
        timeout: Duration,
        output: String,
    },

    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("docker daemon not ready after {waited:?} ({attempts} probes)")]
    ReadinessTimeout {
        waited: Duration,
        attempts: u32,
        last_output: String,
    },

    #[error("docker daemon exited before becoming ready ({status})")]
    DaemonExited { status: ExitSummary },

    #[error("{op}: cancelled")]
    Cancelled { op: Operation },

    #[error("docker daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("docker daemon is not running")]
    NotRunning,
}

impl DaemonError {
    /// Output captured from the failing subprocess, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            DaemonError::CommandFailed { output, .. }
            | DaemonError::CommandTimedOut { output, .. }
            | DaemonError::ReadinessTimeout {
                last_output: output,
                ..
            } => Some(output.as_str()),
            _ => None,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            DaemonError::Spawn { op, .. }
            | DaemonError::CommandFailed { op, .. }
            | DaemonError::CommandTimedOut { op, .. }
            | DaemonError::Cancelled { op } => Some(*op),
            DaemonError::CreateDir { .. }
            | DaemonError::ReadinessTimeout { .. }
            | DaemonError::DaemonExited { .. }
            | DaemonError::AlreadyRunning { .. } => Some(Operation::Start),
            DaemonError::NotRunning => Some(Operation::Stop),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DaemonError::ReadinessTimeout { .. } | DaemonError::CommandTimedOut { .. }
        )
    }
}
