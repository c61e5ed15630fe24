//! Drive a local Docker daemon from end-to-end test harnesses by shelling
//! out to the `docker` CLI.
//!
//! ```no_run
//! use e2e_docker::DaemonController;
//!
//! # fn main() -> Result<(), e2e_docker::DaemonError> {
//! let mut docker = DaemonController::host_default();
//! docker.start()?;
//! docker.pull(["busybox"])?;
//! let id = docker.run(["-d", "busybox", "sleep", "60"])?;
//! assert!(docker.list("")?.contains(&id));
//! docker.remove(&id)?;
//! docker.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod docker;
pub mod exec;
pub mod logging;

pub use config::DaemonConfig;
pub use docker::{CancelToken, ContainerRef, DaemonController, DaemonError, Operation};
