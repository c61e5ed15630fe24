// Docker orchestration over the CLI: daemon lifecycle and container commands.

mod bridge;
pub mod controller;
pub mod error;
mod invoke;
pub mod parse;
pub mod readiness;
pub mod types;

pub use controller::{DaemonController, ManagedProcess};
pub use error::DaemonError;
pub use parse::parse_container_ids;
pub use readiness::{Backoff, Probe, wait_until_ready};
pub use types::{CancelToken, ContainerRef, Operation};
