// Subprocess plumbing: command specs, runners and privilege prefixes.

pub mod mock;
pub mod privileged;
pub mod runner;
pub mod types;

pub use mock::{MockResponse, MockRunner, args_contain};
pub use privileged::PrivilegedExecutor;
pub use runner::{CommandRunner, ManagedChild, SystemRunner};
pub use types::{CommandOutput, CommandSpec, ExitSummary};
