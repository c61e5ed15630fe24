use super::types::CommandSpec;
use crate::config::Privilege;

/// Builds commands that need root: bridge setup, launching the daemon and
/// signalling it.
///
/// The executor only decides the prefix (`sudo` or nothing); the commands it
/// builds still go through the controller's [`super::CommandRunner`], so a
/// mock runner sees `sudo kill 42` without anything being elevated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedExecutor {
    prefix: Vec<String>,
}

impl PrivilegedExecutor {
    /// Use an arbitrary prefix, e.g. `["doas"]` or `["sudo", "-n"]`.
    pub fn new<I, S>(prefix: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sudo() -> Self {
        Self::new(["sudo"])
    }

    /// Run privileged commands as-is.
    pub fn direct() -> Self {
        Self { prefix: Vec::new() }
    }

    pub fn from_privilege(privilege: Privilege) -> Self {
        match privilege {
            Privilege::Sudo => Self::sudo(),
            Privilege::None => Self::direct(),
            Privilege::Auto if is_root() => Self::direct(),
            Privilege::Auto => Self::sudo(),
        }
    }

    pub fn is_elevating(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// `program args...`, prefixed as configured.
    pub fn command<I, S>(&self, program: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.prefix.split_first() {
            Some((head, rest)) => CommandSpec::new(head.as_str())
                .args(rest.iter().cloned())
                .arg(program)
                .args(args),
            None => CommandSpec::new(program).args(args),
        }
    }
}

fn is_root() -> bool {
    #[cfg(unix)]
    {
        // SAFETY: geteuid() is a POSIX getter that always succeeds and has no side effects.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    {
        false
    }
}
