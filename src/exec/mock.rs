//! Scripted command runner for tests.
//!
//! `MockRunner` records every command it is asked to run and answers from a
//! list of rules. Rules are checked in registration order; the first one that
//! matches (and still has uses left) supplies the response. Commands that
//! match no rule succeed with empty output.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use super::runner::{CommandRunner, ManagedChild};
use super::types::{CommandOutput, CommandSpec, ExitSummary};

/// What a matched command produces.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Output(CommandOutput),
    /// The program could not be started at all.
    SpawnError(io::ErrorKind),
}

impl MockResponse {
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self::Output(CommandOutput::success_with(stdout))
    }

    pub fn fail(code: i32, combined: impl Into<String>) -> Self {
        Self::Output(CommandOutput::failure_with(code, combined))
    }

    pub fn timed_out(combined: impl Into<String>) -> Self {
        Self::Output(CommandOutput {
            status: None,
            stdout: String::new(),
            combined: combined.into(),
            timed_out: true,
        })
    }
}

type Matcher = Box<dyn Fn(&CommandSpec) -> bool + Send>;

struct Rule {
    matcher: Matcher,
    response: MockResponse,
    remaining: Option<usize>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<CommandSpec>,
    spawned: Vec<CommandSpec>,
    rules: Vec<Rule>,
    spawn_error: Option<io::ErrorKind>,
    spawn_exit: Option<ExitSummary>,
    next_pid: u32,
    children: Vec<Arc<Mutex<Option<ExitSummary>>>>,
}

#[derive(Default)]
pub struct MockRunner {
    state: Mutex<MockState>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every matching command with `response`.
    pub fn on<F>(&self, matcher: F, response: MockResponse) -> &Self
    where
        F: Fn(&CommandSpec) -> bool + Send + 'static,
    {
        self.push_rule(Box::new(matcher), response, None)
    }

    /// Answer the next `times` matching commands with `response`.
    pub fn on_times<F>(&self, times: usize, matcher: F, response: MockResponse) -> &Self
    where
        F: Fn(&CommandSpec) -> bool + Send + 'static,
    {
        self.push_rule(Box::new(matcher), response, Some(times))
    }

    /// Make every subsequent `spawn` fail with `kind`.
    pub fn fail_spawns(&self, kind: io::ErrorKind) {
        self.lock().spawn_error = Some(kind);
    }

    /// Children spawned from now on report `status` as soon as they are polled.
    pub fn exit_spawned_immediately(&self, status: ExitSummary) {
        self.lock().spawn_exit = Some(status);
    }

    /// Mark every spawned child as exited with `status`.
    pub fn exit_children(&self, status: ExitSummary) {
        for child in &self.lock().children {
            if let Ok(mut exit) = child.lock() {
                *exit = Some(status);
            }
        }
    }

    /// Every command passed to `output`, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.lock().calls.clone()
    }

    /// `calls()` rendered as command lines.
    pub fn command_lines(&self) -> Vec<String> {
        self.lock().calls.iter().map(CommandSpec::display).collect()
    }

    /// Every command passed to `spawn`, in order.
    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.lock().spawned.clone()
    }

    fn push_rule(
        &self,
        matcher: Matcher,
        response: MockResponse,
        remaining: Option<usize>,
    ) -> &Self {
        self.lock().rules.push(Rule {
            matcher,
            response,
            remaining,
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from the
        // assertions that follow.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommandRunner for MockRunner {
    fn output(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut state = self.lock();
        state.calls.push(spec.clone());

        let rule = state
            .rules
            .iter_mut()
            .find(|rule| rule.remaining != Some(0) && (rule.matcher)(spec));

        let response = match rule {
            Some(rule) => {
                if let Some(left) = rule.remaining.as_mut() {
                    *left -= 1;
                }
                rule.response.clone()
            }
            None => MockResponse::stdout(""),
        };

        match response {
            MockResponse::Output(out) => Ok(out),
            MockResponse::SpawnError(kind) => Err(io::Error::new(kind, "mock spawn failure")),
        }
    }

    fn spawn(&self, spec: &CommandSpec, _tag: &str) -> io::Result<Box<dyn ManagedChild>> {
        let mut state = self.lock();
        state.spawned.push(spec.clone());

        if let Some(kind) = state.spawn_error {
            return Err(io::Error::new(kind, "mock spawn failure"));
        }

        state.next_pid += 1;
        let pid = 4000 + state.next_pid;
        let exit = Arc::new(Mutex::new(state.spawn_exit));
        state.children.push(exit.clone());

        Ok(Box::new(MockChild { pid, exit }))
    }
}

/// Child handed out by [`MockRunner::spawn`]. It runs until
/// [`MockRunner::exit_children`] is called; `wait` on a still-running child
/// reports termination by SIGTERM.
pub struct MockChild {
    pid: u32,
    exit: Arc<Mutex<Option<ExitSummary>>>,
}

impl ManagedChild for MockChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitSummary>> {
        Ok(self.exit.lock().ok().and_then(|exit| *exit))
    }

    fn wait(&mut self) -> io::Result<ExitSummary> {
        let mut exit = self
            .exit
            .lock()
            .map_err(|_| io::Error::other("mock child state poisoned"))?;
        Ok(*exit.get_or_insert(ExitSummary::from_signal(15)))
    }
}

/// Matches commands whose argv contains `words` as a contiguous run.
pub fn args_contain(words: &[&str]) -> impl Fn(&CommandSpec) -> bool + Send + 'static {
    let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    move |spec: &CommandSpec| {
        let argv = spec.argv();
        !words.is_empty()
            && argv
                .windows(words.len())
                .any(|window| window.iter().zip(&words).all(|(a, b)| *a == b.as_str()))
    }
}
