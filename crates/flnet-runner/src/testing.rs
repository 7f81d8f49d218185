//! In-memory stand-ins for the simulator process and the wall clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::command::SimCommand;
use crate::process::{Captured, Exit, Launcher, SimProcess};

pub fn captured(exit: i32, stdout: &str, stderr: &str) -> Captured {
    Captured {
        exit: Exit::Code(exit),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct FakeState {
    pub exited: bool,
    pub exit: Exit,
    pub stdout: String,
    pub stderr: String,
    /// Whether a terminate request makes the process exit.
    pub honours_terminate: bool,
    pub terminated: bool,
    pub killed: bool,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            exited: false,
            exit: Exit::Code(0),
            stdout: String::new(),
            stderr: String::new(),
            honours_terminate: true,
            terminated: false,
            killed: false,
        }
    }
}

pub struct FakeProcess(Rc<RefCell<FakeState>>);

impl SimProcess for FakeProcess {
    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.0.borrow().exited)
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut state = self.0.borrow_mut();
        state.terminated = true;
        if state.honours_terminate {
            state.exited = true;
            state.exit = Exit::Signal;
        }
        Ok(())
    }

    fn wait_for(&mut self, _limit: Duration) -> io::Result<bool> {
        Ok(self.0.borrow().exited)
    }

    fn kill(&mut self) -> io::Result<()> {
        let mut state = self.0.borrow_mut();
        state.killed = true;
        state.exited = true;
        state.exit = Exit::Signal;
        Ok(())
    }

    fn collect(self: Box<Self>) -> io::Result<Captured> {
        let state = self.0.borrow();
        assert!(state.exited, "collect on a live fake process");
        Ok(Captured {
            exit: state.exit,
            stdout: state.stdout.clone(),
            stderr: state.stderr.clone(),
        })
    }
}

/// Records every command and plays back scripted results.
#[derive(Default)]
pub struct FakeLauncher {
    pub commands: RefCell<Vec<SimCommand>>,
    /// Results handed out by `run`, in order. An empty queue yields a silent success.
    pub run_results: RefCell<VecDeque<Captured>>,
    /// Template for the next spawned process.
    pub next_process: RefCell<FakeState>,
    pub spawned: RefCell<Vec<Rc<RefCell<FakeState>>>>,
    pub fail_spawn: Cell<bool>,
}

impl FakeLauncher {
    pub fn with_run(result: Captured) -> Self {
        let launcher = Self::default();
        launcher.run_results.borrow_mut().push_back(result);
        launcher
    }

    pub fn last_process(&self) -> Rc<RefCell<FakeState>> {
        self.spawned
            .borrow()
            .last()
            .cloned()
            .expect("no process spawned")
    }

    pub fn calls(&self) -> usize {
        self.commands.borrow().len()
    }
}

impl Launcher for FakeLauncher {
    fn run(&self, command: &SimCommand) -> io::Result<Captured> {
        self.commands.borrow_mut().push(command.clone());
        Ok(self
            .run_results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| captured(0, "", "")))
    }

    fn spawn(&self, command: &SimCommand) -> io::Result<Box<dyn SimProcess>> {
        self.commands.borrow_mut().push(command.clone());
        if self.fail_spawn.get() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such simulator"));
        }
        let state = Rc::new(RefCell::new(self.next_process.borrow().clone()));
        self.spawned.borrow_mut().push(Rc::clone(&state));
        Ok(Box::new(FakeProcess(state)))
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock(Rc<Cell<Instant>>);

impl Default for ManualClock {
    fn default() -> Self {
        Self(Rc::new(Cell::new(Instant::now())))
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}
