use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::command::SimCommand;

const WAIT_STEP: Duration = Duration::from_millis(20);
const REAP_LIMIT: Duration = Duration::from_millis(500);

/// How a simulator process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Terminated by a signal, no exit code.
    Signal,
}

impl Exit {
    pub fn success(self) -> bool {
        self == Exit::Code(0)
    }
}

impl From<ExitStatus> for Exit {
    fn from(status: ExitStatus) -> Self {
        status.code().map_or(Exit::Signal, Exit::Code)
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Code(code) => write!(f, "exit code {code}"),
            Exit::Signal => write!(f, "terminated by signal"),
        }
    }
}

/// Exit state plus everything the process wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub exit: Exit,
    pub stdout: String,
    pub stderr: String,
}

/// Starts simulator processes.
pub trait Launcher {
    /// Run to completion, capturing both streams.
    fn run(&self, command: &SimCommand) -> io::Result<Captured>;

    /// Start in the background and hand back exclusive ownership of the process.
    fn spawn(&self, command: &SimCommand) -> io::Result<Box<dyn SimProcess>>;
}

/// A background simulator process.
pub trait SimProcess {
    /// Non-blocking exit check.
    fn has_exited(&mut self) -> io::Result<bool>;

    /// Ask the process to stop.
    fn terminate(&mut self) -> io::Result<()>;

    /// Wait up to `limit` for the process to exit. Returns whether it did.
    fn wait_for(&mut self, limit: Duration) -> io::Result<bool>;

    /// Stop the process unconditionally.
    fn kill(&mut self) -> io::Result<()>;

    /// Reap the process and return its output. Blocks until it has exited.
    fn collect(self: Box<Self>) -> io::Result<Captured>;
}

/// Launches real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLauncher;

impl OsLauncher {
    fn command(command: &SimCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn_os(&self, command: &SimCommand) -> io::Result<OsProcess> {
        let mut cmd = Self::command(command);
        // Own process group, so termination also reaches whatever the launcher forks.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let mut child = cmd.spawn()?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        Ok(OsProcess {
            child,
            stdout,
            stderr,
        })
    }
}

impl Launcher for OsLauncher {
    fn run(&self, command: &SimCommand) -> io::Result<Captured> {
        let output = Self::command(command).output()?;
        Ok(Captured {
            exit: output.status.into(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn(&self, command: &SimCommand) -> io::Result<Box<dyn SimProcess>> {
        Ok(Box::new(self.spawn_os(command)?))
    }
}

/// Pipes are drained on reader threads so a chatty simulator never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// A spawned simulator. Dropping it before it has exited kills its whole process group.
pub struct OsProcess {
    child: Child,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
}

impl OsProcess {
    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) -> io::Result<()> {
        let pgid = libc::pid_t::try_from(self.child.id())
            .map_err(|_| io::Error::other("pid out of range"))?;
        // SAFETY: plain syscall on a process group this process created.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl SimProcess for OsProcess {
    fn has_exited(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_some())
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        self.signal_group(libc::SIGTERM)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn wait_for(&mut self, limit: Duration) -> io::Result<bool> {
        let start = Instant::now();
        loop {
            if self.child.try_wait()?.is_some() {
                return Ok(true);
            }
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Ok(false);
            }
            thread::sleep(WAIT_STEP.min(limit - elapsed));
        }
    }

    #[cfg(unix)]
    fn kill(&mut self) -> io::Result<()> {
        self.signal_group(libc::SIGKILL)
    }

    #[cfg(not(unix))]
    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn collect(mut self: Box<Self>) -> io::Result<Captured> {
        let status = self.child.wait()?;
        Ok(Captured {
            exit: status.into(),
            stdout: join(self.stdout.take()),
            stderr: join(self.stderr.take()),
        })
    }
}

impl Drop for OsProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            if let Err(err) = self.kill() {
                debug!("Could not kill dropped simulator: {}", err);
            }
            // Bounded: a process stuck in the kernel is left behind rather than hanging the caller.
            if !self.wait_for(REAP_LIMIT).unwrap_or(false) {
                warn!("Dropped simulator (pid {}) did not exit after kill", self.child.id());
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> SimCommand {
        SimCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
            workdir: PathBuf::from("."),
        }
    }

    #[test]
    fn run_captures_both_streams() {
        let out = OsLauncher.run(&sh("echo out; echo err >&2; exit 4")).unwrap();
        assert_eq!(out.exit, Exit::Code(4));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
    }

    fn scratch(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("flnet-proc-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn wait_until(limit: Duration, ready: impl Fn() -> bool) {
        let start = Instant::now();
        while !ready() {
            assert!(start.elapsed() < limit, "condition not reached in {limit:?}");
            thread::sleep(WAIT_STEP);
        }
    }

    fn alive(pid: u32) -> bool {
        // SAFETY: signal 0 only checks that the pid exists.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[test]
    fn spawned_process_can_be_terminated() {
        let marker = scratch("started");
        let script = format!("echo started; : > '{}'; sleep 30", marker.display());
        let mut proc = OsLauncher.spawn(&sh(&script)).unwrap();
        wait_until(Duration::from_secs(5), || marker.exists());
        assert!(!proc.has_exited().unwrap());
        proc.terminate().unwrap();
        assert!(proc.wait_for(Duration::from_secs(5)).unwrap());
        let out = proc.collect().unwrap();
        assert_eq!(out.exit, Exit::Signal);
        assert_eq!(out.stdout, "started\n");
        let _ = std::fs::remove_file(marker);
    }

    #[test]
    fn dropping_a_live_process_kills_and_reaps_it() {
        let proc = OsLauncher.spawn_os(&sh("trap '' TERM; sleep 30")).unwrap();
        let pid = proc.child.id();
        assert!(alive(pid));
        drop(proc);
        assert!(!alive(pid));
    }

    #[test]
    fn dropping_a_collected_process_is_harmless() {
        let proc = OsLauncher.spawn(&sh("echo done")).unwrap();
        let out = proc.collect().unwrap();
        assert_eq!(out.exit, Exit::Code(0));
        assert_eq!(out.stdout, "done\n");
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let cmd = SimCommand {
            program: "./definitely-not-a-simulator".into(),
            args: vec![],
            workdir: PathBuf::from("."),
        };
        assert!(OsLauncher.spawn(&cmd).is_err());
        assert!(OsLauncher.run(&cmd).is_err());
    }
}
