//! Spawns children, targets signals at their process group, and tracks the
//! `Starting → Running → (Paused ↔ Running) → Terminating → Reaped` lifecycle.

use anyhow::{Context, Result, bail};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::process::{Child, Command};

use crate::pty::{PtyHandle, PtyMasterReader, PtyPort};
use crate::signal::{kill_process_group, terminate_process_group};

/// Spawn-time options controlling PTY use, shell wrapping, and isolation.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Run the child through a pseudo-terminal master rather than pipes.
    pub pty: bool,
    /// Interpret `command` as a shell string (`sh -c command`) rather than
    /// splitting it into an argv vector.
    pub shell: bool,
    /// Isolate the child in its own process group; on by default.
    pub process_group: bool,
    /// When `pty` is set, whether stderr shares the PTY rather than a pipe.
    pub combine_stderr: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            pty: false,
            shell: true,
            process_group: true,
            combine_stderr: false,
        }
    }
}

/// What to run and with what environment.
#[derive(Debug, Clone)]
pub struct SpawnTarget {
    pub command: String,
    pub env_overrides: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub env_denylist: HashSet<String>,
}

/// Lifecycle state of a supervised child.
///
/// `Terminating` is entered on cancel, timeout, or sink error; teardown
/// always targets the process group, never the leaf pid alone. `Reaped` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Paused,
    Terminating,
    Reaped,
}

/// Which stdio sources the multiplexer should read from.
pub enum ChildOutput {
    Piped {
        child: Child,
    },
    Pty {
        handle: PtyHandle,
    },
}

/// A spawned child plus the bookkeeping the executor needs to drive it.
pub struct ProcessHandle {
    pub pid: u32,
    /// Process group id; equal to `pid` because the child calls `setsid()`.
    pub pgid: u32,
    output: ChildOutput,
    state: ProcessState,
    exit_code: AtomicI32,
    reaped: std::sync::atomic::AtomicBool,
}

impl ProcessHandle {
    /// Take the piped stdout handle, if the child was not spawned with a PTY.
    pub fn take_stdout(&mut self) -> Option<tokio::process::ChildStdout> {
        match &mut self.output {
            ChildOutput::Piped { child } => child.stdout.take(),
            ChildOutput::Pty { .. } => None,
        }
    }

    /// Take the piped stderr handle, if the child was not spawned with a PTY.
    pub fn take_stderr(&mut self) -> Option<tokio::process::ChildStderr> {
        match &mut self.output {
            ChildOutput::Piped { child } => child.stderr.take(),
            ChildOutput::Pty { .. } => None,
        }
    }

    /// Take the PTY master reader, if the child was spawned with `pty: true`.
    pub fn take_pty_reader(&mut self) -> Option<PtyMasterReader> {
        match &mut self.output {
            ChildOutput::Pty { handle } => Some(std::mem::replace(
                &mut handle.reader,
                PtyMasterReader::spawn(Box::new(std::io::empty())),
            )),
            ChildOutput::Piped { .. } => None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Send `SIGTERM` to the whole process group.
    pub fn terminate(&mut self) {
        self.state = ProcessState::Terminating;
        terminate_process_group(self.pgid);
    }

    /// Send `SIGKILL` to the whole process group; the hard stop after `GRACE_MS`.
    pub fn kill(&mut self) {
        self.state = ProcessState::Terminating;
        kill_process_group(self.pgid);
    }

    /// Suspend the child by sending `SIGSTOP` to the group.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != ProcessState::Running {
            bail!("cannot pause from state {:?}", self.state);
        }
        #[cfg(unix)]
        {
            // SAFETY: kill() is async-signal-safe.
            unsafe {
                libc::kill(-(self.pgid as i32), libc::SIGSTOP);
            }
        }
        #[cfg(not(unix))]
        bail!("pause is unsupported on this platform");
        self.state = ProcessState::Paused;
        Ok(())
    }

    /// Resume a previously paused child by sending `SIGCONT` to the group.
    pub fn resume(&mut self) -> Result<()> {
        if self.state != ProcessState::Paused {
            bail!("cannot resume from state {:?}", self.state);
        }
        #[cfg(unix)]
        {
            // SAFETY: kill() is async-signal-safe.
            unsafe {
                libc::kill(-(self.pgid as i32), libc::SIGCONT);
            }
        }
        #[cfg(not(unix))]
        bail!("resume is unsupported on this platform");
        self.state = ProcessState::Running;
        Ok(())
    }

    /// Wait for exit, idempotently. Negative codes encode "killed by signal
    /// N" as `-N`.
    pub async fn wait(&mut self) -> Result<i32> {
        if self.reaped.load(Ordering::Acquire) {
            return Ok(self.exit_code.load(Ordering::Acquire));
        }
        let code = match &mut self.output {
            ChildOutput::Piped { child } => {
                let status = child.wait().await.context("failed to wait for child")?;
                exit_code_of(status)
            }
            ChildOutput::Pty { handle } => {
                let status = handle.child.wait().context("failed to wait for pty child")?;
                if status.success() {
                    0
                } else {
                    1
                }
            }
        };
        self.exit_code.store(code, Ordering::Release);
        self.reaped.store(true, Ordering::Release);
        self.state = ProcessState::Reaped;
        Ok(code)
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().unwrap_or_else(|| -status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Spawn a command per spec §4.2. Fails with context before any stdio is
/// consumed; the caller is expected to map spawn failure to `spawn_error`.
pub async fn spawn(
    target: SpawnTarget,
    options: SpawnOptions,
    pty_port: &dyn PtyPort,
) -> Result<ProcessHandle> {
    if options.pty {
        return spawn_pty(target, options, pty_port);
    }

    let mut cmd = build_command(&target, &options);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);

    if options.process_group {
        // SAFETY: setsid() is async-signal-safe and only runs in the child
        // between fork and exec.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    let child = cmd.spawn().context("failed to spawn command")?;
    let pid = child.id().context("child exited before its pid could be read")?;

    Ok(ProcessHandle {
        pid,
        pgid: pid,
        output: ChildOutput::Piped { child },
        state: ProcessState::Running,
        exit_code: AtomicI32::new(0),
        reaped: std::sync::atomic::AtomicBool::new(false),
    })
}

fn spawn_pty(target: SpawnTarget, options: SpawnOptions, pty_port: &dyn PtyPort) -> Result<ProcessHandle> {
    let (program, args) = shell_invocation(&target.command, options.shell);
    let env: Vec<(String, String)> = target
        .env_overrides
        .into_iter()
        .filter(|(k, _)| !target.env_denylist.contains(k))
        .collect();

    let handle = pty_port
        .spawn(&program, &args, target.cwd.as_deref().and_then(|p| p.to_str()), &env)
        .context("failed to spawn command in pty")?;
    let pid = handle.child.process_id().unwrap_or(0);

    Ok(ProcessHandle {
        pid,
        pgid: pid,
        output: ChildOutput::Pty { handle },
        state: ProcessState::Running,
        exit_code: AtomicI32::new(0),
        reaped: std::sync::atomic::AtomicBool::new(false),
    })
}

fn build_command(target: &SpawnTarget, options: &SpawnOptions) -> Command {
    let (program, args) = shell_invocation(&target.command, options.shell);
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(cwd) = &target.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &target.env_overrides {
        if !target.env_denylist.contains(k) {
            cmd.env(k, v);
        }
    }
    for denied in &target.env_denylist {
        cmd.env_remove(denied);
    }
    cmd
}

fn shell_invocation(command: &str, shell: bool) -> (String, Vec<String>) {
    if shell {
        ("/bin/sh".to_string(), vec!["-c".to_string(), command.to_string()])
    } else {
        let mut parts = command.split_whitespace();
        let program = parts.next().unwrap_or_default().to_string();
        let args = parts.map(str::to_string).collect();
        (program, args)
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
