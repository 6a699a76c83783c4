//! Signal delivery targeting a child's entire process group.

/// Send `SIGTERM` to the process group rooted at `pid`.
///
/// `pid` must be the child's own pid, spawned with `setsid()` in
/// `pre_exec` so that it is also its own process group leader; negating it
/// targets the whole group rather than just the leader.
pub fn terminate_process_group(pid: u32) {
    send_signal(pid, Signal::Term);
}

/// Send `SIGKILL` to the process group rooted at `pid`.
pub fn kill_process_group(pid: u32) {
    send_signal(pid, Signal::Kill);
}

/// Send `SIGSTOP` to the process group rooted at `pid` (pause control).
pub fn stop_process_group(pid: u32) {
    send_signal(pid, Signal::Stop);
}

/// Send `SIGCONT` to the process group rooted at `pid` (resume control).
pub fn continue_process_group(pid: u32) {
    send_signal(pid, Signal::Cont);
}

enum Signal {
    Term,
    Kill,
    Stop,
    Cont,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
        Signal::Stop => libc::SIGSTOP,
        Signal::Cont => libc::SIGCONT,
    };
    // SAFETY: kill() is async-signal-safe; a negative pid targets the group.
    unsafe {
        libc::kill(-(pid as i32), sig);
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: Signal) {
    tracing::warn!("process-group signal delivery is unsupported on this platform");
}
