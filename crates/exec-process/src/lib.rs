//! Process spawning, signal delivery, and stdout/stderr multiplexing.

mod multiplexer;
mod pty;
mod signal;
mod supervisor;

pub use multiplexer::{Sink, StreamChunk, StreamTag, decode_lossy, multiplex};
pub use pty::{PtyHandle, PtyMasterReader, PtyPort, UnixPtyPort};
pub use signal::{continue_process_group, kill_process_group, stop_process_group, terminate_process_group};
pub use supervisor::{ProcessHandle, ProcessState, SpawnOptions, SpawnTarget, spawn};
