//! Subprocess runner: spawns a command and streams its output into buffers

pub mod buffer;
pub mod session;

pub use buffer::Buffer;
pub use session::{run_to_completion, Session, SessionBuilder, SIGNALED_EXIT_CODE};
