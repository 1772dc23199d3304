pub mod extract;
pub mod pacer;
pub mod tmux;

pub use tmux::{CaptureMode, Tmux};
