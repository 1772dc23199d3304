pub mod auth;
pub mod http;
pub mod rpc;
pub mod state;
pub mod stdio;

pub use state::AppState;
