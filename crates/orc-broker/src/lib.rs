pub mod broker;
pub mod daemon_client;
pub mod position;
pub mod usage;
