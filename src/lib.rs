pub mod config;
pub mod energy;
pub mod fetch;
pub mod pipeline;
pub mod server;
pub mod synth;
pub mod tools;
pub mod transcode;

/// Application name for XDG paths
pub const APP_NAME: &str = "audioflicker";
