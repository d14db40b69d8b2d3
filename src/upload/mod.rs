pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod policy;
pub mod progress;
pub mod session;
pub mod source;
pub mod uploader;
