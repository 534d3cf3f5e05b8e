pub mod cli;
pub mod config;
pub mod net;
pub mod runtime;
