//! `tl-agent`: the tvlink device agent.
//!
//! Wires the reusable link from `tl-link` to a real process: TOML config,
//! device identity, the single-instance PID lock, command executors and
//! signal handling.  The `tvlink-agent` binary is a thin CLI over
//! [`app::run`].

pub mod app;
pub mod cli;
pub mod config;
pub mod executor;
pub mod identity;
pub mod pid;
