//! Terminal, process and signal services
//!
//! This module contains all code that talks to the operating system: the
//! controlling terminal, process groups, child reaping and signals.

pub mod child_status;
pub mod job_tracker;
pub mod line_editor;
pub mod log_dirs;
pub mod process_group;
pub mod signal_handler;
pub mod termstate;
pub mod termstate_sync;
pub mod tracing_setup;
pub mod tty;
