//! Core data model for command lines and jobs
//!
//! This module contains pure data structures with no access to the terminal
//! or the process table.

pub mod command;
pub mod job;
pub mod parser;
