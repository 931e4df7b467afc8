//! CLI command implementations.
//!
//! This module contains the implementation of each CLI command.

pub mod games;
pub mod preset;
pub mod processes;
pub mod run;
