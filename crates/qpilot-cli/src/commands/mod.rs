//! CLI command implementations.

pub mod common;
pub mod formats;
pub mod path;
pub mod providers;
pub mod run;
pub mod transpile;
