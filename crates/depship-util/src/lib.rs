#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for depship.
//!
//! This crate provides pure filesystem helpers with no logging/tracing dependencies.
//! Logging is handled by the core and CLI crates.

pub mod fs;
