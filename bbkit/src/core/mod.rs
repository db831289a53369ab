//! Deterministic, pure logic shared by bbkit.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod application;
pub mod arguments;
pub mod command;
pub mod flags;
pub mod mounts;
