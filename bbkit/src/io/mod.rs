//! I/O helpers: filesystem, configuration files, processes and network.

pub mod config;
pub mod definition;
pub mod deploy;
pub mod environ;
pub mod manifest;
pub mod mounts;
pub mod process;
pub mod template;
