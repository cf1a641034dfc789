//! recent-dirs - a daemon and CLI for jumping back to recently used directories
//!
//! This library provides the building blocks of the `rd` tool: the usage
//! sources that observe directories in use, the engine that ranks and
//! persists them, and the Unix-socket RPC layer between daemon and client.

pub mod config;
pub mod daemon;
pub mod engine;
pub mod history;
pub mod rpc;
