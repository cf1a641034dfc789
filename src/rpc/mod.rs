//! # RPC Over a Unix Socket
//!
//! The daemon listens on a local Unix-domain socket; clients exchange
//! line-delimited JSON frames with it. There is no authentication: the
//! socket lives in a user-owned directory and filesystem permissions are
//! the boundary.
//!
//! [`proto`] defines the frames, [`server`] accepts and dispatches them to
//! the engine, [`client`] is the connecting side used by the CLI, including
//! daemon auto-start.

pub mod client;
pub mod proto;
pub mod server;

pub use client::{connect_or_start, DaemonClient};
pub use proto::{Request, Response};
pub use server::{bind_socket, serve};
