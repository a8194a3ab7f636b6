//! RPC surfaces.
//!
//! [`mesh`] is the internet-facing join protocol served over TCP,
//! optionally behind mutual TLS. [`agent`] is the local operator surface
//! served on a Unix domain socket; access control is filesystem
//! permissions on the socket path.

pub mod agent;
pub mod mesh;
