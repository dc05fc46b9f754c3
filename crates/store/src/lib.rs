//! gridwatch-store: versioned snapshot documents in a remote content
//! store.
//!
//! [`ContentClient`] reads and writes a path-addressed JSON document
//! against a GitHub-style contents API under optimistic concurrency
//! (an opaque sha token per version). Documents too large for the
//! direct endpoint fall back transparently to the raw object protocol
//! (blob, tree, commit, ref move).
//!
//! All HTTP goes through the blocking [`Transport`] trait so the
//! protocol logic can be exercised against the in-memory fake in
//! [`testing`].

pub mod client;
pub mod error;
pub mod testing;
pub mod transport;

pub use client::{Committer, ContentClient, RepoLocation};
pub use error::StoreError;
pub use transport::{Method, Request, Response, Transport, TransportError, UreqTransport};
