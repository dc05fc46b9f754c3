use crate::transport::TransportError;

/// All errors surfaced by a [`crate::ContentClient`].
///
/// The "too large" rejection of the direct endpoints never appears
/// here: it is absorbed internally by switching to the object
/// protocol.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The document (or branch tree entry) does not exist. Recoverable:
    /// callers treat it as empty prior state.
    #[error("document not found: {path}")]
    NotFound { path: String },

    /// A write conflicted on its version token even after re-reading
    /// the current token and retrying once.
    #[error("version conflict on {path}: token stale after one retry")]
    VersionConflict { path: String },

    /// Any other non-success response. Carries the raw status and body
    /// for diagnosis.
    #[error("content store returned {status}: {body}")]
    UnknownServer { status: u16, body: String },

    /// The connection itself failed (DNS, refused, timeout).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response did not match the expected wire shape.
    #[error("could not decode content store response: {0}")]
    Decode(String),
}
