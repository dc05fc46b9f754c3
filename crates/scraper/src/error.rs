use gridwatch_core::GeoError;
use gridwatch_store::TransportError;

/// Errors raised while resolving incidents from the vendor API.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The resolved outage total disagrees with the vendor-reported
    /// total. Either the walk missed incidents or the vendor's live
    /// data moved underneath it; both abort the pass.
    #[error("resolved outage total ({found}) does not match vendor total ({expected})")]
    ResolutionMismatch { found: i64, expected: i64 },

    /// A vendor endpoint returned a non-success status other than the
    /// "no incidents in this tile" 404.
    #[error("vendor returned {status} for {url}: {body}")]
    UnknownServer {
        status: u16,
        url: String,
        body: String,
    },

    /// The discovery documents were missing an expected entry.
    #[error("vendor discovery document missing {0}")]
    Discovery(String),

    /// A vendor response did not parse as the expected shape.
    #[error("could not parse vendor response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Geo(#[from] GeoError),
}
