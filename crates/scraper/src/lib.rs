//! gridwatch-scraper: turns a vendor's cluster tile API into outage
//! snapshots and stores them as versioned documents.
//!
//! [`kubra::KubraResolver`] walks the tile hierarchy recursively,
//! zooming into clusters and expanding into neighboring tiles until
//! every incident is resolved (or synthesized at maximum zoom).
//! [`orchestrator::Orchestrator`] runs one scrape-and-store pass:
//! load the prior snapshot, fetch fresh data through a
//! [`orchestrator::FetchStrategy`], diff, and commit a new document
//! only when something changed.

pub mod error;
pub mod kubra;
pub mod orchestrator;

pub use error::ScrapeError;
pub use kubra::{KubraInstance, KubraResolver, Resolution, TileVisit, MAX_ZOOM, MIN_ZOOM};
pub use orchestrator::{
    FetchStrategy, KubraFetch, Orchestrator, OutageRenderer, PassError, PassOutcome,
};
