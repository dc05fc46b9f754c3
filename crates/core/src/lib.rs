//! gridwatch-core: shared building blocks for the outage scraper.
//!
//! Provides the tile/quadkey geometry used to walk a vendor's cluster
//! tile hierarchy, the [`OutageRecord`] data model persisted in
//! snapshot documents, and the keyed delta reporter that turns two
//! snapshots into a human-readable changelog.
//!
//! # Public API
//!
//! Key types are re-exported at the crate root for convenience:
//!
//! - [`LatLng`], [`BoundingBox`], [`Tile`] -- geometry
//! - [`decode_polyline`] -- compact coordinate decoding
//! - [`OutageRecord`] -- one resolved incident
//! - [`diff`], [`Delta`], [`Renderer`], [`ReportStyle`] -- changelogs

pub mod delta;
pub mod error;
pub mod geo;
pub mod record;

pub use delta::{
    diff, field_changes, render_message, Delta, FieldChange, KeyValueRenderer, Renderer,
    ReportStyle,
};
pub use error::GeoError;
pub use geo::polyline::decode_polyline;
pub use geo::tile::{BoundingBox, LatLng, Tile};
pub use record::{parse_snapshot, serialize_snapshot, OutageRecord};
