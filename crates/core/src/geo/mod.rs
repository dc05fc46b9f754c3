//! Geometry utilities: polyline decoding and Web Mercator tile math.

pub mod polyline;
pub mod tile;
