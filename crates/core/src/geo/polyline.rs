//! Google polyline algorithm decoding.
//!
//! The vendor publishes service-area rings and incident points as
//! polyline-encoded strings (5-decimal-place precision). Only decoding
//! is needed; gridwatch never re-encodes coordinates.

use crate::error::GeoError;
use crate::geo::tile::LatLng;

/// Decode a polyline string into a sequence of points.
///
/// Each point is a delta against the previous one; a truncated value
/// or an out-of-range byte yields [`GeoError::InvalidPolyline`] with
/// the offending byte position.
pub fn decode_polyline(encoded: &str) -> Result<Vec<LatLng>, GeoError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut pos = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while pos < bytes.len() {
        let (dlat, next) = decode_value(bytes, pos)?;
        let (dlng, next) = decode_value(bytes, next)?;
        lat += dlat;
        lng += dlng;
        points.push(LatLng {
            lat: lat as f64 / 1e5,
            lng: lng as f64 / 1e5,
        });
        pos = next;
    }

    Ok(points)
}

/// Decode one zigzag varint starting at `pos`, returning the signed
/// value and the position after it.
fn decode_value(bytes: &[u8], mut pos: usize) -> Result<(i64, usize), GeoError> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;

    loop {
        // 12 chunks fill an i64; a longer continuation run cannot be a
        // real coordinate delta.
        if shift > 63 {
            return Err(GeoError::InvalidPolyline { position: pos });
        }
        let b = *bytes
            .get(pos)
            .ok_or(GeoError::InvalidPolyline { position: pos })?;
        if !(63..=126).contains(&b) {
            return Err(GeoError::InvalidPolyline { position: pos });
        }
        let chunk = (b - 63) as i64;
        result |= (chunk & 0x1f) << shift;
        pos += 1;
        if chunk & 0x20 == 0 {
            break;
        }
        shift += 5;
    }

    let value = if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Ok((value, pos))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
