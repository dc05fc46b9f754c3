//! Web Mercator tile addressing (quadkeys).
//!
//! The vendor's cluster tile API is addressed by quadkey: the string
//! path from the quadtree root down to a square map region. These are
//! the standard Bing-style formulas; zoom is bounded well below 32 so
//! `u32` tile coordinates never overflow.

use crate::error::GeoError;

/// Latitude bound of the Web Mercator projection.
const MAX_LAT: f64 = 85.051_128_779_806_59;

/// A geographic point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A bounding box in decimal degrees: (west, south) to (east, north).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty set.
    pub fn from_points(points: &[LatLng]) -> Option<BoundingBox> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            west: first.lng,
            south: first.lat,
            east: first.lng,
            north: first.lat,
        };
        for p in &points[1..] {
            bbox.west = bbox.west.min(p.lng);
            bbox.south = bbox.south.min(p.lat);
            bbox.east = bbox.east.max(p.lng);
            bbox.north = bbox.north.max(p.lat);
        }
        Some(bbox)
    }
}

/// One quadtree tile: column `x`, row `y` at zoom `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl Tile {
    /// Deepest zoom the `u32` tile coordinates support without
    /// overflow. Vendor data tops out at 14; callers taking zoom from
    /// user input must reject anything above this.
    pub const MAX_ZOOM: u8 = 30;

    /// The tile containing a point at the given zoom.
    pub fn at(lng: f64, lat: f64, zoom: u8) -> Tile {
        let n = 1u32 << zoom;
        let lat = lat.clamp(-MAX_LAT, MAX_LAT);
        let lat_rad = lat.to_radians();

        let x = ((lng + 180.0) / 360.0 * n as f64).floor();
        let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI)
            / 2.0
            * n as f64)
            .floor();

        Tile {
            x: (x.max(0.0) as u32).min(n - 1),
            y: (y.max(0.0) as u32).min(n - 1),
            z: zoom,
        }
    }

    /// Canonical quadkey string for this tile ("" at zoom 0).
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.z as usize);
        for i in (1..=self.z).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = 0u8;
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push((b'0' + digit) as char);
        }
        key
    }

    /// Parse a quadkey back into a tile.
    pub fn from_quadkey(quadkey: &str) -> Result<Tile, GeoError> {
        if quadkey.len() > Tile::MAX_ZOOM as usize {
            return Err(GeoError::QuadkeyTooDeep {
                length: quadkey.len(),
            });
        }
        let mut x = 0u32;
        let mut y = 0u32;
        for c in quadkey.chars() {
            x <<= 1;
            y <<= 1;
            match c {
                '0' => {}
                '1' => x |= 1,
                '2' => y |= 1,
                '3' => {
                    x |= 1;
                    y |= 1;
                }
                other => {
                    return Err(GeoError::InvalidQuadkey {
                        quadkey: quadkey.to_string(),
                        digit: other,
                    })
                }
            }
        }
        Ok(Tile {
            x,
            y,
            z: quadkey.len() as u8,
        })
    }

    /// The up-to-8 tiles surrounding this one at the same zoom.
    ///
    /// Tiles that would fall off the edge of the grid are omitted, so
    /// a corner tile has 3 neighbors. Order: N, E, S, W, NE, SE, NW, SW.
    pub fn neighbors(&self) -> Vec<Tile> {
        const OFFSETS: [(i64, i64); 8] = [
            (0, -1),
            (1, 0),
            (0, 1),
            (-1, 0),
            (1, -1),
            (1, 1),
            (-1, -1),
            (-1, 1),
        ];
        let n = 1i64 << self.z;
        OFFSETS
            .iter()
            .filter_map(|&(dx, dy)| {
                let x = self.x as i64 + dx;
                let y = self.y as i64 + dy;
                if (0..n).contains(&x) && (0..n).contains(&y) {
                    Some(Tile {
                        x: x as u32,
                        y: y as u32,
                        z: self.z,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Every tile at `zoom` intersecting the bounding box, row-major.
    pub fn cover(bbox: &BoundingBox, zoom: u8) -> Vec<Tile> {
        let ul = Tile::at(bbox.west, bbox.north, zoom);
        let lr = Tile::at(bbox.east, bbox.south, zoom);
        let mut tiles = Vec::new();
        for y in ul.y..=lr.y {
            for x in ul.x..=lr.x {
                tiles.push(Tile { x, y, z: zoom });
            }
        }
        tiles
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadkey_matches_reference_example() {
        // Bing tile system worked example.
        let tile = Tile { x: 3, y: 5, z: 3 };
        assert_eq!(tile.quadkey(), "213");
    }

    #[test]
    fn quadkey_round_trips() {
        let tile = Tile {
            x: 35210,
            y: 21493,
            z: 16,
        };
        assert_eq!(Tile::from_quadkey(&tile.quadkey()).unwrap(), tile);
    }

    #[test]
    fn from_quadkey_rejects_bad_digit() {
        let err = Tile::from_quadkey("0214").unwrap_err();
        assert!(matches!(err, GeoError::InvalidQuadkey { digit: '4', .. }));
    }

    #[test]
    fn from_quadkey_rejects_overdeep_keys() {
        let deep = "0".repeat(Tile::MAX_ZOOM as usize + 1);
        let err = Tile::from_quadkey(&deep).unwrap_err();
        assert!(matches!(err, GeoError::QuadkeyTooDeep { length: 31 }));

        // A key of exactly 256 digits would otherwise wrap the zoom
        // back to 0 through the u8 cast.
        let wrapped = "0".repeat(256);
        assert!(Tile::from_quadkey(&wrapped).is_err());
    }

    #[test]
    fn tile_at_known_point() {
        // mercantile.tile(-105.0, 40.0, 5) == (6, 12, 5)
        assert_eq!(Tile::at(-105.0, 40.0, 5), Tile { x: 6, y: 12, z: 5 });
    }

    #[test]
    fn tile_at_clamps_poles() {
        let t = Tile::at(0.0, 90.0, 4);
        assert_eq!(t.y, 0);
        let t = Tile::at(0.0, -90.0, 4);
        assert_eq!(t.y, 15);
    }

    #[test]
    fn interior_tile_has_eight_neighbors() {
        let tile = Tile { x: 3, y: 5, z: 4 };
        let neighbors = tile.neighbors();
        assert_eq!(neighbors.len(), 8);
        assert!(neighbors.contains(&Tile { x: 3, y: 4, z: 4 })); // N
        assert!(neighbors.contains(&Tile { x: 2, y: 6, z: 4 })); // SW
        assert!(!neighbors.contains(&tile));
    }

    #[test]
    fn corner_tile_has_three_neighbors() {
        let neighbors = Tile { x: 0, y: 0, z: 3 }.neighbors();
        assert_eq!(neighbors.len(), 3);
    }

    #[test]
    fn bbox_from_points() {
        let points = [
            LatLng {
                lat: 38.5,
                lng: -120.2,
            },
            LatLng {
                lat: 40.7,
                lng: -120.95,
            },
            LatLng {
                lat: 43.252,
                lng: -126.453,
            },
        ];
        let bbox = BoundingBox::from_points(&points).unwrap();
        assert_eq!(bbox.west, -126.453);
        assert_eq!(bbox.south, 38.5);
        assert_eq!(bbox.east, -120.2);
        assert_eq!(bbox.north, 43.252);
    }

    #[test]
    fn bbox_of_no_points_is_none() {
        assert!(BoundingBox::from_points(&[]).is_none());
    }

    #[test]
    fn cover_of_point_bbox_is_single_tile() {
        let bbox = BoundingBox {
            west: -105.0,
            south: 40.0,
            east: -105.0,
            north: 40.0,
        };
        assert_eq!(Tile::cover(&bbox, 5), vec![Tile::at(-105.0, 40.0, 5)]);
    }

    #[test]
    fn cover_is_the_full_rectangle() {
        let bbox = BoundingBox {
            west: -106.0,
            south: 39.0,
            east: -104.0,
            north: 41.0,
        };
        let tiles = Tile::cover(&bbox, 7);
        let ul = Tile::at(bbox.west, bbox.north, 7);
        let lr = Tile::at(bbox.east, bbox.south, 7);
        let expected = (lr.x - ul.x + 1) as usize * (lr.y - ul.y + 1) as usize;
        assert_eq!(tiles.len(), expected);
        assert!(tiles.contains(&ul));
        assert!(tiles.contains(&lr));
    }
}
