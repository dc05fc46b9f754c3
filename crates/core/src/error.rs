/// Errors produced by the geometry utilities.
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    /// A polyline string ended mid-value or contained a byte outside
    /// the printable encoding range.
    #[error("invalid polyline encoding at byte {position}")]
    InvalidPolyline { position: usize },

    /// A quadkey contained a digit other than 0-3.
    #[error("invalid quadkey digit '{digit}' in {quadkey:?}")]
    InvalidQuadkey { quadkey: String, digit: char },

    /// A quadkey deeper than the supported zoom range.
    #[error("quadkey of {length} digits exceeds the supported zoom depth")]
    QuadkeyTooDeep { length: usize },
}
