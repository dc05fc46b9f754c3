//! The outage record data model and snapshot document format.

use serde::{Deserialize, Serialize};

/// One resolved outage incident.
///
/// Produced by the incident resolver, immutable once built. `id` is
/// the vendor's incident id, or a synthesized point+start-time id for
/// a cluster that could not be resolved at maximum zoom (in which
/// case `cluster_flag` is true).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutageRecord {
    pub id: String,
    pub start_time: Option<String>,
    pub estimated_restore_time: Option<String>,
    pub estimated_restore_confidence: Option<f64>,
    pub cause: Option<String>,
    pub crew_status: Option<String>,
    pub comments: Option<String>,
    pub customers_affected: Option<i64>,
    pub number_out: i64,
    pub cluster_flag: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// Tile URL the record was read from.
    pub source_url: String,
}

/// Parse a stored snapshot document (a JSON array of records).
pub fn parse_snapshot(bytes: &[u8]) -> Result<Vec<OutageRecord>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Serialize a snapshot with stable indentation, for diff-friendly
/// commit history.
pub fn serialize_snapshot(records: &[OutageRecord]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(records)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutageRecord {
        OutageRecord {
            id: "o-1234".to_string(),
            start_time: Some("2025-02-15T18:20:00Z".to_string()),
            estimated_restore_time: None,
            estimated_restore_confidence: Some(0.8),
            cause: Some("wind".to_string()),
            crew_status: None,
            comments: None,
            customers_affected: Some(41),
            number_out: 3,
            cluster_flag: false,
            latitude: 38.25,
            longitude: -85.76,
            source_url: "https://kubra.io/tiles/0231.json".to_string(),
        }
    }

    #[test]
    fn serializes_with_camel_case_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["numberOut"], 3);
        assert_eq!(value["clusterFlag"], false);
        assert_eq!(value["estimatedRestoreTime"], serde_json::Value::Null);
        assert_eq!(value["sourceUrl"], "https://kubra.io/tiles/0231.json");
    }

    #[test]
    fn snapshot_round_trips() {
        let records = vec![sample()];
        let bytes = serialize_snapshot(&records).unwrap();
        assert_eq!(parse_snapshot(&bytes).unwrap(), records);
    }

    #[test]
    fn snapshot_is_pretty_printed() {
        let bytes = serialize_snapshot(&[sample()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n  {"));
    }
}
