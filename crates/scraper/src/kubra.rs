//! Kubra Storm Center tile protocol: endpoint discovery and the
//! recursive quadtree incident resolver.
//!
//! The vendor publishes outages as zoomable cluster tiles. A tile
//! entry is either a single resolvable incident or a cluster marker
//! standing in for incidents too close together at the current zoom.
//! The resolver drills into clusters one zoom at a time and expands
//! into the 8 neighboring tiles of every resolved incident, so
//! boundary-straddling incidents on adjacent tiles are picked up too.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use gridwatch_core::{decode_polyline, BoundingBox, OutageRecord, Tile};
use gridwatch_store::{Request, Transport};

use crate::error::ScrapeError;

/// Zoom level for the initial service-area tile cover.
pub const MIN_ZOOM: u8 = 7;
/// The vendor does not resolve incidents grouped closer than zoom 14;
/// clusters still present there are synthesized into single records.
pub const MAX_ZOOM: u8 = 14;

/// Which Storm Center deployment to scrape. Immutable; constructed at
/// startup from configuration and passed by reference.
#[derive(Debug, Clone)]
pub struct KubraInstance {
    /// e.g. "https://kubra.io/"
    pub base_url: String,
    pub instance_id: String,
    pub view_id: String,
}

/// Paths discovered from the instance's currentState and
/// configuration documents.
#[derive(Debug, Clone)]
struct Endpoints {
    base_url: String,
    regions_path: String,
    regions_key: String,
    data_path: String,
    cluster_data_path: String,
    layer_name: String,
}

impl Endpoints {
    fn summary_url(&self) -> String {
        format!("{}{}/public/summary-1/data.json", self.base_url, self.data_path)
    }

    fn service_areas_url(&self) -> String {
        format!(
            "{}{}/{}/serviceareas.json",
            self.base_url, self.regions_path, self.regions_key
        )
    }

    /// Tile documents are sharded by the reversed last three quadkey
    /// digits, substituted for the `{qkh}` placeholder in the cluster
    /// data path.
    fn tile_url(&self, quadkey: &str) -> String {
        let tail_start = quadkey.len().saturating_sub(3);
        let qkh: String = quadkey[tail_start..].chars().rev().collect();
        format!(
            "{}{}/public/{}/{}.json",
            self.base_url,
            self.cluster_data_path.replace("{qkh}", &qkh),
            self.layer_name,
            quadkey
        )
    }
}

// ─── Vendor wire shapes ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SummaryDoc {
    #[serde(rename = "summaryFileData")]
    summary_file_data: SummaryFileData,
}

#[derive(Deserialize)]
struct SummaryFileData {
    totals: Vec<SummaryTotals>,
}

#[derive(Deserialize)]
struct SummaryTotals {
    total_outages: i64,
}

#[derive(Deserialize)]
struct ServiceAreasDoc {
    file_data: Vec<ServiceArea>,
}

#[derive(Deserialize)]
struct ServiceArea {
    geom: AreaGeom,
}

#[derive(Deserialize)]
struct AreaGeom {
    /// Polyline-encoded coordinate rings.
    a: Vec<String>,
}

#[derive(Deserialize)]
struct TileDoc {
    file_data: Vec<RawIncident>,
}

#[derive(Deserialize)]
struct RawIncident {
    desc: IncidentDesc,
    geom: IncidentGeom,
}

#[derive(Deserialize)]
struct IncidentDesc {
    cluster: bool,
    #[serde(default)]
    inc_id: Option<String>,
    #[serde(default)]
    etr: Option<String>,
    #[serde(default)]
    etr_confidence: Option<f64>,
    #[serde(default)]
    cause: Option<CauseText>,
    #[serde(default)]
    comments: Option<String>,
    n_out: i64,
    #[serde(default)]
    cust_a: Option<CustomerCount>,
    #[serde(default)]
    crew_status: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
}

#[derive(Deserialize)]
struct CauseText {
    #[serde(rename = "EN-US", default)]
    en_us: Option<String>,
}

#[derive(Deserialize)]
struct CustomerCount {
    #[serde(default)]
    val: Option<i64>,
}

#[derive(Deserialize)]
struct IncidentGeom {
    /// Polyline-encoded representative points.
    p: Vec<String>,
}

// ─── Resolver ─────────────────────────────────────────────────────────────────

/// One fully resolved pass over the tile hierarchy.
#[derive(Debug)]
pub struct Resolution {
    /// incident id → record; at most one record per id.
    pub outages: BTreeMap<String, OutageRecord>,
    /// Requests made during the pass (summary, service areas, tiles).
    pub requests: u64,
    /// Response bytes downloaded during the pass.
    pub bytes: u64,
}

impl Resolution {
    /// The snapshot sequence: records in id order, deterministic
    /// across passes.
    pub fn into_snapshot(self) -> Vec<OutageRecord> {
        self.outages.into_values().collect()
    }
}

/// One tile fetch, reported to the optional trace hook.
#[derive(Debug, Clone, Copy)]
pub struct TileVisit<'a> {
    pub url: &'a str,
    pub zoom: u8,
    /// True when this fetch came from drilling into a cluster rather
    /// than the initial cover or a neighbor expansion.
    pub cluster_search: bool,
}

/// Walk state threaded through every recursive call; confined to one
/// `resolve` invocation so concurrent passes can never share it.
struct TileWalk {
    visited: HashSet<String>,
    requests: u64,
    bytes: u64,
}

type Trace = Box<dyn Fn(TileVisit<'_>)>;

/// Recursive quadtree incident resolver for one Kubra deployment.
pub struct KubraResolver<T: Transport> {
    transport: T,
    endpoints: Endpoints,
    min_zoom: u8,
    max_zoom: u8,
    trace: Option<Trace>,
}

impl<T: Transport> std::fmt::Debug for KubraResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubraResolver")
            .field("endpoints", &self.endpoints)
            .field("min_zoom", &self.min_zoom)
            .field("max_zoom", &self.max_zoom)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> KubraResolver<T> {
    /// Fetch the deployment's discovery documents and build a
    /// resolver for it.
    pub fn discover(transport: T, instance: &KubraInstance) -> Result<Self, ScrapeError> {
        let state_url = format!(
            "{}stormcenter/api/v1/stormcenters/{}/views/{}/currentState?preview=false",
            instance.base_url, instance.instance_id, instance.view_id
        );
        let state: serde_json::Value = fetch_json(&transport, &state_url)?;

        // The datastatic map carries a single region entry.
        let (regions_key, regions_path) = state["datastatic"]
            .as_object()
            .and_then(|m| m.iter().next())
            .and_then(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .ok_or_else(|| ScrapeError::Discovery("datastatic region entry".to_string()))?;
        let data_path = string_at(&state, &["data", "interval_generation_data"])
            .ok_or_else(|| ScrapeError::Discovery("data.interval_generation_data".to_string()))?;
        let cluster_data_path = string_at(&state, &["data", "cluster_interval_generation_data"])
            .ok_or_else(|| {
                ScrapeError::Discovery("data.cluster_interval_generation_data".to_string())
            })?;
        let deployment_id = string_at(&state, &["stormcenterDeploymentId"])
            .ok_or_else(|| ScrapeError::Discovery("stormcenterDeploymentId".to_string()))?;

        let config_url = format!(
            "{}stormcenter/api/v1/stormcenters/{}/views/{}/configuration/{}?preview=false",
            instance.base_url, instance.instance_id, instance.view_id, deployment_id
        );
        let config: serde_json::Value = fetch_json(&transport, &config_url)?;
        let layer_name = config["config"]["layers"]["data"]["interval_generation_data"]
            .as_array()
            .and_then(|layers| {
                layers.iter().find(|layer| {
                    layer["type"]
                        .as_str()
                        .is_some_and(|t| t.starts_with("CLUSTER_LAYER"))
                })
            })
            .and_then(|layer| layer["id"].as_str().map(str::to_string))
            .ok_or_else(|| ScrapeError::Discovery("CLUSTER_LAYER layer id".to_string()))?;

        Ok(KubraResolver {
            transport,
            endpoints: Endpoints {
                base_url: instance.base_url.clone(),
                regions_path,
                regions_key,
                data_path,
                cluster_data_path,
                layer_name,
            },
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
            trace: None,
        })
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Install a hook called once per tile fetch.
    pub fn with_trace(mut self, trace: impl Fn(TileVisit<'_>) + 'static) -> Self {
        self.trace = Some(Box::new(trace));
        self
    }

    /// Resolve the full service area down to individual incidents.
    pub fn resolve(&self) -> Result<Resolution, ScrapeError> {
        let mut walk = TileWalk {
            visited: HashSet::new(),
            requests: 0,
            bytes: 0,
        };

        let summary_url = self.endpoints.summary_url();
        let summary: SummaryDoc = self.fetch_counted(&summary_url, &mut walk)?;
        let expected = summary
            .summary_file_data
            .totals
            .first()
            .map(|t| t.total_outages)
            .ok_or_else(|| ScrapeError::Discovery("summary totals".to_string()))?;

        let quadkeys = self.service_area_quadkeys(&mut walk)?;

        let mut outages = BTreeMap::new();
        self.resolve_tiles(&quadkeys, &mut walk, self.min_zoom, false, &mut outages)?;

        let found: i64 = outages.values().map(|o| o.number_out).sum();
        if found != expected {
            return Err(ScrapeError::ResolutionMismatch { found, expected });
        }

        Ok(Resolution {
            outages,
            requests: walk.requests,
            bytes: walk.bytes,
        })
    }

    /// Quadkeys covering the whole service area at `min_zoom`.
    fn service_area_quadkeys(&self, walk: &mut TileWalk) -> Result<Vec<String>, ScrapeError> {
        let url = self.endpoints.service_areas_url();
        let areas: ServiceAreasDoc = self.fetch_counted(&url, walk)?;

        let mut points = Vec::new();
        for area in &areas.file_data {
            for ring in &area.geom.a {
                points.extend(decode_polyline(ring)?);
            }
        }

        let bbox = BoundingBox::from_points(&points)
            .ok_or_else(|| ScrapeError::Discovery("service area geometry".to_string()))?;

        Ok(Tile::cover(&bbox, self.min_zoom)
            .iter()
            .map(Tile::quadkey)
            .collect())
    }

    /// The recursive walk. The visited set in `walk` guarantees no
    /// tile URL is fetched twice within a pass, which also terminates
    /// mutual recursion between neighbor expansion and cluster
    /// drill-down.
    fn resolve_tiles(
        &self,
        quadkeys: &[String],
        walk: &mut TileWalk,
        zoom: u8,
        cluster_search: bool,
        outages: &mut BTreeMap<String, OutageRecord>,
    ) -> Result<(), ScrapeError> {
        for quadkey in quadkeys {
            let url = self.endpoints.tile_url(quadkey);
            if !walk.visited.insert(url.clone()) {
                continue;
            }
            if let Some(trace) = &self.trace {
                trace(TileVisit {
                    url: &url,
                    zoom,
                    cluster_search,
                });
            }

            let response = self.transport.send(&Request::get(&url))?;
            walk.requests += 1;
            walk.bytes += response.body.len() as u64;

            // No incidents in the tile's area means no file at all.
            if response.status == 404 {
                continue;
            }
            if !response.is_success() {
                return Err(ScrapeError::UnknownServer {
                    status: response.status,
                    url,
                    body: response.body_text(),
                });
            }

            let tile_doc: TileDoc =
                response.json().map_err(|e| ScrapeError::Malformed {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

            for incident in &tile_doc.file_data {
                if incident.desc.cluster {
                    if zoom >= self.max_zoom {
                        // Irreducible cluster: synthesize a record.
                        let record = outage_record(incident, &url)?;
                        outages.insert(record.id.clone(), record);
                    } else {
                        let point = representative_point(incident, &url)?;
                        let finer = Tile::at(point.lng, point.lat, zoom + 1).quadkey();
                        self.resolve_tiles(&[finer], walk, zoom + 1, true, outages)?;
                    }
                } else {
                    // Boundary-straddling incidents can appear in
                    // adjacent tiles; expand before recording.
                    let neighbors: Vec<String> = Tile::from_quadkey(quadkey)?
                        .neighbors()
                        .iter()
                        .map(Tile::quadkey)
                        .collect();
                    self.resolve_tiles(&neighbors, walk, zoom, false, outages)?;

                    let record = outage_record(incident, &url)?;
                    outages.insert(record.id.clone(), record);
                }
            }
        }
        Ok(())
    }

    fn fetch_counted<D: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        walk: &mut TileWalk,
    ) -> Result<D, ScrapeError> {
        let response = self.transport.send(&Request::get(url))?;
        walk.requests += 1;
        walk.bytes += response.body.len() as u64;
        if !response.is_success() {
            return Err(ScrapeError::UnknownServer {
                status: response.status,
                url: url.to_string(),
                body: response.body_text(),
            });
        }
        response.json().map_err(|e| ScrapeError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn fetch_json<T: Transport, D: serde::de::DeserializeOwned>(
    transport: &T,
    url: &str,
) -> Result<D, ScrapeError> {
    let response = transport.send(&Request::get(url))?;
    if !response.is_success() {
        return Err(ScrapeError::UnknownServer {
            status: response.status,
            url: url.to_string(),
            body: response.body_text(),
        });
    }
    response.json().map_err(|e| ScrapeError::Malformed {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn string_at(value: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = &current[*key];
    }
    current.as_str().map(str::to_string)
}

/// First decoded point of the incident's representative geometry.
fn representative_point(
    incident: &RawIncident,
    url: &str,
) -> Result<gridwatch_core::LatLng, ScrapeError> {
    let encoded = incident
        .geom
        .p
        .first()
        .ok_or_else(|| ScrapeError::Malformed {
            url: url.to_string(),
            message: "incident entry has no geometry points".to_string(),
        })?;
    decode_polyline(encoded)?
        .first()
        .copied()
        .ok_or_else(|| ScrapeError::Malformed {
            url: url.to_string(),
            message: "incident geometry decoded to no points".to_string(),
        })
}

/// Deterministic id for a cluster that cannot be resolved further.
///
/// Known correctness gap carried over from the vendor data: two
/// distinct irreducible clusters sharing the exact representative
/// point and start time collapse to the same id.
fn synthetic_cluster_id(encoded_point: &str, start_time: Option<&str>) -> String {
    format!("{}-{}", encoded_point, start_time.unwrap_or(""))
}

/// Build an [`OutageRecord`] from a vendor tile entry.
fn outage_record(incident: &RawIncident, url: &str) -> Result<OutageRecord, ScrapeError> {
    let point = representative_point(incident, url)?;
    let desc = &incident.desc;

    let id = match desc.inc_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            // Guarded by representative_point above.
            let encoded = incident.geom.p.first().map(String::as_str).unwrap_or("");
            synthetic_cluster_id(encoded, desc.start_time.as_deref())
        }
    };

    Ok(OutageRecord {
        id,
        start_time: desc.start_time.clone(),
        estimated_restore_time: desc.etr.clone(),
        estimated_restore_confidence: desc.etr_confidence,
        cause: desc.cause.as_ref().and_then(|c| c.en_us.clone()),
        crew_status: desc.crew_status.clone(),
        comments: desc.comments.clone(),
        customers_affected: desc.cust_a.as_ref().and_then(|c| c.val),
        number_out: desc.n_out,
        cluster_flag: desc.cluster,
        latitude: point.lat,
        longitude: point.lng,
        source_url: url.to_string(),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints {
            base_url: "https://kubra.io/".to_string(),
            regions_path: "data/regions".to_string(),
            regions_key: "rk".to_string(),
            data_path: "data/int".to_string(),
            cluster_data_path: "data/cluster/{qkh}".to_string(),
            layer_name: "cluster-1".to_string(),
        }
    }

    #[test]
    fn tile_url_reverses_last_three_quadkey_digits() {
        assert_eq!(
            endpoints().tile_url("0230113"),
            "https://kubra.io/data/cluster/311/public/cluster-1/0230113.json"
        );
    }

    #[test]
    fn tile_url_handles_short_quadkeys() {
        assert_eq!(
            endpoints().tile_url("02"),
            "https://kubra.io/data/cluster/20/public/cluster-1/02.json"
        );
    }

    #[test]
    fn summary_and_service_area_urls() {
        let e = endpoints();
        assert_eq!(
            e.summary_url(),
            "https://kubra.io/data/int/public/summary-1/data.json"
        );
        assert_eq!(
            e.service_areas_url(),
            "https://kubra.io/data/regions/rk/serviceareas.json"
        );
    }

    #[test]
    fn synthetic_id_is_point_plus_start_time() {
        assert_eq!(
            synthetic_cluster_id("_p~iF~ps|U", Some("2025-01-01T00:00:00Z")),
            "_p~iF~ps|U-2025-01-01T00:00:00Z"
        );
        assert_eq!(synthetic_cluster_id("_p~iF~ps|U", None), "_p~iF~ps|U-");
    }

    #[test]
    fn record_uses_vendor_id_when_present() {
        let incident: RawIncident = serde_json::from_value(serde_json::json!({
            "desc": {
                "cluster": false,
                "inc_id": "o-77",
                "etr": "2025-01-01T06:00:00Z",
                "etr_confidence": 0.9,
                "cause": { "EN-US": "wind" },
                "comments": "crews dispatched",
                "n_out": 4,
                "cust_a": { "val": 120 },
                "crew_status": "on site",
                "start_time": "2025-01-01T00:00:00Z"
            },
            "geom": { "p": ["_p~iF~ps|U"] }
        }))
        .unwrap();

        let record = outage_record(&incident, "https://kubra.io/t.json").unwrap();
        assert_eq!(record.id, "o-77");
        assert_eq!(record.cause.as_deref(), Some("wind"));
        assert_eq!(record.customers_affected, Some(120));
        assert_eq!(record.number_out, 4);
        assert!(!record.cluster_flag);
        assert!((record.latitude - 38.5).abs() < 1e-9);
        assert!((record.longitude - -120.2).abs() < 1e-9);
        assert_eq!(record.source_url, "https://kubra.io/t.json");
    }

    #[test]
    fn record_synthesizes_id_for_unresolved_cluster() {
        let incident: RawIncident = serde_json::from_value(serde_json::json!({
            "desc": {
                "cluster": true,
                "n_out": 9,
                "start_time": "2025-01-01T00:00:00Z"
            },
            "geom": { "p": ["_p~iF~ps|U"] }
        }))
        .unwrap();

        let record = outage_record(&incident, "https://kubra.io/t.json").unwrap();
        assert_eq!(record.id, "_p~iF~ps|U-2025-01-01T00:00:00Z");
        assert!(record.cluster_flag);
        assert_eq!(record.customers_affected, None);
    }
}
