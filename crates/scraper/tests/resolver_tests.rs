//! Resolver walk tests against a scripted vendor API: cluster
//! drill-down, neighbor expansion, the visited-set guarantee, and the
//! vendor-total cross-check.

use gridwatch_core::Tile;
use gridwatch_scraper::{KubraInstance, KubraResolver, ScrapeError};
use gridwatch_store::testing::StaticTransport;
use serde_json::{json, Value};

const BASE: &str = "https://kubra.io/";

/// Single point at (38.5, -120.2).
const POINT: &str = "_p~iF~ps|U";

fn instance() -> KubraInstance {
    KubraInstance {
        base_url: BASE.to_string(),
        instance_id: "i-1".to_string(),
        view_id: "v-1".to_string(),
    }
}

fn state_url() -> String {
    format!("{BASE}stormcenter/api/v1/stormcenters/i-1/views/v-1/currentState?preview=false")
}

fn config_url() -> String {
    format!("{BASE}stormcenter/api/v1/stormcenters/i-1/views/v-1/configuration/dep-1?preview=false")
}

fn summary_url() -> String {
    format!("{BASE}data/int/public/summary-1/data.json")
}

fn areas_url() -> String {
    format!("{BASE}data/regions/rk/serviceareas.json")
}

fn tile_url(quadkey: &str) -> String {
    let qkh: String = quadkey[quadkey.len() - 3..].chars().rev().collect();
    format!("{BASE}data/cluster/{qkh}/public/cluster-1/{quadkey}.json")
}

/// Quadkey of the tile containing `POINT` at the given zoom.
fn point_quadkey(zoom: u8) -> String {
    Tile::at(-120.2, 38.5, zoom).quadkey()
}

fn with_discovery(total_outages: i64) -> StaticTransport {
    StaticTransport::new()
        .route_json(
            state_url(),
            200,
            &json!({
                "datastatic": { "rk": "data/regions" },
                "data": {
                    "interval_generation_data": "data/int",
                    "cluster_interval_generation_data": "data/cluster/{qkh}"
                },
                "stormcenterDeploymentId": "dep-1"
            }),
        )
        .route_json(
            config_url(),
            200,
            &json!({
                "config": { "layers": { "data": { "interval_generation_data": [
                    { "type": "THEMATIC_LAYER", "id": "not-this-one" },
                    { "type": "CLUSTER_LAYER_V2", "id": "cluster-1" }
                ]}}}
            }),
        )
        .route_json(
            summary_url(),
            200,
            &json!({ "summaryFileData": { "totals": [{ "total_outages": total_outages }] } }),
        )
        .route_json(
            areas_url(),
            200,
            &json!({ "file_data": [{ "geom": { "a": [POINT] } }] }),
        )
}

fn cluster_entry(n_out: i64) -> Value {
    json!({
        "desc": {
            "cluster": true,
            "n_out": n_out,
            "cust_a": { "val": 12 },
            "start_time": "2025-01-01T00:00:00Z"
        },
        "geom": { "p": [POINT] }
    })
}

fn incident_entry(id: &str, n_out: i64) -> Value {
    json!({
        "desc": {
            "cluster": false,
            "inc_id": id,
            "etr": "2025-01-01T06:00:00Z",
            "etr_confidence": 0.9,
            "cause": { "EN-US": "wind" },
            "n_out": n_out,
            "cust_a": { "val": 41 },
            "start_time": "2025-01-01T00:00:00Z"
        },
        "geom": { "p": [POINT] }
    })
}

#[test]
fn irreducible_cluster_becomes_synthetic_record() {
    let qk = point_quadkey(7);
    let transport = with_discovery(5).route_json(
        tile_url(&qk),
        200,
        &json!({ "file_data": [cluster_entry(5)] }),
    );

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 7);
    let resolution = resolver.resolve().unwrap();

    assert_eq!(resolution.outages.len(), 1);
    let record = resolution.outages.values().next().unwrap();
    assert!(record.cluster_flag);
    assert_eq!(record.id, format!("{POINT}-2025-01-01T00:00:00Z"));
    assert_eq!(record.number_out, 5);
    assert_eq!(record.source_url, tile_url(&qk));

    // Summary + service areas + one tile; no neighbor expansion for
    // cluster entries.
    assert_eq!(resolution.requests, 3);
    assert!(resolution.bytes > 0);
}

#[test]
fn cluster_drills_down_to_individual_incident() {
    let coarse = point_quadkey(7);
    let fine = point_quadkey(8);
    let transport = with_discovery(5)
        .route_json(
            tile_url(&coarse),
            200,
            &json!({ "file_data": [cluster_entry(5)] }),
        )
        .route_json(
            tile_url(&fine),
            200,
            &json!({ "file_data": [incident_entry("o-1", 5)] }),
        );

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 8);
    let resolution = resolver.resolve().unwrap();

    assert_eq!(resolution.outages.len(), 1);
    let record = &resolution.outages["o-1"];
    assert!(!record.cluster_flag);
    assert_eq!(record.cause.as_deref(), Some("wind"));
    assert!((record.latitude - 38.5).abs() < 1e-9);
    assert_eq!(record.source_url, tile_url(&fine));

    // Summary + areas + coarse tile + fine tile + 8 fine neighbors.
    assert_eq!(resolution.requests, 12);
    assert_eq!(transport.hits(&tile_url(&fine)), 1);
}

#[test]
fn visited_set_fetches_each_neighbor_once() {
    let qk = point_quadkey(7);
    // Two incidents in the same tile; each triggers the same
    // neighborhood expansion, which must only be fetched once.
    let transport = with_discovery(5).route_json(
        tile_url(&qk),
        200,
        &json!({ "file_data": [incident_entry("o-1", 2), incident_entry("o-2", 3)] }),
    );

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 7);
    let resolution = resolver.resolve().unwrap();

    assert_eq!(resolution.outages.len(), 2);
    // Summary + areas + tile + 8 neighbors, each exactly once.
    assert_eq!(resolution.requests, 11);
    assert_eq!(transport.hits(&tile_url(&qk)), 1);
    for neighbor in Tile::from_quadkey(&qk).unwrap().neighbors() {
        assert_eq!(transport.hits(&tile_url(&neighbor.quadkey())), 1);
    }
}

#[test]
fn total_mismatch_aborts_the_pass() {
    let qk = point_quadkey(7);
    let transport = with_discovery(99).route_json(
        tile_url(&qk),
        200,
        &json!({ "file_data": [cluster_entry(5)] }),
    );

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 7);
    let err = resolver.resolve().unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::ResolutionMismatch {
            found: 5,
            expected: 99
        }
    ));
}

#[test]
fn empty_service_area_resolves_to_nothing() {
    // No tile routed: every tile fetch 404s, which means "no
    // incidents here", not an error.
    let transport = with_discovery(0);

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 7);
    let resolution = resolver.resolve().unwrap();
    assert!(resolution.outages.is_empty());
}

#[test]
fn tile_server_error_is_fatal() {
    let qk = point_quadkey(7);
    let transport = with_discovery(5).route(tile_url(&qk), 500, "boom");

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 7);
    let err = resolver.resolve().unwrap_err();
    assert!(matches!(err, ScrapeError::UnknownServer { status: 500, .. }));
}

#[test]
fn discovery_requires_a_cluster_layer() {
    let transport = StaticTransport::new()
        .route_json(
            state_url(),
            200,
            &json!({
                "datastatic": { "rk": "data/regions" },
                "data": {
                    "interval_generation_data": "data/int",
                    "cluster_interval_generation_data": "data/cluster/{qkh}"
                },
                "stormcenterDeploymentId": "dep-1"
            }),
        )
        .route_json(
            config_url(),
            200,
            &json!({
                "config": { "layers": { "data": { "interval_generation_data": [
                    { "type": "THEMATIC_LAYER", "id": "not-this-one" }
                ]}}}
            }),
        );

    let err = KubraResolver::discover(&transport, &instance()).unwrap_err();
    assert!(matches!(err, ScrapeError::Discovery(_)));
}

#[test]
fn trace_reports_cluster_search_mode() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let coarse = point_quadkey(7);
    let fine = point_quadkey(8);
    let transport = with_discovery(5)
        .route_json(
            tile_url(&coarse),
            200,
            &json!({ "file_data": [cluster_entry(5)] }),
        )
        .route_json(
            tile_url(&fine),
            200,
            &json!({ "file_data": [incident_entry("o-1", 5)] }),
        );

    let visits: Rc<RefCell<Vec<(String, u8, bool)>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&visits);

    let resolver = KubraResolver::discover(&transport, &instance())
        .unwrap()
        .with_zoom_range(7, 8)
        .with_trace(move |visit| {
            sink.borrow_mut()
                .push((visit.url.to_string(), visit.zoom, visit.cluster_search));
        });
    resolver.resolve().unwrap();

    let visits = visits.borrow();
    assert_eq!(visits[0], (tile_url(&coarse), 7, false));
    assert_eq!(visits[1], (tile_url(&fine), 8, true));
    // Neighbor expansion is not a cluster search.
    assert!(visits[2..].iter().all(|(_, zoom, cluster)| *zoom == 8 && !cluster));
}
