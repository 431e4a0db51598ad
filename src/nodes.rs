//! Coordinate extraction from the two generations of `nodes.json`.
//!
//! Each entry of the `nodes` collection is resolved to a [`NodeRecord`] by
//! looking for a `nodeinfo` key: present means the current (meshviewer)
//! schema, absent means the legacy (ffmap) schema. Field access after that
//! point follows the contract of the detected schema only.

use crate::types::{CoordMap, GeoPoint, NodeRecord, Schema};
use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Result of scanning one node document.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub schema: Schema,
    pub with_geo: usize,
    pub without_geo: usize,
    /// Every node with a usable position.
    pub known: CoordMap,
    /// Subset of `known` reporting online. `None` for legacy documents.
    pub online: Option<CoordMap>,
}

impl Extraction {
    pub fn total(&self) -> usize {
        self.with_geo + self.without_geo
    }
}

pub fn load_nodes(path: &Path) -> Result<Extraction> {
    let content = fs::read(path)
        .with_context(|| format!("Failed to open node cache: {:?}", path))?;
    let extraction = extract_from_slice(&content)
        .with_context(|| format!("Failed to parse node document: {:?}", path))?;

    info!("Nodes with coordinates: {}", extraction.with_geo);
    info!("Nodes without coordinates: {}", extraction.without_geo);

    Ok(extraction)
}

pub fn extract_from_slice(content: &[u8]) -> Result<Extraction> {
    let document: Value = serde_json::from_slice(content).context("Invalid JSON")?;
    let records = parse_records(&document)?;
    Ok(extract(&records))
}

/// Resolve the `nodes` collection into records, paired with the key they
/// were stored under (object key, or array index).
pub fn parse_records(document: &Value) -> Result<Vec<(String, NodeRecord)>> {
    let nodes = document
        .get("nodes")
        .ok_or_else(|| anyhow!("Document has no 'nodes' member"))?;

    let records: Vec<(String, NodeRecord)> = match nodes {
        Value::Array(list) => list
            .iter()
            .enumerate()
            .map(|(i, node)| (i.to_string(), NodeRecord::from_value(node)))
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(key, node)| (key.clone(), NodeRecord::from_value(node)))
            .collect(),
        _ => return Err(anyhow!("'nodes' must be a list or an object")),
    };

    Ok(records)
}

pub fn extract(records: &[(String, NodeRecord)]) -> Extraction {
    let schema = if records.iter().any(|(_, r)| r.schema() == Schema::Current) {
        Schema::Current
    } else {
        Schema::Legacy
    };

    let mut with_geo = 0;
    let mut without_geo = 0;
    let mut known = CoordMap::new();
    let mut online = CoordMap::new();

    for (key, record) in records {
        let Some(point) = record.position() else {
            without_geo += 1;
            continue;
        };
        with_geo += 1;

        let id = record.id().unwrap_or(key.as_str()).to_string();
        if record.is_online() {
            online.insert(id.clone(), point);
        }
        known.insert(id, point);
    }

    Extraction {
        schema,
        with_geo,
        without_geo,
        known,
        online: (schema == Schema::Current).then_some(online),
    }
}

impl NodeRecord {
    pub fn from_value(node: &Value) -> NodeRecord {
        match node.get("nodeinfo") {
            Some(nodeinfo) => NodeRecord::Current {
                hostname: nodeinfo.get("hostname").and_then(Value::as_str).map(str::to_string),
                location: nodeinfo.get("location").and_then(current_location),
                online: node
                    .get("flags")
                    .and_then(|flags| flags.get("online"))
                    .map_or(false, |v| *v == Value::Bool(true)),
            },
            None => NodeRecord::Legacy {
                name: node.get("name").and_then(Value::as_str).map(str::to_string),
                geo: node.get("geo").and_then(legacy_geo),
            },
        }
    }
}

/// `{"latitude": .., "longitude": ..}`; both fields are required.
fn current_location(location: &Value) -> Option<GeoPoint> {
    let lat = location.get("latitude")?;
    let lon = location.get("longitude")?;
    match (lat.as_f64(), lon.as_f64()) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lon, lat)),
        _ => {
            debug!("Ignoring non-numeric location {}", location);
            None
        }
    }
}

/// `[latitude, longitude]`, or null.
fn legacy_geo(geo: &Value) -> Option<GeoPoint> {
    match geo.as_array().map(Vec::as_slice) {
        Some([lat, lon]) => Some(GeoPoint::new(lon.as_f64()?, lat.as_f64()?)),
        None if geo.is_null() => None,
        _ => {
            debug!("Ignoring malformed geo field {}", geo);
            None
        }
    }
}
