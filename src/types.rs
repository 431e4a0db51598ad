use geo::{MultiPolygon, Point};
use std::collections::BTreeMap;

/// WGS84 position, x = longitude, y = latitude (degrees).
pub type GeoPoint = Point<f64>;

/// Node identifier -> position.
pub type CoordMap = BTreeMap<String, GeoPoint>;

#[derive(Debug, Clone)]
pub struct District {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// Which generation of nodes.json a document (or a single node) follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// ffmap style: `name` plus optional `geo: [lat, lon]`.
    Legacy,
    /// meshviewer style: `nodeinfo.location.{latitude,longitude}` and `flags.online`.
    Current,
}

/// A single entry of the `nodes` collection, already resolved to one schema.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRecord {
    Legacy {
        name: Option<String>,
        geo: Option<GeoPoint>,
    },
    Current {
        hostname: Option<String>,
        location: Option<GeoPoint>,
        online: bool,
    },
}

impl NodeRecord {
    pub fn schema(&self) -> Schema {
        match self {
            NodeRecord::Legacy { .. } => Schema::Legacy,
            NodeRecord::Current { .. } => Schema::Current,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            NodeRecord::Legacy { name, .. } => name.as_deref(),
            NodeRecord::Current { hostname, .. } => hostname.as_deref(),
        }
    }

    pub fn position(&self) -> Option<GeoPoint> {
        match self {
            NodeRecord::Legacy { geo, .. } => *geo,
            NodeRecord::Current { location, .. } => *location,
        }
    }

    /// Legacy records carry no reachability information and are never online.
    pub fn is_online(&self) -> bool {
        matches!(self, NodeRecord::Current { online: true, .. })
    }
}
