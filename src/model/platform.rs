use serde::{Deserialize, Serialize};

use crate::model::location::Location;

/// persistent platform key: osm type byte followed by the little-endian
/// osm id.
pub type PlatformKey = [u8; 9];

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OsmType {
    Node,
    Way,
    Relation,
    Unknown,
}

impl OsmType {
    pub fn as_byte(&self) -> u8 {
        match self {
            OsmType::Node => 0,
            OsmType::Way => 1,
            OsmType::Relation => 2,
            OsmType::Unknown => 3,
        }
    }
}

/// a passenger boarding location identified in OSM data: a node, a way, or
/// a multipolygon relation reduced to a representative coordinate.
///
/// platform identity is `(osm_type, osm_id)`; names and the coordinate are
/// payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Platform {
    pub loc: Location,
    pub osm_id: i64,
    pub osm_type: OsmType,
    /// ordered list of distinct names harvested from the object's tags.
    pub names: Vec<String>,
    pub is_bus_stop: bool,
}

impl Platform {
    pub fn new(
        loc: Location,
        osm_id: i64,
        osm_type: OsmType,
        names: Vec<String>,
        is_bus_stop: bool,
    ) -> Platform {
        Platform {
            loc,
            osm_id,
            osm_type,
            names,
            is_bus_stop,
        }
    }

    /// persistent store key, injective on `(osm_type, osm_id)`.
    pub fn key(&self) -> PlatformKey {
        let mut key = [0u8; 9];
        key[0] = self.osm_type.as_byte();
        key[1..].copy_from_slice(&self.osm_id.to_le_bytes());
        key
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.osm_id == other.osm_id && self.osm_type == other.osm_type
    }
}

impl Eq for Platform {}
