use std::collections::{HashMap, HashSet};
use std::path::Path;

use kdam::{Bar, BarExt};
use osmpbf::{Element, ElementReader, RelMemberType};

use crate::model::location::Location;
use crate::model::platform::{OsmType, Platform};
use crate::model::TransferError;

/// tag combinations identifying a passenger platform.
const PLATFORM_FILTER: [(&str, &str); 4] = [
    ("public_transport", "platform"),
    ("public_transport", "stop_position"),
    ("railway", "platform"),
    ("railway", "tram_stop"),
];

/// tag keys searched for platform names, in harvest order.
const NAME_TAG_KEYS: [&str; 5] = ["name", "description", "ref_name", "local_ref", "ref"];

/// sentinel value marking an absent name.
const NO_NAME: &str = "n/a";

/// a platform-tagged way awaiting node coordinates.
struct PendingWay {
    osm_id: i64,
    names: Vec<String>,
    is_bus_stop: bool,
    node_refs: Vec<i64>,
}

/// a platform-tagged multipolygon relation awaiting its outer-ring ways.
struct PendingRelation {
    osm_id: i64,
    names: Vec<String>,
    is_bus_stop: bool,
    member_way_ids: Vec<i64>,
}

/// extracts all platforms from the given OSM .pbf file.
///
/// nodes resolve immediately; ways and multipolygon relations are resolved
/// in two further passes that collect outer-ring member ways and node
/// coordinates. closed ways and relations use the arithmetic mean of their
/// ring vertices as coordinate, open ways the corner of their envelope.
pub fn extract_platforms(osm_path: &Path) -> Result<Vec<Platform>, TransferError> {
    let mut platforms = vec![];
    let mut pending_ways: Vec<PendingWay> = vec![];
    let mut pending_relations: Vec<PendingRelation> = vec![];

    let mut reader_bar = Bar::builder()
        .desc(osm_path.display().to_string())
        .unit(" rows")
        .unit_scale(true)
        .build()
        .map_err(TransferError::InternalError)?;

    let reader =
        ElementReader::from_path(osm_path).map_err(|e| TransferError::PbfLibError { source: e })?;
    reader
        .for_each(|element| {
            match element {
                Element::Node(node) => {
                    let tags: Vec<(&str, &str)> = node.tags().collect();
                    if is_platform(&tags) {
                        platforms.push(Platform::new(
                            Location::new(node.lat(), node.lon()),
                            node.id(),
                            OsmType::Node,
                            platform_names(&tags),
                            is_bus_stop(&tags),
                        ));
                    }
                }
                Element::DenseNode(node) => {
                    let tags: Vec<(&str, &str)> = node.tags().collect();
                    if is_platform(&tags) {
                        platforms.push(Platform::new(
                            Location::new(node.lat(), node.lon()),
                            node.id(),
                            OsmType::Node,
                            platform_names(&tags),
                            is_bus_stop(&tags),
                        ));
                    }
                }
                Element::Way(way) => {
                    let tags: Vec<(&str, &str)> = way.tags().collect();
                    if is_platform(&tags) {
                        pending_ways.push(PendingWay {
                            osm_id: way.id(),
                            names: platform_names(&tags),
                            is_bus_stop: is_bus_stop(&tags),
                            node_refs: way.refs().collect(),
                        });
                    }
                }
                Element::Relation(relation) => {
                    let tags: Vec<(&str, &str)> = relation.tags().collect();
                    if is_platform(&tags) && is_multipolygon(&tags) {
                        let member_way_ids = relation
                            .members()
                            .filter(|member| {
                                member.member_type == RelMemberType::Way
                                    && matches!(member.role(), Ok("outer") | Ok(""))
                            })
                            .map(|member| member.member_id)
                            .collect();
                        pending_relations.push(PendingRelation {
                            osm_id: relation.id(),
                            names: platform_names(&tags),
                            is_bus_stop: is_bus_stop(&tags),
                            member_way_ids,
                        });
                    }
                }
            }
            let _ = reader_bar.update(1);
        })
        .map_err(|e| TransferError::PbfLibError { source: e })?;
    eprintln!();

    // second pass: node refs for relation member ways
    let member_way_refs = read_member_way_refs(osm_path, &pending_relations)?;

    // third pass: coordinates for every node referenced by a pending way
    let node_coords = read_node_coordinates(osm_path, &pending_ways, &member_way_refs)?;

    for way in &pending_ways {
        // only a closed way encloses an area whose ring vertices can be
        // averaged; an open way is reduced to its envelope corner
        let coord = if is_closed(&way.node_refs) {
            mean_coordinate(&way.node_refs, &node_coords)
        } else {
            envelope_corner(&way.node_refs, &node_coords)
        };
        match coord {
            Some(loc) => platforms.push(Platform::new(
                loc,
                way.osm_id,
                OsmType::Way,
                way.names.clone(),
                way.is_bus_stop,
            )),
            None => {
                log::warn!("platform way {} has unresolvable nodes, dropped", way.osm_id)
            }
        }
    }

    for relation in &pending_relations {
        let outer_refs: Vec<i64> = relation
            .member_way_ids
            .iter()
            .filter_map(|way_id| member_way_refs.get(way_id))
            .flatten()
            .copied()
            .collect();
        match mean_coordinate(&outer_refs, &node_coords) {
            Some(loc) => platforms.push(Platform::new(
                loc,
                relation.osm_id,
                OsmType::Relation,
                relation.names.clone(),
                relation.is_bus_stop,
            )),
            None => log::warn!(
                "platform relation {} has no resolvable outer ring, dropped",
                relation.osm_id
            ),
        }
    }

    log::info!(
        "{} platforms extracted from OSM resource {}",
        platforms.len(),
        osm_path.display()
    );
    Ok(platforms)
}

/// collects the node refs of every way referenced by a pending relation.
fn read_member_way_refs(
    osm_path: &Path,
    pending_relations: &[PendingRelation],
) -> Result<HashMap<i64, Vec<i64>>, TransferError> {
    let needed: HashSet<i64> = pending_relations
        .iter()
        .flat_map(|relation| relation.member_way_ids.iter().copied())
        .collect();
    let mut refs: HashMap<i64, Vec<i64>> = HashMap::new();
    if needed.is_empty() {
        return Ok(refs);
    }

    ElementReader::from_path(osm_path)
        .map_err(|e| TransferError::PbfLibError { source: e })?
        .for_each(|element| {
            if let Element::Way(way) = element {
                if needed.contains(&way.id()) {
                    refs.insert(way.id(), way.refs().collect());
                }
            }
        })
        .map_err(|e| TransferError::PbfLibError { source: e })?;
    Ok(refs)
}

/// collects coordinates for every node referenced by a pending way or a
/// relation member way.
fn read_node_coordinates(
    osm_path: &Path,
    pending_ways: &[PendingWay],
    member_way_refs: &HashMap<i64, Vec<i64>>,
) -> Result<HashMap<i64, Location>, TransferError> {
    let needed: HashSet<i64> = pending_ways
        .iter()
        .flat_map(|way| way.node_refs.iter().copied())
        .chain(member_way_refs.values().flatten().copied())
        .collect();
    let mut coords: HashMap<i64, Location> = HashMap::new();
    if needed.is_empty() {
        return Ok(coords);
    }

    ElementReader::from_path(osm_path)
        .map_err(|e| TransferError::PbfLibError { source: e })?
        .for_each(|element| match element {
            Element::Node(node) if needed.contains(&node.id()) => {
                coords.insert(node.id(), Location::new(node.lat(), node.lon()));
            }
            Element::DenseNode(node) if needed.contains(&node.id()) => {
                coords.insert(node.id(), Location::new(node.lat(), node.lon()));
            }
            _ => {}
        })
        .map_err(|e| TransferError::PbfLibError { source: e })?;
    Ok(coords)
}

/// a way whose first and last node refs coincide encloses an area.
fn is_closed(node_refs: &[i64]) -> bool {
    node_refs.len() > 2 && node_refs.first() == node_refs.last()
}

/// bottom-left corner of the bounding box spanned by the referenced nodes,
/// or None if any node is missing or the ref list is empty.
fn envelope_corner(node_refs: &[i64], coords: &HashMap<i64, Location>) -> Option<Location> {
    if node_refs.is_empty() {
        return None;
    }
    let mut min_lat = f64::INFINITY;
    let mut min_lng = f64::INFINITY;
    for node_ref in node_refs {
        let loc = coords.get(node_ref)?;
        min_lat = min_lat.min(loc.lat);
        min_lng = min_lng.min(loc.lng);
    }
    Some(Location::new(min_lat, min_lng))
}

/// arithmetic mean of the referenced node coordinates, or None if any node
/// is missing or the ref list is empty.
fn mean_coordinate(node_refs: &[i64], coords: &HashMap<i64, Location>) -> Option<Location> {
    if node_refs.is_empty() {
        return None;
    }
    let mut lat_sum = 0.0;
    let mut lng_sum = 0.0;
    for node_ref in node_refs {
        let loc = coords.get(node_ref)?;
        lat_sum += loc.lat;
        lng_sum += loc.lng;
    }
    let n = node_refs.len() as f64;
    Some(Location::new(lat_sum / n, lng_sum / n))
}

fn is_platform(tags: &[(&str, &str)]) -> bool {
    tags.iter().any(|tag| PLATFORM_FILTER.contains(tag))
}

fn is_multipolygon(tags: &[(&str, &str)]) -> bool {
    tags.iter()
        .any(|(key, value)| *key == "type" && *value == "multipolygon")
}

fn is_bus_stop(tags: &[(&str, &str)]) -> bool {
    tags.iter()
        .any(|(key, value)| *key == "highway" && *value == "bus_stop")
}

/// harvests distinct platform names by trying the name tag keys in order.
fn platform_names(tags: &[(&str, &str)]) -> Vec<String> {
    let mut names: Vec<String> = vec![];
    for key in NAME_TAG_KEYS {
        if let Some((_, value)) = tags.iter().find(|(tag_key, _)| *tag_key == key) {
            if *value != NO_NAME && !names.iter().any(|name| name == value) {
                names.push((*value).to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::{
        envelope_corner, is_bus_stop, is_closed, is_platform, mean_coordinate, platform_names,
    };
    use crate::model::location::Location;
    use std::collections::HashMap;

    #[test]
    fn test_is_platform_accepts_filter_tags() {
        assert!(is_platform(&[("public_transport", "platform")]));
        assert!(is_platform(&[("public_transport", "stop_position")]));
        assert!(is_platform(&[("railway", "platform")]));
        assert!(is_platform(&[("railway", "tram_stop")]));
        assert!(is_platform(&[
            ("highway", "bus_stop"),
            ("railway", "tram_stop")
        ]));
    }

    #[test]
    fn test_is_platform_rejects_other_tags() {
        assert!(!is_platform(&[]));
        assert!(!is_platform(&[("railway", "rail")]));
        assert!(!is_platform(&[("public_transport", "station")]));
        assert!(!is_platform(&[("highway", "bus_stop")]));
    }

    #[test]
    fn test_platform_names_harvest_order_and_dedup() {
        let tags = [
            ("ref", "7"),
            ("name", "Hauptbahnhof"),
            ("description", "Hauptbahnhof"),
            ("local_ref", "7a"),
        ];
        assert_eq!(platform_names(&tags), vec!["Hauptbahnhof", "7a", "7"]);
    }

    #[test]
    fn test_platform_names_drops_sentinel() {
        let tags = [("name", "n/a"), ("ref", "12")];
        assert_eq!(platform_names(&tags), vec!["12"]);
    }

    #[test]
    fn test_platform_names_empty_when_unnamed() {
        assert!(platform_names(&[("railway", "platform")]).is_empty());
    }

    #[test]
    fn test_is_bus_stop() {
        assert!(is_bus_stop(&[
            ("public_transport", "platform"),
            ("highway", "bus_stop")
        ]));
        assert!(!is_bus_stop(&[("public_transport", "platform")]));
    }

    #[test]
    fn test_mean_coordinate() {
        let coords = HashMap::from([
            (1i64, Location::new(48.0, 11.0)),
            (2, Location::new(48.0, 11.0002)),
            (3, Location::new(48.0004, 11.0001)),
        ]);
        let mean = mean_coordinate(&[1, 2, 3], &coords).expect("mean should resolve");
        assert_eq!(mean, Location::new(48.0001333333, 11.0001));
    }

    #[test]
    fn test_mean_coordinate_missing_node() {
        let coords = HashMap::from([(1i64, Location::new(48.0, 11.0))]);
        assert!(mean_coordinate(&[1, 99], &coords).is_none());
        assert!(mean_coordinate(&[], &coords).is_none());
    }

    #[test]
    fn test_is_closed() {
        assert!(is_closed(&[1, 2, 3, 1]));
        assert!(!is_closed(&[1, 2, 3]));
        // a degenerate two-node loop is not a ring
        assert!(!is_closed(&[1, 1]));
        assert!(!is_closed(&[]));
    }

    #[test]
    fn test_envelope_corner() {
        let coords = HashMap::from([
            (1i64, Location::new(48.0002, 11.0001)),
            (2, Location::new(48.0000, 11.0003)),
            (3, Location::new(48.0001, 11.0000)),
        ]);
        let corner = envelope_corner(&[1, 2, 3], &coords).expect("corner should resolve");
        assert_eq!(corner, Location::new(48.0, 11.0));
    }

    #[test]
    fn test_envelope_corner_missing_node() {
        let coords = HashMap::from([(1i64, Location::new(48.0, 11.0))]);
        assert!(envelope_corner(&[1, 99], &coords).is_none());
        assert!(envelope_corner(&[], &coords).is_none());
    }
}
