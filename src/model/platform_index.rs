use geo::{Distance, Haversine, Point};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};

use crate::model::platform::Platform;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// metres per degree of latitude, used to derive the degree-space envelope
/// for a metric radius query. the envelope only prefilters; the haversine
/// distance decides membership.
const DEGREE_LENGTH_M: f64 = 111_320.0;

/// spatial index over a fixed set of platforms.
///
/// ordinal ids are assigned by insertion order and are stable for the
/// lifetime of the index. radius queries measure great-circle distance in
/// metres and may return ordinals in any order.
pub struct PlatformIndex {
    platforms: Vec<Platform>,
    rtree: RTree<IndexedPoint>,
}

impl PlatformIndex {
    pub fn new(platforms: Vec<Platform>) -> PlatformIndex {
        let points = platforms
            .iter()
            .enumerate()
            .map(|(i, pf)| GeomWithData::new([pf.loc.lng, pf.loc.lat], i))
            .collect();
        PlatformIndex {
            rtree: RTree::bulk_load(points),
            platforms,
        }
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&Platform> {
        self.platforms.get(ordinal)
    }

    /// ordinals of all platforms within `radius_m` metres of `point`.
    pub fn platforms_in_radius(&self, point: &Point<f64>, radius_m: f64) -> Vec<usize> {
        self.rtree
            .locate_in_envelope(&envelope(point, radius_m))
            .filter(|entry| {
                let candidate = Point::new(entry.geom()[0], entry.geom()[1]);
                Haversine.distance(*point, candidate) <= radius_m
            })
            .map(|entry| entry.data)
            .collect()
    }

    /// ordinals of all platforms within `radius_m` metres of `pf`, omitting
    /// entries with the same `(osm_type, osm_id)` as `pf` itself.
    pub fn other_platforms_in_radius(&self, pf: &Platform, radius_m: f64) -> Vec<usize> {
        self.platforms_in_radius(&pf.loc.to_point(), radius_m)
            .into_iter()
            .filter(|ordinal| self.platforms[*ordinal] != *pf)
            .collect()
    }
}

/// degree-space bounding box around `point` covering at least `radius_m`
/// metres in every direction.
fn envelope(point: &Point<f64>, radius_m: f64) -> AABB<[f64; 2]> {
    let dlat = radius_m / DEGREE_LENGTH_M;
    let cos_lat = point.y().to_radians().cos().abs().max(1e-6);
    let dlng = radius_m / (DEGREE_LENGTH_M * cos_lat);
    AABB::from_corners(
        [point.x() - dlng, point.y() - dlat],
        [point.x() + dlng, point.y() + dlat],
    )
}
