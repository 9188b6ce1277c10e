use std::collections::HashMap;

use geo::{Distance, Haversine};
use kdam::tqdm;

use crate::model::location::{Location, LocationKey};
use crate::model::platform::Platform;
use crate::model::platform_index::PlatformIndex;

/// matching radii in metres. bus stops use the tighter radius since they
/// sit much closer to their timetable location than rail platforms do.
#[derive(Copy, Clone, Debug)]
pub struct MatchingOptions {
    pub max_matching_dist: f64,
    pub max_bus_stop_matching_dist: f64,
}

impl Default for MatchingOptions {
    fn default() -> Self {
        MatchingOptions {
            max_matching_dist: 400.0,
            max_bus_stop_matching_dist: 120.0,
        }
    }
}

/// a timetable location bound to its nearest qualifying platform.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchingResult {
    pub platform: Platform,
    pub location: Location,
}

struct Candidate {
    platform: Platform,
    distance: f64,
}

/// binds each previously unmatched timetable location to at most one OSM
/// platform: the nearest candidate within its radius, drawn from both state
/// indices. locations without a candidate stay unmatched and are retried on
/// the next run.
pub fn match_locations_by_distance(
    locations: &[Location],
    already_matched: &HashMap<LocationKey, Platform>,
    old_pfs_idx: Option<&PlatformIndex>,
    update_pfs_idx: Option<&PlatformIndex>,
    options: &MatchingOptions,
) -> Vec<MatchingResult> {
    let query_radius = options
        .max_matching_dist
        .max(options.max_bus_stop_matching_dist);

    let mut results = vec![];
    let locations_iter = tqdm!(
        locations.iter(),
        total = locations.len(),
        desc = "match locations"
    );
    for location in locations_iter {
        if already_matched.contains_key(&location.key()) {
            continue;
        }

        let mut candidates: Vec<Candidate> = [old_pfs_idx, update_pfs_idx]
            .into_iter()
            .flatten()
            .flat_map(|idx| {
                idx.platforms_in_radius(&location.to_point(), query_radius)
                    .into_iter()
                    .filter_map(|ordinal| idx.get(ordinal))
                    .map(|pf| Candidate {
                        platform: pf.clone(),
                        distance: Haversine.distance(location.to_point(), pf.loc.to_point()),
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|candidate| {
                let radius = if candidate.platform.is_bus_stop {
                    options.max_bus_stop_matching_dist
                } else {
                    options.max_matching_dist
                };
                candidate.distance <= radius
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.platform.osm_type.cmp(&b.platform.osm_type))
                .then_with(|| a.platform.osm_id.cmp(&b.platform.osm_id))
        });

        if let Some(best) = candidates.into_iter().next() {
            results.push(MatchingResult {
                platform: best.platform,
                location: *location,
            });
        }
    }
    eprintln!();

    log::info!(
        "{} of {} locations matched to platforms",
        results.len(),
        locations.len()
    );
    results
}
