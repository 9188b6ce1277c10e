mod by_distance;

pub use by_distance::{match_locations_by_distance, MatchingOptions, MatchingResult};
