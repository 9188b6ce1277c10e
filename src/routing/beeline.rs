use geo::{Distance, Haversine};

use crate::model::TransferError;
use crate::routing::{FootRouter, Route, RoutingQuery, RoutingResponse};

/// built-in pedestrian router estimating every leg over the great-circle
/// distance at the profile's walking speed. a destination is unreached when
/// the estimated duration exceeds the profile's duration limit.
///
/// this keeps the pipeline runnable without a street network; a
/// street-network router plugs in through [`FootRouter`].
#[derive(Default)]
pub struct BeelineRouter;

impl BeelineRouter {
    pub fn new() -> BeelineRouter {
        BeelineRouter
    }
}

impl FootRouter for BeelineRouter {
    fn find_routes(&self, query: &RoutingQuery) -> Result<RoutingResponse, TransferError> {
        if query.profile.walking_speed <= 0.0 {
            return Err(TransferError::RoutingError(format!(
                "walking speed must be positive, got {}",
                query.profile.walking_speed
            )));
        }

        let start = query.start.to_point();
        let routes = query
            .destinations
            .iter()
            .map(|destination| {
                let distance_meters = Haversine.distance(start, destination.to_point());
                let duration_seconds = distance_meters / query.profile.walking_speed;
                if duration_seconds <= query.profile.duration_limit {
                    vec![Route {
                        duration_seconds,
                        distance_meters,
                    }]
                } else {
                    vec![]
                }
            })
            .collect();

        Ok(RoutingResponse { routes })
    }
}

#[cfg(test)]
mod tests {
    use super::BeelineRouter;
    use crate::model::location::Location;
    use crate::routing::{FootRouter, RoutingQuery, SearchDirection, SearchProfile};

    fn query(destinations: Vec<Location>, profile: SearchProfile) -> RoutingQuery {
        RoutingQuery {
            start: Location::new(48.0, 11.0),
            destinations,
            profile,
            direction: SearchDirection::Forward,
        }
    }

    #[test]
    fn test_reachable_destination() {
        let profile = SearchProfile {
            walking_speed: 1.4,
            duration_limit: 300.0,
        };
        let response = BeelineRouter::new()
            .find_routes(&query(vec![Location::new(48.001, 11.0)], profile))
            .expect("routing failed");

        assert_eq!(response.destinations_reached(), 1);
        let route = &response.routes[0][0];
        // one millidegree of latitude is roughly 111 metres
        assert!((route.distance_meters - 111.0).abs() < 1.0);
        assert!((route.duration_seconds - route.distance_meters / 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_unreachable_destination_is_empty() {
        let profile = SearchProfile {
            walking_speed: 1.4,
            duration_limit: 60.0,
        };
        let response = BeelineRouter::new()
            .find_routes(&query(vec![Location::new(48.001, 11.0)], profile))
            .expect("routing failed");

        assert_eq!(response.destinations_reached(), 0);
        assert_eq!(response.routes.len(), 1);
        assert!(response.routes[0].is_empty());
    }

    #[test]
    fn test_mixed_destinations() {
        let profile = SearchProfile {
            walking_speed: 1.4,
            duration_limit: 300.0,
        };
        let response = BeelineRouter::new()
            .find_routes(&query(
                vec![
                    Location::new(48.001, 11.0),
                    Location::new(48.1, 11.0),
                    Location::new(48.0, 11.001),
                ],
                profile,
            ))
            .expect("routing failed");

        assert_eq!(response.routes.len(), 3);
        assert_eq!(response.destinations_reached(), 2);
        assert!(response.routes[1].is_empty());
    }

    #[test]
    fn test_invalid_walking_speed() {
        let profile = SearchProfile {
            walking_speed: 0.0,
            duration_limit: 300.0,
        };
        let result = BeelineRouter::new().find_routes(&query(vec![], profile));
        assert!(result.is_err());
    }
}
