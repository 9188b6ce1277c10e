mod beeline;

pub use beeline::BeelineRouter;

use serde::{Deserialize, Serialize};

use crate::model::location::Location;
use crate::model::TransferError;

/// a named pedestrian routing configuration. the product
/// `walking_speed * duration_limit` bounds the reachable distance in metres
/// and drives transfer candidate generation.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchProfile {
    /// metres per second
    pub walking_speed: f64,
    /// seconds
    pub duration_limit: f64,
}

impl SearchProfile {
    /// maximum beeline distance in metres a pedestrian can cover within the
    /// duration limit.
    pub fn reach(&self) -> f64 {
        self.walking_speed * self.duration_limit
    }
}

/// transfers are always routed in walking direction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchDirection {
    #[default]
    Forward,
}

/// one point-to-multipoint routing task.
#[derive(Clone, Debug)]
pub struct RoutingQuery {
    pub start: Location,
    pub destinations: Vec<Location>,
    pub profile: SearchProfile,
    pub direction: SearchDirection,
}

/// one route candidate towards a single destination.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Route {
    pub duration_seconds: f64,
    pub distance_meters: f64,
}

/// per destination of the query, a ranked list of route candidates. an
/// unreached destination holds an empty list.
#[derive(Clone, Debug, Default)]
pub struct RoutingResponse {
    pub routes: Vec<Vec<Route>>,
}

impl RoutingResponse {
    pub fn destinations_reached(&self) -> usize {
        self.routes.iter().filter(|routes| !routes.is_empty()).count()
    }
}

/// point-to-multipoint pedestrian router. the engine shares one router
/// across its routing worker threads; implementations are read-only after
/// construction.
pub trait FootRouter: Send + Sync {
    fn find_routes(&self, query: &RoutingQuery) -> Result<RoutingResponse, TransferError>;
}
