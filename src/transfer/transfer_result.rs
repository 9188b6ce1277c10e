use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use kdam::{Bar, BarExt};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::location::{LocationKey, ProfileKey};
use crate::model::timetable::FootpathDuration;
use crate::model::TransferError;
use crate::routing::{FootRouter, RoutingQuery, SearchDirection, SearchProfile};
use crate::transfer::transfer_request::TransferRequest;
use crate::transfer::{transfer_key, TransferKey};

/// duration and distance of the best route towards one destination.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferInfo {
    /// walking duration in whole minutes
    pub duration: FootpathDuration,
    /// walked distance in metres
    pub distance: f64,
}

/// the materialised outcome of one transfer request: the destinations that
/// were reached and, aligned index by index, their transfer infos.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub from_loc: LocationKey,
    pub to_locs: Vec<LocationKey>,
    pub profile: ProfileKey,
    pub infos: Vec<TransferInfo>,
}

impl TransferResult {
    pub fn key(&self) -> TransferKey {
        transfer_key(self.from_loc, self.profile)
    }
}

fn to_minutes(duration_seconds: f64) -> FootpathDuration {
    (duration_seconds / 60.0)
        .round()
        .min(FootpathDuration::MAX as f64) as FootpathDuration
}

/// routes a single transfer request. destinations without a route are
/// omitted; a request with no reached destination at all yields None.
pub fn route_single_request(
    request: &TransferRequest,
    router: &dyn FootRouter,
    profiles: &HashMap<ProfileKey, SearchProfile>,
) -> Result<Option<TransferResult>, TransferError> {
    let profile = profiles
        .get(&request.profile)
        .ok_or(TransferError::UnknownProfile(request.profile))?;

    let query = RoutingQuery {
        start: request.transfer_start.loc,
        destinations: request
            .transfer_targets
            .iter()
            .map(|target| target.loc)
            .collect(),
        profile: *profile,
        direction: SearchDirection::Forward,
    };
    let response = router.find_routes(&query)?;

    if response.destinations_reached() == 0 {
        return Ok(None);
    }
    if response.routes.len() != request.transfer_targets.len() {
        return Err(TransferError::RoutingError(format!(
            "router answered {} destinations for a query naming {}",
            response.routes.len(),
            request.transfer_targets.len()
        )));
    }

    let mut result = TransferResult {
        from_loc: request.from_loc,
        to_locs: vec![],
        profile: request.profile,
        infos: vec![],
    };
    for (i, routes) in response.routes.iter().enumerate() {
        // best candidate per destination comes first
        let Some(route) = routes.first() else {
            continue;
        };
        result.to_locs.push(request.to_locs[i]);
        result.infos.push(TransferInfo {
            duration: to_minutes(route.duration_seconds),
            distance: route.distance_meters,
        });
    }
    Ok(Some(result))
}

/// routes a batch of transfer requests across the rayon worker pool.
/// results accumulate in unspecified order; empty results are dropped.
pub fn route_multiple_requests(
    requests: &[TransferRequest],
    router: &dyn FootRouter,
    profiles: &HashMap<ProfileKey, SearchProfile>,
) -> Result<Vec<TransferResult>, TransferError> {
    let results = Mutex::new(Vec::with_capacity(requests.len()));
    let progress = Mutex::new(
        Bar::builder()
            .total(requests.len())
            .desc("route transfers")
            .build()
            .map_err(TransferError::InternalError)?,
    );

    requests.par_iter().try_for_each(|request| {
        let result = route_single_request(request, router, profiles)?;
        if let Some(result) = result {
            results
                .lock()
                .map_err(|e| TransferError::InternalError(e.to_string()))?
                .push(result);
        }
        if let Ok(mut bar) = progress.lock() {
            let _ = bar.update(1);
        }
        Ok::<(), TransferError>(())
    })?;
    eprintln!();

    let results = results
        .into_inner()
        .map_err(|e| TransferError::InternalError(e.to_string()))?;
    log::info!(
        "{} of {} transfer requests produced results",
        results.len(),
        requests.len()
    );
    Ok(results)
}

/// merges `b` into `a` by adjoining destination/info pairs of `b` whose
/// destination is not yet present in `a`. info already present in `a` is
/// never overwritten, even if `b` carries a fresher value.
pub fn merge_transfer_results(
    a: &TransferResult,
    b: &TransferResult,
) -> Result<TransferResult, TransferError> {
    let precondition = |reason: String| TransferError::MergePreconditionViolated {
        from: a.from_loc,
        profile: a.profile,
        reason,
    };

    if a.from_loc != b.from_loc {
        return Err(precondition(format!(
            "transfer results name different from-locations ({} vs {})",
            a.from_loc, b.from_loc
        )));
    }
    if a.profile != b.profile {
        return Err(precondition(format!(
            "transfer results name different profiles ({} vs {})",
            a.profile, b.profile
        )));
    }
    if a.to_locs.len() != a.infos.len() {
        return Err(precondition(format!(
            "left operand pairs {} destinations with {} infos",
            a.to_locs.len(),
            a.infos.len()
        )));
    }
    if b.to_locs.len() != b.infos.len() {
        return Err(precondition(format!(
            "right operand pairs {} destinations with {} infos",
            b.to_locs.len(),
            b.infos.len()
        )));
    }

    let mut merged = a.clone();
    let mut seen: HashSet<LocationKey> = merged.to_locs.iter().copied().collect();
    for (to_loc, info) in b.to_locs.iter().zip(b.infos.iter()) {
        if seen.insert(*to_loc) {
            merged.to_locs.push(*to_loc);
            merged.infos.push(*info);
        }
    }
    Ok(merged)
}
