use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::model::location::{LocationKey, ProfileKey};
use crate::model::platform::Platform;
use crate::model::platform_index::PlatformIndex;
use crate::model::TransferError;
use crate::routing::SearchProfile;
use crate::transfer::{transfer_key, TransferKey};

/// a deferred routing task addressed purely by location keys and a profile.
/// `from_loc` never appears in `to_locs`, and `to_locs` holds no duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequestByKeys {
    pub from_loc: LocationKey,
    pub to_locs: Vec<LocationKey>,
    pub profile: ProfileKey,
}

impl TransferRequestByKeys {
    pub fn key(&self) -> TransferKey {
        transfer_key(self.from_loc, self.profile)
    }
}

/// a transfer request with its location keys resolved to matched platforms,
/// ready to hand to the pedestrian router.
#[derive(Clone, Debug)]
pub struct TransferRequest {
    pub transfer_start: Platform,
    pub from_loc: LocationKey,
    pub transfer_targets: Vec<Platform>,
    pub to_locs: Vec<LocationKey>,
    pub profile: ProfileKey,
}

/// one side of the old/update state partition as seen by the generator: a
/// matched-platform index plus the location keys aligned with its ordinals.
#[derive(Copy, Clone)]
pub struct MatchedLocationData<'a> {
    pub matched_pfs_idx: Option<&'a PlatformIndex>,
    pub loc_keys: &'a [LocationKey],
}

pub struct GenerationData<'a> {
    pub old: MatchedLocationData<'a>,
    pub update: MatchedLocationData<'a>,
    pub profiles: &'a HashMap<ProfileKey, SearchProfile>,
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TransferRequestOptions {
    /// also generate requests between pairs of already known matches. set
    /// when the profile set changed and old pairs need re-evaluation.
    pub old_to_old: bool,
}

/// resolves keyed requests to concrete requests via the combined matching
/// map. every location named by a request must be matched.
pub fn to_transfer_requests(
    requests: &[TransferRequestByKeys],
    matches: &HashMap<LocationKey, Platform>,
) -> Result<Vec<TransferRequest>, TransferError> {
    requests
        .iter()
        .map(|request| {
            let transfer_start = matches
                .get(&request.from_loc)
                .ok_or(TransferError::UnmatchedLocation(request.from_loc))?
                .clone();
            let transfer_targets = request
                .to_locs
                .iter()
                .map(|to_loc| {
                    matches
                        .get(to_loc)
                        .cloned()
                        .ok_or(TransferError::UnmatchedLocation(*to_loc))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(TransferRequest {
                transfer_start,
                from_loc: request.from_loc,
                transfer_targets,
                to_locs: request.to_locs.clone(),
                profile: request.profile,
            })
        })
        .collect()
}

/// generates keyed transfer requests for every profile across the state
/// partition: old -> update, update -> old, and update -> update, plus
/// old -> old when requested. the per-profile candidate radius is
/// `walking_speed * duration_limit`.
pub fn generate_transfer_requests(
    data: &GenerationData,
    options: &TransferRequestOptions,
) -> Vec<TransferRequestByKeys> {
    let mut requests = vec![];

    for (profile_key, profile) in data
        .profiles
        .iter()
        .sorted_by_key(|(profile_key, _)| **profile_key)
    {
        let reach = profile.reach();

        if options.old_to_old {
            requests.extend(all_pair_requests(&data.old, &data.old, *profile_key, reach));
        }

        if data.update.matched_pfs_idx.is_none() {
            continue;
        }

        requests.extend(all_pair_requests(
            &data.old,
            &data.update,
            *profile_key,
            reach,
        ));
        requests.extend(all_pair_requests(
            &data.update,
            &data.old,
            *profile_key,
            reach,
        ));
        requests.extend(all_pair_requests(
            &data.update,
            &data.update,
            *profile_key,
            reach,
        ));
    }

    log::info!("{} transfer requests generated", requests.len());
    requests
}

/// emits one request per from-ordinal in `from` that has neighbors in `to`
/// within `reach` metres. self-transfers are excluded by platform identity
/// when both sides share an index.
fn all_pair_requests(
    from: &MatchedLocationData,
    to: &MatchedLocationData,
    profile_key: ProfileKey,
    reach: f64,
) -> Vec<TransferRequestByKeys> {
    let (Some(from_idx), Some(to_idx)) = (from.matched_pfs_idx, to.matched_pfs_idx) else {
        return vec![];
    };
    if from_idx.is_empty() || to_idx.is_empty() {
        return vec![];
    }

    let mut requests = vec![];
    for ordinal in 0..from_idx.len() {
        let Some(from_pf) = from_idx.get(ordinal) else {
            continue;
        };
        let target_ordinals = to_idx.other_platforms_in_radius(from_pf, reach);
        if target_ordinals.is_empty() {
            continue;
        }

        requests.push(TransferRequestByKeys {
            from_loc: from.loc_keys[ordinal],
            to_locs: target_ordinals
                .into_iter()
                .map(|target| to.loc_keys[target])
                .collect(),
            profile: profile_key,
        });
    }
    requests
}

/// merges `b` into `a` by adjoining destinations of `b` not yet present in
/// `a`. both requests must share the from-location and the profile.
pub fn merge_transfer_requests(
    a: &TransferRequestByKeys,
    b: &TransferRequestByKeys,
) -> Result<TransferRequestByKeys, TransferError> {
    if a.from_loc != b.from_loc {
        return Err(TransferError::MergePreconditionViolated {
            from: a.from_loc,
            profile: a.profile,
            reason: format!(
                "transfer requests name different from-locations ({} vs {})",
                a.from_loc, b.from_loc
            ),
        });
    }
    if a.profile != b.profile {
        return Err(TransferError::MergePreconditionViolated {
            from: a.from_loc,
            profile: a.profile,
            reason: format!(
                "transfer requests name different profiles ({} vs {})",
                a.profile, b.profile
            ),
        });
    }

    let mut merged = a.clone();
    let mut seen: HashSet<LocationKey> = merged.to_locs.iter().copied().collect();
    for to_loc in &b.to_locs {
        if seen.insert(*to_loc) {
            merged.to_locs.push(*to_loc);
        }
    }
    Ok(merged)
}
