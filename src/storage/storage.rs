use std::collections::{HashMap, HashSet};
use std::path::Path;

use itertools::Itertools;

use crate::matching::MatchingResult;
use crate::model::location::{LocationKey, ProfileKey};
use crate::model::platform::Platform;
use crate::model::platform_index::PlatformIndex;
use crate::model::timetable::{Footpath, Timetable, MAX_PROFILES};
use crate::model::TransferError;
use crate::routing::SearchProfile;
use crate::storage::database::Database;
use crate::transfer::transfer_request::{
    GenerationData, MatchedLocationData, TransferRequestByKeys,
};
use crate::transfer::transfer_result::TransferResult;

/// selects which side of the state partition a data query addresses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataRequestType {
    PartialOld,
    PartialUpdate,
    Full,
}

/// one snapshot of the state partition. `old` is loaded from the persistent
/// store at initialization; `update` accumulates what the current run adds.
/// `loc_keys` is ordinally aligned with `matched_pfs_idx`.
#[derive(Default)]
pub struct State {
    pub pfs_idx: Option<PlatformIndex>,
    pub matched_pfs_idx: Option<PlatformIndex>,
    pub loc_keys: Vec<LocationKey>,
    pub matches: HashMap<LocationKey, Platform>,
    pub transfer_requests: Vec<TransferRequestByKeys>,
    pub transfer_results: Vec<TransferResult>,
}

/// owns the persistent database plus the old/update state partition and
/// mediates every stage's reads and writes.
pub struct Storage {
    pub profile_name_to_key: HashMap<String, ProfileKey>,
    pub profile_key_to_name: HashMap<ProfileKey, String>,
    pub profile_key_to_search_profile: HashMap<ProfileKey, SearchProfile>,
    pub used_profiles: HashSet<ProfileKey>,
    old_state: State,
    update_state: State,
    db: Database,
}

impl Storage {
    pub fn open(db_file_path: &Path, cache_size: usize) -> Result<Storage, TransferError> {
        Ok(Storage {
            profile_name_to_key: HashMap::new(),
            profile_key_to_name: HashMap::new(),
            profile_key_to_search_profile: HashMap::new(),
            used_profiles: HashSet::new(),
            old_state: State::default(),
            update_state: State::default(),
            db: Database::open(db_file_path, cache_size)?,
        })
    }

    /// registers the run's search profiles: allocates keys for unseen names
    /// and declares all given names as used by this run. must run before
    /// `initialize`, which loads only used-profile data.
    pub fn add_new_profiles(
        &mut self,
        profiles: &HashMap<String, SearchProfile>,
    ) -> Result<(), TransferError> {
        // sorted for deterministic key allocation
        let names: Vec<String> = profiles.keys().sorted().cloned().collect();
        self.db.put_profiles(&names)?;
        self.profile_name_to_key = self.db.get_profile_keys()?;
        self.profile_key_to_name = self.db.get_profile_key_to_name()?;

        self.used_profiles.clear();
        self.profile_key_to_search_profile.clear();
        for (name, search_profile) in profiles {
            let key = self.profile_name_to_key.get(name).copied().ok_or_else(|| {
                TransferError::InternalError(format!("profile '{name}' missing after insertion"))
            })?;
            self.used_profiles.insert(key);
            self.profile_key_to_search_profile
                .insert(key, *search_profile);
        }
        Ok(())
    }

    /// loads the old state from the database: all platforms, the matchings
    /// join, and requests/results of the used profiles.
    pub fn initialize(&mut self) -> Result<(), TransferError> {
        let platforms = self.db.get_platforms()?;
        let matches = self.db.get_matchings()?;

        // sorted for a stable ordinal <-> location key alignment
        let mut loc_keys = vec![];
        let mut matched_platforms = vec![];
        for (loc_key, platform) in matches.iter().sorted_by_key(|(loc_key, _)| **loc_key) {
            loc_keys.push(*loc_key);
            matched_platforms.push(platform.clone());
        }

        self.old_state = State {
            pfs_idx: Some(PlatformIndex::new(platforms)),
            matched_pfs_idx: Some(PlatformIndex::new(matched_platforms)),
            loc_keys,
            matches,
            transfer_requests: self.db.get_transfer_requests(&self.used_profiles)?,
            transfer_results: self.db.get_transfer_results(&self.used_profiles)?,
        };

        log::info!(
            "old state loaded: {} platforms, {} matchings, {} requests, {} results",
            self.old_state
                .pfs_idx
                .as_ref()
                .map(PlatformIndex::len)
                .unwrap_or(0),
            self.old_state.matches.len(),
            self.old_state.transfer_requests.len(),
            self.old_state.transfer_results.len()
        );
        Ok(())
    }

    pub fn old_state(&self) -> &State {
        &self.old_state
    }

    pub fn update_state(&self) -> &State {
        &self.update_state
    }

    /// matchings of both states combined; the update state wins on conflict.
    pub fn get_all_matchings(&self) -> HashMap<LocationKey, Platform> {
        let mut all = self.old_state.matches.clone();
        all.extend(
            self.update_state
                .matches
                .iter()
                .map(|(loc_key, platform)| (*loc_key, platform.clone())),
        );
        all
    }

    pub fn has_transfer_requests(&self, request_type: DataRequestType) -> bool {
        match request_type {
            DataRequestType::PartialOld => !self.old_state.transfer_requests.is_empty(),
            DataRequestType::PartialUpdate => !self.update_state.transfer_requests.is_empty(),
            DataRequestType::Full => {
                !self.old_state.transfer_requests.is_empty()
                    || !self.update_state.transfer_requests.is_empty()
            }
        }
    }

    pub fn get_transfer_requests(
        &self,
        request_type: DataRequestType,
    ) -> Vec<TransferRequestByKeys> {
        match request_type {
            DataRequestType::PartialOld => self.old_state.transfer_requests.clone(),
            DataRequestType::PartialUpdate => self.update_state.transfer_requests.clone(),
            DataRequestType::Full => {
                let mut full = self.old_state.transfer_requests.clone();
                full.extend(self.update_state.transfer_requests.iter().cloned());
                full
            }
        }
    }

    /// all data the request generator consumes, borrowed from both states.
    pub fn generation_data(&self) -> GenerationData<'_> {
        GenerationData {
            old: MatchedLocationData {
                matched_pfs_idx: self.old_state.matched_pfs_idx.as_ref(),
                loc_keys: &self.old_state.loc_keys,
            },
            update: MatchedLocationData {
                matched_pfs_idx: self.update_state.matched_pfs_idx.as_ref(),
                loc_keys: &self.update_state.loc_keys,
            },
            profiles: &self.profile_key_to_search_profile,
        }
    }

    /// persists platforms and rebuilds the update-state platform index from
    /// the entries actually new to the database.
    pub fn add_new_platforms(&mut self, platforms: Vec<Platform>) -> Result<(), TransferError> {
        let added = self.db.put_platforms(&platforms)?;
        let new_platforms: Vec<Platform> = added
            .iter()
            .map(|idx| platforms[*idx].clone())
            .collect();
        log::info!(
            "{} of {} extracted platforms are new",
            new_platforms.len(),
            platforms.len()
        );
        self.update_state.pfs_idx = Some(PlatformIndex::new(new_platforms));
        Ok(())
    }

    /// persists matchings and extends the update state by the entries new
    /// to the database.
    pub fn add_new_matchings(
        &mut self,
        matchings: Vec<MatchingResult>,
    ) -> Result<(), TransferError> {
        let added = self.db.put_matchings(&matchings)?;

        let mut matched_platforms = vec![];
        for idx in &added {
            let matching = &matchings[*idx];
            self.update_state
                .matches
                .insert(matching.location.key(), matching.platform.clone());
            self.update_state.loc_keys.push(matching.location.key());
            matched_platforms.push(matching.platform.clone());
        }
        log::info!("{} of {} matchings are new", added.len(), matchings.len());
        self.update_state.matched_pfs_idx = Some(PlatformIndex::new(matched_platforms));
        Ok(())
    }

    /// persists generated requests: known keys are merged in place, unknown
    /// keys are inserted. the update state receives exactly the entries
    /// that changed or extended the database.
    pub fn add_new_transfer_requests(
        &mut self,
        requests: Vec<TransferRequestByKeys>,
    ) -> Result<(), TransferError> {
        let updated = self.db.update_transfer_requests(&requests)?;
        let added = self.db.put_transfer_requests(&requests)?;

        self.update_state.transfer_requests.clear();
        for idx in updated.iter().chain(added.iter()) {
            self.update_state
                .transfer_requests
                .push(requests[*idx].clone());
        }
        log::info!(
            "{} transfer requests merged, {} inserted",
            updated.len(),
            added.len()
        );
        Ok(())
    }

    /// persists routed results, mirroring `add_new_transfer_requests`.
    pub fn add_new_transfer_results(
        &mut self,
        results: Vec<TransferResult>,
    ) -> Result<(), TransferError> {
        let updated = self.db.update_transfer_results(&results)?;
        let added = self.db.put_transfer_results(&results)?;

        self.update_state.transfer_results.clear();
        for idx in updated.iter().chain(added.iter()) {
            self.update_state
                .transfer_results
                .push(results[*idx].clone());
        }
        log::info!(
            "{} transfer results merged, {} inserted",
            updated.len(),
            added.len()
        );
        Ok(())
    }

    /// rebuilds the timetable's per-profile footpath tables from all
    /// persisted results of the used profiles, then writes the timetable to
    /// `dump_path`. results naming locations unknown to the timetable are
    /// dropped.
    pub fn update_timetable(
        &self,
        timetable: &mut Timetable,
        dump_path: &Path,
    ) -> Result<(), TransferError> {
        let results = self.db.get_transfer_results(&self.used_profiles)?;
        let ordinals = timetable.location_ordinals();
        timetable.clear_footpaths();

        let mut written = 0usize;
        for result in &results {
            let profile = result.profile as usize;
            if profile >= MAX_PROFILES {
                log::warn!(
                    "transfer result for profile {} exceeds the timetable's {} footpath tables, skipped",
                    result.profile,
                    MAX_PROFILES
                );
                continue;
            }
            let Some(&from) = ordinals.get(&result.from_loc) else {
                continue;
            };
            for (to_loc, info) in result.to_locs.iter().zip(result.infos.iter()) {
                let Some(&to) = ordinals.get(to_loc) else {
                    continue;
                };
                timetable.footpaths_out[profile][from].push(Footpath {
                    target: to as u32,
                    duration: info.duration,
                });
                timetable.footpaths_in[profile][to].push(Footpath {
                    target: from as u32,
                    duration: info.duration,
                });
                written += 1;
            }
        }

        log::info!(
            "{} footpaths written from {} transfer results",
            written,
            results.len()
        );
        timetable.write(dump_path)
    }
}
