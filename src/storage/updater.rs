use std::path::PathBuf;

use clap::ValueEnum;

use crate::config::EngineConfig;
use crate::matching::{match_locations_by_distance, MatchingOptions};
use crate::model::timetable::Timetable;
use crate::model::TransferError;
use crate::osm::extract_platforms;
use crate::routing::FootRouter;
use crate::storage::storage::{DataRequestType, Storage};
use crate::transfer::transfer_request::{
    generate_transfer_requests, to_transfer_requests, TransferRequestOptions,
};
use crate::transfer::transfer_result::route_multiple_requests;

/// earliest pipeline stage a partial update reruns. later stages cascade:
/// rerunning the OSM extraction implies rematching and request generation,
/// a timetable change implies rematching and generation, and a profile
/// change implies generation over the already known matches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FirstStage {
    None,
    Profiles,
    Timetable,
    Osm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoutingMode {
    None,
    /// route only requests produced by the current run, if any.
    Partial,
    /// reroute persisted requests first, then the current run's requests.
    Full,
}

/// drives the transfer precomputation pipeline against one timetable and
/// one persistent store.
pub struct StorageUpdater {
    storage: Storage,
    timetable: Timetable,
    router: Box<dyn FootRouter>,
    osm_path: PathBuf,
    timetable_dump_path: PathBuf,
    matching_options: MatchingOptions,
}

impl StorageUpdater {
    /// opens the store, registers the configured profiles, and loads the
    /// old state.
    pub fn new(
        timetable: Timetable,
        config: &EngineConfig,
        router: Box<dyn FootRouter>,
    ) -> Result<StorageUpdater, TransferError> {
        let mut storage = Storage::open(&config.db_file_path, config.db_max_size)?;
        storage.add_new_profiles(&config.profiles)?;
        storage.initialize()?;

        Ok(StorageUpdater {
            storage,
            timetable,
            router,
            osm_path: config.osm_path.clone(),
            timetable_dump_path: config.timetable_dump_path.clone(),
            matching_options: MatchingOptions {
                max_matching_dist: config.max_matching_dist,
                max_bus_stop_matching_dist: config.max_bus_stop_matching_dist,
            },
        })
    }

    pub fn timetable(&self) -> &Timetable {
        &self.timetable
    }

    /// runs the complete pipeline. to be used when the store holds no data
    /// from a previous run.
    pub fn full_update(&mut self) -> Result<(), TransferError> {
        self.extract_and_store_osm_platforms()?;
        self.match_and_store_matches_by_distance()?;
        self.generate_and_store_transfer_requests(false)?;
        self.generate_and_store_transfer_results(DataRequestType::PartialUpdate)?;
        self.storage
            .update_timetable(&mut self.timetable, &self.timetable_dump_path)
    }

    /// resumes from persisted state, rerunning the pipeline from
    /// `first_stage` onwards and routing according to `routing_mode`. the
    /// timetable writer always runs.
    pub fn partial_update(
        &mut self,
        first_stage: FirstStage,
        routing_mode: RoutingMode,
    ) -> Result<(), TransferError> {
        match first_stage {
            FirstStage::Osm => {
                self.extract_and_store_osm_platforms()?;
                self.match_and_store_matches_by_distance()?;
                self.generate_and_store_transfer_requests(false)?;
            }
            FirstStage::Timetable => {
                self.match_and_store_matches_by_distance()?;
                self.generate_and_store_transfer_requests(false)?;
            }
            FirstStage::Profiles => {
                self.generate_and_store_transfer_requests(true)?;
            }
            FirstStage::None => {}
        }

        match routing_mode {
            RoutingMode::None => {}
            RoutingMode::Partial => {
                if self.storage.has_transfer_requests(DataRequestType::PartialUpdate) {
                    self.generate_and_store_transfer_results(DataRequestType::PartialUpdate)?;
                }
            }
            RoutingMode::Full => {
                // rerouting old requests absorbs profile changes before the
                // current run's requests are routed
                self.generate_and_store_transfer_results(DataRequestType::PartialOld)?;
                self.generate_and_store_transfer_results(DataRequestType::PartialUpdate)?;
            }
        }

        self.storage
            .update_timetable(&mut self.timetable, &self.timetable_dump_path)
    }

    fn extract_and_store_osm_platforms(&mut self) -> Result<(), TransferError> {
        let platforms = extract_platforms(&self.osm_path)?;
        self.storage.add_new_platforms(platforms)
    }

    fn match_and_store_matches_by_distance(&mut self) -> Result<(), TransferError> {
        let matchings = match_locations_by_distance(
            &self.timetable.locations,
            &self.storage.old_state().matches,
            self.storage.old_state().pfs_idx.as_ref(),
            self.storage.update_state().pfs_idx.as_ref(),
            &self.matching_options,
        );
        self.storage.add_new_matchings(matchings)
    }

    fn generate_and_store_transfer_requests(
        &mut self,
        old_to_old: bool,
    ) -> Result<(), TransferError> {
        let requests = generate_transfer_requests(
            &self.storage.generation_data(),
            &TransferRequestOptions { old_to_old },
        );
        self.storage.add_new_transfer_requests(requests)
    }

    fn generate_and_store_transfer_results(
        &mut self,
        request_type: DataRequestType,
    ) -> Result<(), TransferError> {
        let keyed_requests = self.storage.get_transfer_requests(request_type);
        if keyed_requests.is_empty() {
            return Ok(());
        }
        let requests = to_transfer_requests(&keyed_requests, &self.storage.get_all_matchings())?;
        let results = route_multiple_requests(
            &requests,
            self.router.as_ref(),
            &self.storage.profile_key_to_search_profile,
        )?;
        self.storage.add_new_transfer_results(results)
    }
}
