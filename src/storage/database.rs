use std::collections::{HashMap, HashSet};
use std::path::Path;

use redb::{Durability, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::matching::MatchingResult;
use crate::model::location::{LocationKey, ProfileKey};
use crate::model::platform::{Platform, PlatformKey};
use crate::model::TransferError;
use crate::transfer::transfer_request::{merge_transfer_requests, TransferRequestByKeys};
use crate::transfer::transfer_result::{merge_transfer_results, TransferResult};
use crate::transfer::TransferKey;

const PROFILES_TABLE: TableDefinition<&str, u8> = TableDefinition::new("profiles");
const PLATFORMS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("platforms");
const MATCHINGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("matchings");
const REQUESTS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("transreqs");
const RESULTS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("transfers");

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TransferError> {
    bincode::serialize(value).map_err(|e| TransferError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransferError> {
    bincode::deserialize(bytes).map_err(|e| TransferError::SerializationError(e.to_string()))
}

/// the embedded persistent store: five tables in a single redb file. every
/// write happens in one transaction per batch. durability is relaxed since
/// the whole store can be rebuilt from its inputs.
pub struct Database {
    db: redb::Database,
    highest_profile_key: ProfileKey,
}

impl Database {
    /// opens (or creates) the database file and ensures all tables exist.
    /// `cache_size` is the store's in-memory cache budget in bytes.
    pub fn open(db_file_path: &Path, cache_size: usize) -> Result<Database, TransferError> {
        let db = redb::Builder::new()
            .set_cache_size(cache_size)
            .create(db_file_path)?;

        let mut txn = db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            txn.open_table(PROFILES_TABLE)?;
            txn.open_table(PLATFORMS_TABLE)?;
            txn.open_table(MATCHINGS_TABLE)?;
            txn.open_table(REQUESTS_TABLE)?;
            txn.open_table(RESULTS_TABLE)?;
        }
        txn.commit()?;

        let mut database = Database {
            db,
            highest_profile_key: 0,
        };
        database.highest_profile_key = database
            .get_profile_keys()?
            .values()
            .copied()
            .max()
            .unwrap_or(0);
        Ok(database)
    }

    /// assigns fresh profile keys to previously unseen names. keys are
    /// allocated monotonically and never reused; key 0 stays reserved for
    /// the timetable's built-in default profile.
    pub fn put_profiles(&mut self, profile_names: &[String]) -> Result<Vec<usize>, TransferError> {
        let mut added = vec![];

        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            let mut table = txn.open_table(PROFILES_TABLE)?;
            for (idx, name) in profile_names.iter().enumerate() {
                if table.get(name.as_str())?.is_some() {
                    continue;
                }
                self.highest_profile_key =
                    self.highest_profile_key.checked_add(1).ok_or_else(|| {
                        TransferError::ConfigurationError(String::from(
                            "profile key space exhausted (at most 255 profiles)",
                        ))
                    })?;
                table.insert(name.as_str(), self.highest_profile_key)?;
                added.push(idx);
            }
        }
        txn.commit()?;
        Ok(added)
    }

    pub fn get_profile_keys(&self) -> Result<HashMap<String, ProfileKey>, TransferError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PROFILES_TABLE)?;
        let mut keys = HashMap::new();
        for entry in table.iter()? {
            let (name, key) = entry?;
            keys.insert(name.value().to_string(), key.value());
        }
        Ok(keys)
    }

    pub fn get_profile_key_to_name(&self) -> Result<HashMap<ProfileKey, String>, TransferError> {
        Ok(self
            .get_profile_keys()?
            .into_iter()
            .map(|(name, key)| (key, name))
            .collect())
    }

    /// inserts platforms not yet present, returning the indices of the
    /// entries actually added.
    pub fn put_platforms(&self, platforms: &[Platform]) -> Result<Vec<usize>, TransferError> {
        let mut added = vec![];

        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            let mut table = txn.open_table(PLATFORMS_TABLE)?;
            for (idx, platform) in platforms.iter().enumerate() {
                let key = platform.key();
                if table.get(&key[..])?.is_some() {
                    continue;
                }
                let bytes = encode(platform)?;
                table.insert(&key[..], bytes.as_slice())?;
                added.push(idx);
            }
        }
        txn.commit()?;
        Ok(added)
    }

    pub fn get_platforms(&self) -> Result<Vec<Platform>, TransferError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PLATFORMS_TABLE)?;
        let mut platforms = vec![];
        for entry in table.iter()? {
            let (_, value) = entry?;
            platforms.push(decode(value.value())?);
        }
        Ok(platforms)
    }

    pub fn get_platform(&self, key: &PlatformKey) -> Result<Option<Platform>, TransferError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PLATFORMS_TABLE)?;
        match table.get(&key[..])? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// inserts matchings for locations not yet matched, skipping entries
    /// whose platform is unknown to the platforms table.
    pub fn put_matchings(&self, matchings: &[MatchingResult]) -> Result<Vec<usize>, TransferError> {
        let mut added = vec![];

        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            let mut matchings_table = txn.open_table(MATCHINGS_TABLE)?;
            let platforms_table = txn.open_table(PLATFORMS_TABLE)?;
            for (idx, matching) in matchings.iter().enumerate() {
                let loc_key = matching.location.key();
                let platform_key = matching.platform.key();
                if matchings_table.get(loc_key)?.is_some() {
                    continue;
                }
                if platforms_table.get(&platform_key[..])?.is_none() {
                    continue;
                }
                matchings_table.insert(loc_key, &platform_key[..])?;
                added.push(idx);
            }
        }
        txn.commit()?;
        Ok(added)
    }

    /// all persisted matchings joined against the platforms table. entries
    /// whose platform vanished are omitted.
    pub fn get_matchings(&self) -> Result<HashMap<LocationKey, Platform>, TransferError> {
        let txn = self.db.begin_read()?;
        let matchings_table = txn.open_table(MATCHINGS_TABLE)?;
        let platforms_table = txn.open_table(PLATFORMS_TABLE)?;
        let mut matchings = HashMap::new();
        for entry in matchings_table.iter()? {
            let (loc_key, platform_key) = entry?;
            if let Some(platform) = platforms_table.get(platform_key.value())? {
                matchings.insert(loc_key.value(), decode(platform.value())?);
            }
        }
        Ok(matchings)
    }

    pub fn put_transfer_requests(
        &self,
        requests: &[TransferRequestByKeys],
    ) -> Result<Vec<usize>, TransferError> {
        self.put_entries(REQUESTS_TABLE, requests, TransferRequestByKeys::key)
    }

    /// merges every request whose key already exists into the stored row,
    /// rewriting only rows whose merged value differs. returns the indices
    /// of the entries that changed their stored row.
    pub fn update_transfer_requests(
        &self,
        requests: &[TransferRequestByKeys],
    ) -> Result<Vec<usize>, TransferError> {
        self.update_entries(
            REQUESTS_TABLE,
            requests,
            TransferRequestByKeys::key,
            merge_transfer_requests,
        )
    }

    /// all persisted requests whose profile is in the given set.
    pub fn get_transfer_requests(
        &self,
        profiles: &HashSet<ProfileKey>,
    ) -> Result<Vec<TransferRequestByKeys>, TransferError> {
        self.get_entries(REQUESTS_TABLE, profiles, |request: &TransferRequestByKeys| {
            request.profile
        })
    }

    pub fn put_transfer_results(
        &self,
        results: &[TransferResult],
    ) -> Result<Vec<usize>, TransferError> {
        self.put_entries(RESULTS_TABLE, results, TransferResult::key)
    }

    pub fn update_transfer_results(
        &self,
        results: &[TransferResult],
    ) -> Result<Vec<usize>, TransferError> {
        self.update_entries(
            RESULTS_TABLE,
            results,
            TransferResult::key,
            merge_transfer_results,
        )
    }

    /// all persisted results whose profile is in the given set.
    pub fn get_transfer_results(
        &self,
        profiles: &HashSet<ProfileKey>,
    ) -> Result<Vec<TransferResult>, TransferError> {
        self.get_entries(RESULTS_TABLE, profiles, |result: &TransferResult| {
            result.profile
        })
    }

    fn put_entries<T: Serialize>(
        &self,
        table_def: TableDefinition<&[u8], &[u8]>,
        entries: &[T],
        key_fn: impl Fn(&T) -> TransferKey,
    ) -> Result<Vec<usize>, TransferError> {
        let mut added = vec![];

        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            let mut table = txn.open_table(table_def)?;
            for (idx, entry) in entries.iter().enumerate() {
                let key = key_fn(entry);
                if table.get(&key[..])?.is_some() {
                    continue;
                }
                let bytes = encode(entry)?;
                table.insert(&key[..], bytes.as_slice())?;
                added.push(idx);
            }
        }
        txn.commit()?;
        Ok(added)
    }

    fn update_entries<T: Serialize + DeserializeOwned + PartialEq>(
        &self,
        table_def: TableDefinition<&[u8], &[u8]>,
        entries: &[T],
        key_fn: impl Fn(&T) -> TransferKey,
        merge_fn: impl Fn(&T, &T) -> Result<T, TransferError>,
    ) -> Result<Vec<usize>, TransferError> {
        let mut changed = vec![];

        let mut txn = self.db.begin_write()?;
        txn.set_durability(Durability::None);
        {
            let mut table = txn.open_table(table_def)?;
            for (idx, entry) in entries.iter().enumerate() {
                let key = key_fn(entry);
                let stored: Option<T> = match table.get(&key[..])? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
                let Some(stored) = stored else {
                    continue;
                };

                let merged = merge_fn(&stored, entry)?;
                if merged == stored {
                    continue;
                }
                let bytes = encode(&merged)?;
                table.insert(&key[..], bytes.as_slice())?;
                changed.push(idx);
            }
        }
        txn.commit()?;
        Ok(changed)
    }

    fn get_entries<T: DeserializeOwned>(
        &self,
        table_def: TableDefinition<&[u8], &[u8]>,
        profiles: &HashSet<ProfileKey>,
        profile_fn: impl Fn(&T) -> ProfileKey,
    ) -> Result<Vec<T>, TransferError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(table_def)?;
        let mut entries = vec![];
        for entry in table.iter()? {
            let (_, value) = entry?;
            let decoded: T = decode(value.value())?;
            if profiles.contains(&profile_fn(&decoded)) {
                entries.push(decoded);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::matching::MatchingResult;
    use crate::model::location::Location;
    use crate::model::platform::{OsmType, Platform};
    use crate::transfer::transfer_request::TransferRequestByKeys;
    use crate::transfer::transfer_result::{TransferInfo, TransferResult};
    use std::collections::HashSet;

    const CACHE_SIZE: usize = 1 << 20;

    fn open_database(dir: &tempfile::TempDir) -> Database {
        Database::open(&dir.path().join("transfers.db"), CACHE_SIZE)
            .expect("test invariant failed: cannot open database")
    }

    fn platform(osm_id: i64, lat: f64, lng: f64) -> Platform {
        Platform::new(
            Location::new(lat, lng),
            osm_id,
            OsmType::Node,
            vec![String::from("stop")],
            false,
        )
    }

    #[test]
    fn test_profiles_allocate_monotonic_keys() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let mut db = open_database(&dir);

        let added = db
            .put_profiles(&[String::from("default"), String::from("wheelchair")])
            .expect("put_profiles failed");
        assert_eq!(added, vec![0, 1]);

        let keys = db.get_profile_keys().expect("get_profile_keys failed");
        assert_eq!(keys.get("default"), Some(&1));
        assert_eq!(keys.get("wheelchair"), Some(&2));

        // re-putting known names allocates nothing
        let re_added = db
            .put_profiles(&[String::from("default"), String::from("fast")])
            .expect("put_profiles failed");
        assert_eq!(re_added, vec![1]);
        let keys = db.get_profile_keys().expect("get_profile_keys failed");
        assert_eq!(keys.get("default"), Some(&1));
        assert_eq!(keys.get("fast"), Some(&3));

        let names = db
            .get_profile_key_to_name()
            .expect("get_profile_key_to_name failed");
        assert_eq!(names.get(&3).map(String::as_str), Some("fast"));
    }

    #[test]
    fn test_profile_keys_survive_reopen() {
        let dir = tempfile::tempdir().expect("no tempdir");
        {
            let mut db = open_database(&dir);
            db.put_profiles(&[String::from("default")])
                .expect("put_profiles failed");
        }
        let mut db = open_database(&dir);
        db.put_profiles(&[String::from("fast")])
            .expect("put_profiles failed");
        let keys = db.get_profile_keys().expect("get_profile_keys failed");
        assert_eq!(keys.get("default"), Some(&1));
        assert_eq!(keys.get("fast"), Some(&2));
    }

    #[test]
    fn test_platforms_insert_if_absent() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let db = open_database(&dir);

        let pf = platform(1, 48.0, 11.0);
        let added = db
            .put_platforms(&[pf.clone(), platform(2, 48.001, 11.0)])
            .expect("put_platforms failed");
        assert_eq!(added, vec![0, 1]);

        // same identity again, different payload: skipped
        let mut renamed = pf.clone();
        renamed.names = vec![String::from("renamed")];
        let re_added = db
            .put_platforms(&[renamed, platform(3, 48.002, 11.0)])
            .expect("put_platforms failed");
        assert_eq!(re_added, vec![1]);

        assert_eq!(db.get_platforms().expect("get_platforms failed").len(), 3);
        let looked_up = db
            .get_platform(&pf.key())
            .expect("get_platform failed")
            .expect("platform missing");
        assert_eq!(looked_up.names, vec!["stop"]);
    }

    #[test]
    fn test_matchings_require_known_platform() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let db = open_database(&dir);

        let known = platform(1, 48.0, 11.0);
        db.put_platforms(std::slice::from_ref(&known))
            .expect("put_platforms failed");

        let location = Location::new(48.0001, 11.0);
        let added = db
            .put_matchings(&[
                MatchingResult {
                    platform: known.clone(),
                    location,
                },
                MatchingResult {
                    platform: platform(99, 48.1, 11.0),
                    location: Location::new(48.1, 11.0),
                },
            ])
            .expect("put_matchings failed");
        assert_eq!(added, vec![0]);

        // the matched location is never rematched
        let re_added = db
            .put_matchings(&[MatchingResult {
                platform: known.clone(),
                location,
            }])
            .expect("put_matchings failed");
        assert!(re_added.is_empty());

        let matchings = db.get_matchings().expect("get_matchings failed");
        assert_eq!(matchings.len(), 1);
        assert_eq!(matchings.get(&location.key()), Some(&known));
    }

    fn request(from: u64, to: &[u64], profile: u8) -> TransferRequestByKeys {
        TransferRequestByKeys {
            from_loc: from,
            to_locs: to.to_vec(),
            profile,
        }
    }

    #[test]
    fn test_requests_put_then_merge_update() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let db = open_database(&dir);

        let added = db
            .put_transfer_requests(&[request(10, &[20, 30], 1)])
            .expect("put failed");
        assert_eq!(added, vec![0]);

        // merge adjoins the unseen destination, union is order-stable
        let changed = db
            .update_transfer_requests(&[request(10, &[30, 40], 1)])
            .expect("update failed");
        assert_eq!(changed, vec![0]);

        let profiles = HashSet::from([1u8]);
        let stored = db
            .get_transfer_requests(&profiles)
            .expect("get failed");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].to_locs, vec![20, 30, 40]);
    }

    #[test]
    fn test_requests_update_skips_unchanged_rows() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let db = open_database(&dir);

        db.put_transfer_requests(&[request(10, &[20, 30], 1)])
            .expect("put failed");
        // a subset of the stored destinations merges to the identical row
        let changed = db
            .update_transfer_requests(&[request(10, &[30], 1)])
            .expect("update failed");
        assert!(changed.is_empty());

        // unknown keys are not inserted by update
        let changed = db
            .update_transfer_requests(&[request(11, &[30], 1)])
            .expect("update failed");
        assert!(changed.is_empty());
        let profiles = HashSet::from([1u8]);
        assert_eq!(db.get_transfer_requests(&profiles).expect("get failed").len(), 1);
    }

    #[test]
    fn test_requests_profile_filter() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let db = open_database(&dir);

        db.put_transfer_requests(&[request(10, &[20], 1), request(10, &[20], 2)])
            .expect("put failed");

        let only_two = db
            .get_transfer_requests(&HashSet::from([2u8]))
            .expect("get failed");
        assert_eq!(only_two.len(), 1);
        assert_eq!(only_two[0].profile, 2);

        let none = db
            .get_transfer_requests(&HashSet::new())
            .expect("get failed");
        assert!(none.is_empty());
    }

    fn result(from: u64, pairs: &[(u64, u16)], profile: u8) -> TransferResult {
        TransferResult {
            from_loc: from,
            to_locs: pairs.iter().map(|(to, _)| *to).collect(),
            profile,
            infos: pairs
                .iter()
                .map(|(_, duration)| TransferInfo {
                    duration: *duration,
                    distance: 100.0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_results_merge_keeps_existing_info() {
        let dir = tempfile::tempdir().expect("no tempdir");
        let db = open_database(&dir);

        db.put_transfer_results(&[result(10, &[(20, 1)], 1)])
            .expect("put failed");
        let changed = db
            .update_transfer_results(&[result(10, &[(20, 7), (30, 2)], 1)])
            .expect("update failed");
        assert_eq!(changed, vec![0]);

        let stored = db
            .get_transfer_results(&HashSet::from([1u8]))
            .expect("get failed");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].to_locs, vec![20, 30]);
        // the duplicate destination keeps its original duration
        assert_eq!(stored[0].infos[0].duration, 1);
        assert_eq!(stored[0].infos[1].duration, 2);
    }
}
