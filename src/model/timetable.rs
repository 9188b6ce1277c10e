use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::location::{Location, LocationKey};
use crate::model::transfer_error::TransferError;

/// walking duration in whole minutes.
pub type FootpathDuration = u16;

/// number of per-profile footpath tables carried by a timetable. profile
/// keys at or beyond this bound cannot be written back.
pub const MAX_PROFILES: usize = 8;

/// a per-profile walking edge between two timetable locations, addressed by
/// the target's location ordinal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footpath {
    pub target: u32,
    pub duration: FootpathDuration,
}

/// one row of the timetable location CSV input.
#[derive(Debug, Deserialize)]
struct LocationRow {
    name: String,
    lat: f64,
    lng: f64,
}

/// minimal timetable container: an ordered list of named locations plus one
/// outbound and one inbound footpath table per profile. the transfer engine
/// reads the locations and fully rebuilds the footpath tables on write-back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Timetable {
    pub names: Vec<String>,
    pub locations: Vec<Location>,
    /// `footpaths_out[profile][location ordinal]` -> outgoing footpaths
    pub footpaths_out: Vec<Vec<Vec<Footpath>>>,
    /// `footpaths_in[profile][location ordinal]` -> incoming footpaths
    pub footpaths_in: Vec<Vec<Vec<Footpath>>>,
}

impl Timetable {
    pub fn from_locations(names: Vec<String>, locations: Vec<Location>) -> Timetable {
        let n = locations.len();
        Timetable {
            names,
            locations,
            footpaths_out: vec![vec![vec![]; n]; MAX_PROFILES],
            footpaths_in: vec![vec![vec![]; n]; MAX_PROFILES],
        }
    }

    /// reads locations from a CSV file with `name,lat,lng` columns.
    /// locations whose packed coordinate collides with an earlier row are
    /// indistinguishable to the engine; the first row wins.
    pub fn read_csv(path: &Path) -> Result<Timetable, TransferError> {
        let read_err =
            |e: String| TransferError::TimetableReadError(path.display().to_string(), e);

        let mut reader = csv::Reader::from_path(path).map_err(|e| read_err(e.to_string()))?;
        let mut names = vec![];
        let mut locations: Vec<Location> = vec![];
        let mut seen: HashMap<LocationKey, usize> = HashMap::new();
        for row in reader.deserialize() {
            let row: LocationRow = row.map_err(|e| read_err(e.to_string()))?;
            let loc = Location::new(row.lat, row.lng);
            if let Some(prev) = seen.get(&loc.key()) {
                log::warn!(
                    "locations '{}' and '{}' share the packed coordinate {:#018x}, keeping '{}'",
                    names[*prev],
                    row.name,
                    loc.key(),
                    names[*prev]
                );
                continue;
            }
            seen.insert(loc.key(), locations.len());
            names.push(row.name);
            locations.push(loc);
        }
        log::info!(
            "{} locations read from timetable resource {}",
            locations.len(),
            path.display()
        );
        Ok(Timetable::from_locations(names, locations))
    }

    /// location key -> ordinal, exact on the packed coordinate.
    pub fn location_ordinals(&self) -> HashMap<LocationKey, usize> {
        self.locations
            .iter()
            .enumerate()
            .map(|(i, loc)| (loc.key(), i))
            .collect()
    }

    /// drops every footpath in all per-profile tables, keeping the
    /// per-location vector shape.
    pub fn clear_footpaths(&mut self) {
        let n = self.locations.len();
        for profile in 0..MAX_PROFILES {
            self.footpaths_out[profile] = vec![vec![]; n];
            self.footpaths_in[profile] = vec![vec![]; n];
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), TransferError> {
        let write_err =
            |e: String| TransferError::TimetableWriteError(path.display().to_string(), e);

        let file = File::create(path).map_err(|e| write_err(e.to_string()))?;
        bincode::serialize_into(BufWriter::new(file), self).map_err(|e| write_err(e.to_string()))
    }

    pub fn read(path: &Path) -> Result<Timetable, TransferError> {
        let read_err =
            |e: String| TransferError::TimetableReadError(path.display().to_string(), e);

        let file = File::open(path).map_err(|e| read_err(e.to_string()))?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| read_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Footpath, Timetable, MAX_PROFILES};
    use crate::model::location::Location;
    use std::io::Write;

    fn two_stop_timetable() -> Timetable {
        Timetable::from_locations(
            vec![String::from("a"), String::from("b")],
            vec![Location::new(48.0, 11.0), Location::new(48.001, 11.0)],
        )
    }

    #[test]
    fn test_from_locations_shapes_tables() {
        let tt = two_stop_timetable();
        assert_eq!(tt.footpaths_out.len(), MAX_PROFILES);
        assert_eq!(tt.footpaths_in.len(), MAX_PROFILES);
        assert!(tt.footpaths_out.iter().all(|table| table.len() == 2));
        assert!(tt.footpaths_in.iter().all(|table| table.len() == 2));
    }

    #[test]
    fn test_location_ordinals_exact_key_match() {
        let tt = two_stop_timetable();
        let ordinals = tt.location_ordinals();
        assert_eq!(ordinals.get(&Location::new(48.0, 11.0).key()), Some(&0));
        assert_eq!(ordinals.get(&Location::new(48.001, 11.0).key()), Some(&1));
        assert_eq!(ordinals.get(&Location::new(48.002, 11.0).key()), None);
    }

    #[test]
    fn test_read_csv_keeps_first_on_key_collision() {
        let dir = tempfile::tempdir().expect("test invariant failed: no tempdir");
        let path = dir.path().join("locations.csv");
        let mut file =
            std::fs::File::create(&path).expect("test invariant failed: cannot create csv");
        writeln!(file, "name,lat,lng").expect("write failed");
        writeln!(file, "first,48.0,11.0").expect("write failed");
        writeln!(file, "second,48.001,11.0").expect("write failed");
        // collides with "first" at 1e-7 degree resolution
        writeln!(file, "shadowed,48.00000001,11.0").expect("write failed");
        drop(file);

        let tt = Timetable::read_csv(&path).expect("csv read failed");
        assert_eq!(tt.names, vec!["first", "second"]);
        assert_eq!(tt.locations.len(), 2);
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().expect("test invariant failed: no tempdir");
        let path = dir.path().join("timetable.bin");

        let mut tt = two_stop_timetable();
        tt.footpaths_out[1][0].push(Footpath {
            target: 1,
            duration: 1,
        });
        tt.footpaths_in[1][1].push(Footpath {
            target: 0,
            duration: 1,
        });
        tt.write(&path).expect("timetable write failed");

        let read_back = Timetable::read(&path).expect("timetable read failed");
        assert_eq!(read_back, tt);
    }

    #[test]
    fn test_clear_footpaths() {
        let mut tt = two_stop_timetable();
        tt.footpaths_out[0][1].push(Footpath {
            target: 0,
            duration: 3,
        });
        tt.clear_footpaths();
        assert!(tt.footpaths_out.iter().flatten().all(|fps| fps.is_empty()));
        assert!(tt.footpaths_in.iter().flatten().all(|fps| fps.is_empty()));
    }
}
