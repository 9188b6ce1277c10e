use serde::{Deserialize, Serialize};

/// 64-bit packed fixed-point coordinate. serves as the identity of a
/// timetable location throughout the engine.
pub type LocationKey = u64;

/// key of a search profile as assigned by the persistent store.
pub type ProfileKey = u8;

const FIXED_POINT_SCALE: f64 = 1e7;

/// a timetable location reduced to its WGS84 coordinate.
///
/// two locations are equal iff their packed keys are equal, i.e. their
/// coordinates agree at 1e-7 degree resolution.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Location {
        Location { lat, lng }
    }

    /// packs this coordinate into its 64-bit key. each half is the
    /// coordinate scaled by 1e7 and rounded to an integer:
    /// `lat_fixed (high 32 bits) || lng_fixed (low 32 bits)`.
    /// decoding and re-encoding a key is lossless.
    pub fn key(&self) -> LocationKey {
        let lat_fixed = (self.lat * FIXED_POINT_SCALE).round() as i32 as u32;
        let lng_fixed = (self.lng * FIXED_POINT_SCALE).round() as i32 as u32;
        ((lat_fixed as u64) << 32) | (lng_fixed as u64)
    }

    /// unpacks a 64-bit key back into a coordinate.
    pub fn from_key(key: LocationKey) -> Location {
        let lat_fixed = (key >> 32) as u32 as i32;
        let lng_fixed = key as u32 as i32;
        Location {
            lat: lat_fixed as f64 / FIXED_POINT_SCALE,
            lng: lng_fixed as f64 / FIXED_POINT_SCALE,
        }
    }

    pub fn to_point(&self) -> geo::Point<f64> {
        geo::Point::new(self.lng, self.lat)
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Location {}
