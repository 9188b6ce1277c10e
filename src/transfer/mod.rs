pub mod transfer_request;
pub mod transfer_result;

use crate::model::location::{LocationKey, ProfileKey};

/// persistent key shared by transfer requests and transfer results:
/// little-endian from-location key followed by the profile key.
pub type TransferKey = [u8; 9];

pub fn transfer_key(from_loc: LocationKey, profile: ProfileKey) -> TransferKey {
    let mut key = [0u8; 9];
    key[..8].copy_from_slice(&from_loc.to_le_bytes());
    key[8] = profile;
    key
}
