//! Deterministic traffic bucketing.
//!
//! A user's bucket for an experiment is derived from SHA-256 of the user id
//! followed by the experiment id, so the same pair always lands in the same
//! bucket and different experiments bucket independently.

use sha2::{Digest, Sha256};

use super::datafile::TrafficAllocation;

/// Number of buckets traffic ranges are expressed over.
pub const MAX_TRAFFIC_VALUE: u32 = 10_000;

/// Bucket in `0..MAX_TRAFFIC_VALUE` for `user_id` in `experiment_id`.
#[must_use]
pub fn bucket_value(user_id: &str, experiment_id: &str) -> u32 {
    let digest = Sha256::new()
        .chain_update(user_id.as_bytes())
        .chain_update(experiment_id.as_bytes())
        .finalize();

    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    // Scale the 32-bit prefix onto the bucket range without modulo bias.
    let scaled = (u64::from(prefix) * u64::from(MAX_TRAFFIC_VALUE)) >> 32;
    u32::try_from(scaled).unwrap_or(MAX_TRAFFIC_VALUE - 1)
}

/// Entity id of the first range whose end is above `bucket`.
///
/// Returns `None` when the bucket falls past every range or into held-out
/// traffic (an empty entity id).
#[must_use]
pub fn allocate(ranges: &[TrafficAllocation], bucket: u32) -> Option<&str> {
    ranges
        .iter()
        .find(|range| bucket < range.end_of_range)
        .map(|range| range.entity_id.as_str())
        .filter(|id| !id.is_empty())
}
