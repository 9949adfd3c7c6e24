//! Hash chain over the stock movement audit trail.

use sha2::{Digest, Sha256};

use crate::models::{MovementPayload, StockMovement};

/// `prev_hash` of the first movement in a database.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash data using SHA-256.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Chain hash of one entry: `sha256(prev_hash || canonical_json(payload))`.
pub fn entry_hash(prev_hash: &str, payload: &MovementPayload) -> Result<String, serde_json::Error> {
    let json = payload.to_canonical_json()?;
    let combined = format!("{}{}", prev_hash, json);
    Ok(hash_data(combined.as_bytes()))
}

/// Outcome of recomputing the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Movements examined
    pub entries: usize,
    /// Sequence number of the first entry whose link or hash does not match
    pub broken_at: Option<i64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// Walk movements in `seq` order and find the first broken link.
pub fn verify_movements(movements: &[StockMovement]) -> Result<ChainVerification, serde_json::Error> {
    let mut expected_prev = GENESIS_HASH.to_string();

    for movement in movements {
        if movement.prev_hash != expected_prev {
            return Ok(ChainVerification {
                entries: movements.len(),
                broken_at: Some(movement.seq),
            });
        }

        let recomputed = entry_hash(&movement.prev_hash, &MovementPayload::from(movement))?;
        if recomputed != movement.entry_hash {
            return Ok(ChainVerification {
                entries: movements.len(),
                broken_at: Some(movement.seq),
            });
        }

        expected_prev = movement.entry_hash.clone();
    }

    Ok(ChainVerification {
        entries: movements.len(),
        broken_at: None,
    })
}
