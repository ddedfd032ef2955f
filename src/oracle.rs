// 6.0: price oracle capability. the ledger is agnostic to where prices come
// from: an exchange aggregator, an on-chain oracle, a replay file. it only
// needs a point-in-time lookup, captured once before each atomic mutation.
// a missing price is an error, never a silent zero.

use crate::types::{AssetId, Price, Timestamp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("no price available for asset {0:?}")]
    Unavailable(AssetId),
}

pub trait PriceOracle: Send + Sync {
    /// Latest market price for the asset.
    fn current_price(&self, asset_id: AssetId) -> Result<Price, OracleError>;

    /// Reference price at a past instant, used for settlement-time pricing.
    fn price_at(&self, asset_id: AssetId, at: Timestamp) -> Result<Price, OracleError>;
}

/// In-memory oracle with settable spot prices and a recorded price history.
/// Serves tests and the simulator; production wires a real feed behind the
/// same trait.
#[derive(Debug, Default)]
pub struct StaticOracle {
    spot: RwLock<HashMap<AssetId, Price>>,
    history: RwLock<HashMap<AssetId, BTreeMap<Timestamp, Price>>>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, asset_id: AssetId, price: Price) {
        self.spot.write().insert(asset_id, price);
    }

    /// Drop the spot price so lookups fail, simulating a feed outage.
    pub fn clear_price(&self, asset_id: AssetId) {
        self.spot.write().remove(&asset_id);
    }

    pub fn record_at(&self, asset_id: AssetId, at: Timestamp, price: Price) {
        self.history.write().entry(asset_id).or_default().insert(at, price);
    }
}

impl PriceOracle for StaticOracle {
    fn current_price(&self, asset_id: AssetId) -> Result<Price, OracleError> {
        self.spot
            .read()
            .get(&asset_id)
            .copied()
            .ok_or(OracleError::Unavailable(asset_id))
    }

    // Latest recorded sample at or before the requested instant.
    fn price_at(&self, asset_id: AssetId, at: Timestamp) -> Result<Price, OracleError> {
        self.history
            .read()
            .get(&asset_id)
            .and_then(|samples| samples.range(..=at).next_back().map(|(_, p)| *p))
            .ok_or(OracleError::Unavailable(asset_id))
    }
}
