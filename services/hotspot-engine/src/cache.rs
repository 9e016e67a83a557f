use crate::models::PredictionRecord;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;

/// Number of locations returned by the hotspot ranking.
pub const HOTSPOT_LIMIT: usize = 10;

/// Latest scoring pass, held as an immutable snapshot.
///
/// Writers swap the whole snapshot; readers clone the `Arc` and never see a
/// partially written list.
pub struct PredictionCache {
    snapshot: RwLock<Arc<[PredictionRecord]>>,
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionCache {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Replaces the cached pass wholesale and returns the new snapshot.
    pub fn replace(&self, records: Vec<PredictionRecord>) -> Arc<[PredictionRecord]> {
        let snapshot: Arc<[PredictionRecord]> = Arc::from(records);
        *self.snapshot.write() = snapshot.clone();
        snapshot
    }

    pub fn snapshot(&self) -> Arc<[PredictionRecord]> {
        self.snapshot.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// Highest-risk locations first; ties keep scoring order.
    pub fn hotspots(&self, limit: usize) -> Vec<PredictionRecord> {
        rank(&self.snapshot(), limit)
    }
}

pub fn rank(records: &[PredictionRecord], limit: usize) -> Vec<PredictionRecord> {
    let mut ranked = records.to_vec();
    // sort_by is stable
    ranked.sort_by(|a, b| b.risk.partial_cmp(&a.risk).unwrap_or(Ordering::Equal));
    ranked.truncate(limit);
    ranked
}
