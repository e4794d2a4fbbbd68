//! Identity resolution and fill-missing merge in front of a [`PlaceStore`].
//!
//! A candidate is the same place as a stored record when their external ids
//! match, or, failing that, when their names match exactly and the stored
//! record does not carry a different external id. Merges only fill fields
//! the stored record lacks, so replaying a batch is a no-op.

use crate::domain::model::{Place, UpsertStats};
use crate::domain::ports::PlaceStore;
use crate::utils::error::{EtlError, Result};
use chrono::Utc;

pub const DEFAULT_MIN_DESCRIPTION_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

pub struct PlaceSink<S: PlaceStore> {
    store: S,
    min_description_len: usize,
}

impl<S: PlaceStore> PlaceSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            min_description_len: DEFAULT_MIN_DESCRIPTION_LEN,
        }
    }

    pub fn with_min_description_len(mut self, min_description_len: usize) -> Self {
        self.min_description_len = min_description_len;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Upserts every candidate; a failing record is logged and skipped.
    pub async fn upsert(&self, places: Vec<Place>) -> UpsertStats {
        let mut stats = UpsertStats::default();
        let total = places.len();

        for (index, place) in places.into_iter().enumerate() {
            let name = place.name.clone();
            match self.upsert_one(place).await {
                Ok(UpsertOutcome::Inserted) => stats.inserted += 1,
                Ok(UpsertOutcome::Updated) => stats.updated += 1,
                Ok(UpsertOutcome::Unchanged) => stats.unchanged += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!("Skipping place {}/{} '{}': {}", index + 1, total, name, e);
                }
            }
        }

        tracing::info!(
            "Upsert finished: {} new, {} updated, {} unchanged, {} failed",
            stats.inserted,
            stats.updated,
            stats.unchanged,
            stats.failed
        );
        stats
    }

    pub async fn upsert_one(&self, mut candidate: Place) -> Result<UpsertOutcome> {
        candidate.name = candidate.name.trim().to_string();
        if candidate.name.is_empty() {
            return Err(EtlError::validation("place name is required"));
        }

        match self.find_existing(&candidate).await? {
            None => {
                let now = Utc::now();
                candidate.id = None;
                candidate.created_at = Some(now);
                candidate.updated_at = Some(now);
                let stored = self.store.insert(candidate).await?;
                tracing::debug!("Inserted '{}' as {:?}", stored.name, stored.id);
                Ok(UpsertOutcome::Inserted)
            }
            Some(mut existing) => {
                if self.merge_missing(&mut existing, &candidate) {
                    existing.updated_at = Some(Utc::now());
                    self.store.update(&existing).await?;
                    tracing::debug!("Merged new fields into '{}'", existing.name);
                    Ok(UpsertOutcome::Updated)
                } else {
                    Ok(UpsertOutcome::Unchanged)
                }
            }
        }
    }

    async fn find_existing(&self, candidate: &Place) -> Result<Option<Place>> {
        if let Some(external_id) = candidate.external_id.as_deref() {
            if let Some(found) = self.store.find_by_external_id(external_id).await? {
                return Ok(Some(found));
            }
        }

        let by_name = self.store.find_by_name(&candidate.name).await?;
        Ok(by_name.filter(|existing| {
            match (&existing.external_id, &candidate.external_id) {
                (Some(stored), Some(incoming)) if stored != incoming => {
                    tracing::debug!(
                        "'{}' shares a name with {} but has id {}, treating as distinct",
                        candidate.name,
                        stored,
                        incoming
                    );
                    false
                }
                _ => true,
            }
        }))
    }

    /// Copies fields `existing` lacks. Returns whether anything changed.
    pub fn merge_missing(&self, existing: &mut Place, candidate: &Place) -> bool {
        let mut changed = false;

        if existing.coordinate.is_none() {
            if let Some(coordinate) = candidate.coordinate {
                existing.coordinate = Some(coordinate);
                changed = true;
            }
        }

        if existing.external_id.is_none() {
            if let Some(external_id) = &candidate.external_id {
                existing.external_id = Some(external_id.clone());
                changed = true;
            }
        }

        if self.should_replace_description(&existing.description, &candidate.description) {
            existing.description = candidate.description.clone();
            changed = true;
        }

        changed
    }

    fn should_replace_description(&self, existing: &str, candidate: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.is_empty() || existing.trim() == candidate {
            return false;
        }
        if existing.trim().is_empty() {
            return true;
        }

        let candidate_len = candidate.chars().count();
        candidate_len >= self.min_description_len && candidate_len > existing.trim().chars().count()
    }
}
