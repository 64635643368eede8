use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::cache::{SnapshotRepository, SNAPSHOT_VERSION};
use crate::error::Result;
use crate::models::{
    CandidateRecord, NoteFilters, PageRequest, PopularPage, PopularitySnapshot, ScoredRecord,
};
use crate::store::NoteStore;

pub const W_DOWNLOADS: f64 = 0.5;
pub const W_RATING: f64 = 0.3;
pub const W_VIEWS: f64 = 0.2;
pub const W_RECENCY: f64 = 0.05;
pub const RECENCY_DAYS: f64 = 20.0;

pub fn staleness_window() -> Duration {
    Duration::hours(24)
}

/// Linear freshness bonus: 20 on the day of upload, gone after 20 days.
pub fn recency_boost(days_since: f64) -> f64 {
    (RECENCY_DAYS - days_since.max(0.0)).max(0.0)
}

pub fn days_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = (now - created_at).num_seconds() as f64;
    (seconds / 86_400.0).max(0.0)
}

/// Composite score of one note. The maxima are taken over the whole visible set.
pub fn popularity_score(
    record: &CandidateRecord,
    max_downloads: u64,
    max_views: u64,
    now: DateTime<Utc>,
) -> f64 {
    let download_ratio = record.downloads as f64 / max_downloads.max(1) as f64;
    let rating_ratio = (record.rating_or_zero() / 5.0).clamp(0.0, 1.0);
    let view_ratio = record.views as f64 / max_views.max(1) as f64;
    let boost = recency_boost(days_since(record.created_at, now));

    W_DOWNLOADS * download_ratio + W_RATING * rating_ratio + W_VIEWS * view_ratio + W_RECENCY * boost
}

/// Scores the full set and orders it best first, id ascending on ties.
pub fn score_notes(notes: Vec<CandidateRecord>, now: DateTime<Utc>) -> Vec<ScoredRecord> {
    let max_downloads = notes.iter().map(|note| note.downloads).max().unwrap_or(0);
    let max_views = notes.iter().map(|note| note.views).max().unwrap_or(0);

    let mut scored: Vec<ScoredRecord> = notes
        .into_iter()
        .map(|record| ScoredRecord {
            score: popularity_score(&record, max_downloads, max_views, now),
            record,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    scored
}

pub fn is_fresh(snapshot: &PopularitySnapshot, now: DateTime<Utc>, window: Duration) -> bool {
    now - snapshot.computed_at < window
}

/// Daily popularity ranking served from a persisted snapshot.
///
/// Concurrent callers that both see a stale snapshot each recompute; the
/// result is the same for the same instant and the last save wins.
pub struct PopularityService<S, C> {
    store: S,
    cache: C,
    window: Duration,
}

impl<S: NoteStore, C: SnapshotRepository> PopularityService<S, C> {
    pub fn new(store: S, cache: C) -> Self {
        Self {
            store,
            cache,
            window: staleness_window(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn popular(&self, filters: &NoteFilters, page: PageRequest) -> PopularPage {
        self.popular_at(filters, page, Utc::now()).await
    }

    /// Never fails: an unreachable store falls back to the last snapshot, or
    /// to an empty page when there has never been one.
    pub async fn popular_at(
        &self,
        filters: &NoteFilters,
        page: PageRequest,
        now: DateTime<Utc>,
    ) -> PopularPage {
        let cached = self.cache.load().unwrap_or_else(|err| {
            warn!("failed to load popularity snapshot: {err}");
            None
        });

        let snapshot = match cached {
            Some(snapshot) if is_fresh(&snapshot, now, self.window) => Some(snapshot),
            stale => match self.recompute(now).await {
                Ok(fresh) => Some(fresh),
                Err(err) => {
                    warn!(
                        has_fallback = stale.is_some(),
                        "popularity recompute failed, serving last snapshot: {err}"
                    );
                    stale
                }
            },
        };

        // A ranking of no notes has nothing worth dating.
        let Some(snapshot) = snapshot.filter(|snapshot| !snapshot.items.is_empty()) else {
            return PopularPage {
                items: Vec::new(),
                total: 0,
                computed_at: None,
            };
        };

        let matching: Vec<ScoredRecord> = snapshot
            .items
            .into_iter()
            .filter(|item| filters.matches(&item.record))
            .collect();

        PopularPage {
            total: matching.len(),
            items: page.slice(&matching),
            computed_at: Some(snapshot.computed_at),
        }
    }

    /// Rebuilds the ranking from every visible note and persists it, replacing
    /// whatever snapshot was there before, even when no notes are visible.
    pub async fn recompute(&self, now: DateTime<Utc>) -> Result<PopularitySnapshot> {
        let notes = self.store.fetch_candidates(&NoteFilters::default(), None).await?;

        let snapshot = PopularitySnapshot {
            version: SNAPSHOT_VERSION,
            computed_at: now,
            items: score_notes(notes, now),
        };
        info!(items = snapshot.items.len(), "recomputed popularity snapshot");

        if let Err(err) = self.cache.save(&snapshot) {
            warn!("failed to persist popularity snapshot: {err}");
        }
        Ok(snapshot)
    }
}
