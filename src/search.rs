use tracing::debug;

use crate::error::Result;
use crate::models::{CandidateRecord, NoteFilters, PageRequest, ScoredRecord, SearchPage, SortMode};
use crate::similarity;
use crate::store::NoteStore;

/// Upper bound on candidates pulled from the store for one fuzzy query.
pub const DEFAULT_SEARCH_WINDOW: usize = 500;

/// Typo-tolerant note search. A non-empty query ranks a bounded window of
/// candidates by similarity; an empty query falls back to a plain sort.
pub async fn search<S: NoteStore>(
    store: &S,
    query: &str,
    filters: &NoteFilters,
    sort: SortMode,
    page: PageRequest,
    window: usize,
) -> Result<SearchPage> {
    let query = query.trim();

    if query.is_empty() {
        let mut notes = store.fetch_candidates(filters, None).await?;
        let total = notes.len();
        sort_notes(&mut notes, sort);
        let scored: Vec<ScoredRecord> = notes
            .into_iter()
            .map(|record| ScoredRecord { record, score: 0.0 })
            .collect();

        return Ok(SearchPage {
            items: page.slice(&scored),
            total,
            approximate_total: false,
        });
    }

    let candidates = store.fetch_candidates(filters, Some(window)).await?;
    let ranked = rank_candidates(query, candidates);
    // Only a full window can have left matching notes unscored.
    let approximate_total =
        ranked.len() >= window && store.count_visible(filters).await? > ranked.len();
    debug!(query, scored = ranked.len(), approximate_total, "ranked search window");

    Ok(SearchPage {
        items: page.slice(&ranked),
        total: ranked.len(),
        approximate_total,
    })
}

/// Scores every candidate against the query and orders them best first.
/// Equal scores keep the order they were fetched in.
pub fn rank_candidates(query: &str, candidates: Vec<CandidateRecord>) -> Vec<ScoredRecord> {
    let mut ranked: Vec<ScoredRecord> = candidates
        .into_iter()
        .map(|record| ScoredRecord {
            score: similarity::candidate_score(query, &record),
            record,
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}

/// Deterministic ordering for browse mode; ties fall back to id ascending.
pub fn sort_notes(notes: &mut [CandidateRecord], sort: SortMode) {
    notes.sort_by(|a, b| {
        let primary = match sort {
            SortMode::Newest => b.created_at.cmp(&a.created_at),
            SortMode::Oldest => a.created_at.cmp(&b.created_at),
            SortMode::Downloads => b.downloads.cmp(&a.downloads),
            SortMode::Rating => b.rating_or_zero().total_cmp(&a.rating_or_zero()),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}
