#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(test)]
use crate::error::RankError;
use crate::error::Result;
use crate::models::{CandidateRecord, ContributorRecord, NoteFilters};

/// Read-only access to visible notes. Filters are applied by the store and
/// results come back in id order.
pub trait NoteStore {
    async fn fetch_candidates(
        &self,
        filters: &NoteFilters,
        limit: Option<usize>,
    ) -> Result<Vec<CandidateRecord>>;

    async fn count_visible(&self, filters: &NoteFilters) -> Result<usize>;

    async fn fetch_contributors(&self) -> Result<Vec<ContributorRecord>>;
}

/// Store backed by a vector.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: Vec<CandidateRecord>,
    contributors: Vec<ContributorRecord>,
    offline: bool,
    fetches: AtomicUsize,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(mut notes: Vec<CandidateRecord>) -> Self {
        notes.sort_by_key(|note| note.id);
        Self {
            notes,
            ..Self::default()
        }
    }

    /// A store whose every call fails as if the database were down.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn with_contributors(mut self, contributors: Vec<ContributorRecord>) -> Self {
        self.contributors = contributors;
        self
    }

    /// Number of `fetch_candidates` calls seen so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(RankError::StoreUnavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
impl NoteStore for MemoryStore {
    async fn fetch_candidates(
        &self,
        filters: &NoteFilters,
        limit: Option<usize>,
    ) -> Result<Vec<CandidateRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self
            .notes
            .iter()
            .filter(|note| filters.matches(note))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count_visible(&self, filters: &NoteFilters) -> Result<usize> {
        self.check_online()?;
        Ok(self.notes.iter().filter(|note| filters.matches(note)).count())
    }

    async fn fetch_contributors(&self) -> Result<Vec<ContributorRecord>> {
        self.check_online()?;
        Ok(self.contributors.clone())
    }
}
