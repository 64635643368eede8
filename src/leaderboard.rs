use crate::models::{ContributorRecord, LeaderboardEntry};

/// Ranks uploaders by stars received, then notes shared, then downloads.
pub fn rank_contributors(contributors: &[ContributorRecord]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = contributors
        .iter()
        .map(|contributor| {
            let notes_count = contributor.notes.len();
            let points = contributor.notes.iter().map(|note| note.rating_sum).sum();
            let total_downloads = contributor.notes.iter().map(|note| note.downloads).sum();
            let avg_rating = if notes_count == 0 {
                0.0
            } else {
                let sum: f64 = contributor
                    .notes
                    .iter()
                    .map(|note| note.avg_rating.unwrap_or(0.0))
                    .sum();
                round_one_decimal(sum / notes_count as f64)
            };

            LeaderboardEntry {
                uploader_id: contributor.uploader_id,
                name: contributor.name.clone(),
                points,
                notes_count,
                total_downloads,
                avg_rating,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.notes_count.cmp(&a.notes_count))
            .then_with(|| b.total_downloads.cmp(&a.total_downloads))
            .then_with(|| a.uploader_id.cmp(&b.uploader_id))
    });
    entries
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteContribution;

    fn contribution(downloads: u64, avg_rating: Option<f64>, rating_sum: i64) -> NoteContribution {
        NoteContribution {
            downloads,
            avg_rating,
            rating_sum,
        }
    }

    fn contributor(id: i64, name: &str, notes: Vec<NoteContribution>) -> ContributorRecord {
        ContributorRecord {
            uploader_id: id,
            name: name.to_string(),
            notes,
        }
    }

    #[test]
    fn points_are_total_stars_received() {
        let ranked = rank_contributors(&[
            contributor(1, "Ayşe Yılmaz", vec![contribution(5, Some(4.0), 8), contribution(2, None, 0)]),
            contributor(2, "Can Kaya", vec![contribution(40, Some(4.5), 9)]),
        ]);

        assert_eq!(ranked[0].name, "Can Kaya");
        assert_eq!(ranked[0].points, 9);
        assert_eq!(ranked[1].points, 8);
        assert_eq!(ranked[1].notes_count, 2);
        assert_eq!(ranked[1].total_downloads, 7);
        assert_eq!(ranked[1].avg_rating, 2.0);
    }

    #[test]
    fn ties_fall_through_notes_then_downloads_then_id() {
        let ranked = rank_contributors(&[
            contributor(4, "D", vec![contribution(1, None, 0)]),
            contributor(3, "C", vec![contribution(9, None, 0)]),
            contributor(2, "B", vec![contribution(1, None, 0), contribution(0, None, 0)]),
            contributor(1, "A", vec![contribution(1, None, 0)]),
        ]);

        let ids: Vec<i64> = ranked.iter().map(|entry| entry.uploader_id).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);
    }

    #[tokio::test]
    async fn ranks_contributors_fetched_from_store() {
        use crate::store::{MemoryStore, NoteStore};

        let store = MemoryStore::new(Vec::new()).with_contributors(vec![
            contributor(1, "Ayşe Yılmaz", vec![contribution(3, Some(3.0), 3)]),
            contributor(2, "Elif Şahin", vec![contribution(90, Some(5.0), 10), contribution(4, Some(4.0), 4)]),
        ]);

        let ranked = rank_contributors(&store.fetch_contributors().await.unwrap());
        let names: Vec<&str> = ranked.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Elif Şahin", "Ayşe Yılmaz"]);
        assert_eq!(ranked[0].points, 14);
        assert_eq!(ranked[0].avg_rating, 4.5);

        let offline = MemoryStore::offline();
        assert!(offline.fetch_contributors().await.is_err());
    }

    #[test]
    fn uploaders_without_notes_score_zero() {
        let ranked = rank_contributors(&[contributor(1, "Elif Şahin", Vec::new())]);
        assert_eq!(ranked[0].points, 0);
        assert_eq!(ranked[0].avg_rating, 0.0);
    }

    #[test]
    fn average_rating_is_rounded_to_one_decimal() {
        let ranked = rank_contributors(&[contributor(
            1,
            "Zeynep Arslan",
            vec![contribution(0, Some(4.0), 4), contribution(0, Some(3.33), 3), contribution(0, Some(5.0), 5)],
        )]);
        assert_eq!(ranked[0].avg_rating, 4.1);
    }
}
