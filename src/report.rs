use std::fmt::Write;

use crate::models::{LeaderboardEntry, NoteType, PopularPage, ScoredRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSummary {
    pub note_type: NoteType,
    pub count: usize,
    pub avg_downloads: f64,
}

pub fn summarize_by_type(items: &[ScoredRecord]) -> Vec<TypeSummary> {
    let mut map: std::collections::HashMap<NoteType, (usize, u64)> =
        std::collections::HashMap::new();

    for item in items {
        let entry = map.entry(item.record.note_type).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += item.record.downloads;
    }

    let mut summaries: Vec<TypeSummary> = map
        .into_iter()
        .map(|(note_type, (count, downloads))| TypeSummary {
            note_type,
            count,
            avg_downloads: if count == 0 {
                0.0
            } else {
                downloads as f64 / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.note_type.as_str().cmp(b.note_type.as_str()))
    });
    summaries
}

pub fn build_report(
    scope: Option<&str>,
    popular: &PopularPage,
    leaders: &[LeaderboardEntry],
) -> String {
    let summaries = summarize_by_type(&popular.items);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all courses");

    let _ = writeln!(output, "# Popular Notes Report");
    match popular.computed_at {
        Some(computed_at) => {
            let _ = writeln!(
                output,
                "Generated for {} (ranking computed {})",
                scope_label,
                computed_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        None => {
            let _ = writeln!(output, "Generated for {} (no ranking computed yet)", scope_label);
        }
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Note Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No notes ranked yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} notes (avg {:.1} downloads)",
                summary.note_type, summary.count, summary.avg_downloads
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Popular Notes");

    if popular.items.is_empty() {
        let _ = writeln!(output, "No notes ranked yet.");
    } else {
        for (rank, item) in popular.items.iter().enumerate() {
            let _ = writeln!(
                output,
                "{}. {} ({}, {}) score {:.2}: {} downloads, rating {:.1}, by {}",
                rank + 1,
                item.record.title,
                item.record.course,
                item.record.note_type,
                item.score,
                item.record.downloads,
                item.record.rating_or_zero(),
                item.record.uploader.as_deref().unwrap_or("unknown")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Contributors");

    if leaders.is_empty() {
        let _ = writeln!(output, "No contributors yet.");
    } else {
        for entry in leaders.iter() {
            let _ = writeln!(
                output,
                "- {}: {} points across {} notes ({} downloads, avg rating {:.1})",
                entry.name, entry.points, entry.notes_count, entry.total_downloads, entry.avg_rating
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::CandidateRecord;

    fn item(id: i64, note_type: NoteType, downloads: u64) -> ScoredRecord {
        ScoredRecord {
            record: CandidateRecord {
                id,
                title: format!("Not {id}"),
                description: String::new(),
                course: "BIL203".to_string(),
                note_type,
                downloads,
                avg_rating: Some(4.0),
                views: 0,
                created_at: Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap(),
                uploader: None,
            },
            score: 1.0,
        }
    }

    #[test]
    fn summary_groups_by_type() {
        let summaries = summarize_by_type(&[
            item(1, NoteType::Pdf, 10),
            item(2, NoteType::Pdf, 30),
            item(3, NoteType::Image, 5),
        ]);
        assert_eq!(summaries[0].note_type, NoteType::Pdf);
        assert_eq!(summaries[0].count, 2);
        assert!((summaries[0].avg_downloads - 20.0).abs() < 1e-9);
        assert_eq!(summaries[1].note_type, NoteType::Image);
    }

    #[test]
    fn report_lists_notes_and_contributors() {
        let page = PopularPage {
            items: vec![item(1, NoteType::Pdf, 10)],
            total: 1,
            computed_at: Some(Utc.with_ymd_and_hms(2026, 10, 18, 6, 0, 0).unwrap()),
        };
        let leaders = vec![LeaderboardEntry {
            uploader_id: 1,
            name: "Can Kaya".to_string(),
            points: 9,
            notes_count: 1,
            total_downloads: 40,
            avg_rating: 4.5,
        }];

        let report = build_report(Some("BIL"), &page, &leaders);
        assert!(report.contains("Generated for BIL (ranking computed 2026-10-18 06:00 UTC)"));
        assert!(report.contains("1. Not 1 (BIL203, pdf) score 1.00: 10 downloads, rating 4.0, by unknown"));
        assert!(report.contains("- Can Kaya: 9 points across 1 notes"));
    }

    #[test]
    fn empty_report_says_so() {
        let page = PopularPage {
            items: Vec::new(),
            total: 0,
            computed_at: None,
        };
        let report = build_report(None, &page, &[]);
        assert!(report.contains("no ranking computed yet"));
        assert!(report.contains("No contributors yet."));
    }
}
