use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CandidateRecord, ContributorRecord, NoteContribution, NoteFilters, NoteType};
use crate::store::NoteStore;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgNoteStore {
    pool: PgPool,
}

impl PgNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CANDIDATE_COLUMNS: &str = "SELECT n.id, n.title, n.description, n.course, n.note_type, \
     n.downloads_count, n.avg_rating, n.views_count, n.created_at, \
     NULLIF(TRIM(CONCAT_WS(' ', u.first_name, u.last_name)), '') AS uploader \
     FROM notes n LEFT JOIN users u ON u.id = n.user_id \
     WHERE n.is_hidden = FALSE";

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filters: &NoteFilters) {
    if let Some(course) = &filters.course {
        query.push(" AND n.course ILIKE ");
        query.push_bind(course_pattern(course));
    }
    if let Some(note_type) = filters.note_type {
        query.push(" AND n.note_type = ");
        query.push_bind(note_type.as_str());
    }
}

/// `ILIKE` does the case folding, so the course goes in as typed.
fn course_pattern(course: &str) -> String {
    format!("%{}%", escape_like(course))
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl NoteStore for PgNoteStore {
    async fn fetch_candidates(
        &self,
        filters: &NoteFilters,
        limit: Option<usize>,
    ) -> Result<Vec<CandidateRecord>> {
        let mut query = QueryBuilder::<Postgres>::new(CANDIDATE_COLUMNS);
        push_filters(&mut query, filters);
        query.push(" ORDER BY n.id ASC");
        if let Some(limit) = limit {
            query.push(" LIMIT ");
            query.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut notes = Vec::with_capacity(rows.len());

        for row in rows {
            let note_type: String = row.try_get("note_type")?;
            notes.push(CandidateRecord {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                course: row.try_get("course")?,
                note_type: note_type.parse().unwrap_or(NoteType::Other),
                downloads: non_negative(row.try_get("downloads_count")?),
                avg_rating: row.try_get("avg_rating")?,
                views: non_negative(row.try_get("views_count")?),
                created_at: row.try_get("created_at")?,
                uploader: row.try_get("uploader")?,
            });
        }

        debug!(count = notes.len(), "fetched candidate notes");
        Ok(notes)
    }

    async fn count_visible(&self, filters: &NoteFilters) -> Result<usize> {
        let mut query =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM notes n WHERE n.is_hidden = FALSE");
        push_filters(&mut query, filters);

        let total: i64 = query.build().fetch_one(&self.pool).await?.try_get("total")?;
        Ok(usize::try_from(total).unwrap_or(0))
    }

    async fn fetch_contributors(&self) -> Result<Vec<ContributorRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id AS uploader_id,
                   TRIM(CONCAT_WS(' ', u.first_name, u.last_name)) AS name,
                   n.id AS note_id,
                   n.downloads_count,
                   n.avg_rating,
                   COALESCE((SELECT SUM(r.score) FROM ratings r WHERE r.note_id = n.id), 0)::BIGINT
                       AS rating_sum
            FROM users u
            LEFT JOIN notes n ON n.user_id = u.id
            ORDER BY u.id, n.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut contributors: Vec<ContributorRecord> = Vec::new();
        for row in rows {
            let uploader_id: i64 = row.try_get("uploader_id")?;
            if contributors.last().map(|last| last.uploader_id) != Some(uploader_id) {
                contributors.push(ContributorRecord {
                    uploader_id,
                    name: row.try_get("name")?,
                    notes: Vec::new(),
                });
            }

            let note_id: Option<i64> = row.try_get("note_id")?;
            if note_id.is_none() {
                continue;
            }
            let downloads: Option<i64> = row.try_get("downloads_count")?;
            if let Some(current) = contributors.last_mut() {
                current.notes.push(NoteContribution {
                    downloads: non_negative(downloads.unwrap_or(0)),
                    avg_rating: row.try_get("avg_rating")?,
                    rating_sum: row.try_get("rating_sum")?,
                });
            }
        }

        Ok(contributors)
    }
}

async fn upsert_user(pool: &PgPool, email: &str, full_name: &str) -> anyhow::Result<i64> {
    let (first_name, last_name) = match full_name.trim().rsplit_once(' ') {
        Some((first, last)) => (first.trim(), last.trim()),
        None => (full_name.trim(), ""),
    };

    let id: i64 = sqlx::query(
        r#"
        INSERT INTO users (email, first_name, last_name)
        VALUES ($1, $2, NULLIF($3, ''))
        ON CONFLICT (email) DO UPDATE
        SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
        RETURNING id
        "#,
    )
    .bind(email)
    .bind(first_name)
    .bind(last_name)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        ("ayse.yilmaz@ogrenci.edu.tr", "Ayşe Yılmaz"),
        ("can.kaya@ogrenci.edu.tr", "Can Kaya"),
        ("elif.sahin@ogrenci.edu.tr", "Elif Şahin"),
    ];

    for (email, name) in users {
        upsert_user(pool, email, name).await?;
    }

    let notes = vec![
        (
            "seed-001",
            "ayse.yilmaz@ogrenci.edu.tr",
            "Veri Yapıları - Vize Notları",
            "Bağlı listeler, yığınlar ve kuyruklar",
            "BIL203 Veri Yapıları",
            NoteType::Pdf,
            120,
            340,
            2,
        ),
        (
            "seed-002",
            "can.kaya@ogrenci.edu.tr",
            "Lineer Cebir Final Özeti",
            "Özdeğerler ve köşegenleştirme",
            "MAT201 Lineer Cebir",
            NoteType::Doc,
            45,
            90,
            12,
        ),
        (
            "seed-003",
            "elif.sahin@ogrenci.edu.tr",
            "Fizik 1 Formül Kağıdı",
            "Kinematik ve dinamik formülleri",
            "FIZ101 Fizik 1",
            NoteType::Image,
            210,
            500,
            40,
        ),
        (
            "seed-004",
            "ayse.yilmaz@ogrenci.edu.tr",
            "Algoritma Analizi Çalışma Soruları",
            "Asimptotik notasyon ve böl-fethet",
            "BIL305 Algoritmalar",
            NoteType::Pdf,
            8,
            25,
            0,
        ),
    ];

    for (source_key, email, title, description, course, note_type, downloads, views, days_ago) in notes {
        let user_id: i64 = sqlx::query("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(pool)
            .await?
            .get("id");

        sqlx::query(
            r#"
            INSERT INTO notes
            (user_id, title, description, course, note_type, downloads_count, views_count,
             source_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now() - make_interval(days => $9))
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(description)
        .bind(course)
        .bind(note_type.as_str())
        .bind(downloads as i64)
        .bind(views as i64)
        .bind(source_key)
        .bind(days_ago)
        .execute(pool)
        .await?;
    }

    let ratings = vec![
        ("seed-001", "can.kaya@ogrenci.edu.tr", 5),
        ("seed-001", "elif.sahin@ogrenci.edu.tr", 4),
        ("seed-002", "ayse.yilmaz@ogrenci.edu.tr", 3),
        ("seed-003", "ayse.yilmaz@ogrenci.edu.tr", 5),
        ("seed-003", "can.kaya@ogrenci.edu.tr", 5),
    ];

    for (source_key, email, score) in ratings {
        sqlx::query(
            r#"
            INSERT INTO ratings (note_id, user_id, score)
            SELECT n.id, u.id, $3
            FROM notes n, users u
            WHERE n.source_key = $1 AND u.email = $2
            ON CONFLICT (note_id, user_id) DO UPDATE SET score = EXCLUDED.score
            "#,
        )
        .bind(source_key)
        .bind(email)
        .bind(score)
        .execute(pool)
        .await?;
    }

    refresh_average_ratings(pool).await?;
    info!("seed data in place");
    Ok(())
}

async fn refresh_average_ratings(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE notes n
        SET avg_rating = (SELECT AVG(r.score)::DOUBLE PRECISION FROM ratings r WHERE r.note_id = n.id)
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        uploader_name: String,
        uploader_email: String,
        title: String,
        description: String,
        course: String,
        note_type: Option<String>,
        file_mime: Option<String>,
        downloads: Option<i64>,
        views: Option<i64>,
        avg_rating: Option<f64>,
        created_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let user_id = upsert_user(pool, &row.uploader_email, &row.uploader_name).await?;

        let note_type = match (&row.note_type, &row.file_mime) {
            (Some(value), _) => value
                .parse::<NoteType>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("bad note_type for {:?}", row.title))?,
            (None, Some(mime)) => NoteType::from_mime(mime),
            (None, None) => NoteType::Other,
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO notes
            (user_id, title, description, course, note_type, file_mime, downloads_count,
             views_count, avg_rating, source_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, now()))
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.course)
        .bind(note_type.as_str())
        .bind(&row.file_mime)
        .bind(row.downloads.unwrap_or(0).max(0))
        .bind(row.views.unwrap_or(0).max(0))
        .bind(row.avg_rating.map(|rating| rating.clamp(0.0, 5.0)))
        .bind(source_key)
        .bind(row.created_at)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("BIL203"), "BIL203");
    }

    #[test]
    fn course_pattern_keeps_dotted_capital_i() {
        let filters = NoteFilters::new(Some("İşletim"), None);
        let course = filters.course.as_deref().unwrap();
        assert_eq!(course_pattern(course), "%İşletim%");
    }

    #[test]
    fn negative_counters_read_as_zero() {
        assert_eq!(non_negative(-4), 0);
        assert_eq!(non_negative(17), 17);
    }

    #[test]
    fn filters_extend_the_where_clause() {
        let mut query = QueryBuilder::<Postgres>::new(CANDIDATE_COLUMNS);
        push_filters(&mut query, &NoteFilters::new(Some("bil"), Some(NoteType::Pdf)));
        let sql = query.sql();
        assert!(sql.ends_with("AND n.course ILIKE $1 AND n.note_type = $2"));
    }
}
