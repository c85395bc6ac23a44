use std::future::Future;
use std::io;

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{AlertSnapshot, ChurchId, EngagementSnapshot, MemberSnapshot};

/// Read side of the hosted member and alert tables.
pub trait SnapshotSource {
    /// Active members only.
    fn fetch_members(
        &self,
        church: ChurchId,
    ) -> impl Future<Output = Result<Vec<MemberSnapshot>, sqlx::Error>> + Send;

    fn fetch_alerts(
        &self,
        church: ChurchId,
    ) -> impl Future<Output = Result<Vec<AlertSnapshot>, sqlx::Error>> + Send;

    /// Engagement columns of active members.
    fn fetch_engagement(
        &self,
        church: ChurchId,
    ) -> impl Future<Output = Result<Vec<EngagementSnapshot>, sqlx::Error>> + Send;
}

#[derive(Clone)]
pub struct PgSnapshotSource {
    pool: PgPool,
}

impl PgSnapshotSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SnapshotSource for PgSnapshotSource {
    async fn fetch_members(&self, church: ChurchId) -> Result<Vec<MemberSnapshot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, active, created_at, last_service_attendance,
                   baptized, baptism_date, discipleship_stage
            FROM members
            WHERE church_id = $1 AND active = true
            "#,
        )
        .bind(church.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(MemberSnapshot {
                    id: row.try_get("id")?,
                    active: row.try_get::<Option<bool>, _>("active")?.unwrap_or(false),
                    created_at: row.try_get("created_at")?,
                    last_service_attendance: row.try_get("last_service_attendance")?,
                    baptized: row.try_get::<Option<bool>, _>("baptized")?.unwrap_or(false),
                    baptism_date: row.try_get("baptism_date")?,
                    discipleship_stage: row.try_get("discipleship_stage")?,
                })
            })
            .collect()
    }

    async fn fetch_alerts(&self, church: ChurchId) -> Result<Vec<AlertSnapshot>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, status::text AS status FROM pastoral_alerts WHERE church_id = $1",
        )
        .bind(church.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(AlertSnapshot {
                    id: row.try_get("id")?,
                    status: row.try_get("status")?,
                })
            })
            .collect()
    }

    async fn fetch_engagement(
        &self,
        church: ChurchId,
    ) -> Result<Vec<EngagementSnapshot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT discipleship_stage, engagement_score::float8 AS engagement_score,
                   last_activity_log
            FROM members
            WHERE church_id = $1 AND active = true
            "#,
        )
        .bind(church.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, sqlx::Error>(EngagementSnapshot {
                    discipleship_stage: row.try_get("discipleship_stage")?,
                    engagement_score: row.try_get("engagement_score")?,
                    last_activity_log: row.try_get("last_activity_log")?,
                })
            })
            .collect()
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

struct SeedMember {
    name: &'static str,
    email: &'static str,
    stage: Option<&'static str>,
    joined_days_ago: i64,
    attended_days_ago: Option<i64>,
    baptized_days_ago: Option<i64>,
    engagement_score: f64,
}

/// Loads sample members and alerts for `church`. Ids are derived from the
/// church id, so reseeding updates rows instead of duplicating them.
pub async fn seed(pool: &PgPool, church: ChurchId, now: DateTime<Utc>) -> anyhow::Result<()> {
    let members = [
        SeedMember {
            name: "Grace Okafor",
            email: "grace.okafor@example.org",
            stage: Some("Leader"),
            joined_days_ago: 900,
            attended_days_ago: Some(3),
            baptized_days_ago: Some(800),
            engagement_score: 0.92,
        },
        SeedMember {
            name: "Daniel Reyes",
            email: "daniel.reyes@example.org",
            stage: Some("Growing"),
            joined_days_ago: 120,
            attended_days_ago: Some(10),
            baptized_days_ago: Some(40),
            engagement_score: 0.71,
        },
        SeedMember {
            name: "Hannah Lindqvist",
            email: "hannah.lindqvist@example.org",
            stage: Some("New Believer"),
            joined_days_ago: 5,
            attended_days_ago: Some(2),
            baptized_days_ago: None,
            engagement_score: 0.45,
        },
        SeedMember {
            name: "Samuel Mensah",
            email: "samuel.mensah@example.org",
            stage: Some("Seeker"),
            joined_days_ago: 60,
            attended_days_ago: Some(75),
            baptized_days_ago: None,
            engagement_score: 0.12,
        },
        SeedMember {
            name: "Ruth Tanaka",
            email: "ruth.tanaka@example.org",
            stage: None,
            joined_days_ago: 400,
            attended_days_ago: None,
            baptized_days_ago: None,
            engagement_score: 0.33,
        },
    ];

    let mut tx = pool.begin().await?;

    let mut member_ids = Vec::with_capacity(members.len());
    for member in &members {
        let id = Uuid::new_v5(&church.0, member.email.as_bytes());
        let days = |offset: i64| now - Duration::days(offset);

        sqlx::query(
            r#"
            INSERT INTO members
            (id, church_id, name, email, discipleship_stage, baptized, baptism_date,
             engagement_score, last_service_attendance, last_activity_log, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, true, $10)
            ON CONFLICT (id) DO UPDATE
            SET discipleship_stage = EXCLUDED.discipleship_stage,
                baptized = EXCLUDED.baptized,
                baptism_date = EXCLUDED.baptism_date,
                engagement_score = EXCLUDED.engagement_score,
                last_service_attendance = EXCLUDED.last_service_attendance,
                last_activity_log = EXCLUDED.last_activity_log,
                created_at = EXCLUDED.created_at,
                updated_at = now()
            "#,
        )
        .bind(id)
        .bind(church.0)
        .bind(member.name)
        .bind(member.email)
        .bind(member.stage)
        .bind(member.baptized_days_ago.is_some())
        .bind(member.baptized_days_ago.map(|d| days(d).date_naive()))
        .bind(member.engagement_score)
        .bind(member.attended_days_ago.map(days))
        .bind(days(member.joined_days_ago))
        .execute(&mut *tx)
        .await?;

        member_ids.push(id);
    }

    let alerts = [
        (0, "disengagement", "Missed four Sundays in a row", "open"),
        (3, "disengagement", "No response to follow-up call", "in_progress"),
        (1, "milestone", "Ready for baptism class", "resolved"),
        (4, "pastoral_care", "Family bereavement", "escalated"),
        (2, "spiritual_gap", "Questions about assurance", "closed"),
    ];

    for (member_index, alert_type, title, status) in alerts {
        let id = Uuid::new_v5(&church.0, title.as_bytes());
        sqlx::query(
            r#"
            INSERT INTO pastoral_alerts (id, church_id, member_id, alert_type, title, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = now()
            "#,
        )
        .bind(id)
        .bind(church.0)
        .bind(member_ids[member_index])
        .bind(alert_type)
        .bind(title)
        .bind(status)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct MemberImportRow {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub discipleship_stage: Option<String>,
    #[serde(default)]
    pub baptized: Option<bool>,
    #[serde(default)]
    pub baptism_date: Option<NaiveDate>,
    #[serde(default)]
    pub saved_status: Option<bool>,
}

/// Parses a header-based member CSV. Rejects the whole file on the first
/// malformed or nameless row.
pub fn parse_member_csv<R: io::Read>(input: R) -> anyhow::Result<Vec<MemberImportRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let headers = reader.headers().context("failed to read member CSV header")?;
    if !headers.iter().any(|header| header == "name") {
        bail!("member CSV header has no `name` column");
    }
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<MemberImportRow>().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        let mut row = result.with_context(|| format!("invalid member row on line {line}"))?;
        if row.name.trim().is_empty() {
            bail!("member row on line {line} has no name");
        }
        row.email = non_blank(row.email).map(|email| email.to_lowercase());
        row.phone_number = non_blank(row.phone_number);
        row.discipleship_stage = non_blank(row.discipleship_stage);
        rows.push(row);
    }

    Ok(rows)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl MemberImportRow {
    /// Stable id for re-imports: keyed on email when present, else on name
    /// and phone.
    pub fn member_id(&self, church: ChurchId) -> Uuid {
        match &self.email {
            Some(email) => Uuid::new_v5(&church.0, email.as_bytes()),
            None => {
                let key = format!(
                    "{}|{}",
                    self.name.trim(),
                    self.phone_number.as_deref().unwrap_or("")
                );
                Uuid::new_v5(&church.0, key.to_lowercase().as_bytes())
            }
        }
    }

    fn conflict_target(&self) -> &'static str {
        if self.email.is_some() {
            "(church_id, email)"
        } else {
            "(id)"
        }
    }
}

pub async fn import_csv(
    pool: &PgPool,
    church: ChurchId,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = parse_member_csv(file)?;

    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for row in rows {
        let baptized = row.baptized.unwrap_or(row.baptism_date.is_some());
        let statement = format!(
            r#"
            INSERT INTO members
            (id, church_id, name, email, phone_number, discipleship_stage,
             baptized, baptism_date, saved_status, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true)
            ON CONFLICT {} DO UPDATE
            SET name = EXCLUDED.name,
                phone_number = EXCLUDED.phone_number,
                discipleship_stage = EXCLUDED.discipleship_stage,
                baptized = EXCLUDED.baptized,
                baptism_date = EXCLUDED.baptism_date,
                saved_status = EXCLUDED.saved_status,
                updated_at = now()
            "#,
            row.conflict_target()
        );

        let result = sqlx::query(&statement)
            .bind(row.member_id(church))
            .bind(church.0)
            .bind(row.name.trim())
            .bind(&row.email)
            .bind(&row.phone_number)
            .bind(&row.discipleship_stage)
            .bind(baptized)
            .bind(row.baptism_date)
            .bind(row.saved_status.unwrap_or(false))
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() > 0 {
            written += 1;
        }
    }

    tx.commit().await?;
    Ok(written)
}
