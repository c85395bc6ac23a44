use tracing::debug;

use crate::calendar::AsOf;
use crate::db::SnapshotSource;
use crate::error::{DataSourceError, SnapshotQuery};
use crate::models::{
    ChurchId, DiscipleshipStage, EngagementBreakdown, EngagementSnapshot, MemberStats, StageCount,
};

pub const RECENT_ACTIVITY_DAYS: i64 = 7;

pub async fn compute_member_stats<S: SnapshotSource>(
    source: &S,
    church: ChurchId,
    as_of: AsOf,
) -> Result<MemberStats, DataSourceError> {
    let rows = source
        .fetch_engagement(church)
        .await
        .map_err(|e| DataSourceError::new(SnapshotQuery::Engagement, church, e))?;
    debug!(%church, members = rows.len(), "fetched engagement snapshots");
    Ok(summarize(&rows, as_of))
}

pub fn summarize(rows: &[EngagementSnapshot], as_of: AsOf) -> MemberStats {
    let mut by_stage: Vec<StageCount> = DiscipleshipStage::ALL
        .into_iter()
        .map(|stage| StageCount { stage, count: 0 })
        .collect();
    let mut engagement = EngagementBreakdown::default();
    let activity_cutoff = as_of.days_ago(RECENT_ACTIVITY_DAYS);
    let mut recent_activity = 0;

    for row in rows {
        if let Some(stage) = row.discipleship_stage.as_deref().and_then(DiscipleshipStage::parse) {
            if let Some(entry) = by_stage.iter_mut().find(|entry| entry.stage == stage) {
                entry.count += 1;
            }
        }

        match EngagementLevel::from_score(row.engagement_score.unwrap_or(0.0)) {
            EngagementLevel::High => engagement.high += 1,
            EngagementLevel::Medium => engagement.medium += 1,
            EngagementLevel::Low => engagement.low += 1,
            EngagementLevel::Inactive => engagement.inactive += 1,
        }

        if row.last_activity_log.is_some_and(|seen| seen > activity_cutoff) {
            recent_activity += 1;
        }
    }

    MemberStats {
        total: rows.len(),
        by_stage,
        engagement,
        recent_activity,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
    Inactive,
}

impl EngagementLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            EngagementLevel::High
        } else if score >= 0.6 {
            EngagementLevel::Medium
        } else if score >= 0.3 {
            EngagementLevel::Low
        } else {
            EngagementLevel::Inactive
        }
    }
}
