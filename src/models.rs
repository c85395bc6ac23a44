use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant scope for every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChurchId(pub Uuid);

impl fmt::Display for ChurchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct MemberSnapshot {
    #[allow(dead_code)]
    pub id: Uuid,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub last_service_attendance: Option<DateTime<Utc>>,
    pub baptized: bool,
    pub baptism_date: Option<NaiveDate>,
    pub discipleship_stage: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlertSnapshot {
    pub id: Uuid,
    pub status: Option<String>,
}

impl AlertSnapshot {
    /// Maps the stored status onto the known set. Missing and unrecognised
    /// values count as `open`.
    pub fn normalized_status(&self) -> AlertStatus {
        match self.status.as_deref() {
            None => AlertStatus::Open,
            Some(raw) => AlertStatus::parse(raw).unwrap_or_else(|| {
                tracing::warn!(
                    alert = %self.id,
                    status = raw,
                    "unrecognised alert status, counting as open"
                );
                AlertStatus::Open
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngagementSnapshot {
    pub discipleship_stage: Option<String>,
    pub engagement_score: Option<f64>,
    pub last_activity_log: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Escalated,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::InProgress => "in_progress",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Closed => "closed",
            AlertStatus::Escalated => "escalated",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" | "open" => Some(AlertStatus::Open),
            "in_progress" => Some(AlertStatus::InProgress),
            "resolved" => Some(AlertStatus::Resolved),
            "closed" => Some(AlertStatus::Closed),
            "escalated" => Some(AlertStatus::Escalated),
            _ => None,
        }
    }

    /// Anything not in the terminal set {resolved, closed}.
    pub fn is_pending(self) -> bool {
        !matches!(self, AlertStatus::Resolved | AlertStatus::Closed)
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscipleshipStage {
    #[serde(rename = "New Believer")]
    NewBeliever,
    Growing,
    Mature,
    Leader,
    Seeker,
}

impl DiscipleshipStage {
    pub const ALL: [DiscipleshipStage; 5] = [
        DiscipleshipStage::NewBeliever,
        DiscipleshipStage::Growing,
        DiscipleshipStage::Mature,
        DiscipleshipStage::Leader,
        DiscipleshipStage::Seeker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DiscipleshipStage::NewBeliever => "New Believer",
            DiscipleshipStage::Growing => "Growing",
            DiscipleshipStage::Mature => "Mature",
            DiscipleshipStage::Leader => "Leader",
            DiscipleshipStage::Seeker => "Seeker",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == raw.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardAnalytics {
    pub metrics: DashboardMetrics,
    pub charts: DashboardCharts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub total_active_members: usize,
    pub new_members_this_month: usize,
    pub pending_alerts: usize,
    pub average_attendance_rate: f64,
    pub baptisms_this_year: usize,
    pub stage_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub stage_distribution: Vec<StageSlice>,
    #[serde(rename = "newMembersLast6Months")]
    pub new_members_last_6_months: Vec<MonthlyCount>,
    pub alerts_by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSlice {
    pub name: String,
    pub value: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: AlertStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    pub total: usize,
    pub by_stage: Vec<StageCount>,
    pub engagement: EngagementBreakdown,
    pub recent_activity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub stage: DiscipleshipStage,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngagementBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub inactive: usize,
}
