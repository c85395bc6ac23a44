//! Dashboard metrics derived from member and alert snapshots.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::calendar::AsOf;
use crate::db::SnapshotSource;
use crate::error::{DataSourceError, SnapshotQuery};
use crate::models::{
    AlertSnapshot, AlertStatus, ChurchId, DashboardAnalytics, DashboardCharts, DashboardMetrics,
    MemberSnapshot, MonthlyCount, StageSlice, StatusCount,
};

pub const ATTENDANCE_WINDOW_DAYS: i64 = 30;
pub const TREND_MONTHS: u32 = 6;
pub const UNKNOWN_STAGE: &str = "Unknown";

/// Fetches both snapshots for `church` concurrently and aggregates them.
/// Either read failing fails the whole computation.
pub async fn compute_dashboard_analytics<S: SnapshotSource>(
    source: &S,
    church: ChurchId,
    as_of: AsOf,
) -> Result<DashboardAnalytics, DataSourceError> {
    let members = async {
        source
            .fetch_members(church)
            .await
            .map_err(|e| DataSourceError::new(SnapshotQuery::Members, church, e))
    };
    let alerts = async {
        source
            .fetch_alerts(church)
            .await
            .map_err(|e| DataSourceError::new(SnapshotQuery::Alerts, church, e))
    };
    let (members, alerts) = tokio::try_join!(members, alerts)?;

    debug!(
        %church,
        members = members.len(),
        alerts = alerts.len(),
        "fetched dashboard snapshots"
    );

    Ok(aggregate(&members, &alerts, as_of))
}

pub fn aggregate(
    members: &[MemberSnapshot],
    alerts: &[AlertSnapshot],
    as_of: AsOf,
) -> DashboardAnalytics {
    let members: Vec<&MemberSnapshot> = members.iter().filter(|m| m.active).collect();
    let statuses: Vec<AlertStatus> = alerts
        .iter()
        .map(AlertSnapshot::normalized_status)
        .collect();

    let total_active_members = members.len();

    let month_start = as_of.start_of_month();
    debug!(
        %month_start,
        year_start = %as_of.start_of_year(),
        tz = %as_of.tz,
        "calendar windows"
    );
    let new_members_this_month = members
        .iter()
        .filter_map(|m| m.created_at)
        .filter(|created| *created >= month_start && *created <= as_of.now)
        .count();

    let pending_alerts = statuses.iter().filter(|s| s.is_pending()).count();

    let attendance_cutoff = as_of.days_ago(ATTENDANCE_WINDOW_DAYS);
    let attended = members
        .iter()
        .filter_map(|m| m.last_service_attendance)
        .filter(|seen| *seen >= attendance_cutoff)
        .count();
    let average_attendance_rate = if total_active_members == 0 {
        0.0
    } else {
        attended as f64 / total_active_members as f64
    };

    let year_start = as_of.first_of_year();
    let today = as_of.today();
    let baptisms_this_year = members
        .iter()
        .filter(|m| m.baptized)
        .filter_map(|m| m.baptism_date)
        .filter(|date| *date >= year_start && *date <= today)
        .count();

    let stage_chart = count_first_seen(
        members
            .iter()
            .map(|m| m.discipleship_stage.as_deref().unwrap_or(UNKNOWN_STAGE)),
    );
    let stage_distribution: BTreeMap<String, usize> = stage_chart
        .iter()
        .map(|(stage, count)| (stage.to_string(), *count))
        .collect();

    let new_members_last_6_months = as_of
        .trailing_months(TREND_MONTHS)
        .into_iter()
        .map(|window| MonthlyCount {
            count: members
                .iter()
                .filter_map(|m| m.created_at)
                .filter(|created| window.contains(*created))
                .count(),
            month: window.label(),
        })
        .collect();

    let alerts_by_status = count_first_seen(statuses.iter().copied())
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();

    DashboardAnalytics {
        metrics: DashboardMetrics {
            total_active_members,
            new_members_this_month,
            pending_alerts,
            average_attendance_rate,
            baptisms_this_year,
            stage_distribution,
        },
        charts: DashboardCharts {
            stage_distribution: stage_chart
                .into_iter()
                .map(|(name, value)| StageSlice {
                    name: name.to_string(),
                    value,
                })
                .collect(),
            new_members_last_6_months,
            alerts_by_status,
        },
    }
}

/// Counts occurrences, keeping keys in the order they first appear.
fn count_first_seen<K, I>(items: I) -> Vec<(K, usize)>
where
    K: Eq + std::hash::Hash + Copy,
    I: IntoIterator<Item = K>,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();

    for item in items {
        match positions.get(&item) {
            Some(&index) => counts[index].1 += 1,
            None => {
                positions.insert(item, counts.len());
                counts.push((item, 1));
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngagementSnapshot;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn as_of() -> AsOf {
        AsOf::new(now(), Tz::UTC)
    }

    fn member(created_at: DateTime<Utc>) -> MemberSnapshot {
        MemberSnapshot {
            id: Uuid::new_v4(),
            active: true,
            created_at: Some(created_at),
            last_service_attendance: None,
            baptized: false,
            baptism_date: None,
            discipleship_stage: None,
        }
    }

    fn alert(status: Option<&str>) -> AlertSnapshot {
        AlertSnapshot {
            id: Uuid::new_v4(),
            status: status.map(String::from),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn counts_new_members_this_month() {
        let members = vec![
            member(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap()),
            member(Utc.with_ymd_and_hms(2023, 2, 10, 8, 0, 0).unwrap()),
        ];
        let analytics = aggregate(&members, &[], as_of());
        assert_eq!(analytics.metrics.total_active_members, 2);
        assert_eq!(analytics.metrics.new_members_this_month, 1);
    }

    #[test]
    fn this_month_window_is_closed_at_now() {
        let members = vec![
            member(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()),
            member(now()),
            member(now() + Duration::seconds(1)),
        ];
        let analytics = aggregate(&members, &[], as_of());
        assert_eq!(analytics.metrics.new_members_this_month, 2);
    }

    #[test]
    fn missing_status_counts_as_open() {
        let alerts = vec![alert(Some("open")), alert(Some("resolved")), alert(None)];
        let analytics = aggregate(&[], &alerts, as_of());
        assert_eq!(analytics.metrics.pending_alerts, 2);

        let by_status: HashMap<AlertStatus, usize> = analytics
            .charts
            .alerts_by_status
            .iter()
            .map(|s| (s.status, s.count))
            .collect();
        assert_eq!(by_status.len(), 2);
        assert_eq!(by_status[&AlertStatus::Open], 2);
        assert_eq!(by_status[&AlertStatus::Resolved], 1);
    }

    #[test]
    fn pending_and_terminal_alerts_partition_the_total() {
        let alerts: Vec<AlertSnapshot> = [
            Some("open"),
            Some("in_progress"),
            Some("resolved"),
            Some("closed"),
            Some("escalated"),
            Some("closed"),
            None,
        ]
        .into_iter()
        .map(alert)
        .collect();
        let analytics = aggregate(&[], &alerts, as_of());
        let terminal: usize = analytics
            .charts
            .alerts_by_status
            .iter()
            .filter(|s| !s.status.is_pending())
            .map(|s| s.count)
            .sum();
        assert_eq!(analytics.metrics.pending_alerts, 4);
        assert_eq!(analytics.metrics.pending_alerts + terminal, alerts.len());
    }

    #[test]
    fn empty_inputs_produce_zeroes() {
        let analytics = aggregate(&[], &[], as_of());
        assert_eq!(analytics.metrics.total_active_members, 0);
        assert_eq!(analytics.metrics.average_attendance_rate, 0.0);
        assert_eq!(analytics.metrics.pending_alerts, 0);
        assert!(analytics.charts.alerts_by_status.is_empty());
        assert!(analytics.charts.stage_distribution.is_empty());
        assert_eq!(analytics.charts.new_members_last_6_months.len(), 6);
        assert!(analytics
            .charts
            .new_members_last_6_months
            .iter()
            .all(|m| m.count == 0));
    }

    #[test]
    fn attendance_rate_uses_thirty_day_window() {
        let mut recent = member(now() - Duration::days(400));
        recent.last_service_attendance = Some(now() - Duration::days(2));
        let mut boundary = member(now() - Duration::days(400));
        boundary.last_service_attendance = Some(now() - Duration::days(30));
        let mut lapsed = member(now() - Duration::days(400));
        lapsed.last_service_attendance = Some(now() - Duration::days(31));
        let never = member(now() - Duration::days(400));

        let analytics = aggregate(&[recent, boundary, lapsed, never], &[], as_of());
        assert!((analytics.metrics.average_attendance_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn attendance_rate_stays_in_unit_interval() {
        let members: Vec<MemberSnapshot> = (0..5)
            .map(|_| {
                let mut m = member(now());
                m.last_service_attendance = Some(now());
                m
            })
            .collect();
        let analytics = aggregate(&members, &[], as_of());
        assert_eq!(analytics.metrics.average_attendance_rate, 1.0);
    }

    #[test]
    fn baptisms_require_flag_and_date_in_year() {
        let mut counted = member(now());
        counted.baptized = true;
        counted.baptism_date = Some(ymd(2024, 1, 1));
        let mut not_baptized = member(now());
        not_baptized.baptism_date = Some(ymd(2024, 2, 4));
        let mut last_year = member(now());
        last_year.baptized = true;
        last_year.baptism_date = Some(ymd(2023, 12, 31));
        let mut no_date = member(now());
        no_date.baptized = true;
        let mut scheduled = member(now());
        scheduled.baptized = true;
        scheduled.baptism_date = Some(ymd(2024, 4, 7));

        let analytics = aggregate(
            &[counted, not_baptized, last_year, no_date, scheduled],
            &[],
            as_of(),
        );
        assert_eq!(analytics.metrics.baptisms_this_year, 1);
    }

    #[test]
    fn stage_distribution_defaults_to_unknown() {
        let stages = [Some("Growing"), None, Some("Leader"), Some("Growing"), None];
        let members: Vec<MemberSnapshot> = stages
            .iter()
            .map(|stage| {
                let mut m = member(now());
                m.discipleship_stage = stage.map(String::from);
                m
            })
            .collect();

        let analytics = aggregate(&members, &[], as_of());
        let map = &analytics.metrics.stage_distribution;
        assert_eq!(map["Growing"], 2);
        assert_eq!(map[UNKNOWN_STAGE], 2);
        assert_eq!(map["Leader"], 1);

        let names: Vec<&str> = analytics
            .charts
            .stage_distribution
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["Growing", UNKNOWN_STAGE, "Leader"]);
    }

    #[test]
    fn inactive_members_are_ignored() {
        let mut inactive = member(now());
        inactive.active = false;
        inactive.last_service_attendance = Some(now());
        let analytics = aggregate(&[inactive, member(now())], &[], as_of());
        assert_eq!(analytics.metrics.total_active_members, 1);
        assert_eq!(analytics.metrics.new_members_this_month, 1);
        assert_eq!(analytics.metrics.average_attendance_rate, 0.0);
    }

    #[test]
    fn six_month_trend_is_half_open_per_month() {
        let members = vec![
            member(Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()),
            member(Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()),
            member(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            member(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()),
            member(Utc.with_ymd_and_hms(2023, 9, 30, 23, 0, 0).unwrap()),
        ];
        let analytics = aggregate(&members, &[], as_of());
        let trend: Vec<(&str, usize)> = analytics
            .charts
            .new_members_last_6_months
            .iter()
            .map(|m| (m.month.as_str(), m.count))
            .collect();
        assert_eq!(
            trend,
            vec![
                ("Oct", 1),
                ("Nov", 0),
                ("Dec", 1),
                ("Jan", 1),
                ("Feb", 0),
                ("Mar", 1),
            ]
        );
    }

    #[test]
    fn same_inputs_serialize_identically() {
        let mut members: Vec<MemberSnapshot> = ["Seeker", "Mature", "Seeker", "Leader"]
            .into_iter()
            .map(|stage| {
                let mut m = member(now() - Duration::days(20));
                m.discipleship_stage = Some(stage.to_string());
                m
            })
            .collect();
        members[0].last_service_attendance = Some(now());
        let alerts = vec![alert(Some("escalated")), alert(None), alert(Some("closed"))];

        let first = serde_json::to_string(&aggregate(&members, &alerts, as_of())).unwrap();
        let second = serde_json::to_string(&aggregate(&members, &alerts, as_of())).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"newMembersLast6Months\""));
        assert!(first.contains("\"averageAttendanceRate\":0.25"));
    }

    #[derive(Default)]
    struct StubSource {
        members: Vec<MemberSnapshot>,
        alerts: Vec<AlertSnapshot>,
        failing: Option<SnapshotQuery>,
    }

    impl StubSource {
        fn fail_if(&self, query: SnapshotQuery) -> Result<(), sqlx::Error> {
            if self.failing == Some(query) {
                return Err(sqlx::Error::Protocol(format!("{query} query refused")));
            }
            Ok(())
        }
    }

    impl SnapshotSource for StubSource {
        async fn fetch_members(&self, _: ChurchId) -> Result<Vec<MemberSnapshot>, sqlx::Error> {
            self.fail_if(SnapshotQuery::Members)?;
            Ok(self.members.clone())
        }

        async fn fetch_alerts(&self, _: ChurchId) -> Result<Vec<AlertSnapshot>, sqlx::Error> {
            self.fail_if(SnapshotQuery::Alerts)?;
            Ok(self.alerts.clone())
        }

        async fn fetch_engagement(
            &self,
            _: ChurchId,
        ) -> Result<Vec<EngagementSnapshot>, sqlx::Error> {
            self.fail_if(SnapshotQuery::Engagement)?;
            Ok(Vec::new())
        }
    }

    fn church() -> ChurchId {
        ChurchId(Uuid::nil())
    }

    #[tokio::test]
    async fn computes_from_source() {
        let source = StubSource {
            members: vec![member(now()), member(now() - Duration::days(90))],
            alerts: vec![alert(Some("in_progress"))],
            ..Default::default()
        };
        let analytics = compute_dashboard_analytics(&source, church(), as_of())
            .await
            .unwrap();
        assert_eq!(analytics.metrics.total_active_members, 2);
        assert_eq!(analytics.metrics.pending_alerts, 1);
    }

    #[tokio::test]
    async fn alert_failure_aborts_whole_computation() {
        let source = StubSource {
            members: vec![member(now())],
            failing: Some(SnapshotQuery::Alerts),
            ..Default::default()
        };
        let err = compute_dashboard_analytics(&source, church(), as_of())
            .await
            .unwrap_err();
        assert_eq!(err.query, SnapshotQuery::Alerts);
        assert_eq!(err.church, church());
        assert!(err.to_string().contains("pastoral alerts"));
    }

    #[tokio::test]
    async fn member_failure_is_reported() {
        let source = StubSource {
            failing: Some(SnapshotQuery::Members),
            ..Default::default()
        };
        let err = compute_dashboard_analytics(&source, church(), as_of())
            .await
            .unwrap_err();
        assert_eq!(err.query, SnapshotQuery::Members);
    }
}
