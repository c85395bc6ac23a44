use std::fmt::Write;

use crate::calendar::AsOf;
use crate::models::{ChurchId, DashboardAnalytics, MemberStats};

pub fn build_report(
    church: ChurchId,
    as_of: AsOf,
    analytics: &DashboardAnalytics,
    stats: &MemberStats,
) -> String {
    let metrics = &analytics.metrics;
    let charts = &analytics.charts;
    let mut output = String::new();

    let _ = writeln!(output, "# Church Dashboard Report");
    let _ = writeln!(
        output,
        "Generated for church {} as of {} ({})",
        church,
        as_of.now.with_timezone(&as_of.tz).format("%Y-%m-%d %H:%M"),
        as_of.tz
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Active members: {}", metrics.total_active_members);
    let _ = writeln!(output, "- New this month: {}", metrics.new_members_this_month);
    let _ = writeln!(
        output,
        "- Attended in the last 30 days: {:.1}%",
        metrics.average_attendance_rate * 100.0
    );
    let _ = writeln!(output, "- Baptisms this year: {}", metrics.baptisms_this_year);
    let _ = writeln!(output, "- Pending alerts: {}", metrics.pending_alerts);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Discipleship Stages");

    if charts.stage_distribution.is_empty() {
        let _ = writeln!(output, "No active members recorded.");
    } else {
        let mut stages = charts.stage_distribution.clone();
        stages.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name)));
        for slice in &stages {
            let _ = writeln!(output, "- {}: {}", slice.name, slice.value);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## New Members, Last 6 Months");
    let _ = writeln!(output, "| Month | New members |");
    let _ = writeln!(output, "|---|---|");
    for month in &charts.new_members_last_6_months {
        let _ = writeln!(output, "| {} | {} |", month.month, month.count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Alerts by Status");

    if charts.alerts_by_status.is_empty() {
        let _ = writeln!(output, "No pastoral alerts recorded.");
    } else {
        for entry in &charts.alerts_by_status {
            let _ = writeln!(output, "- {}: {}", entry.status, entry.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement");
    let engagement = &stats.engagement;
    let _ = writeln!(
        output,
        "- High {} / Medium {} / Low {} / Inactive {}",
        engagement.high, engagement.medium, engagement.low, engagement.inactive
    );
    let _ = writeln!(
        output,
        "- Active in the last week: {} of {}",
        stats.recent_activity, stats.total
    );

    output
}
