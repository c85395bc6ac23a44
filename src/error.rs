use std::fmt;

use thiserror::Error;

use crate::models::ChurchId;

/// Which snapshot read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotQuery {
    Members,
    Alerts,
    Engagement,
}

impl fmt::Display for SnapshotQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnapshotQuery::Members => "members",
            SnapshotQuery::Alerts => "pastoral alerts",
            SnapshotQuery::Engagement => "member engagement",
        })
    }
}

#[derive(Debug, Error)]
#[error("failed to load {query} for church {church}")]
pub struct DataSourceError {
    pub query: SnapshotQuery,
    pub church: ChurchId,
    #[source]
    pub source: sqlx::Error,
}

impl DataSourceError {
    pub fn new(query: SnapshotQuery, church: ChurchId, source: sqlx::Error) -> Self {
        Self {
            query,
            church,
            source,
        }
    }
}
