use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::database::models::LogEvent;
use crate::database::repository::{FindResults, Repository};
use crate::database::DatabaseError;
use crate::filter::FilterData;

/// Default window: three days back, fifteen minutes ahead for clock skew
pub fn default_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (
        start.unwrap_or(now - Duration::days(3)),
        end.unwrap_or(now + Duration::minutes(15)),
    )
}

fn within(document: &Value, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    document
        .get("created_utc")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc))
        .is_some_and(|at| at >= start && at <= end)
}

impl Repository<LogEvent> {
    /// Newest first. `organization_id` of `None` spans every organization.
    pub async fn entries(
        &self,
        organization_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        filter: FilterData,
    ) -> Result<FindResults<LogEvent>, DatabaseError> {
        let (start, end) = default_window(start, end);
        let pattern = match organization_id {
            Some(id) => json!({ "organization_id": id }),
            None => json!({}),
        };
        let filter = filter.with_pattern(pattern).with_sort("-created_utc");
        self.select_any_where(&filter, |d| within(d, start, end)).await
    }

    /// Writes an audit entry; failures are logged, never surfaced
    pub async fn record(&self, event: LogEvent) {
        if let Err(e) = self.add(event).await {
            tracing::warn!("Unable to write audit log entry: {}", e);
        }
    }
}
