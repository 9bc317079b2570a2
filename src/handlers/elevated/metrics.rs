// handlers/elevated/metrics.rs - GET /api/v1/metrics handler

use axum::{extract::State, Extension};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::filter::FilterData;
use crate::middleware::{ApiResponse, ApiResult, RequestContext};
use crate::queue::QueueStats;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DocumentCounts {
    pub organizations: u64,
    pub users: u64,
    pub tokens: u64,
    pub notifications: u64,
}

#[derive(Debug, Serialize)]
pub struct Metrics {
    pub started_utc: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub store: &'static str,
    pub mail_queue: QueueStats,
    pub bus_subscribers: usize,
    pub counts: DocumentCounts,
}

/// GET /api/v1/metrics - Queue statistics and document counts (global admin)
pub async fn metrics(State(state): State<AppState>, Extension(ctx): Extension<RequestContext>) -> ApiResult<Metrics> {
    ctx.require_global_admin()?;

    let all = FilterData::default();
    let (organizations, users, tokens, notifications) = futures::try_join!(
        state.organizations.count(&all),
        state.users.count(&all),
        state.tokens.count(&all),
        state.notifications.count(&all),
    )?;
    let counts = DocumentCounts {
        organizations: organizations.total,
        users: users.total,
        tokens: tokens.total,
        notifications: notifications.total,
    };

    Ok(ApiResponse::success(Metrics {
        started_utc: state.started_utc,
        uptime_seconds: (Utc::now() - state.started_utc).num_seconds(),
        store: state.store.name(),
        mail_queue: state.mail_queue.stats().await,
        bus_subscribers: state.bus.subscriber_count(),
        counts,
    }))
}
