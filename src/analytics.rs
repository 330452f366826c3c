use std::sync::Arc;

use axum::Extension;

use crate::db::StudentRepository;
use crate::models::Analytics;
use crate::{proceeds, AppState, Error, Payload};

pub const RECENT_LIMIT: i64 = 5;

pub async fn summarize(students: &StudentRepository) -> Result<Analytics, Error> {
    Ok(Analytics {
        total: students.count().await?,
        average_by_subject: students.averages_by_subject().await?,
        recent: students.recent(RECENT_LIMIT).await?,
    })
}

pub async fn read_analytics(Extension(state): Extension<Arc<AppState>>) -> Payload<Analytics> {
    proceeds(summarize(&state.students).await?)
}
