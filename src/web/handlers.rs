//! HTTP request handlers.

use super::AppState;
use crate::config::{BotConfig, DisplayMode};
use crate::scheduler::{SchedulerError, TargetSnapshot, TargetState};

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let ctx = state.scheduler.context();
    Json(json!({
        "status": "ok",
        "targets": state.scheduler.targets().len(),
        "messages": ctx.reconciler().handle_count(),
        "channels_with_history": ctx.history().channel_count(),
    }))
}

// ============================================================================
// API: Targets
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TargetView {
    pub name: String,
    pub address: String,
    pub channel_id: String,
    pub update_interval_secs: u64,
    pub display: DisplayMode,
    pub state: TargetState,
    pub history_samples: usize,
    pub message_id: Option<String>,
    pub last: Option<TargetSnapshot>,
}

pub async fn handle_get_targets(State(state): State<AppState>) -> impl IntoResponse {
    let scheduler = &state.scheduler;
    let ctx = scheduler.context();

    let views: Vec<TargetView> = scheduler
        .targets()
        .iter()
        .map(|t| TargetView {
            name: t.name.clone(),
            address: t.address.clone(),
            channel_id: t.channel_id.clone(),
            update_interval_secs: t.update_interval_secs,
            display: t.display,
            state: scheduler.state(&t.name),
            history_samples: ctx.history().snapshot(&t.channel_id).len(),
            message_id: ctx.reconciler().handle(&t.channel_id).map(|h| h.message_id),
            last: ctx.snapshot(&t.name),
        })
        .collect();

    Json(views)
}

pub async fn handle_status(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.scheduler.query_once(&name).await {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_chart(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.scheduler.chart(&name) {
        Ok(Some(png)) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not enough history for a chart").into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_reply(
    State(state): State<AppState>,
    Path((name, channel_id)): Path<(String, String)>,
) -> Response {
    match state.scheduler.reply_once(&name, &channel_id).await {
        Ok(handle) => (StatusCode::CREATED, Json(handle)).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Control
// ============================================================================

pub async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.tick_all().await)
}

pub async fn handle_reload(State(state): State<AppState>) -> Response {
    let cfg = match BotConfig::from_file(&state.config_path).and_then(|c| c.validate().map(|_| c)) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Reload rejected: {}", e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let count = cfg.targets.len();
    state.scheduler.reload(cfg.targets);
    tracing::info!("Reloaded {} targets from {}", count, state.config_path.display());

    Json(json!({ "targets": count })).into_response()
}

fn error_response(e: SchedulerError) -> Response {
    let status = match &e {
        SchedulerError::UnknownTarget(_) | SchedulerError::DestinationUnavailable(_) => StatusCode::NOT_FOUND,
        SchedulerError::Chat(_) => StatusCode::BAD_GATEWAY,
        SchedulerError::Chart(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tests::{context, target, FakeChat, FakeProbe};
    use crate::scheduler::Scheduler;
    use axum::body::to_bytes;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn state(probe: Arc<FakeProbe>, chat: Arc<FakeChat>) -> AppState {
        AppState {
            scheduler: Arc::new(Scheduler::new(context(probe, chat), vec![target("alpha", "100")])),
            config_path: PathBuf::from("does-not-exist.toml"),
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_and_unknown_target() {
        let probe = Arc::new(FakeProbe::default());
        probe.set("alpha.example.net", Ok((4, 16)));
        let state = state(probe, Arc::new(FakeChat::default()));

        let resp = handle_status(State(state.clone()), Path("alpha".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["title"], "alpha");
        assert_eq!(body["status_line"], "🟢 Online");

        let resp = handle_status(State(state), Path("nope".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chart_needs_two_samples() {
        let state = state(Arc::new(FakeProbe::default()), Arc::new(FakeChat::default()));

        let resp = handle_chart(State(state.clone()), Path("alpha".to_string())).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let history = state.scheduler.context().history();
        history.record("100", 3, 24, t0);
        history.record("100", 6, 24, t0 + ChronoDuration::hours(1));

        let resp = handle_chart(State(state), Path("alpha".to_string())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn test_reply_and_refresh() {
        let probe = Arc::new(FakeProbe::default());
        probe.set("alpha.example.net", Ok((1, 8)));
        let chat = Arc::new(FakeChat::default());
        let state = state(probe, chat.clone());

        let resp = handle_reply(State(state.clone()), Path(("alpha".to_string(), "555".to_string()))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["channel_id"], "555");

        let resp = handle_refresh(State(state.clone())).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["outcome"]["outcome"], "created");

        let resp = handle_get_targets(State(state.clone())).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body[0]["name"], "alpha");
        assert_eq!(body[0]["history_samples"], 1);
        assert_eq!(body[0]["last"]["result"]["state"], "online");
        assert_eq!(body[0]["message_id"], "m1");
        assert_eq!(chat.sent_count(), 2);

        let resp = handle_health(State(state)).await.into_response();
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["messages"], 1);
    }

    #[tokio::test]
    async fn test_reload() {
        let mut state = state(Arc::new(FakeProbe::default()), Arc::new(FakeChat::default()));

        let resp = handle_reload(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[bot]
token = "abc"

[[targets]]
name = "beta"
address = "beta.example.net:25570"
channel_id = "200"
"#
        )
        .unwrap();
        state.config_path = file.path().to_path_buf();

        let resp = handle_reload(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["targets"], 1);

        let names: Vec<String> = state.scheduler.targets().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["beta".to_string()]);
        assert_eq!(state.scheduler.state("beta"), TargetState::Scheduled);
        tokio_test::assert_ok!(state.scheduler.target("beta"));
    }
}
