mod dashboard;

use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use piforge_proto::{
    ServiceStatus,
    msg::{HealthResp, MetricsResp},
};

use crate::{AppState, counters::Endpoint};

pub use dashboard::dashboard;

pub const PATH_STATUS: &str = "/api/status";
pub const PATH_HEALTHZ: &str = "/healthz";
pub const PATH_METRICS: &str = "/api/metrics";

/// Counts every plain HTTP request before it is dispatched, so the metrics
/// endpoint includes the request it is answering.
pub async fn count_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    state.counters.record_request();
    next.run(req).await
}

pub async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    state.counters.hit(Endpoint::ApiStatus);
    Json(state.identity.as_ref().clone())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResp> {
    state.counters.hit(Endpoint::Healthz);
    Json(HealthResp {
        ok: true,
        uptime_ms: state.uptime_ms(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResp> {
    state.counters.hit(Endpoint::ApiMetrics);
    Json(MetricsResp {
        uptime_ms: state.uptime_ms(),
        request_count: state.counters.total(),
        endpoints: state.counters.endpoints(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::app;

    fn test_app() -> (AppState, Router) {
        let state = AppState::new(ServiceStatus::default(), "does-not-exist.html");
        (state.clone(), app(state))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn status_reports_service_identity() {
        let (_, app) = test_app();
        let (status, body) = get_json(&app, PATH_STATUS).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "status": "online",
                "service": "Quantum Pi Forge",
                "engine": "Gargoura Active",
                "network": "Pi Mainnet",
            })
        );
    }

    #[tokio::test]
    async fn status_is_json() {
        let (_, app) = test_app();
        let req = Request::builder()
            .uri(PATH_STATUS)
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();

        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn healthz_uptime_never_decreases() {
        let (_, app) = test_app();

        let (status, first) = get_json(&app, PATH_HEALTHZ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["ok"], true);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let (_, second) = get_json(&app, PATH_HEALTHZ).await;
        assert_eq!(second["ok"], true);
        assert!(second["uptime_ms"].as_u64().unwrap() >= first["uptime_ms"].as_u64().unwrap());
    }

    #[tokio::test]
    async fn metrics_count_includes_current_request() {
        let (_, app) = test_app();

        let (_, first) = get_json(&app, PATH_METRICS).await;
        assert_eq!(first["request_count"], 1);
        assert_eq!(first["endpoints"]["/api/metrics"], 1);

        let (_, second) = get_json(&app, PATH_METRICS).await;
        assert_eq!(second["request_count"], 2);
    }

    #[tokio::test]
    async fn metrics_tracks_every_endpoint() {
        let (state, app) = test_app();

        get_json(&app, PATH_STATUS).await;
        get_json(&app, PATH_HEALTHZ).await;
        get_json(&app, PATH_HEALTHZ).await;
        // falls through to the (missing) dashboard
        let req = Request::builder()
            .uri("/nowhere")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(req).await.unwrap();

        let (_, metrics) = get_json(&app, PATH_METRICS).await;
        assert_eq!(metrics["request_count"], 5);
        assert_eq!(
            metrics["endpoints"],
            serde_json::json!({"/api/status": 1, "/healthz": 2, "/api/metrics": 1, "/": 1})
        );
        assert_eq!(state.counters.total(), 5);
    }

    #[tokio::test]
    async fn routes_answer_any_method() {
        let (_, app) = test_app();
        let req = Request::builder()
            .method(Method::POST)
            .uri(PATH_HEALTHZ)
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn query_string_does_not_defeat_route() {
        let (_, app) = test_app();
        let (status, body) = get_json(&app, "/healthz?verbose=1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }
}
