//! HTTP API over the prediction engine.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use penguin_ai::{PredictError, PredictionEngine};
use penguin_core::FeatureRecord;
use penguin_store::ArtifactStore;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

pub type Engine = PredictionEngine<ArtifactStore>;

pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .route("/health", get(health))
        .with_state(engine)
}

/// Error response rendered as `{"detail": ...}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        if e.is_client_error() {
            Self::new(StatusCode::BAD_REQUEST, e.to_string())
        } else {
            Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prediction failed: {e}"),
            )
        }
    }
}

#[derive(Serialize)]
struct PredictResponse {
    species: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    loaded: bool,
    source: Option<&'static str>,
    loaded_at: Option<String>,
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Penguin Species Prediction API" }))
}

async fn predict(
    State(engine): State<Engine>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let text = std::str::from_utf8(&body).map_err(|_| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "request body is not valid UTF-8")
    })?;
    let record = FeatureRecord::from_json(text).map_err(|e| {
        warn!(error = %e, "rejected request");
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })?;

    let species = engine.predict(&record).await?;
    info!(species = %species, island = %record.island, sex = %record.sex, "predicted species");
    Ok(Json(PredictResponse { species }))
}

async fn health(State(engine): State<Engine>) -> Json<HealthResponse> {
    let status = engine.provider().status();
    Json(HealthResponse {
        status: "ok",
        loaded: status.loaded,
        source: status.source.map(|s| s.as_str()),
        loaded_at: status.loaded_at.map(|t| t.to_rfc3339()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use penguin_store::{RemoteConfig, StoreConfig};
    use penguin_sync::{FetchError, ObjectFetcher};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn fixtures() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
    }

    struct NoRemote;

    #[async_trait]
    impl ObjectFetcher for NoRemote {
        async fn fetch(&self, _: &str, object: &str, _: &Path) -> Result<PathBuf, FetchError> {
            Err(FetchError::Server {
                status: 404,
                body: format!("no such object: {object}"),
            })
        }
    }

    fn engine_for(dir: PathBuf, remote: RemoteConfig) -> Engine {
        let config = StoreConfig {
            model_dir: dir,
            remote,
            ..StoreConfig::default()
        };
        PredictionEngine::new(Arc::new(ArtifactStore::new(config, Arc::new(NoRemote))))
    }

    fn app() -> Router {
        router(engine_for(fixtures(), RemoteConfig::default()))
    }

    fn sample() -> Value {
        json!({
            "bill_length_mm": 39.1,
            "bill_depth_mm": 18.7,
            "flipper_length_mm": 181,
            "body_mass_g": 3750,
            "year": 2007,
            "sex": "Female",
            "island": "Biscoe"
        })
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_predict(app: Router, body: &Value) -> (StatusCode, Value) {
        let req = Request::post("/predict")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(app, req).await
    }

    #[tokio::test]
    async fn root_message() {
        let req = Request::get("/").body(Body::empty()).unwrap();
        let (status, body) = send(app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Penguin Species Prediction API"}));
    }

    #[tokio::test]
    async fn predicts_valid_input() {
        let (status, body) = post_predict(app(), &sample()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"species": "Adelie"}));
    }

    #[tokio::test]
    async fn float_year_is_accepted() {
        let mut s = sample();
        s["year"] = json!(2007.0);
        let (status, body) = post_predict(app(), &s).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"species": "Adelie"}));
    }

    #[tokio::test]
    async fn missing_field_is_422() {
        let mut s = sample();
        s.as_object_mut().unwrap().remove("bill_length_mm");
        let (status, body) = post_predict(app(), &s).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("bill_length_mm"));
    }

    #[tokio::test]
    async fn wrong_type_is_422() {
        let mut s = sample();
        s["bill_length_mm"] = json!("not-a-number");
        let (status, _) = post_predict(app(), &s).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn negative_mass_is_422() {
        let mut s = sample();
        s["body_mass_g"] = json!(-50);
        let (status, body) = post_predict(app(), &s).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("body_mass_g"));
    }

    #[tokio::test]
    async fn unknown_enum_value_is_422() {
        let mut s = sample();
        s["sex"] = json!("Other");
        let (status, _) = post_predict(app(), &s).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn empty_body_is_422() {
        let (status, _) = post_predict(app(), &json!({})).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unseen_island_is_400() {
        let dir = TempDir::new().unwrap();
        std::fs::copy(fixtures().join("model.json"), dir.path().join("model.json")).unwrap();
        std::fs::write(
            dir.path().join("encoder_info.json"),
            json!({
                "encoder_info": {"sex": ["Female", "Male"], "island": ["Biscoe", "Dream"]},
                "label_encoder": {"classes": ["Adelie", "Chinstrap", "Gentoo"]}
            })
            .to_string(),
        )
        .unwrap();
        let app = router(engine_for(dir.path().to_path_buf(), RemoteConfig::default()));

        let mut s = sample();
        s["sex"] = json!("Male");
        s["island"] = json!("Torgersen");
        let (status, body) = post_predict(app, &s).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["detail"],
            r#"Invalid island: Torgersen. Must be one of ["Biscoe", "Dream"]"#
        );
    }

    #[tokio::test]
    async fn missing_artifacts_are_500() {
        let dir = TempDir::new().unwrap();
        let app = router(engine_for(dir.path().to_path_buf(), RemoteConfig::default()));
        let (status, body) = post_predict(app, &sample()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body["detail"].as_str().unwrap();
        assert!(detail.starts_with("Prediction failed:"), "{detail}");
        assert!(detail.contains("GCS_BUCKET_NAME"), "{detail}");
    }

    #[tokio::test]
    async fn failed_remote_fetch_is_500() {
        let dir = TempDir::new().unwrap();
        let remote = RemoteConfig {
            bucket: Some("penguins".into()),
            model_object: Some("model.json".into()),
            encoder_object: Some("encoder_info.json".into()),
        };
        let app = router(engine_for(dir.path().to_path_buf(), remote));
        let (status, body) = post_predict(app, &sample()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn health_reports_load_state() {
        let engine = engine_for(fixtures(), RemoteConfig::default());
        let app = router(engine.clone());

        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["loaded"], false);
        assert!(body["source"].is_null());

        engine.provider().ensure_loaded().await.unwrap();
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (_, body) = send(app, req).await;
        assert_eq!(body["loaded"], true);
        assert_eq!(body["source"], "local");
        assert!(body["loaded_at"].is_string());
    }
}
