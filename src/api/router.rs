//! API router.
//!
//! Returns a composable `Router` with every route and the CORS layer applied.

use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, CorsLayer};

use crate::api::endpoints;
use crate::api::types::ApiContext;

/// Browsers may cache a preflight answer this long.
const CORS_MAX_AGE_SECS: u64 = 3600;

/// Build the API router.
pub fn api_router(ctx: ApiContext) -> Router {
    let cors = cors_layer(&ctx.config.cors_origins);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/analyze", post(endpoints::analyze::analyze))
        .route("/emr/save", post(endpoints::emr::save))
        .route("/emr/patients", get(endpoints::emr::patients))
        .route(
            "/emr/patients/:patient_id",
            delete(endpoints::emr::delete_patient),
        )
        .route("/emr/records/:patient_id", get(endpoints::emr::records))
        .with_state(ctx)
        .layer(cors)
}

/// Credentialed CORS for the configured origins. Unparseable origins are
/// dropped with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::types::test_support::{test_context, test_context_with};
    use crate::pipeline::analysis::{AnalysisError, MockLlmClient};

    const MODEL_REPLY: &str = r#"```json
{
  'Patient': {'name': {'text': 'Jane Roe'}, 'birth_date': '1985-07-02', 'gender': 'female'},
  'Encounter': {'status': 'finished', 'class': 'AMB', 'type': 'visit', 'reason_text': 'poor sleep'},
  'Condition': {'code': {'text': 'insomnia'}, 'severity': 'mild'},
  'Observation': [{'code': {'text': 'sleep'}, 'value_string': 'four hours a night'}],
  'MedicationStatement': [],
}
```"#;

    const DIALOGUE: &str = "Doctor: How have you been sleeping?\nPatient: Only four hours a night.";

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn save_body(identifier: &str, analysis: Value) -> Value {
        json!({
            "patient_identifier": identifier,
            "patient_name": "Jane Roe",
            "patient_birth_date": "1985-07-02",
            "patient_gender": "female",
            "conversation_text": DIALOGUE,
            "llm_analysis_result": analysis,
        })
    }

    #[tokio::test]
    async fn health_reports_version() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), "{}"));
        let (status, json) = send(app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::config::APP_VERSION);
    }

    #[tokio::test]
    async fn analyze_returns_repaired_and_stamped_record() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let (status, json) = send(app, post_json("/analyze", json!({"text": DIALOGUE}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["Condition"]["code"]["text"], "insomnia");
        assert!(json["Encounter"]["period"]["start"].is_string());
        assert!(json["Observation"][0]["effective_datetime"].is_string());
        assert_eq!(json["MedicationStatement"], json!([]));
    }

    #[tokio::test]
    async fn analyze_unparseable_reply_returns_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), "I cannot help with that."));
        let (status, json) = send(app, post_json("/analyze", json!({"text": DIALOGUE}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["Condition"]["code"]["text"], "needs consultation");
    }

    #[tokio::test]
    async fn analyze_short_text_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let (status, json) = send(app, post_json("/analyze", json!({"text": "hi"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn analyze_model_unreachable_is_502() {
        let dir = tempfile::tempdir().unwrap();
        let llm = MockLlmClient::new(MODEL_REPLY).with_script(vec![
            Err(AnalysisError::LlmConnection("x".into())),
            Err(AnalysisError::LlmConnection("x".into())),
            Err(AnalysisError::LlmConnection("x".into())),
        ]);
        let app = api_router(test_context_with(dir.path(), llm));
        let (status, json) = send(app, post_json("/analyze", json!({"text": DIALOGUE}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "LLM_UNAVAILABLE");
    }

    #[tokio::test]
    async fn analyze_malformed_body_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let (status, json) = send(app, post_json("/analyze", json!({"dialogue": DIALOGUE}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn save_then_list_then_fetch_records() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), MODEL_REPLY);
        let analysis = json!({
            "Encounter": {"reason_text": "poor sleep"},
            "Condition": {"code": {"text": "insomnia"}},
            "Observation": [{"code": {"text": "sleep"}, "value_string": "short"}],
            "MedicationStatement": []
        });

        let (status, saved) = send(
            api_router(ctx.clone()),
            post_json("/emr/save", save_body("MRN-1", analysis)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved["message"], "EMR record saved");
        let patient_id = saved["patient_id"].as_str().unwrap().to_string();

        let (status, patients) = send(api_router(ctx.clone()), get("/emr/patients")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patients.as_array().unwrap().len(), 1);
        assert_eq!(patients[0]["identifier"], "MRN-1");

        let (status, records) =
            send(api_router(ctx), get(&format!("/emr/records/{patient_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(records[0]["encounter"]["id"], saved["encounter_id"]);
        assert_eq!(records[0]["conditions"][0]["code"]["text"], "insomnia");
        assert_eq!(records[0]["conversation"]["participants"]["patient"], "Jane Roe");
    }

    #[tokio::test]
    async fn save_with_bad_birth_date_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let mut body = save_body("MRN-1", json!({}));
        body["patient_birth_date"] = json!("July 2nd");
        let (status, _) = send(app, post_json("/emr/save", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn records_for_unknown_patient_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let uri = format!("/emr/records/{}", uuid::Uuid::new_v4());
        let (status, json) = send(app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn records_with_malformed_id_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let (status, _) = send(app, get("/emr/records/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_patient_then_records_gone() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path(), MODEL_REPLY);
        let (_, saved) = send(
            api_router(ctx.clone()),
            post_json("/emr/save", save_body("MRN-9", json!({}))),
        )
        .await;
        let uri = format!("/emr/patients/{}", saved["patient_id"].as_str().unwrap());

        let delete = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(api_router(ctx.clone()), delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let again = Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(api_router(ctx), again).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/emr/save")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(headers.get("access-control-allow-credentials").unwrap(), "true");
    }

    #[tokio::test]
    async fn cors_rejects_unknown_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = api_router(test_context(dir.path(), MODEL_REPLY));
        let request = Request::builder()
            .uri("/health")
            .header("origin", "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }
}
