// HTTP route handlers for the dailybug API

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use dailybug_common::types::Language;
use dailybug_grader::{GradeError, ProblemError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

/// Submissions above this size are rejected before any work is done
const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub user_code: String,
    pub language: String,
}

/// Error body: `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn outcome_label(&self) -> &'static str {
        match self.status {
            StatusCode::BAD_REQUEST => "rejected",
            StatusCode::GATEWAY_TIMEOUT => "sandbox_timeout",
            StatusCode::BAD_GATEWAY => "sandbox_failed",
            StatusCode::NOT_FOUND => "no_problem",
            _ => "internal_error",
        }
    }
}

impl From<ProblemError> for ApiError {
    fn from(e: ProblemError) -> Self {
        match e {
            ProblemError::NoProblemFound => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<GradeError> for ApiError {
    fn from(e: GradeError) -> Self {
        match e {
            GradeError::Generation(e) => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            GradeError::Dispatch(e) if e.is_timeout() => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, e.to_string())
            }
            GradeError::Dispatch(e) => Self::new(StatusCode::BAD_GATEWAY, e.to_string()),
            GradeError::Problem(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// GET /problem - Today's problem, solution stripped
pub async fn get_problem(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    match state.problems.today().await {
        Ok(problem) => {
            info!(problem_id = %problem.id, "Problem served");
            Ok(Json(problem.public()))
        }
        Err(e) => {
            error!(error = %e, "Failed to load today's problem");
            Err(e.into())
        }
    }
}

/// POST /run - Grade a submission against today's problem
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> Response {
    let run_id = Uuid::new_v4();
    let start = Instant::now();
    let language_label = payload
        .language
        .parse::<Language>()
        .map(|l| l.as_str())
        .unwrap_or("unknown");

    let outcome = grade(&state, &payload, run_id).await;
    let elapsed = start.elapsed().as_secs_f64();

    match outcome {
        Ok(result) => {
            let label = if result.is_completed() { "completed" } else { "error" };
            metrics::record_grading(language_label, label, elapsed);
            (StatusCode::OK, Json(result)).into_response()
        }
        Err(e) => {
            metrics::record_grading(language_label, e.outcome_label(), elapsed);
            e.into_response()
        }
    }
}

async fn grade(
    state: &AppState,
    payload: &RunRequest,
    run_id: Uuid,
) -> Result<dailybug_common::types::GradingResult, ApiError> {
    if payload.user_code.len() > MAX_SOURCE_CODE_BYTES {
        warn!(run_id = %run_id, size = payload.user_code.len(), "Submission too large");
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("source code exceeds maximum size of {} bytes", MAX_SOURCE_CODE_BYTES),
        ));
    }

    let problem = state.problems.today().await.map_err(|e| {
        error!(run_id = %run_id, error = %e, "Failed to load today's problem");
        ApiError::from(e)
    })?;

    info!(
        run_id = %run_id,
        problem_id = %problem.id,
        language = %payload.language,
        source_size = payload.user_code.len(),
        "Submission received"
    );

    match state
        .grader
        .grade(&problem, &payload.language, &payload.user_code)
        .await
    {
        Ok(result) => {
            info!(
                run_id = %run_id,
                status = ?result.status,
                passed = result.summary.passed,
                total = result.summary.total,
                "Submission graded"
            );
            Ok(result)
        }
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Grading failed");
            Err(e.into())
        }
    }
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus exposition
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes;
    use async_trait::async_trait;
    use chrono::Utc;
    use dailybug_common::config::LanguageConfigManager;
    use dailybug_common::types::{Problem, TestCase};
    use dailybug_grader::dispatcher::{ExecuteRequest, ExecuteResponse, StageResult};
    use dailybug_grader::{DispatchError, Grader, ProblemCache, ProblemStore, Sandbox};
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct StaticStore(Vec<Problem>);

    #[async_trait]
    impl ProblemStore for StaticStore {
        async fn load_all(&self) -> Result<Vec<Problem>, ProblemError> {
            Ok(self.0.clone())
        }
    }

    /// Answers every request with the same run stage, or fails it
    struct CannedSandbox(Option<StageResult>);

    #[async_trait]
    impl Sandbox for CannedSandbox {
        async fn execute(
            &self,
            _request: &ExecuteRequest,
            timeout: Duration,
        ) -> Result<ExecuteResponse, DispatchError> {
            match &self.0 {
                Some(run) => Ok(ExecuteResponse {
                    compile: None,
                    run: run.clone(),
                }),
                None => Err(DispatchError::Timeout(timeout)),
            }
        }
    }

    fn problem() -> Problem {
        let mut starting_code = BTreeMap::new();
        starting_code.insert("python".to_string(), "def add(a, b):\n    pass\n".to_string());
        Problem {
            id: "add".to_string(),
            date_published: Utc::now(),
            starting_code,
            test_cases: vec![TestCase {
                input: json!([2, 3]),
                expected: json!(5),
                description: None,
            }],
            issues: Vec::new(),
            entry_point: None,
            solution: "def add(a, b):\n    return a + b\n".to_string(),
        }
    }

    fn completed_run() -> StageResult {
        StageResult {
            code: Some(0),
            stdout: json!({
                "status": "completed",
                "outcomes": [{"index": 0, "input": [2, 3], "expected": 5, "actual": 5, "passed": true}],
                "summary": {"total": 1, "passed": 1, "failed": 0}
            })
            .to_string(),
            ..Default::default()
        }
    }

    async fn serve(problems: Vec<Problem>, run: Option<StageResult>) -> String {
        let state = Arc::new(AppState {
            grader: Grader::new(
                Arc::new(CannedSandbox(run)),
                LanguageConfigManager::builtin(),
                Duration::from_secs(1),
            ),
            problems: ProblemCache::new(Arc::new(StaticStore(problems)), Duration::from_secs(60)),
        });
        let app = routes::routes().with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn post_run(base: &str, body: Value) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/run", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_get_problem_strips_solution() {
        let base = serve(vec![problem()], Some(completed_run())).await;
        let body: Value = reqwest::get(format!("{}/problem", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["id"], "add");
        assert!(body.get("solution").is_none());
        assert_eq!(body["testCases"][0]["expected"], 5);
    }

    #[tokio::test]
    async fn test_get_problem_not_found() {
        let base = serve(vec![], Some(completed_run())).await;
        let response = reqwest::get(format!("{}/problem", base)).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "no problem found");
    }

    #[tokio::test]
    async fn test_run_returns_grading_result() {
        let base = serve(vec![problem()], Some(completed_run())).await;
        let (status, body) = post_run(
            &base,
            json!({"userCode": "def add(a,b): return a+b", "language": "python"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["summary"]["passed"], 1);
        assert_eq!(body["allIssuesFixed"], true);
    }

    #[tokio::test]
    async fn test_run_reports_user_code_errors_as_results() {
        let load_failure = StageResult {
            code: Some(2),
            stdout: r#"{"status": "error", "message": "Error in user code", "details": "SyntaxError"}"#.to_string(),
            ..Default::default()
        };
        let base = serve(vec![problem()], Some(load_failure)).await;
        let (status, body) = post_run(
            &base,
            json!({"userCode": "def add(a,b) return", "language": "python"}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Error in user code");
        assert_eq!(body["outcomes"], json!([]));
    }

    #[tokio::test]
    async fn test_run_unsupported_language() {
        let base = serve(vec![problem()], Some(completed_run())).await;
        let (status, body) =
            post_run(&base, json!({"userCode": "x", "language": "fortran"})).await;
        assert_eq!(status, 400);
        assert!(body["error"].as_str().unwrap().contains("unsupported language"));
    }

    #[tokio::test]
    async fn test_run_sandbox_timeout() {
        let base = serve(vec![problem()], None).await;
        let (status, body) = post_run(
            &base,
            json!({"userCode": "def add(a,b): return a+b", "language": "python"}),
        )
        .await;
        assert_eq!(status, 504);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_run_without_problem() {
        let base = serve(vec![], Some(completed_run())).await;
        let (status, _) = post_run(&base, json!({"userCode": "x", "language": "python"})).await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_status_and_metrics() {
        let base = serve(vec![problem()], Some(completed_run())).await;
        let status = reqwest::get(format!("{}/status", base)).await.unwrap();
        assert_eq!(status.text().await.unwrap(), "OK");

        post_run(&base, json!({"userCode": "def add(a,b): return a+b", "language": "python"})).await;
        let text = reqwest::get(format!("{}/metrics", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("dailybug_grading_requests_total"));
    }

    #[test]
    fn test_error_status_mapping() {
        use dailybug_grader::GenerationError;

        let e: ApiError = GradeError::Generation(GenerationError::InvalidEntryPoint("1x".into())).into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e: ApiError = GradeError::Dispatch(DispatchError::Rejected {
            status: 500,
            message: "down".into(),
        })
        .into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);

        let e: ApiError = GradeError::Dispatch(DispatchError::SandboxTimeout {
            reason: "TO".into(),
        })
        .into();
        assert_eq!(e.status, StatusCode::GATEWAY_TIMEOUT);

        let e: ApiError = ProblemError::Io {
            path: "x".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        }
        .into();
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
