/// Sandbox Dispatcher - Remote Execution Boundary
///
/// **Core Responsibility:**
/// Ship a generated harness to the sandbox service and hand back its raw
/// transcript.
///
/// **Critical Properties:**
/// - Exactly one outbound call per invocation. No retries: the sandbox runs its
///   own admission control, so the caller decides whether to retry.
/// - The caller's timeout bounds the whole call.
/// - A timeout reported *by the sandbox* is an error, not a transcript.
///
/// The wire contract is Piston's `POST /api/v2/execute`.

use async_trait::async_trait;
use dailybug_common::types::SandboxTranscript;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::DispatchError;
use crate::harness::{HarnessPayload, SourceFile};

/// Piston's status for a run stopped by its wall/cpu limit
const STATUS_TIMED_OUT: &str = "TO";
const SIGKILL: &str = "SIGKILL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub version: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<StageResult>,
    pub run: StageResult,
}

/// Remote code execution service
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        request: &ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteResponse, DispatchError>;
}

/// Piston-compatible HTTP sandbox client
#[derive(Debug, Clone)]
pub struct HttpSandbox {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSandbox {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, DispatchError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| DispatchError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl Sandbox for HttpSandbox {
    async fn execute(
        &self,
        request: &ExecuteRequest,
        timeout: Duration,
    ) -> Result<ExecuteResponse, DispatchError> {
        match tokio::time::timeout(timeout, self.post(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(DispatchError::Transport(e))) if e.is_timeout() => {
                Err(DispatchError::Timeout(timeout))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DispatchError::Timeout(timeout)),
        }
    }
}

/// Piston answers errors as `{"message": "..."}`; fall back to the raw body
fn rejection_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Build the wire request for a harness, primary file first
pub fn build_request(payload: &HarnessPayload, language_id: &str, version_id: &str) -> ExecuteRequest {
    ExecuteRequest {
        language: language_id.to_string(),
        version: version_id.to_string(),
        files: payload.files.clone(),
    }
}

/// Turn a sandbox response into a transcript.
///
/// A failed compile stage wins over the run stage. A stage without an exit
/// code (killed by a signal) maps to exit code -1.
pub fn into_transcript(response: ExecuteResponse) -> Result<SandboxTranscript, DispatchError> {
    let stage = match response.compile {
        Some(compile) if compile.code.unwrap_or(-1) != 0 => compile,
        _ => response.run,
    };

    if let Some(reason) = timeout_reason(&stage) {
        return Err(DispatchError::SandboxTimeout { reason });
    }

    // Sandbox-side kills (e.g. memory limit) only explain themselves in `message`
    let stderr = match stage.message {
        Some(message) if stage.stderr.trim().is_empty() => message,
        _ => stage.stderr,
    };

    Ok(SandboxTranscript {
        exit_code: stage.code.unwrap_or(-1),
        stdout: stage.stdout,
        stderr,
    })
}

fn timeout_reason(stage: &StageResult) -> Option<String> {
    if stage.status.as_deref() == Some(STATUS_TIMED_OUT) {
        return Some(
            stage
                .message
                .clone()
                .unwrap_or_else(|| "time limit exceeded".to_string()),
        );
    }
    // Bare SIGKILL only; an explicit status such as "SG" is a user-code failure
    if stage.status.is_none() && stage.code.is_none() && stage.signal.as_deref() == Some(SIGKILL) {
        return Some(format!("process killed by {}", SIGKILL));
    }
    None
}

/// Submit a harness to the sandbox and return its transcript
#[instrument(skip(sandbox, payload), fields(language = language_id, version = version_id, entry_point = %payload.entry_point))]
pub async fn dispatch(
    sandbox: &dyn Sandbox,
    payload: &HarnessPayload,
    language_id: &str,
    version_id: &str,
    timeout: Duration,
) -> Result<SandboxTranscript, DispatchError> {
    let request = build_request(payload, language_id, version_id);
    debug!(
        files = request.files.len(),
        timeout_ms = timeout.as_millis() as u64,
        "Dispatching harness"
    );

    let start = Instant::now();
    let response = match sandbox.execute(&request, timeout).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, elapsed_ms = start.elapsed().as_millis() as u64, "Sandbox call failed");
            return Err(e);
        }
    };

    let transcript = into_transcript(response)?;
    info!(
        exit_code = transcript.exit_code,
        stdout_bytes = transcript.stdout.len(),
        stderr_bytes = transcript.stderr.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Sandbox run finished"
    );
    Ok(transcript)
}
