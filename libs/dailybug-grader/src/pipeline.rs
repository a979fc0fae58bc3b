/// Grader - Pipeline Orchestration
///
/// **Responsibility:**
/// Run one submission through generate → dispatch → interpret.
///
/// This module is the glue layer. It knows nothing about:
/// - How harnesses are written (harness's job)
/// - How the sandbox is reached (dispatcher's job)
/// - How output is judged (interpreter's job)

use dailybug_common::config::{LanguageConfig, LanguageConfigManager};
use dailybug_common::types::{GradingResult, Problem};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

use crate::dispatcher::{dispatch, Sandbox};
use crate::error::{GenerationError, GradeError};
use crate::harness::{self, HarnessPayload};
use crate::interpreter::interpret_with;
use crate::issues::IssueKeywordTable;

/// Configuration for a client-submitted language name, if it is both
/// supported and configured
pub fn resolve_language<'a>(
    languages: &'a LanguageConfigManager,
    language: &str,
) -> Result<&'a LanguageConfig, GenerationError> {
    let strategy = harness::strategy_by_name(language)?;
    languages
        .get_config(strategy.language())
        .ok_or_else(|| GenerationError::UnsupportedLanguage(language.to_string()))
}

/// Build the harness for a submission without running it. Entry point:
/// the problem's explicit one, then the template's, then the fallback name.
pub fn prepare_harness(
    languages: &LanguageConfigManager,
    problem: &Problem,
    language: &str,
    user_code: &str,
) -> Result<HarnessPayload, GenerationError> {
    let config = resolve_language(languages, language)?;
    let strategy = harness::strategy_for(config.name);
    let entry_point = harness::resolve_entry_point(
        strategy,
        problem.entry_point.as_deref(),
        problem.template_for(config.name),
    )?;
    harness::generate(config.name, user_code, &entry_point, &problem.test_cases)
}

#[derive(Clone)]
pub struct Grader {
    sandbox: Arc<dyn Sandbox>,
    languages: LanguageConfigManager,
    timeout: Duration,
    extra_rules: IssueKeywordTable,
}

impl Grader {
    pub fn new(sandbox: Arc<dyn Sandbox>, languages: LanguageConfigManager, timeout: Duration) -> Self {
        Self {
            sandbox,
            languages,
            timeout,
            extra_rules: IssueKeywordTable::default(),
        }
    }

    /// Deployment-wide keyword rules, merged with each problem's own
    pub fn with_keyword_table(mut self, table: IssueKeywordTable) -> Self {
        self.extra_rules = table;
        self
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Generation step only: resolve the language and entry point, build the harness
    pub fn prepare(
        &self,
        problem: &Problem,
        language: &str,
        user_code: &str,
    ) -> Result<HarnessPayload, GenerationError> {
        prepare_harness(&self.languages, problem, language, user_code)
    }

    /// Grade one submission against `problem`.
    ///
    /// Only generation and infrastructure failures are errors; anything the
    /// user code does ends up inside the returned `GradingResult`.
    #[instrument(skip(self, problem, user_code), fields(problem_id = %problem.id, code_bytes = user_code.len()))]
    pub async fn grade(
        &self,
        problem: &Problem,
        language: &str,
        user_code: &str,
    ) -> Result<GradingResult, GradeError> {
        let start = Instant::now();
        let config = resolve_language(&self.languages, language)?;
        let payload = self.prepare(problem, language, user_code)?;

        let transcript = dispatch(
            self.sandbox.as_ref(),
            &payload,
            &config.sandbox_language,
            &config.version,
            self.timeout,
        )
        .await?;

        let result = interpret_with(&transcript, problem, &self.extra_rules);
        info!(
            entry_point = %payload.entry_point,
            status = ?result.status,
            passed = result.summary.passed,
            total = result.summary.total,
            all_issues_fixed = result.all_issues_fixed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Submission graded"
        );
        Ok(result)
    }
}
