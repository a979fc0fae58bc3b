/// Harness Generator - Test Wrapper Synthesis
///
/// **Core Responsibility:**
/// Turn untrusted user code plus a problem's test cases into a set of source
/// files that, once executed by the sandbox, print exactly one JSON report line.
///
/// **Embedding Rules:**
/// - User code is shipped as its own file and loaded with the language's
///   import/evaluation mechanism. It is never spliced into harness source.
/// - Test data is serialized to JSON and embedded as a base64 literal, so no
///   test value can terminate a string or block early.
/// - The entry-point name is the only value placed into harness source, and it
///   must pass the language's identifier check first.
///
/// **Report Contract:**
/// - success: `{"status":"completed","outcomes":[...],"summary":{...}}`
/// - load failure: `{"status":"error","message":"Error in user code","details":...}`
///   followed by exit code [`LOAD_FAILURE_EXIT_CODE`], before any test runs

mod javascript;
mod python;

use base64::{engine::general_purpose, Engine as _};
use dailybug_common::types::{Language, TestCase};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::GenerationError;

pub use javascript::JavaScriptStrategy;
pub use python::PythonStrategy;

/// Entry point used when neither the problem nor its template names one
pub const FALLBACK_ENTRY_POINT: &str = "user_function";

/// Exit code of a harness whose user code failed to load
pub const LOAD_FAILURE_EXIT_CODE: i64 = 2;

pub const LOAD_FAILURE_MESSAGE: &str = "Error in user code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Generated executable for one grading request. The first file is the one
/// the sandbox runs.
#[derive(Debug, Clone)]
pub struct HarnessPayload {
    pub language: Language,
    pub entry_point: String,
    pub files: Vec<SourceFile>,
}

impl HarnessPayload {
    pub fn primary(&self) -> Option<&SourceFile> {
        self.files.first()
    }
}

/// One test case as the harness consumes it
#[derive(Debug, Serialize)]
struct HarnessCase<'a> {
    index: usize,
    description: Option<&'a str>,
    input: &'a Value,
    expected: &'a Value,
    args: Vec<Value>,
}

/// Per-language harness generation
pub trait HarnessStrategy: Send + Sync {
    fn language(&self) -> Language;

    /// First function/method name declared in a starting-code template.
    ///
    /// A regex scan, not a parser: good enough for the short templates
    /// problems ship, and the problem can always override it.
    fn extract_entry_point(&self, template: &str) -> Option<String>;

    fn is_valid_identifier(&self, name: &str) -> bool;

    /// Source files for the sandbox, primary file first
    fn render(&self, user_code: &str, entry_point: &str, encoded_cases: &str) -> Vec<SourceFile>;
}

pub fn strategy_for(language: Language) -> &'static dyn HarnessStrategy {
    match language {
        Language::Python => &PythonStrategy,
        Language::JavaScript => &JavaScriptStrategy,
    }
}

/// Look up a strategy by the language name a client submitted
pub fn strategy_by_name(name: &str) -> Result<&'static dyn HarnessStrategy, GenerationError> {
    name.parse::<Language>()
        .map(strategy_for)
        .map_err(|_| GenerationError::UnsupportedLanguage(name.to_string()))
}

/// Pick the entry point: explicit override, then the template's first
/// definition, then [`FALLBACK_ENTRY_POINT`].
pub fn resolve_entry_point(
    strategy: &dyn HarnessStrategy,
    explicit: Option<&str>,
    template: Option<&str>,
) -> Result<String, GenerationError> {
    let name = match explicit.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => template
            .and_then(|template| strategy.extract_entry_point(template))
            .unwrap_or_else(|| FALLBACK_ENTRY_POINT.to_string()),
    };

    if !strategy.is_valid_identifier(&name) {
        return Err(GenerationError::InvalidEntryPoint(name));
    }
    Ok(name)
}

/// JSON-encode test cases with their bound arguments, then base64 the result
pub fn encode_cases(test_cases: &[TestCase]) -> Result<String, GenerationError> {
    let cases: Vec<HarnessCase<'_>> = test_cases
        .iter()
        .enumerate()
        .map(|(index, tc)| HarnessCase {
            index,
            description: tc.description.as_deref(),
            input: &tc.input,
            expected: &tc.expected,
            args: tc.positional_args(),
        })
        .collect();

    let json = serde_json::to_vec(&cases)?;
    Ok(general_purpose::STANDARD.encode(json))
}

/// Build the harness payload for one submission
pub fn generate(
    language: Language,
    user_code: &str,
    function_name: &str,
    test_cases: &[TestCase],
) -> Result<HarnessPayload, GenerationError> {
    let strategy = strategy_for(language);
    if !strategy.is_valid_identifier(function_name) {
        return Err(GenerationError::InvalidEntryPoint(function_name.to_string()));
    }

    let encoded_cases = encode_cases(test_cases)?;
    let files = strategy.render(user_code, function_name, &encoded_cases);

    debug!(
        language = %language,
        entry_point = function_name,
        test_cases = test_cases.len(),
        files = files.len(),
        "Harness generated"
    );

    Ok(HarnessPayload {
        language,
        entry_point: function_name.to_string(),
        files,
    })
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"__[A-Z][A-Z_]*[A-Z]__").unwrap())
}

/// Substitute `__MARKER__` placeholders in a single pass.
///
/// Inserted values are never rescanned, and unknown markers stay untouched.
pub(crate) fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let lookup: HashMap<&str, &str> = values.iter().copied().collect();
    marker_regex()
        .replace_all(template, |caps: &Captures<'_>| {
            let marker = &caps[0];
            lookup
                .get(marker)
                .map(|value| value.to_string())
                .unwrap_or_else(|| marker.to_string())
        })
        .into_owned()
}
