use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Submission languages with a registered harness strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Python, Language::JavaScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

/// A hidden test case owned by a problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TestCase {
    /// Positional arguments for the entry point.
    ///
    /// - mapping: values in declaration order (`{a:2,b:3}` -> `f(2, 3)`)
    /// - list: items in order (`[2,3]` -> `f(2, 3)`)
    /// - anything else: the sole argument (`5` -> `f(5)`)
    ///
    /// Every harness strategy invokes the entry point with exactly this list.
    pub fn positional_args(&self) -> Vec<Value> {
        match &self.input {
            Value::Object(params) => params.values().cloned().collect(),
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

/// A known issue of a problem's starting code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub description: String,
    /// Test-description substrings that count as evidence this issue is fixed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub date_published: DateTime<Utc>,
    #[serde(default)]
    pub starting_code: BTreeMap<String, String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Explicit entry point; takes precedence over template extraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub solution: String,
}

impl Problem {
    /// Starting-code template for a language, if the problem ships one
    pub fn template_for(&self, language: Language) -> Option<&str> {
        self.starting_code
            .iter()
            .find(|(name, _)| name.parse::<Language>().ok() == Some(language))
            .map(|(_, template)| template.as_str())
    }

    /// View safe to hand to clients: everything but the solution
    pub fn public(&self) -> PublicProblem {
        PublicProblem {
            id: self.id.clone(),
            date_published: self.date_published,
            starting_code: self.starting_code.clone(),
            test_cases: self.test_cases.clone(),
            issues: self.issues.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProblem {
    pub id: String,
    pub date_published: DateTime<Utc>,
    pub starting_code: BTreeMap<String, String>,
    pub test_cases: Vec<TestCase>,
    pub issues: Vec<Issue>,
}

/// Raw result of one sandbox execution
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxTranscript {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub index: usize,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub expected: Value,
    #[serde(default)]
    pub actual: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        let passed = outcomes.iter().filter(|o| o.passed).count();
        Self {
            total: outcomes.len(),
            passed,
            failed: outcomes.len() - passed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingStatus {
    Completed,
    Error,
}

/// Externally visible grading report
///
/// Built only through [`GradingResult::completed`] and [`GradingResult::error`],
/// which keep `summary` consistent with `outcomes` and derive `all_issues_fixed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub status: GradingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub outcomes: Vec<TestOutcome>,
    pub summary: Summary,
    pub issues_fixed: BTreeMap<String, bool>,
    pub all_issues_fixed: bool,
}

impl GradingResult {
    pub fn completed(outcomes: Vec<TestOutcome>, issues_fixed: BTreeMap<String, bool>) -> Self {
        let summary = Summary::from_outcomes(&outcomes);
        Self {
            status: GradingStatus::Completed,
            message: None,
            details: None,
            all_issues_fixed: summary.failed == 0,
            outcomes,
            summary,
            issues_fixed,
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: GradingStatus::Error,
            message: Some(message.into()),
            details,
            outcomes: Vec::new(),
            summary: Summary::default(),
            issues_fixed: BTreeMap::new(),
            all_issues_fixed: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == GradingStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(input: Value) -> TestCase {
        TestCase {
            input,
            expected: json!(null),
            description: None,
        }
    }

    #[test]
    fn test_mapping_input_binds_in_declaration_order() {
        let tc: TestCase =
            serde_json::from_str(r#"{"input": {"b": 3, "a": 2}, "expected": 5}"#).unwrap();
        assert_eq!(tc.positional_args(), vec![json!(3), json!(2)]);

        assert_eq!(
            case(json!({"a": 2, "b": 3})).positional_args(),
            vec![json!(2), json!(3)]
        );
    }

    #[test]
    fn test_scalar_and_list_inputs() {
        assert_eq!(case(json!(5)).positional_args(), vec![json!(5)]);
        assert_eq!(case(json!("abc")).positional_args(), vec![json!("abc")]);
        assert_eq!(case(json!([2, 3])).positional_args(), vec![json!(2), json!(3)]);
        assert_eq!(
            case(json!([[1, 2, 3]])).positional_args(),
            vec![json!([1, 2, 3])]
        );
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("Python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("js".parse::<Language>(), Ok(Language::JavaScript));
        assert!("cobol".parse::<Language>().is_err());
        assert_eq!(Language::JavaScript.to_string(), "javascript");
    }

    #[test]
    fn test_completed_result_upholds_summary_invariant() {
        let outcomes = vec![
            TestOutcome {
                index: 0,
                description: None,
                input: json!(1),
                expected: json!(1),
                actual: Some(json!(1)),
                error: None,
                passed: true,
            },
            TestOutcome {
                index: 1,
                description: None,
                input: json!(2),
                expected: json!(4),
                actual: Some(json!(3)),
                error: None,
                passed: false,
            },
        ];
        let result = GradingResult::completed(outcomes, BTreeMap::new());
        assert_eq!(result.summary.total, 2);
        assert_eq!(result.summary.passed + result.summary.failed, result.summary.total);
        assert!(!result.all_issues_fixed);

        let empty = GradingResult::completed(Vec::new(), BTreeMap::new());
        assert!(empty.all_issues_fixed);
    }

    #[test]
    fn test_error_result_has_no_outcomes() {
        let result = GradingResult::error("Execution error", Some("timeout".to_string()));
        assert_eq!(result.status, GradingStatus::Error);
        assert!(result.outcomes.is_empty());
        assert!(!result.all_issues_fixed);
    }

    #[test]
    fn test_problem_public_view_and_wire_format() {
        let problem: Problem = serde_json::from_value(json!({
            "id": "p1",
            "datePublished": "2026-10-16T00:00:00Z",
            "startingCode": {"python": "def add(a, b):\n    return a - b\n"},
            "testCases": [{"input": [2, 3], "expected": 5}],
            "issues": [{"id": "1", "description": "subtracts instead of adding"}],
            "solution": "def add(a, b):\n    return a + b\n"
        }))
        .unwrap();

        assert!(problem.template_for(Language::Python).is_some());
        assert!(problem.template_for(Language::JavaScript).is_none());

        let public = serde_json::to_value(problem.public()).unwrap();
        assert!(public.get("solution").is_none());
        assert!(public.get("startingCode").is_some());
    }

    #[test]
    fn test_shipped_problems_parse() {
        let problems: Vec<Problem> =
            serde_json::from_str(include_str!("../../../data/problems.json")).unwrap();
        assert!(!problems.is_empty());
        for problem in &problems {
            assert!(!problem.solution.is_empty());
            assert!(problem.issues.iter().all(|issue| !issue.keywords.is_empty()));
        }
    }
}
