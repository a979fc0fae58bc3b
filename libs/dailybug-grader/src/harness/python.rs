use dailybug_common::types::Language;
use regex::Regex;
use std::sync::OnceLock;

use super::{fill, HarnessStrategy, SourceFile, LOAD_FAILURE_EXIT_CODE, LOAD_FAILURE_MESSAGE};

const HARNESS_FILE: &str = "main.py";
const USER_MODULE: &str = "solution";

const HARNESS_TEMPLATE: &str = r#"import base64
import contextlib
import importlib
import io
import json
import os
import sys
import traceback

ENTRY_POINT = "__ENTRY_POINT__"
USER_MODULE = "__USER_MODULE__"
LOAD_FAILURE_EXIT = __LOAD_FAILURE_EXIT__
CASES = json.loads(base64.b64decode("__CASES__").decode("utf-8"))

_report = sys.stdout
_captured = io.StringIO()


def emit(record):
    _report.write(json.dumps(record, default=repr) + "\n")
    _report.flush()


def load_failure(details):
    emit({"status": "error", "message": "__LOAD_FAILURE_MESSAGE__", "details": details})
    sys.exit(LOAD_FAILURE_EXIT)


def normalize(value):
    # NaN and Infinity raise here and fail only their own case
    return json.loads(json.dumps(value, default=repr, allow_nan=False))


def same(actual, expected):
    if isinstance(actual, bool) or isinstance(expected, bool):
        return type(actual) is type(expected) and actual == expected
    if isinstance(actual, (int, float)) and isinstance(expected, (int, float)):
        return actual == expected
    if isinstance(actual, list) and isinstance(expected, list):
        return len(actual) == len(expected) and all(same(a, e) for a, e in zip(actual, expected))
    if isinstance(actual, dict) and isinstance(expected, dict):
        return actual.keys() == expected.keys() and all(same(actual[k], expected[k]) for k in actual)
    return type(actual) is type(expected) and actual == expected


def describe(exc):
    return "".join(traceback.format_exception_only(type(exc), exc)).strip()


def resolve(module):
    target = getattr(module, ENTRY_POINT, None)
    if callable(target):
        return target
    holder = getattr(module, "Solution", None)
    if isinstance(holder, type) and callable(getattr(holder, ENTRY_POINT, None)):
        return getattr(holder(), ENTRY_POINT)
    return None


def main():
    sys.path.insert(0, os.path.dirname(os.path.abspath(__file__)))
    try:
        with contextlib.redirect_stdout(_captured):
            module = importlib.import_module(USER_MODULE)
            target = resolve(module)
    except BaseException as exc:
        load_failure(describe(exc))
        return
    if target is None:
        load_failure("function '%s' is not defined" % ENTRY_POINT)
        return

    outcomes = []
    for case in CASES:
        outcome = {
            "index": case["index"],
            "description": case.get("description"),
            "input": case["input"],
            "expected": case["expected"],
            "actual": None,
            "error": None,
            "passed": False,
        }
        try:
            with contextlib.redirect_stdout(_captured):
                actual = normalize(target(*case["args"]))
            outcome["actual"] = actual
            outcome["passed"] = same(actual, case["expected"])
        except BaseException as exc:
            outcome["error"] = describe(exc)
        outcomes.append(outcome)

    passed = sum(1 for outcome in outcomes if outcome["passed"])
    emit({
        "status": "completed",
        "outcomes": outcomes,
        "summary": {"total": len(outcomes), "passed": passed, "failed": len(outcomes) - passed},
    })


if __name__ == "__main__":
    main()
"#;

fn def_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:async[ \t]+)?def[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(").unwrap()
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Runs `main.py`, which imports the submission from `solution.py`
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonStrategy;

impl HarnessStrategy for PythonStrategy {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extract_entry_point(&self, template: &str) -> Option<String> {
        // Dunder methods (`__init__`) are never the graded entry point
        def_regex()
            .captures_iter(template)
            .map(|caps| caps[1].to_string())
            .find(|name| !(name.starts_with("__") && name.ends_with("__")))
    }

    fn is_valid_identifier(&self, name: &str) -> bool {
        identifier_regex().is_match(name)
    }

    fn render(&self, user_code: &str, entry_point: &str, encoded_cases: &str) -> Vec<SourceFile> {
        let exit_code = LOAD_FAILURE_EXIT_CODE.to_string();
        let harness = fill(
            HARNESS_TEMPLATE,
            &[
                ("__ENTRY_POINT__", entry_point),
                ("__USER_MODULE__", USER_MODULE),
                ("__LOAD_FAILURE_EXIT__", exit_code.as_str()),
                ("__LOAD_FAILURE_MESSAGE__", LOAD_FAILURE_MESSAGE),
                ("__CASES__", encoded_cases),
            ],
        );

        vec![
            SourceFile::new(HARNESS_FILE, harness),
            SourceFile::new(format!("{}.py", USER_MODULE), user_code),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_first_function() {
        let template = "import math\n\ndef add(a, b):\n    return a - b\n\ndef helper():\n    pass\n";
        assert_eq!(PythonStrategy.extract_entry_point(template), Some("add".to_string()));
    }

    #[test]
    fn test_extracts_method_skipping_dunder() {
        let template = "class Solution:\n    def __init__(self):\n        pass\n\n    async def twoSum(self, nums, target):\n        pass\n";
        assert_eq!(
            PythonStrategy.extract_entry_point(template),
            Some("twoSum".to_string())
        );
    }

    #[test]
    fn test_no_definition() {
        assert_eq!(PythonStrategy.extract_entry_point("x = 1\n# def nope(\n"), None);
        assert_eq!(PythonStrategy.extract_entry_point(""), None);
    }

    #[test]
    fn test_identifiers() {
        assert!(PythonStrategy.is_valid_identifier("user_function"));
        assert!(PythonStrategy.is_valid_identifier("_private2"));
        assert!(!PythonStrategy.is_valid_identifier("2fast"));
        assert!(!PythonStrategy.is_valid_identifier("a-b"));
        assert!(!PythonStrategy.is_valid_identifier("$x"));
        assert!(!PythonStrategy.is_valid_identifier(""));
    }

    #[test]
    fn test_render_layout() {
        let files = PythonStrategy.render("def add(a, b):\n    return a + b\n", "add", "W10=");
        assert_eq!(files[0].name, "main.py");
        assert_eq!(files[1].name, "solution.py");

        let harness = &files[0].content;
        assert!(harness.contains(r#"ENTRY_POINT = "add""#));
        assert!(harness.contains(r#"base64.b64decode("W10=")"#));
        assert!(harness.contains("LOAD_FAILURE_EXIT = 2"));
        assert!(harness.contains("Error in user code"));
        assert!(harness.contains(r#"if __name__ == "__main__":"#));
        assert!(harness.contains("allow_nan=False"));
        assert!(harness.contains(r#"same(actual, case["expected"])"#));
    }
}
