use dailybug_common::types::Language;
use regex::Regex;
use std::sync::OnceLock;

use super::{fill, HarnessStrategy, SourceFile, LOAD_FAILURE_EXIT_CODE, LOAD_FAILURE_MESSAGE};

const HARNESS_FILE: &str = "main.js";
const USER_FILE: &str = "solution.js";

const HARNESS_TEMPLATE: &str = r#""use strict";
const fs = require("fs");
const path = require("path");
const vm = require("vm");

const ENTRY_POINT = "__ENTRY_POINT__";
const USER_FILE = "__USER_FILE__";
const LOAD_FAILURE_EXIT = __LOAD_FAILURE_EXIT__;
const CASES = JSON.parse(Buffer.from("__CASES__", "base64").toString("utf8"));

const report = process.stdout.write.bind(process.stdout);

// Built inside the context so user code never holds a host-realm object
const CONSOLE_METHODS = Object.keys(console).filter((name) => typeof console[name] === "function");
const PRELUDE = `
var console = {};
for (const name of ${JSON.stringify(CONSOLE_METHODS)}) console[name] = () => {};
var module = { exports: {} };
var exports = module.exports;
`;

function emit(record) {
  report(JSON.stringify(record) + "\n");
}

function loadFailure(details) {
  emit({ status: "error", message: "__LOAD_FAILURE_MESSAGE__", details });
  process.exitCode = LOAD_FAILURE_EXIT;
}

function normalize(value) {
  const text = JSON.stringify(value);
  return text === undefined ? null : JSON.parse(text);
}

function deepEqual(a, b) {
  if (a === b) return true;
  if (a === null || b === null || typeof a !== "object" || typeof b !== "object") return false;
  if (Array.isArray(a) !== Array.isArray(b)) return false;
  if (Array.isArray(a)) {
    return a.length === b.length && a.every((item, i) => deepEqual(item, b[i]));
  }
  const keys = Object.keys(a);
  return (
    keys.length === Object.keys(b).length &&
    keys.every((key) => Object.prototype.hasOwnProperty.call(b, key) && deepEqual(a[key], b[key]))
  );
}

function describe(err) {
  if (err && typeof err.message === "string") {
    return `${err.name || "Error"}: ${err.message}`;
  }
  return String(err);
}

function resolve(context) {
  const direct = vm.runInContext(
    `typeof ${ENTRY_POINT} === "function" ? ${ENTRY_POINT} : undefined`,
    context
  );
  if (direct) return direct;
  const exported = context.module.exports;
  if (exported && typeof exported[ENTRY_POINT] === "function") return exported[ENTRY_POINT];
  const holder = vm.runInContext(`typeof Solution === "function" ? Solution : undefined`, context);
  if (holder && holder.prototype && typeof holder.prototype[ENTRY_POINT] === "function") {
    const instance = new holder();
    return instance[ENTRY_POINT].bind(instance);
  }
  return undefined;
}

async function main() {
  let context;
  let target;
  try {
    const source = fs.readFileSync(path.join(__dirname, USER_FILE), "utf8");
    context = vm.createContext({});
    vm.runInContext(PRELUDE, context);
    vm.runInContext(source, context, { filename: USER_FILE });
    target = resolve(context);
  } catch (err) {
    loadFailure(describe(err));
    return;
  }
  if (!target) {
    loadFailure(`function '${ENTRY_POINT}' is not defined`);
    return;
  }

  const parseInContext = vm.runInContext("(text) => JSON.parse(text)", context);
  const outcomes = [];
  for (const testCase of CASES) {
    const outcome = {
      index: testCase.index,
      description: testCase.description ?? null,
      input: testCase.input,
      expected: testCase.expected,
      actual: null,
      error: null,
      passed: false,
    };
    try {
      const args = parseInContext(JSON.stringify(testCase.args));
      const actual = normalize(await target(...args));
      outcome.actual = actual;
      outcome.passed = deepEqual(actual, testCase.expected);
    } catch (err) {
      outcome.error = describe(err);
    }
    outcomes.push(outcome);
  }

  const passed = outcomes.filter((outcome) => outcome.passed).length;
  emit({
    status: "completed",
    outcomes,
    summary: { total: outcomes.length, passed, failed: outcomes.length - passed },
  });
}

main().catch((err) => loadFailure(describe(err)));
"#;

// Earliest of: `function name(`, `const name = function|(...) =>|x =>`, or a
// class method header `name(...) {`.
fn definition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?m)(?:^|[^\w$.])(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(",
            r"|(?:^|[^\w$.])(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:function\b|\([^)]*\)\s*=>|[A-Za-z_$][\w$]*\s*=>)",
            r"|^[ \t]+(?:async\s+)?([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*\{",
        ))
        .unwrap()
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap())
}

const NOT_METHODS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "constructor",
];

/// Runs `main.js`, which evaluates `solution.js` in a `vm` context
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaScriptStrategy;

impl HarnessStrategy for JavaScriptStrategy {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn extract_entry_point(&self, template: &str) -> Option<String> {
        definition_regex()
            .captures_iter(template)
            .filter_map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str().to_string())
            })
            .find(|name| !NOT_METHODS.contains(&name.as_str()))
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
                ("__USER_FILE__", USER_FILE),
                ("__LOAD_FAILURE_EXIT__", exit_code.as_str()),
                ("__LOAD_FAILURE_MESSAGE__", LOAD_FAILURE_MESSAGE),
                ("__CASES__", encoded_cases),
            ],
        );

        vec![
            SourceFile::new(HARNESS_FILE, harness),
            SourceFile::new(USER_FILE, user_code),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_declaration() {
        let template = "// fix me\nfunction add(a, b) {\n  return a - b;\n}\n";
        assert_eq!(JavaScriptStrategy.extract_entry_point(template), Some("add".to_string()));
    }

    #[test]
    fn test_arrow_and_function_expressions() {
        assert_eq!(
            JavaScriptStrategy.extract_entry_point("const sum = (xs) => xs.reduce((a, b) => a + b, 0);"),
            Some("sum".to_string())
        );
        assert_eq!(
            JavaScriptStrategy.extract_entry_point("let square = async function (x) { return x * x; };"),
            Some("square".to_string())
        );
        assert_eq!(
            JavaScriptStrategy.extract_entry_point("var id = x => x;"),
            Some("id".to_string())
        );
    }

    #[test]
    fn test_class_method_skips_constructor() {
        let template = "class Solution {\n  constructor() {\n    this.memo = {};\n  }\n  twoSum(nums, target) {\n    if (nums) {\n    }\n  }\n}\n";
        assert_eq!(
            JavaScriptStrategy.extract_entry_point(template),
            Some("twoSum".to_string())
        );
    }

    #[test]
    fn test_no_definition() {
        assert_eq!(JavaScriptStrategy.extract_entry_point("const LIMIT = 10;\n"), None);
        assert_eq!(JavaScriptStrategy.extract_entry_point("obj.function foo("), None);
    }

    #[test]
    fn test_identifiers() {
        assert!(JavaScriptStrategy.is_valid_identifier("$helper"));
        assert!(JavaScriptStrategy.is_valid_identifier("twoSum"));
        assert!(!JavaScriptStrategy.is_valid_identifier("two sum"));
        assert!(!JavaScriptStrategy.is_valid_identifier("a\"b"));
    }

    #[test]
    fn test_render_layout() {
        let files = JavaScriptStrategy.render("function add(a, b) { return a + b; }", "add", "W10=");
        assert_eq!(files[0].name, "main.js");
        assert_eq!(files[1].name, "solution.js");

        let harness = &files[0].content;
        assert!(harness.contains(r#"const ENTRY_POINT = "add";"#));
        assert!(harness.contains(r#"const USER_FILE = "solution.js";"#));
        assert!(harness.contains(r#"Buffer.from("W10=", "base64")"#));
        assert!(harness.contains("const LOAD_FAILURE_EXIT = 2;"));
        assert!(harness.contains("vm.runInContext(PRELUDE, context)"));
        assert!(!harness.contains("console: "));
    }
}
