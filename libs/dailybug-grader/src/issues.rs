//! Issue inference: which of a problem's known issues does a submission fix?
//!
//! A best-effort partial-credit signal, not traceability. If every test
//! passed, every issue is fixed. Otherwise a passing test whose description
//! contains a rule's keyword (case-insensitive) marks that rule's issue fixed.
//!
//! Rules live in an [`IssueKeywordTable`], built from each issue's declared
//! `keywords` and optionally extended with deployment-wide rules.

use dailybug_common::types::{Issue, TestOutcome};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordRule {
    pub keyword: String,
    pub issue_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueKeywordTable {
    rules: Vec<KeywordRule>,
}

impl IssueKeywordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules declared on the issues themselves
    pub fn from_issues(issues: &[Issue]) -> Self {
        let rules = issues
            .iter()
            .flat_map(|issue| {
                issue.keywords.iter().map(move |keyword| KeywordRule {
                    keyword: keyword.clone(),
                    issue_id: issue.id.clone(),
                })
            })
            .collect();
        Self { rules }
    }

    pub fn with_rule(mut self, keyword: impl Into<String>, issue_id: impl Into<String>) -> Self {
        self.push(keyword, issue_id);
        self
    }

    pub fn push(&mut self, keyword: impl Into<String>, issue_id: impl Into<String>) {
        let keyword = keyword.into();
        // An empty keyword would match every description
        if keyword.trim().is_empty() {
            return;
        }
        self.rules.push(KeywordRule {
            keyword,
            issue_id: issue_id.into(),
        });
    }

    pub fn extend(&mut self, other: &IssueKeywordTable) {
        for rule in &other.rules {
            self.push(rule.keyword.clone(), rule.issue_id.clone());
        }
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Map every issue id to whether the outcomes show it fixed.
///
/// Rules naming an issue the problem does not declare are ignored.
pub fn infer_issues_fixed(
    outcomes: &[TestOutcome],
    issues: &[Issue],
    table: &IssueKeywordTable,
) -> BTreeMap<String, bool> {
    let mut fixed: BTreeMap<String, bool> =
        issues.iter().map(|issue| (issue.id.clone(), false)).collect();

    if outcomes.iter().all(|o| o.passed) {
        fixed.values_mut().for_each(|v| *v = true);
        return fixed;
    }

    let passing: Vec<String> = outcomes
        .iter()
        .filter(|o| o.passed)
        .filter_map(|o| o.description.as_deref())
        .map(str::to_lowercase)
        .collect();

    for rule in table.rules() {
        let Some(slot) = fixed.get_mut(&rule.issue_id) else {
            continue;
        };
        if *slot || rule.keyword.trim().is_empty() {
            continue;
        }
        let keyword = rule.keyword.to_lowercase();
        if passing.iter().any(|description| description.contains(&keyword)) {
            *slot = true;
        }
    }

    fixed
}
