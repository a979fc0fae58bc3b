// CLI commands for grading and inspecting dailybug problems
use anyhow::{Context, Result};
use dailybug_common::config::LanguageConfigManager;
use dailybug_common::types::{GradingResult, Language, Problem};
use dailybug_grader::harness::HarnessPayload;
use dailybug_grader::pipeline::prepare_harness;
use dailybug_grader::problems::latest_problem;
use dailybug_grader::{FileProblemStore, Grader, HttpSandbox, ProblemStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Most recent problem from a problems file or directory
async fn load_problem(problems_path: &Path) -> Result<Problem> {
    let problems = FileProblemStore::new(problems_path)
        .load_all()
        .await
        .with_context(|| format!("Failed to load problems from {}", problems_path.display()))?;
    Ok(latest_problem(problems)?)
}

fn read_source(code_path: &Path) -> Result<String> {
    fs::read_to_string(code_path)
        .with_context(|| format!("Failed to read {}", code_path.display()))
}

/// Grade a submission through the sandbox
pub async fn grade(
    problems_path: &Path,
    languages_path: &Path,
    code_path: &Path,
    language: &str,
    sandbox_url: &str,
    timeout_ms: u64,
    json: bool,
) -> Result<()> {
    let problem = load_problem(problems_path).await?;
    let user_code = read_source(code_path)?;
    let languages = LanguageConfigManager::load_or_builtin(languages_path)?;
    let sandbox = HttpSandbox::new(sandbox_url).context("Failed to build sandbox HTTP client")?;
    let grader = Grader::new(Arc::new(sandbox), languages, Duration::from_millis(timeout_ms));

    if !json {
        println!("🐛 Grading {} against problem '{}'", code_path.display(), problem.id);
        println!("📡 Sandbox: {}", sandbox_url);
    }

    let result = grader
        .grade(&problem, language, &user_code)
        .await
        .context("Grading failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &GradingResult) {
    if !result.is_completed() {
        println!("\n❌ {}", result.message.as_deref().unwrap_or("Grading error"));
        if let Some(details) = &result.details {
            println!("\n{}", details.trim_end());
        }
        return;
    }

    println!("\n{:<6} {:<8} {:<40}", "TEST", "RESULT", "DESCRIPTION");
    println!("{}", "─".repeat(60));
    for outcome in &result.outcomes {
        let verdict = if outcome.passed { "pass" } else { "FAIL" };
        println!(
            "{:<6} {:<8} {:<40}",
            outcome.index,
            verdict,
            outcome.description.as_deref().unwrap_or("-")
        );
        if !outcome.passed {
            match (&outcome.error, &outcome.actual) {
                (Some(error), _) => println!("         error: {}", error),
                (None, Some(actual)) => {
                    println!("         expected {} got {}", outcome.expected, actual)
                }
                (None, None) => {}
            }
        }
    }

    println!(
        "\n📊 {}/{} passed",
        result.summary.passed, result.summary.total
    );
    for (issue, fixed) in &result.issues_fixed {
        println!("  {} {}", if *fixed { "✅" } else { "⬜" }, issue);
    }
    if result.all_issues_fixed {
        println!("\n✅ All issues fixed!");
    }
}

fn write_payload(payload: &HarnessPayload, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    for file in &payload.files {
        let path = out_dir.join(&file.name);
        fs::write(&path, &file.content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("📝 Wrote {}", path.display());
    }
    Ok(())
}

/// Generate the harness without running it
pub async fn harness(
    problems_path: &Path,
    languages_path: &Path,
    code_path: &Path,
    language: &str,
    out_dir: Option<&Path>,
) -> Result<()> {
    let problem = load_problem(problems_path).await?;
    let user_code = read_source(code_path)?;
    let languages = LanguageConfigManager::load_or_builtin(languages_path)?;
    let payload = prepare_harness(&languages, &problem, language, &user_code)?;

    match out_dir {
        Some(dir) => {
            write_payload(&payload, dir)?;
            if let Some(primary) = payload.primary() {
                println!("\n💡 Entry point '{}', run {}", payload.entry_point, primary.name);
            }
        }
        None => {
            for file in &payload.files {
                println!("==> {} <==", file.name);
                println!("{}", file.content);
            }
        }
    }
    Ok(())
}

/// Print today's problem as served by the API
pub async fn show_problem(problems_path: &Path) -> Result<()> {
    let problem = load_problem(problems_path).await?;
    println!("{}", serde_json::to_string_pretty(&problem.public())?);
    Ok(())
}

/// List configured languages
pub fn list_languages(languages_path: &Path) -> Result<()> {
    let languages = LanguageConfigManager::load_or_builtin(languages_path)?;

    println!("📋 Configured Languages:\n");
    println!("{:<12} {:<12} {:<10} {:<10}", "NAME", "SANDBOX", "VERSION", "EXT");
    println!("{}", "─".repeat(48));

    let names = languages.list_languages();
    for language in &names {
        if let Some(config) = languages.get_config(*language) {
            println!(
                "{:<12} {:<12} {:<10} {:<10}",
                config.name, config.sandbox_language, config.version, config.file_extension
            );
        }
    }

    println!("\n✅ Total: {} language(s)", names.len());
    if names.len() < Language::ALL.len() {
        println!("⚠️  Not configured: {:?}", Language::ALL.iter().filter(|l| !names.contains(l)).collect::<Vec<_>>());
    }
    Ok(())
}
