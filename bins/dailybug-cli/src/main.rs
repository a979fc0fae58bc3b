mod commands;

use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dailybug-cli")]
#[command(about = "dailybug CLI - Grade submissions and inspect harnesses offline", long_about = None)]
struct Cli {
    /// Problems file or directory
    #[arg(short, long, global = true, env = "PROBLEMS_PATH", default_value = "data/problems.json")]
    problems: PathBuf,

    /// Language configuration file
    #[arg(long, global = true, env = "LANGUAGES_CONFIG", default_value = "config/languages.json")]
    languages: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a source file against today's problem
    Grade {
        /// Path to the submission
        #[arg(short, long)]
        code: PathBuf,

        /// Submission language (python, javascript)
        #[arg(short, long)]
        language: String,

        /// Sandbox execute endpoint
        #[arg(long, env = "SANDBOX_URL", default_value = "http://127.0.0.1:2000/api/v2/execute")]
        sandbox_url: String,

        /// Sandbox round-trip timeout in milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,

        /// Print the raw grading result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Print the harness generated for a submission, or write it to a directory
    Harness {
        /// Path to the submission
        #[arg(short, long)]
        code: PathBuf,

        /// Submission language (python, javascript)
        #[arg(short, long)]
        language: String,

        /// Write the generated files here instead of printing them
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Show today's problem as clients see it
    Problem,

    /// List configured languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade {
            code,
            language,
            sandbox_url,
            timeout_ms,
            json,
        } => {
            commands::grade(
                &cli.problems,
                &cli.languages,
                &code,
                &language,
                &sandbox_url,
                timeout_ms,
                json,
            ).await?;
        }
        Commands::Harness { code, language, out_dir } => {
            commands::harness(
                &cli.problems,
                &cli.languages,
                &code,
                &language,
                out_dir.as_deref(),
            ).await?;
        }
        Commands::Problem => {
            commands::show_problem(&cli.problems).await?;
        }
        Commands::Languages => {
            commands::list_languages(&cli.languages)?;
        }
    }

    Ok(())
}
