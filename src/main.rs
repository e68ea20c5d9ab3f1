//! # Persona Sift CLI (`sift`)
//!
//! Ranks the sections of a PDF collection against a persona and task, and
//! drops sections that break hard constraints stated in the task.
//!
//! ## Usage
//!
//! ```bash
//! sift [--config ./sift.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sift run` | Extract, rank, filter, and write the JSON report |
//! | `sift sections <pdf>` | Show the sections extracted from one PDF |
//! | `sift constraints "<query>"` | Show the hard constraints a query enforces |
//! | `sift completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Rank ./input/*.pdf against ./input/request.json
//! sift run
//!
//! # Explicit locations, ten results
//! sift run --input ./docs --request ./docs/req.json --output ./out.json --top-k 10
//!
//! # Check what a query would filter out
//! sift constraints "Prepare a vegetarian, gluten-free buffet"
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use persona_sift::config;
use persona_sift::inspect;
use persona_sift::logging;
use persona_sift::run::{self, RunOptions};

/// Persona Sift CLI — persona-driven section ranking for PDF collections.
#[derive(Parser)]
#[command(
    name = "sift",
    about = "Persona Sift — rank PDF sections for a persona and task, with hard-constraint filtering",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional; built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by `SIFT_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write the JSON report.
    ///
    /// Reads every PDF in the input directory, extracts heading-delimited
    /// sections, ranks them against the persona and task from the request
    /// file, removes sections that violate hard constraints, and writes the
    /// top results.
    Run {
        /// Input directory (overrides `[input].dir`).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output JSON file (overrides `[output].path`).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Request JSON file; defaults to the first `*.json` in the input directory.
        #[arg(long)]
        request: Option<PathBuf>,

        /// Maximum number of sections to emit (overrides `[output].top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Print the sections extracted from one PDF.
    Sections {
        /// Path to the PDF.
        pdf: PathBuf,
    },

    /// Print the hard constraints detected in a query.
    Constraints {
        /// Query text, e.g. "Persona: Caterer. Task: vegetarian buffet".
        query: String,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "sift", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            output,
            request,
            top_k,
        } => {
            let options = RunOptions {
                input,
                output,
                request,
                top_k,
            };
            let (summary, _) = run::run(&cfg, options).await?;
            eprintln!(
                "{} documents, {} sections, {} removed by guardrail, {} emitted, {} issues → {}",
                summary.documents,
                summary.sections,
                summary.removed,
                summary.emitted,
                summary.issues.len(),
                summary.output_path.display()
            );
        }
        Commands::Sections { pdf } => {
            inspect::print_sections(&cfg, &pdf)?;
        }
        Commands::Constraints { query } => {
            inspect::print_constraints(&cfg, &query)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
