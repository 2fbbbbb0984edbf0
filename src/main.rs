//! archivist CLI entry point

use std::path::PathBuf;

use archivist::commands::{
    cmd_generate, cmd_ingest, cmd_init, cmd_list_sources, cmd_query, cmd_remove, cmd_status,
    print_generate_report, print_ingest_report, print_query_results, print_remove_report,
    print_sources, print_status, GenerateOptions, IngestCmdOptions, QueryOptions,
};
use archivist::config::Config;
use archivist::error::Result;
use archivist::llm::LlmGateway;
use archivist::store::Repository;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "archivist")]
#[command(version, about = "Local RAG CLI: ingest sources, retrieve, and generate grounded Markdown", long_about = None)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the project config and store
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Ingest sources (files, directories, URLs, git repositories)
    Ingest {
        /// Paths or URLs to ingest
        sources: Vec<String>,

        /// Recurse into subdirectories (max 10 levels)
        #[arg(long)]
        recursive: bool,

        /// Glob pattern to exclude (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Chunk and report without writing or calling any model
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Run retrieval and show the fused ranking
    Query {
        /// The search query
        query: String,

        /// Candidates per channel
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Retrieval mode: hybrid, dense, or bm25
        #[arg(long)]
        mode: Option<String>,
    },

    /// Generate a grounded Markdown document
    Generate {
        /// Topic / query for retrieval
        #[arg(short, long)]
        topic: String,

        /// Output file path (inside the project root)
        #[arg(short, long)]
        output: String,

        /// Feature document included verbatim in the prompt
        #[arg(long)]
        spec: Option<PathBuf>,

        /// Assemble and report without generating
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show store counts and model configuration
    Status,

    /// List ingested sources
    Sources {
        /// Output only source paths (one per line, for scripting)
        #[arg(long)]
        ids_only: bool,
    },

    /// Remove a source and all of its chunks, index rows, and summary
    Remove {
        /// Source path as shown by 'archivist sources'
        path: String,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        error!("{err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "archivist", &mut std::io::stdout());
        return Ok(());
    }

    let project_root = match &cli.project {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    if let Commands::Init { force } = &cli.command {
        let report = cmd_init(&project_root, *force)?;
        if report.created_config {
            println!("Wrote {}", report.config_file.display());
        } else {
            println!(
                "Config already present at {} (use --force to overwrite)",
                report.config_file.display()
            );
        }
        println!("Store ready at {}", report.db_file.display());
        return Ok(());
    }

    let config = Config::load(&project_root)?;
    let repo = Repository::open(&config.paths.db_file)?;
    let gateway = LlmGateway::new()?;

    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Ingest {
            sources,
            recursive,
            exclude,
            dry_run,
            yes,
        } => {
            let report = cmd_ingest(
                &config,
                &repo,
                &gateway,
                &sources,
                IngestCmdOptions {
                    recursive,
                    exclude,
                    dry_run,
                    assume_yes: yes,
                },
            )
            .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_ingest_report(&report);
            }
        }

        Commands::Query {
            query,
            top_k,
            mode,
        } => {
            let report = cmd_query(
                &config,
                &repo,
                &gateway,
                &query,
                QueryOptions { top_k, mode },
            )
            .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_query_results(&report);
            }
        }

        Commands::Generate {
            topic,
            output,
            spec,
            dry_run,
            yes,
        } => {
            let report = cmd_generate(
                &config,
                &repo,
                &gateway,
                &topic,
                &output,
                GenerateOptions {
                    feature_spec: spec,
                    dry_run,
                    assume_yes: yes,
                },
            )
            .await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_generate_report(&report);
            }
        }

        Commands::Status => {
            let report = cmd_status(&config, &repo)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }

        Commands::Sources { ids_only } => {
            let sources = cmd_list_sources(&repo)?;
            if ids_only {
                for source in &sources {
                    println!("{}", source.path);
                }
            } else if cli.json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                print_sources(&sources);
            }
        }

        Commands::Remove { path, yes } => {
            if !yes
                && !archivist::commands::confirm(
                    &format!("Remove '{path}' and all of its data?"),
                    false,
                )
            {
                println!("Cancelled.");
                return Ok(());
            }
            let report = cmd_remove(&repo, &path)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_remove_report(&report);
            }
        }
    }

    Ok(())
}
