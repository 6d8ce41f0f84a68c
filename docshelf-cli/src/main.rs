use clap::{Parser, Subcommand, ValueEnum};
use docshelf::aggregate;
use docshelf::scanner;
use docshelf::{
    DocumentId, GitFetcher, LocalFetcher, MarkdownRenderer, RunOutcome, SnapshotStore,
    SourceConfig, SyncOrchestrator,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// docshelf CLI: inspect and build a documentation tree from the command line
#[derive(Parser)]
#[command(name = "docshelf", version, about)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the document ID of a file
    Fingerprint {
        file: PathBuf,
    },

    /// List the directories and documents that would be published
    Scan {
        dir: PathBuf,
    },

    /// Scan and render a tree, then print its categories and navigation tree
    Build {
        dir: PathBuf,
        /// Also print the rendered text of every document
        #[arg(long)]
        with_content: bool,
    },

    /// Run one full sync pass and print its report
    Sync {
        /// Working copy to publish from
        #[arg(long)]
        dir: PathBuf,
        /// Git remote to clone or update the working copy from
        #[arg(long)]
        remote: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Fingerprint { file } => {
            let id = DocumentId::of_file(&file)?;
            print_output(
                &serde_json::json!({ "path": file.display().to_string(), "id": id }),
                &cli.format,
            )?;
        }

        Command::Scan { dir } => {
            let records = scanner::scan(&dir)?;
            print_output(&records, &cli.format)?;
        }

        Command::Build { dir, with_content } => {
            let records = scanner::scan(&dir)?;
            let build = aggregate::build(&records, &HashMap::new(), &MarkdownRenderer::new());
            for failure in &build.report.failures {
                eprintln!(
                    "WARN:{} ({}): {}",
                    failure.path.display(),
                    failure.id,
                    failure.error
                );
            }

            let snapshot = &build.snapshot;
            // Keyed by category name so the output is stable
            let tree: BTreeMap<&str, _> = snapshot
                .categories()
                .iter()
                .map(|c| (c.name.as_str(), snapshot.category_tree(&c.id)))
                .collect();
            let mut output = serde_json::json!({
                "categories": snapshot.categories(),
                "tree": tree,
                "rendered": build.report.rendered,
                "failed": build.report.failures.len(),
            });
            if with_content {
                let contents: BTreeMap<String, &str> = snapshot
                    .contents()
                    .iter()
                    .map(|(id, html)| (id.to_string(), html.as_ref()))
                    .collect();
                output["contents"] = serde_json::to_value(contents)?;
            }
            print_output(&output, &cli.format)?;
        }

        Command::Sync { dir, remote } => {
            let source = SourceConfig {
                remote: remote.clone().unwrap_or_default(),
                local_dir: dir,
            };
            let store = Arc::new(SnapshotStore::new());
            let renderer = MarkdownRenderer::new();
            let orchestrator = match remote {
                Some(_) => SyncOrchestrator::new(source, GitFetcher::new(), renderer, store),
                None => SyncOrchestrator::new(source, LocalFetcher, renderer, store),
            };

            match orchestrator.run_once()? {
                RunOutcome::Published(report) => print_output(&report, &cli.format)?,
                RunOutcome::Busy => return Err("a sync pass is already running".into()),
            }
        }
    }

    Ok(())
}

fn print_output<T: Serialize>(
    value: &T,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value)?);
        }
    }
    Ok(())
}
