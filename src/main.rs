use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use textdrill::config::ClientSettings;
use textdrill::nav::Navigator;
use textdrill::nav::engine::metadata_from_value;
use textdrill::script::{load_script, run_script};
use textdrill::service::{DrillService, HttpServiceClient};

const LOG_FILE_PREFIX: &str = "textdrill.log";

#[derive(Debug, Parser)]
#[command(
    name = "textdrill",
    about = "Drill into documents line by line, word by word, character by character"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show service health.
    Health,
    /// List stored documents.
    Docs,
    /// Print a document and its metadata.
    Show { id: String },
    /// Store a new document.
    Create {
        #[arg(long)]
        id: String,
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Delete a document.
    Delete { id: String },
    /// Open a document and drill through the given item indices, e.g. `--path 2,0`.
    Browse {
        id: String,
        #[arg(long, value_delimiter = ',')]
        path: Vec<usize>,
    },
    /// List words shared between documents.
    Crosslinks,
    /// Find the lines containing a word and optionally open one of them.
    Traverse {
        word: String,
        #[arg(long = "doc")]
        document: Option<String>,
        /// Occurrence number (as listed) to open.
        #[arg(long)]
        open: Option<usize>,
    },
    /// Replay a YAML intent script and print the report as JSON.
    Run { script: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = ClientSettings::from_env().context("failed to load configuration")?;
    let _log_guard = init_tracing(&settings)?;

    let client = HttpServiceClient::new(&settings).context("failed to build service client")?;
    let navigator = Navigator::new(client);

    if !matches!(cli.command, Commands::Health) {
        // Startup probe; the command still runs when the service looks unhealthy.
        let _ = navigator.check_health().await;
    }

    match cli.command {
        Commands::Health => {
            let health = navigator.check_health().await?;
            println!(
                "service: {}\nstatus: {}\nneo4j: {}\ndocuments: {}",
                navigator.service().base_url(),
                health.status,
                health.neo4j,
                health.documents
            );
        }
        Commands::Docs => {
            let documents = navigator.list_documents().await?;
            if documents.is_empty() {
                println!("(no documents)");
            }
            for document in documents {
                println!(
                    "{}  [{} lines]  {}",
                    document.id, document.line_count, document.preview
                );
            }
        }
        Commands::Show { id } => {
            let document = navigator.service().get_document(&id).await?;
            let metadata = navigator.service().get_metadata(&id).await?;
            println!("{}", document.paragraph);
            if !metadata.is_empty() {
                println!("\n{}", serde_json::to_string_pretty(&metadata)?);
            }
        }
        Commands::Create {
            id,
            text,
            file,
            metadata,
        } => {
            let paragraph = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read `{}`", path.display()))?,
                (None, None) => bail!("either --text or --file is required"),
            };
            let metadata = metadata
                .map(|raw| {
                    let value =
                        serde_json::from_str(&raw).context("--metadata is not valid JSON")?;
                    metadata_from_value(value)
                        .ok_or_else(|| anyhow!("--metadata must be a JSON object"))
                })
                .transpose()?;

            navigator.create_document(&id, &paragraph, metadata).await?;
            println!("created {}", id.trim());
        }
        Commands::Delete { id } => {
            navigator.delete_document(&id).await?;
            println!("deleted {id}");
        }
        Commands::Browse { id, path } => {
            navigator.select_document(&id).await?;
            for index in path {
                let outcome = navigator.drill_into_index(index).await?;
                debug!(index, ?outcome, "browse step");
            }
            print_view(&navigator);
        }
        Commands::Crosslinks => {
            let shared = navigator.shared_words().await?;
            if shared.is_empty() {
                println!("(no shared words)");
            }
            for entry in shared {
                println!("{}  {}", entry.word, entry.documents.join(", "));
            }
        }
        Commands::Traverse {
            word,
            document,
            open,
        } => {
            let occurrences = navigator.find_word(&word, document.as_deref()).await?;
            for (number, occurrence) in occurrences.iter().enumerate() {
                println!(
                    "[{number}] {} line {}: {}",
                    occurrence.doc_id, occurrence.line_index, occurrence.line_text
                );
            }

            if let Some(number) = open {
                let occurrence = occurrences
                    .get(number)
                    .with_context(|| format!("no occurrence numbered {number}"))?;
                navigator.traverse_occurrence(occurrence).await?;
                println!();
                print_view(&navigator);
            }
        }
        Commands::Run { script } => {
            let script = load_script(&script)?;
            let report = run_script(&navigator, &script).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failed_steps > 0 {
                warn!(failed_steps = report.failed_steps, "some script steps failed");
            }
        }
    }

    Ok(())
}

fn print_view<S: DrillService>(navigator: &Navigator<S>) {
    let snapshot = navigator.snapshot();
    println!("{}", navigator.breadcrumbs().join(" > "));
    println!("level {}: {}", snapshot.state.level, snapshot.state.level.label());
    for node in snapshot.view.items() {
        let marker = if node.can_drill_down { " >" } else { "" };
        println!("  [{}] {}{marker}", node.index, node.label);
    }
    if let Some(error) = snapshot.error {
        println!("error: {error}");
    }
}

fn init_tracing(settings: &ClientSettings) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,textdrill=debug"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(env_filter);

    let (file, guard) = match &settings.log_dir {
        Some(log_dir) => {
            let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(&settings.file_log_filter));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize tracing subscriber: {error}"))?;
    Ok(guard)
}
