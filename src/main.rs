//! index-query: command line entry point

use anyhow::{Context, Result};
use clap::Parser;
use index_query::{
    config::{self, Backend, Settings},
    results::{render, OutputFormat},
    source::{ConnectionProvider, MemoryIndex, MemoryProvider, WindowsSearchProvider},
    CancellationToken, IndexSearch,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Search the Windows Search index for files containing any of the given terms
#[derive(Debug, Parser)]
#[command(name = "index-query", version)]
struct Args {
    /// Path to a settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to search under
    #[arg(short, long)]
    root: Option<String>,

    /// Search term (repeatable)
    #[arg(short, long = "term")]
    terms: Vec<String>,

    /// Accepted extension, leading dot optional (repeatable)
    #[arg(short, long = "ext")]
    extensions: Vec<String>,

    /// Extra index property to project (repeatable)
    #[arg(long = "column")]
    columns: Vec<String>,

    /// Data source backend
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,

    /// YAML fixture for the memory backend
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// PowerShell executable for the Windows Search backend (e.g. pwsh)
    #[arg(long)]
    shell: Option<String>,

    /// Command timeout in seconds, 0 disables it
    #[arg(long)]
    timeout: Option<u64>,

    /// Compare extensions case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Output format: text, json or csv
    #[arg(short, long)]
    format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BackendArg {
    WindowsSearch,
    Memory,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::WindowsSearch => Backend::WindowsSearch,
            BackendArg::Memory => Backend::Memory,
        }
    }
}

impl Args {
    /// Apply command line overrides on top of loaded settings
    fn apply(self, settings: &mut Settings) {
        if let Some(root) = self.root {
            settings.search.root_path = root;
        }
        if !self.terms.is_empty() {
            settings.search.terms = self.terms;
        }
        if !self.extensions.is_empty() {
            settings.search.extensions = self.extensions;
        }
        if !self.columns.is_empty() {
            settings.search.columns = self.columns;
        }
        if self.case_sensitive {
            settings.search.case_sensitive = true;
        }
        if let Some(backend) = self.backend {
            settings.connection.backend = backend.into();
        }
        if let Some(fixture) = self.fixture {
            settings.connection.fixture = Some(fixture);
        }
        if let Some(shell) = self.shell {
            settings.connection.shell = shell;
        }
        if let Some(timeout) = self.timeout {
            settings.connection.command_timeout = timeout;
        }
        if let Some(format) = self.format {
            settings.output.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = config::load(args.config.as_deref())?;
    args.apply(&mut settings);

    // Diagnostics go to stderr so stdout carries only results
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting index-query v{}", index_query::VERSION);

    let request = settings
        .search_request()
        .context("invalid search request")?;
    let provider = build_provider(&settings)?;
    let search = IndexSearch::new(provider, settings.connection.clone());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling search");
            on_signal.cancel();
        }
    });

    let outcome = match tokio::task::spawn_blocking(move || search.execute_with_cancel(&request, &cancel))
        .await
        .context("search task panicked")?
    {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            warn!("{}", e);
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };

    if !outcome.advance_failures.is_empty() {
        warn!(
            "{} cursor advance failures during the search",
            outcome.advance_failures.len()
        );
    }

    print!("{}", render(&outcome.rows, settings.output.format)?);
    Ok(())
}

fn build_provider(settings: &Settings) -> Result<Arc<dyn ConnectionProvider>> {
    Ok(match settings.connection.backend {
        Backend::WindowsSearch => {
            Arc::new(WindowsSearchProvider::new().with_shell(&settings.connection.shell))
        }
        Backend::Memory => {
            let fixture = settings
                .connection
                .fixture
                .as_ref()
                .context("the memory backend needs a fixture file")?;
            let index = MemoryIndex::from_file(fixture)
                .with_context(|| format!("failed to load fixture {}", fixture.display()))?;
            info!("Loaded {} documents from {}", index.documents.len(), fixture.display());
            Arc::new(MemoryProvider::new(index))
        }
    })
}
