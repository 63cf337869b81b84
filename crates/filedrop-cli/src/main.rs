//! filedrop: upload local files through the upload orchestrator.
//!
//! Settings come from FILEDROP_* environment variables (or `.env`); flags override them.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use filedrop_cli::{init_tracing, ConsoleListener, LogNoticeSink};
use filedrop_core::{
    config::parse_extension_list, ItemStatus, LocalFile, StorageBackend, UploadItem,
    UploaderConfig,
};
use filedrop_storage::create_transport;
use filedrop_worker::{IntakeReport, UploadOrchestrator};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "filedrop", about = "Queue and upload files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more files
    Upload {
        /// Paths of the files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Accepted extensions, comma separated (e.g. "png,jpg")
        #[arg(long)]
        accept: Option<String>,
        /// Maximum number of items in the upload list
        #[arg(long)]
        max_items: Option<usize>,
        /// Storage backend: local or memory
        #[arg(long)]
        backend: Option<StorageBackend>,
        /// Directory the local backend writes to
        #[arg(long)]
        store: Option<PathBuf>,
        /// Public base URL for stored files
        #[arg(long)]
        base_url: Option<String>,
        /// Maximum file size in megabytes
        #[arg(long)]
        max_file_size_mb: Option<u64>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct ItemSummary {
    name: String,
    status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl From<&UploadItem> for ItemSummary {
    fn from(item: &UploadItem) -> Self {
        Self {
            name: item.display_name().to_string(),
            status: item.status,
            url: item.remote.as_ref().map(|r| r.url.clone()),
            errors: item.errors.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    items: Vec<ItemSummary>,
    rejected: Vec<String>,
    dropped: Vec<String>,
    canceled: usize,
}

impl Summary {
    fn new(items: &[UploadItem], report: &IntakeReport, canceled: usize) -> Self {
        Self {
            items: items.iter().map(ItemSummary::from).collect(),
            rejected: report.rejected.iter().map(|f| f.name.clone()).collect(),
            dropped: report.dropped.iter().map(|f| f.name.clone()).collect(),
            canceled,
        }
    }

    fn has_errors(&self) -> bool {
        self.items.iter().any(|i| i.status == ItemStatus::Errored)
    }

    fn print_text(&self) {
        for item in &self.items {
            match (&item.url, item.errors.is_empty()) {
                (Some(url), _) => println!("{:<10} {} -> {}", item.status, item.name, url),
                (None, false) => println!(
                    "{:<10} {}: {}",
                    item.status,
                    item.name,
                    item.errors.join("; ")
                ),
                (None, true) => println!("{:<10} {}", item.status, item.name),
            }
        }
        for name in &self.rejected {
            println!("{:<10} {} (extension not accepted)", "rejected", name);
        }
        for name in &self.dropped {
            println!("{:<10} {} (upload list full)", "dropped", name);
        }
        if self.canceled > 0 {
            println!("{} upload(s) canceled", self.canceled);
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize summary")?;
    println!("{}", out);
    Ok(())
}

async fn local_files(paths: Vec<PathBuf>) -> anyhow::Result<Vec<LocalFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        if !meta.is_file() {
            anyhow::bail!("{} is not a regular file", path.display());
        }
        files.push(LocalFile::new(path).with_size(meta.len()));
    }
    Ok(files)
}

#[allow(clippy::too_many_arguments)]
async fn upload(
    paths: Vec<PathBuf>,
    accept: Option<String>,
    max_items: Option<usize>,
    backend: Option<StorageBackend>,
    store: Option<PathBuf>,
    base_url: Option<String>,
    max_file_size_mb: Option<u64>,
    json: bool,
) -> anyhow::Result<bool> {
    let mut config =
        UploaderConfig::from_env().context("Failed to load configuration from environment")?;
    if let Some(accept) = accept {
        config.accepted_extensions = parse_extension_list(&accept);
    }
    if max_items.is_some() {
        config.max_items = max_items;
    }
    if let Some(backend) = backend {
        config.storage_backend = backend;
    }
    if let Some(store) = store {
        config.storage_path = store;
    }
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(mb) = max_file_size_mb {
        config.max_file_size_bytes = Some(mb.saturating_mul(1024 * 1024));
    }
    config.validate().context("Invalid configuration")?;

    let files = local_files(paths).await?;
    let transport = create_transport(&config)
        .await
        .context("Failed to create upload transport")?;

    let orchestrator = UploadOrchestrator::builder(transport)
        .config(config)
        .listener(Arc::new(ConsoleListener::new(48)))
        .notice_sink(Arc::new(LogNoticeSink))
        .build()
        .context("Failed to build upload orchestrator")?;

    let report = orchestrator.submit(files).await?;
    tracing::info!(
        queued = report.queued.len(),
        rejected = report.rejected.len(),
        dropped = report.dropped.len(),
        "Files submitted"
    );

    let mut canceled = 0;
    tokio::select! {
        _ = orchestrator.settled() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            canceled = orchestrator.cancel_all();
            tracing::warn!(canceled = canceled, "Interrupted, in-flight uploads canceled");
            orchestrator.settled().await;
        }
    }

    let summary = Summary::new(&orchestrator.snapshot(), &report, canceled);
    if json {
        print_json(&summary)?;
    } else {
        summary.print_text();
    }
    Ok(!summary.has_errors())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Upload {
            files,
            accept,
            max_items,
            backend,
            store,
            base_url,
            max_file_size_mb,
            json,
        } => {
            upload(
                files,
                accept,
                max_items,
                backend,
                store,
                base_url,
                max_file_size_mb,
                json,
            )
            .await?
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
