//! CLI entry point for `pdffetch`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use pdffetch::config::{self, Config};
use pdffetch::export::download::PdfDownloader;
use pdffetch::export::summary::summarize;
use pdffetch::fetch::{fetch_pdfs, FetchRequest};
use pdffetch::model::summary::DownloadSummary;
use pdffetch::server::jobs::InMemoryJobStore;
use pdffetch::server::runner::GmailRunner;
use pdffetch::server::{self, AppState};

const LOG_FILE_NAME: &str = "pdffetch.log";

#[derive(Parser)]
#[command(
    name = "pdffetch",
    version,
    about = "Download PDF attachments from Gmail for a date range"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch PDF attachments from emails in a date range
    Fetch {
        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start_date: String,
        /// End date (YYYY-MM-DD), exclusive
        #[arg(short, long)]
        end_date: String,
        /// Gmail search query combined with the date range
        #[arg(short, long)]
        query: Option<String>,
        /// Maximum number of emails to process
        #[arg(short, long)]
        max_results: Option<u32>,
        /// Directory to save PDFs into
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
        /// OAuth2 client secrets JSON
        #[arg(short, long)]
        credentials: Option<PathBuf>,
        /// Print the download summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the HTTP job service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Fetch {
            start_date,
            end_date,
            query,
            max_results,
            download_dir,
            credentials,
            json,
        } => {
            let request = FetchRequest {
                start_date,
                end_date,
                query: query.unwrap_or_else(|| config.gmail.default_query.clone()),
                max_results: max_results.unwrap_or(config.gmail.max_results),
            };
            let dir = download_dir.unwrap_or_else(|| config.download.dir.clone());
            let credentials = credentials.or_else(|| config.gmail.credentials_file.clone());
            cmd_fetch(&config, &request, dir, credentials, json, cli.verbose > 0)
        }
        Commands::Serve { host, port } => cmd_serve(&config, host, port),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Install the tracing subscriber: stderr always, plus `pdffetch.log` when the
/// log directory is usable.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let log_dir = config::log_dir(config);
    let file_layer = std::fs::create_dir_all(&log_dir).ok().map(|()| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

/// Authenticate, fetch PDFs for the date range and print a summary.
fn cmd_fetch(
    config: &Config,
    request: &FetchRequest,
    download_dir: PathBuf,
    credentials: Option<PathBuf>,
    json: bool,
    verbose: bool,
) -> anyhow::Result<()> {
    // Reject bad dates before any browser round-trip.
    request.search_query()?;

    let client = pdffetch::gmail::connect(credentials, config::token_file_path(config))
        .context("Failed to authenticate with Gmail")?;
    let downloader = PdfDownloader::new(download_dir)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Downloading [{bar:40.cyan/blue}] {pos}/{len} emails")?
            .progress_chars("#>-"),
    );

    let files = fetch_pdfs(
        &client,
        &downloader,
        request,
        Some(&|done: usize, total: usize| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
            true
        }),
    )?;
    pb.finish_and_clear();

    let summary = summarize(&files);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, &downloader, verbose);
    }
    Ok(())
}

/// Print a download summary in a human-readable table.
fn print_summary(summary: &DownloadSummary, downloader: &PdfDownloader, verbose: bool) {
    use humansize::{format_size, DECIMAL};

    println!();
    if summary.total_files == 0 {
        println!("  No PDF files found in the specified date range.");
        println!();
        return;
    }

    println!("  {:<20} {}", "Downloaded files", summary.total_files);
    println!(
        "  {:<20} {:.2} MB ({})",
        "Total size",
        summary.total_size_mb,
        format_size(summary.total_size_bytes, DECIMAL)
    );
    println!("  {:<20} {}", "Directory", downloader.download_dir().display());

    if verbose {
        println!();
        for file in &summary.files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            println!("    {:>8.2} MB  {name}", file.size_mb);
        }
    }
    println!();
}

/// Run the job service until interrupted.
fn cmd_serve(config: &Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;

    let state = AppState {
        jobs: Arc::new(InMemoryJobStore::new()),
        runner: Arc::new(GmailRunner {
            credentials_file: config.gmail.credentials_file.clone(),
            token_file: config::token_file_path(config),
        }),
        download_dir: config.download.dir.clone(),
        default_query: config.gmail.default_query.clone(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(addr, state))
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "pdffetch", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
