use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use citemark_core::config_file::{load_config, load_from_path, merge};
use citemark_core::{AnalysisConfig, Preset};
use citemark_engine::{Analyzer, NeverCancel};
use citemark_reporting::ExportFormat;

mod output;

use output::ColorMode;

/// Citemark - Detect numeric citation markers in academic PDFs
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect citation markers in a PDF or a JSON character dump
    Analyze {
        /// Path to the PDF or .json character dump
        file_path: PathBuf,

        /// Threshold preset: strict, balanced or recall
        #[arg(long)]
        preset: Option<Preset>,

        /// TOML config file layered over the default config locations
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format: text, json or csv
        #[arg(long, default_value = "text")]
        format: ExportFormat,

        /// Write the export to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Treat every page as a single column
        #[arg(long)]
        no_columns: bool,
    },

    /// Print the reconstructed reading-order text of every page
    Text {
        /// Path to the PDF or .json character dump
        file_path: PathBuf,

        /// TOML config file layered over the default config locations
        #[arg(long)]
        config: Option<PathBuf>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Treat every page as a single column
        #[arg(long)]
        no_columns: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            file_path,
            preset,
            config,
            format,
            output,
            no_color,
            no_columns,
        } => {
            let config = resolve_config(preset, config.as_deref(), no_columns)?;
            analyze(file_path, config, format, output, no_color).await
        }
        Command::Text {
            file_path,
            config,
            no_color,
            no_columns,
        } => {
            let config = resolve_config(None, config.as_deref(), no_columns)?;
            text(&file_path, config, no_color)
        }
    }
}

/// Resolve configuration: CLI flags > env vars > config files > preset defaults.
fn resolve_config(
    preset: Option<Preset>,
    config_path: Option<&Path>,
    no_columns: bool,
) -> anyhow::Result<AnalysisConfig> {
    let mut file = load_config();
    if let Some(path) = config_path {
        let explicit = load_from_path(path).ok_or_else(|| {
            anyhow::anyhow!("Config file missing or unparsable: {}", path.display())
        })?;
        file = merge(file, explicit);
    }

    let preset = match preset {
        Some(p) => Some(p),
        None => std::env::var("CITEMARK_PRESET")
            .ok()
            .map(|v| v.parse::<Preset>())
            .transpose()?,
    };

    let mut builder = file.apply(AnalysisConfig::builder());
    if let Some(preset) = preset {
        builder = builder.preset(preset);
    }
    if no_columns {
        builder = builder.enable_two_column_detect(false);
    }
    Ok(builder.build()?)
}

async fn analyze(
    file_path: PathBuf,
    config: AnalysisConfig,
    format: ExportFormat,
    output: Option<PathBuf>,
    no_color: bool,
) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.display().to_string());
    tracing::info!(
        file = %file_path.display(),
        preset = config.preset.as_str(),
        "analyzing"
    );

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let bar = output::progress_bar()?;
    let worker_bar = bar.clone();
    let worker_path = file_path.clone();
    let analyzer = Analyzer::new(config);
    let result = tokio::task::spawn_blocking(move || {
        citemark_ingest::analyze_path(&worker_path, &analyzer, &cancel, |event| {
            output::advance(&worker_bar, &event)
        })
    })
    .await?;
    bar.finish_and_clear();
    let analysis = result?;

    let mut stderr = std::io::stderr();
    let err_color = ColorMode(!no_color);
    output::print_aborted(&mut stderr, &analysis, err_color)?;

    if let Some(path) = output {
        if !format.matches_path(&path) {
            tracing::warn!(
                path = %path.display(),
                expected = format.extension(),
                "output extension does not match export format"
            );
        }
        citemark_reporting::export_occurrences(&analysis, format, &path)
            .map_err(|e| anyhow::anyhow!(e))?;
        output::print_summary(&mut stderr, &file_name, &analysis, err_color)?;
        writeln!(stderr, "Wrote {} export to {}", format.label(), path.display())?;
        return Ok(());
    }

    let mut stdout = std::io::stdout().lock();
    match format {
        ExportFormat::Text => {
            let color = ColorMode(!no_color);
            output::print_summary(&mut stdout, &file_name, &analysis, color)?;
            output::print_occurrences(&mut stdout, &analysis, color)?;
        }
        ExportFormat::Json | ExportFormat::Csv => {
            let content =
                citemark_reporting::render(&analysis, format).map_err(|e| anyhow::anyhow!(e))?;
            stdout.write_all(content.as_bytes())?;
        }
    }
    stdout.flush()?;
    Ok(())
}

fn text(file_path: &Path, config: AnalysisConfig, no_color: bool) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }
    let pages = citemark_ingest::load_pages(file_path)?;
    let analyzer = Analyzer::new(config);
    let Some((layouts, removed)) = analyzer.reconstruct(&pages, &NeverCancel, &|_| {}) else {
        anyhow::bail!("Line reconstruction was cancelled");
    };
    tracing::debug!(pages = layouts.len(), running_lines_removed = removed, "reconstructed");

    let color = ColorMode(!no_color);
    let mut stdout = std::io::stdout().lock();
    for layout in &layouts {
        let text = citemark_layout::page_text(&layout.lines, &analyzer.config().layout);
        output::print_page_text(&mut stdout, layout.number, &text, color)?;
    }
    stdout.flush()?;
    Ok(())
}
