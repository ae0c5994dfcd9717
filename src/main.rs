use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pii_chunker::chunker::{ChunkingConfig, DEFAULT_OVERLAP_LENGTH};
use pii_chunker::discovery::{collect_input_files, DiscoveryConfig};
use pii_chunker::inference::{AggregationStrategy, HttpBackendConfig, HttpInferenceBackend};
use pii_chunker::output::{write_record, RunStats};
use pii_chunker::reader::{DocumentReader, ReaderConfig};
use pii_chunker::{DetectionPipeline, LabelConfig, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pii-chunker")]
#[command(about = "Detect PII in long documents with a windowed NER model")]
#[command(version)]
struct Args {
    /// Documents or directories to scan
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Token-classification endpoint
    #[arg(long, env = "PII_CHUNKER_ENDPOINT")]
    endpoint: String,

    /// Bearer token for the endpoint
    #[arg(long, env = "PII_CHUNKER_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Label mapping file (.toml or .json); overrides --preset
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Bundled label mapping
    #[arg(long, default_value = "stanford", value_parser = ["stanford", "bert-deid"])]
    preset: String,

    /// Map supported entity types onto themselves
    #[arg(long)]
    canonical_passthrough: bool,

    /// Model maximum input length; window length and threshold default to twice this
    #[arg(long, default_value_t = 512)]
    model_max_length: usize,

    /// Characters per window
    #[arg(long)]
    window_length: Option<usize>,

    /// Characters shared by consecutive windows
    #[arg(long, default_value_t = DEFAULT_OVERLAP_LENGTH)]
    overlap: usize,

    /// Documents at or below this length are sent whole
    #[arg(long)]
    threshold: Option<usize>,

    /// Windows in flight at once (default: number of CPUs)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-window inference timeout in milliseconds
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,

    /// Sub-word aggregation requested from the endpoint
    #[arg(long, value_enum, default_value = "simple")]
    aggregation: AggregationStrategy,

    /// File extension picked up when walking directories
    #[arg(long, default_value = "txt")]
    extension: String,

    /// Abort on first unreadable document
    #[arg(long)]
    fail_fast: bool,

    /// JSON lines output file (default: stdout)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Suppress console progress bar
    #[arg(long)]
    no_progress: bool,

    /// Stats output file path
    #[arg(long, default_value = "run_stats.json")]
    stats_out: PathBuf,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        let defaults = ChunkingConfig::for_model_max_length(self.model_max_length);
        PipelineConfig {
            chunking: ChunkingConfig {
                window_length: self.window_length.unwrap_or(defaults.window_length),
                overlap_length: self.overlap,
                threshold: self.threshold.unwrap_or(defaults.threshold),
            },
            max_concurrency: self.concurrency.unwrap_or_else(num_cpus::get),
            window_timeout: Some(Duration::from_millis(self.timeout_ms)),
        }
    }

    fn label_config(&self) -> Result<LabelConfig> {
        let config = match &self.labels {
            Some(path) => LabelConfig::from_file(path)?,
            None => LabelConfig::preset(&self.preset)
                .with_context(|| format!("Unknown label preset {}", self.preset))?,
        };
        Ok(if self.canonical_passthrough {
            config.with_canonical_passthrough()
        } else {
            config
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: structured JSON logging on stderr keeps stdout free for results
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    // WHY: never log the full args, they carry the API token
    info!(inputs = ?args.inputs, endpoint = %args.endpoint, "Parsed CLI arguments");

    let run_start = Instant::now();

    // WHY: configuration errors are the only fatal pipeline errors, surface them before any I/O
    let labels = args.label_config()?;
    let backend = HttpInferenceBackend::new(HttpBackendConfig {
        endpoint: args.endpoint.clone(),
        api_token: args.api_token.clone(),
        aggregation_strategy: args.aggregation,
        request_timeout: Duration::from_millis(args.timeout_ms),
    })
    .context("Failed to build inference client")?;
    let pipeline = DetectionPipeline::new(Arc::new(backend), labels, args.pipeline_config())?;

    let discovery_config = DiscoveryConfig {
        fail_fast: args.fail_fast,
        extension: args.extension.clone(),
    };
    let inputs = collect_input_files(&args.inputs, &discovery_config).await?;
    if inputs.is_empty() {
        anyhow::bail!("No input documents found");
    }

    let reader = DocumentReader::new(ReaderConfig {
        fail_fast: args.fail_fast,
        ..Default::default()
    });

    let sink: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create output {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    let mut writer = BufWriter::new(sink);

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(inputs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} documents {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let mut run_stats = RunStats::default();

    for input in &inputs {
        let path = input.path.display().to_string();
        progress.set_message(path.clone());

        if let Some(error) = &input.error {
            run_stats.record_failure(&path, error.clone());
            progress.inc(1);
            continue;
        }

        let (text, read_stats) = reader.read_document(&input.path).await?;
        if let Some(error) = read_stats.read_error {
            warn!("Skipping {}: {}", path, error);
            run_stats.record_failure(&path, error);
            progress.inc(1);
            continue;
        }

        let report = pipeline.analyze(&text).await?;
        write_record(&mut writer, &path, &report).await?;
        run_stats.record_success(&path, &report.stats);
        progress.inc(1);
    }

    writer.flush().await?;
    progress.finish_and_clear();

    run_stats.run_time_ms = run_start.elapsed().as_millis() as u64;
    run_stats.save(&args.stats_out).await?;

    info!(
        processed = run_stats.documents_processed,
        failed = run_stats.documents_failed,
        detections = run_stats.total_detections,
        failed_windows = run_stats.failed_windows,
        "Run completed in {}ms",
        run_stats.run_time_ms
    );
    eprintln!(
        "pii-chunker v{}: {} documents processed, {} failed, {} detections",
        env!("CARGO_PKG_VERSION"),
        run_stats.documents_processed,
        run_stats.documents_failed,
        run_stats.total_detections
    );

    Ok(())
}
