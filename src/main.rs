use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pdf_shrink::config::{parse_origins, DEFAULT_MAX_UPLOAD_BYTES};
use pdf_shrink::engine::locator_for;
use pdf_shrink::server;
use pdf_shrink::{Compressor, EngineSelection, PipelineConfig, Quality, ServerConfig};

/// Shrink PDFs with Ghostscript, or by recompressing their images
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Use this Ghostscript executable instead of searching for one
    #[arg(long, env = "GHOSTSCRIPT_PATH", global = true)]
    gs_path: Option<PathBuf>,

    /// Never use Ghostscript; always recompress in-process
    #[arg(long, global = true, conflicts_with = "gs_path")]
    no_engine: bool,

    /// Seconds before a Ghostscript run is abandoned
    #[arg(long, default_value_t = 120, global = true)]
    engine_timeout: u64,
}

impl EngineArgs {
    fn selection(&self) -> EngineSelection {
        match (&self.gs_path, self.no_engine) {
            (_, true) => EngineSelection::Disabled,
            (Some(path), false) => EngineSelection::Pinned(path.clone()),
            (None, false) => EngineSelection::Discover,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0:8000")]
        bind: String,

        /// Directory for staged uploads
        #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
        upload_dir: PathBuf,

        /// Directory for compressed outputs
        #[arg(long, env = "COMPRESSED_DIR", default_value = "compressed")]
        output_dir: PathBuf,

        /// Largest accepted upload in bytes
        #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,

        /// Comma-separated CORS origins, `*` for any
        #[arg(long, env = "ALLOWED_ORIGINS", default_value = "*")]
        allowed_origins: String,
    },

    /// Compress a single local file
    Compress {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file [default: <input>_compressed.pdf]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// low, medium, high or maximum; anything else means medium
        #[arg(short, long, default_value = "medium")]
        quality: String,
    },

    /// Report which Ghostscript executable would be used
    Locate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_env("RUST_LOG")
        .init();

    let engine_timeout = Duration::from_secs(cli.engine.engine_timeout);
    match cli.command {
        Command::Serve {
            bind,
            upload_dir,
            output_dir,
            max_upload_bytes,
            allowed_origins,
        } => {
            let pipeline = PipelineConfig::with_dirs(upload_dir, output_dir)
                .with_engine(cli.engine.selection())
                .with_engine_timeout(engine_timeout);
            let compressor =
                Compressor::from_config(&pipeline).context("Failed to prepare directories")?;
            let config = ServerConfig {
                bind,
                max_upload_bytes,
                allowed_origins: parse_origins(&allowed_origins),
            };
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(server::serve(compressor, config))
        }
        Command::Compress {
            input,
            output,
            quality,
        } => {
            let workdir = tempfile::tempdir().context("Failed to create working directory")?;
            let pipeline =
                PipelineConfig::with_dirs(workdir.path().join("in"), workdir.path().join("out"))
                    .with_engine(cli.engine.selection())
                    .with_engine_timeout(engine_timeout);
            compress_file(&pipeline, input, output, Quality::resolve(&quality))
        }
        Command::Locate => {
            let pipeline = PipelineConfig::default().with_engine(cli.engine.selection());
            match locator_for(&pipeline).locate() {
                Some(path) => println!("Ghostscript: {}", path.display()),
                None => println!("Ghostscript not found; in-process recompression will be used"),
            }
            Ok(())
        }
    }
}

fn compress_file(
    pipeline: &PipelineConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    quality: Quality,
) -> Result<()> {
    let output = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        input.with_file_name(format!("{}_compressed.pdf", stem))
    });

    let content = fs::read(&input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;
    let name = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    println!("Compressing {:?} at {} quality", input, quality);
    let start = Instant::now();
    let compressor = Compressor::from_config(pipeline)?;
    let report = compressor
        .compress(&content, &name, quality)
        .context("Failed to compress PDF")?;
    fs::copy(&report.output, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    compressor.cleanup(&report.output);

    println!("Done in {:.2?}", start.elapsed());
    println!(
        "Original size: {:.2} MB",
        report.original_size as f64 / 1_048_576.0
    );
    println!(
        "New size:      {:.2} MB",
        report.compressed_size as f64 / 1_048_576.0
    );
    println!("Reduction:     {:.2}%", report.compression_ratio);
    println!("Written to {:?}", output);

    Ok(())
}
