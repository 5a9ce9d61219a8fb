use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "frameblend", version)]
struct Cli {
    /// Log filter (`error`, `warn`, `info`, `debug`, `trace`, or a full `RUST_LOG` directive).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter every frame of an image or video.
    Run(RunArgs),
    /// List the backends this build can run.
    Backends,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Input image or video.
    #[arg(long = "in")]
    in_path: Option<PathBuf>,

    /// Output image or video.
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON run configuration; flags given on the command line override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    backend: Option<frameblend::BackendKind>,

    #[arg(long, value_enum)]
    kernel: Option<frameblend::Kernel>,

    /// Codec for both ends (default: chosen by file extension).
    #[arg(long, value_enum)]
    engine: Option<frameblend::CodecEngine>,

    /// Workers for the fork-join and thread-pool backends (0 = available parallelism).
    #[arg(long)]
    threads: Option<usize>,

    /// Round decoded row strides up to a multiple of this many bytes.
    #[arg(long)]
    row_align: Option<usize>,

    /// Refuse to replace an existing output file.
    #[arg(long)]
    no_overwrite: bool,

    /// GPU completion wait timeout, per attempt.
    #[arg(long)]
    fence_timeout_ms: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Backends => cmd_backends(),
    }
}

fn init_tracing(level: Option<&str>) -> anyhow::Result<()> {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l).with_context(|| format!("invalid --log-level '{l}'"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: RunArgs) -> anyhow::Result<frameblend::RunConfig> {
    let mut cfg = match &args.config {
        Some(path) => frameblend::RunConfig::from_json_file(path)
            .with_context(|| format!("load run config '{}'", path.display()))?,
        None => frameblend::RunConfig::default(),
    };
    if let Some(p) = args.in_path {
        cfg.input = p;
    }
    if let Some(p) = args.out {
        cfg.output = p;
    }
    if let Some(b) = args.backend {
        cfg.backend = b;
    }
    if let Some(k) = args.kernel {
        cfg.kernel = k;
    }
    if args.engine.is_some() {
        cfg.engine = args.engine;
    }
    if let Some(t) = args.threads {
        cfg.threads = t;
    }
    if let Some(a) = args.row_align {
        cfg.row_align = a;
    }
    if args.no_overwrite {
        cfg.overwrite = false;
    }
    if let Some(ms) = args.fence_timeout_ms {
        cfg.gpu.fence_timeout_ms = ms;
    }
    Ok(cfg)
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = build_config(args)?;
    let stats = frameblend::run(&cfg).with_context(|| {
        format!(
            "{} '{}' -> '{}' with {}",
            cfg.kernel,
            cfg.input.display(),
            cfg.output.display(),
            cfg.backend
        )
    })?;
    eprintln!(
        "wrote {} ({} frame{})",
        cfg.output.display(),
        stats.frames_encoded,
        if stats.frames_encoded == 1 { "" } else { "s" }
    );
    Ok(())
}

fn cmd_backends() -> anyhow::Result<()> {
    for kind in frameblend::BackendKind::ALL {
        let status = if kind.is_available() {
            "available"
        } else {
            "not built"
        };
        println!("{:<12} {status}", kind.name());
    }
    Ok(())
}
