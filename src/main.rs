use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt};
use variantgen::config::{self, PipelineConfig};
use variantgen::convert::MagickConverter;
use variantgen::executor::CancelToken;
use variantgen::output;
use variantgen::pipeline::{self, RunOptions, RunReport};

#[derive(Parser)]
#[command(name = "variantgen")]
#[command(about = "Incremental responsive image derivatives")]
#[command(long_about = "\
Incremental responsive image derivatives

Every image in the working directory is converted by ImageMagick into a
ladder of sizes, each as JPEG and WebP, and gets an HTML fragment listing
its variants. Only sources newer than their derivatives (or missing some)
are converted again.

Layout:

  photos/
  ├── config.toml            # Optional (variantgen gen-config)
  ├── dawn.png               # Source
  ├── out/dawn_800.jpg       # <name>_<size>.jpg / .webp
  └── html/dawn.embed.html   # Fragment for dawn

Exit status: 0 on success, 1 on fatal errors, 2 when some jobs failed or
sources were skipped because their names collide.")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    build: BuildArgs,
}

/// Flags shared by every command that looks at a working directory.
#[derive(Args, Clone)]
struct RunArgs {
    /// Directory holding the source images
    #[arg(default_value = ".")]
    working_dir: PathBuf,

    /// Config file (default: <WORKING_DIR>/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Derivative directory, relative to the working directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Fragment directory, relative to the working directory
    #[arg(long)]
    html: Option<PathBuf>,

    /// Converter processes running at once
    #[arg(short = 'j', long)]
    parallelism: Option<usize>,

    /// Kill a converter after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Treat every source as stale
    #[arg(long)]
    force: bool,
}

#[derive(Args, Clone)]
struct BuildArgs {
    #[command(flatten)]
    run: RunArgs,

    /// Show what would be converted, convert nothing
    #[arg(long)]
    dry_run: bool,

    /// Cancel the remaining jobs after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Convert stale sources and write fragments (default)
    Build(BuildArgs),
    /// Report stale sources and planned jobs without converting
    Check(RunArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Build(cli.build)) {
        Command::Build(args) => build(args),
        Command::Check(args) => check(args),
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Diagnostics to stderr, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("variantgen=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load config for `args` and apply the command-line overrides.
fn load_config(args: &RunArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) if !path.exists() => {
            return Err(format!("config file not found: {}", path.display()).into());
        }
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(&args.working_dir)?,
    };
    if let Some(output) = &args.output {
        config.paths.output_dir = output.clone();
    }
    if let Some(html) = &args.html {
        config.paths.fragment_dir = html.clone();
    }
    if let Some(parallelism) = args.parallelism {
        config.processing.parallelism = parallelism;
    }
    if let Some(timeout) = args.timeout {
        config.processing.job_timeout_secs = Some(timeout);
    }
    config.validate()?;
    Ok(config)
}

fn exit_code(report: &RunReport) -> ExitCode {
    if report.has_problems() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

/// First Ctrl-C cancels the run: queued jobs are dropped and running
/// converters are killed. A second one exits immediately.
fn install_interrupt_handler(cancel: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("Interrupted, cancelling remaining jobs (Ctrl-C again to abort)");
        cancel.cancel();
    });
    if let Err(e) = result {
        tracing::warn!("cannot install Ctrl-C handler: {e}");
    }
}

fn build(args: BuildArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&args.run)?;
    let converter = MagickConverter::from_config(&config);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_job_event(&event) {
                println!("{}", line);
            }
        }
    });

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone());

    println!("Starting execution");
    let options = RunOptions {
        force: args.run.force,
        dry_run: args.dry_run,
        fail_fast: args.fail_fast,
        cancel,
        events: Some(tx),
    };
    let result = pipeline::run(&args.run.working_dir, &config, &converter, options);
    printer
        .join()
        .map_err(|_| "progress printer thread panicked")?;
    let report = result?;

    if report.dry_run {
        output::print_plan(&report);
    } else {
        output::print_run_summary(&report);
    }
    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
    }
    println!("Finished execution");
    Ok(exit_code(&report))
}

fn check(args: RunArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    let converter = MagickConverter::from_config(&config);
    let options = RunOptions {
        force: args.force,
        dry_run: true,
        ..Default::default()
    };
    println!("==> Checking {}", args.working_dir.display());
    let report = pipeline::run(&args.working_dir, &config, &converter, options)?;
    output::print_plan(&report);
    Ok(exit_code(&report))
}
