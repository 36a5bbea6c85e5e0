use anyhow::Result;
use clap::Parser;
use postcode_validation::{run, write_summary, PipelineConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "postcode-validation")]
#[command(about = "Validate an address list against a postcode reference table")]
#[command(version)]
struct Cli {
    /// Address list (CSV with header)
    address_list: PathBuf,

    /// Postcode reference table (CSV with header)
    postcode_reference: PathBuf,

    /// Destination for the validated address list (TSV)
    destination: PathBuf,

    /// Maximum distance in meters between address and reference coordinates
    #[arg(long)]
    tolerance_meters: Option<f64>,

    /// TOML file overriding column names, date formats or tolerance
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write a JSON summary of the run here
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> ExitCode {
    // Usage guidance (including --help/--version) is not a failure
    let Some(cli) = parse_args(std::env::args_os()) else {
        return ExitCode::SUCCESS;
    };

    init_logging();

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Parse the command line, printing usage and returning None when it is
/// not a runnable invocation.
fn parse_args<I, T>(args: I) -> Option<Cli>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Some(cli),
        Err(err) => {
            let _ = err.print();
            None
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("postcode_validation=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (or defaults) with command-line overrides applied.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(tolerance) = cli.tolerance_meters {
        config = config.with_tolerance(tolerance);
    }

    Ok(config)
}

fn execute(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    let summary = run(
        &cli.address_list,
        &cli.postcode_reference,
        &cli.destination,
        &config,
    )?;

    if let Some(path) = &cli.summary {
        write_summary(path, &summary)?;
    }

    println!("✓ {}", summary.summary());
    println!("✓ Output written to {}", cli.destination.display());

    Ok(())
}
