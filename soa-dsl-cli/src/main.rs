//! SOA DSL CLI - compile Safe-Operating-Area rules into Spectre monitor netlists.

use clap::{Parser, Subcommand, ValueEnum};
use soa_dsl::converter::{DeviceCatalog, MonitorCatalog};
use soa_dsl::{
    GeneratorOptions, Libraries, SoaDslCore, SoaDslError, ValidationOptions, ValidationReport,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soa-dsl")]
#[command(about = "SOA rule compiler: YAML limits to Spectre/Verilog-A monitors", long_about = None)]
#[command(version)]
struct Cli {
    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a rule document and report every problem found
    Validate {
        /// Rule document (.yaml/.yml)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Fail on warnings as well as errors
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Lower a rule document into a monitor document
    Convert {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Device library YAML
        #[arg(long, value_name = "YAML")]
        devices: PathBuf,

        /// Monitor library YAML
        #[arg(long, value_name = "YAML")]
        monitors: PathBuf,

        /// Write the monitor document here instead of stdout
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },

    /// Generate a netlist from a monitor document, or from a rule document
    /// when libraries are given
    Generate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_name = "YAML", requires = "monitors")]
        devices: Option<PathBuf>,

        #[arg(long, value_name = "YAML", requires = "devices")]
        monitors: Option<PathBuf>,

        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Replace global parameter references with their values
        #[arg(long)]
        inline_globals: bool,
    },

    /// Validate, convert and generate in one run
    Compile {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_name = "YAML")]
        devices: PathBuf,

        #[arg(long, value_name = "YAML")]
        monitors: PathBuf,

        #[arg(short, long, value_name = "OUT")]
        output: PathBuf,

        /// Fail on warnings as well as errors
        #[arg(long)]
        strict: bool,

        #[arg(long)]
        inline_globals: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for CI/CD
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Validate {
            file,
            strict,
            format,
        } => handle_validate(&file, strict, format),
        Commands::Convert {
            file,
            devices,
            monitors,
            output,
        } => exit_status(handle_convert(&file, &devices, &monitors, output.as_deref())),
        Commands::Generate {
            file,
            devices,
            monitors,
            output,
            inline_globals,
        } => exit_status(handle_generate(
            &file,
            devices.as_deref().zip(monitors.as_deref()),
            output.as_deref(),
            inline_globals,
        )),
        Commands::Compile {
            file,
            devices,
            monitors,
            output,
            strict,
            inline_globals,
        } => handle_compile(&file, &devices, &monitors, &output, strict, inline_globals),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn exit_status(result: Result<(), SoaDslError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn handle_validate(file: &Path, strict: bool, format: OutputFormat) -> i32 {
    let options = ValidationOptions {
        strict_mode: strict,
    };

    match SoaDslCore::validate_file(file, &options) {
        Ok(report) => {
            if let Err(e) = output_report(&report, &format) {
                eprintln!("Error: {}", e);
                return 1;
            }
            if report.passed {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn output_report(report: &ValidationReport, format: &OutputFormat) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Human => print!("{}", report.render()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}

fn load_libraries(
    devices: &Path,
    monitors: &Path,
) -> Result<(DeviceCatalog, MonitorCatalog), SoaDslError> {
    Ok((
        DeviceCatalog::from_file(devices)?,
        MonitorCatalog::from_file(monitors)?,
    ))
}

fn write_output(output: Option<&Path>, text: &str) -> Result<(), SoaDslError> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            tracing::info!("Wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn handle_convert(
    file: &Path,
    devices: &Path,
    monitors: &Path,
    output: Option<&Path>,
) -> Result<(), SoaDslError> {
    let (devices, monitors) = load_libraries(devices, monitors)?;
    let document = SoaDslCore::convert_file(file, Libraries::new(&devices, &monitors))?;
    write_output(output, &document.to_yaml()?)
}

fn handle_generate(
    file: &Path,
    libraries: Option<(&Path, &Path)>,
    output: Option<&Path>,
    inline_globals: bool,
) -> Result<(), SoaDslError> {
    let options = GeneratorOptions { inline_globals };
    let netlist = match libraries {
        Some((devices, monitors)) => {
            let (devices, monitors) = load_libraries(devices, monitors)?;
            SoaDslCore::generate_file(file, Some(Libraries::new(&devices, &monitors)), &options)?
        }
        None => SoaDslCore::generate_file(file, None, &options)?,
    };
    write_output(output, &netlist)
}

fn handle_compile(
    file: &Path,
    devices: &Path,
    monitors: &Path,
    output: &Path,
    strict: bool,
    inline_globals: bool,
) -> i32 {
    let (devices, monitors) = match load_libraries(devices, monitors) {
        Ok(libraries) => libraries,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let result = SoaDslCore::compile_file(
        file,
        Libraries::new(&devices, &monitors),
        &ValidationOptions {
            strict_mode: strict,
        },
        &GeneratorOptions { inline_globals },
    );

    match result {
        Ok(compiled) => {
            if let Err(e) = write_output(Some(output), &compiled.netlist) {
                eprintln!("Error: {}", e);
                return 1;
            }
            if !compiled.report.warnings.is_empty() {
                eprint!("{}", compiled.report.render());
            }
            println!(
                "Compiled {} monitors into {}",
                compiled.document.monitors.len(),
                output.display()
            );
            0
        }
        Err(SoaDslError::ValidationFailed(report)) => {
            eprint!("{}", report.render());
            eprintln!(
                "Error: Validation failed with {} error(s) and {} warning(s)",
                report.errors.len(),
                report.warnings.len()
            );
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
