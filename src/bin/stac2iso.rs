use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use stac2iso::app::{App, EXIT_SETUP, resolve_record};
use stac2iso::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use stac2iso::domain::{CatalogScope, TemplateVariant, collection_url};
use stac2iso::error::Stac2IsoError;
use stac2iso::normalize::NormalizeOptions;
use stac2iso::output::{ConsoleOutput, JsonOutput, OutputDir, OutputMode};
use stac2iso::populate::{Populator, PopulatorSettings};
use stac2iso::stac::{CatalogClient, StacHttpClient};
use stac2iso::template::Template;

#[derive(Parser)]
#[command(name = "stac2iso")]
#[command(about = "Convert STAC collections into ISO 19115/19139 metadata documents")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./stac2iso.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print a JSON report instead of progress lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Write one ISO metadata document per collection")]
    Convert(ConvertArgs),
    #[command(about = "Print the normalized record of one collection")]
    Record(RecordArgs),
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(long)]
    catalog: Option<String>,

    #[arg(long)]
    template: Option<String>,

    #[arg(long)]
    output_dir: Option<String>,

    /// Only convert this collection id
    #[arg(long)]
    collection: Option<String>,

    #[arg(long, value_enum)]
    variant: Option<TemplateVariant>,

    /// File name for the single-collection document
    #[arg(long, requires = "collection")]
    output_name: Option<String>,
}

#[derive(Args)]
struct RecordArgs {
    id: String,

    #[arg(long)]
    catalog: Option<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<Stac2IsoError>() {
                return ExitCode::from(error.exit_code());
            }
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Console
    };

    match cli.command {
        Commands::Convert(args) => run_convert(cli.config.as_deref(), args, output_mode),
        Commands::Record(args) => run_record(cli.config.as_deref(), args),
    }
}

fn run_convert(
    config_path: Option<&str>,
    args: ConvertArgs,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let overrides = ConfigOverrides {
        catalog_root: args.catalog,
        template: args.template,
        output_dir: args.output_dir,
        template_variant: args.variant,
    };
    let config = ConfigLoader::resolve(config_path, overrides)?;
    let template = Template::load(config.template_path()?)?;
    let output = OutputDir::new(config.output_dir.clone());
    output.ensure_root()?;

    let client = StacHttpClient::new(config.timeout)?;
    let app = App::new(
        client,
        config.catalog_root.clone(),
        template,
        Populator::new(populator_settings(&config)),
        NormalizeOptions {
            license: config.license.clone(),
        },
        output,
    );

    let scope = match args.collection {
        Some(id) => CatalogScope::Single(id),
        None => CatalogScope::All,
    };
    let report = match output_mode {
        OutputMode::Console => {
            let report = app.run(&scope, args.output_name.as_deref(), &ConsoleOutput);
            ConsoleOutput::print_summary(&report);
            report
        }
        OutputMode::Json => {
            let report = app.run(&scope, args.output_name.as_deref(), &JsonOutput);
            JsonOutput::print_report(&report).into_diagnostic()?;
            report
        }
    };

    Ok(ExitCode::from(report.exit_code(&scope)))
}

fn run_record(config_path: Option<&str>, args: RecordArgs) -> miette::Result<ExitCode> {
    let overrides = ConfigOverrides {
        catalog_root: args.catalog,
        ..ConfigOverrides::default()
    };
    let config = ConfigLoader::resolve(config_path, overrides)?;
    let client = StacHttpClient::new(config.timeout)?;
    let url = collection_url(&config.catalog_root, &args.id);
    let raw = client.fetch_collection(&url)?;
    let options = NormalizeOptions {
        license: config.license.clone(),
    };
    let record = resolve_record(&client, &raw, &url, &options);
    JsonOutput::print_record(&record).into_diagnostic()?;
    Ok(ExitCode::SUCCESS)
}

fn populator_settings(config: &ResolvedConfig) -> PopulatorSettings {
    PopulatorSettings {
        variant: config.template_variant,
        namespaces: config.namespaces.clone(),
        catalog_label: config.catalog_label.clone(),
    }
}
