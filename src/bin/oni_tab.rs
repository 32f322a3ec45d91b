use std::fs;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use oni_tabulator::app::App;
use oni_tabulator::config::{ResolvedSettings, SettingsLoader};
use oni_tabulator::domain::{ApiKey, ConfigDocument};
use oni_tabulator::error::OniError;
use oni_tabulator::output::{JsonOutput, OutputMode};
use oni_tabulator::tabulator::ProcessTabulator;
use oni_tabulator::tui::Tui;

#[derive(Parser)]
#[command(name = "oni-tab")]
#[command(about = "Retrieve RO-Crate collections and configure their tabulation")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Settings file (defaults to ./oni-tabulator.json when present)
    #[arg(long, global = true)]
    settings: Option<String>,

    #[arg(long, global = true, env = "ONI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Fetch a collection, convert it and infer a configuration")]
    Retrieve(CollectionArgs),
    #[command(about = "Apply a configuration, build its tables and refresh it")]
    Parameters(ParametersArgs),
    #[command(about = "Show the fetch URL and database path for a collection")]
    Locate(CollectionArgs),
}

#[derive(Args, Clone)]
struct CollectionArgs {
    #[arg(long)]
    collection: String,

    #[arg(long)]
    provider: Option<String>,
}

#[derive(Args, Clone)]
struct ParametersArgs {
    #[command(flatten)]
    target: CollectionArgs,

    /// JSON configuration to apply; omitted means infer from scratch
    #[arg(long)]
    config: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(oni) = report.downcast_ref::<OniError>() {
            return ExitCode::from(map_exit_code(oni));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OniError) -> u8 {
    match error {
        OniError::Configuration(_)
        | OniError::SettingsRead(_)
        | OniError::SettingsParse(_)
        | OniError::UnknownProvider(_) => 2,
        OniError::Conversion(_)
        | OniError::Http(_)
        | OniError::HttpStatus { .. }
        | OniError::Timeout { .. }
        | OniError::MissingTool(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let settings = SettingsLoader::resolve(cli.settings.as_deref())?;
    let api_key = cli.api_key.and_then(ApiKey::new);

    match cli.command {
        Some(Command::Locate(args)) => {
            let app = build_app(&settings, args.provider.as_deref())?;
            JsonOutput::print_locate(&app.locate(&args.collection)).into_diagnostic()?;
            Ok(())
        }
        Some(Command::Retrieve(args)) => {
            let mut app = build_app(&settings, args.provider.as_deref())?;
            let result = app.retrieve_collection(&args.collection, api_key.as_ref(), &JsonOutput)?;
            JsonOutput::print_retrieve(&result).into_diagnostic()?;
            failed_conversion(result.error)
        }
        Some(Command::Parameters(args)) => {
            let document = match &args.config {
                Some(path) => read_document(path)?,
                None => ConfigDocument::new(),
            };
            let mut app = build_app(&settings, args.target.provider.as_deref())?;
            let result = app.get_table_parameters(
                &args.target.collection,
                api_key.as_ref(),
                document,
                &JsonOutput,
            )?;
            JsonOutput::print_parameters(&result).into_diagnostic()?;
            failed_conversion(result.error)
        }
        None => match output_mode {
            OutputMode::Interactive => {
                let app = build_app(&settings, None)?;
                let mut tui = Tui::new(&app, api_key.as_ref());
                tui.run(app)
            }
            OutputMode::NonInteractive => Err(miette::Report::msg(
                "command required (try `oni-tab --help`)",
            )),
        },
    }
}

fn build_app(
    settings: &ResolvedSettings,
    provider: Option<&str>,
) -> Result<App<ProcessTabulator>, OniError> {
    let mut providers = settings.registry();
    if let Some(provider) = provider {
        providers.add(provider);
        providers.select(provider)?;
    }
    let tabulator = ProcessTabulator::new(settings.tabulator_options())?;
    Ok(App::new(settings.store()?, providers, tabulator))
}

/// The result is printed either way; a failed conversion still sets the exit code.
fn failed_conversion(error: Option<String>) -> miette::Result<()> {
    match error {
        Some(error) => Err(OniError::Conversion(error).into()),
        None => Ok(()),
    }
}

fn read_document(path: &str) -> Result<ConfigDocument, OniError> {
    let content = fs::read_to_string(path)
        .map_err(|err| OniError::Configuration(format!("{path}: {err}")))?;
    content.parse()
}
