// crates/stratum-cli/src/main.rs
// ============================================================================
// Module: Stratum CLI Entry Point
// Description: Command dispatcher for environment and agent upgrade workflows.
// Purpose: Drive configured environments and upgrade runs from the shell.
// Dependencies: clap, stratum-config, stratum-core, stratum-providers, stratum-upgrades
// ============================================================================

//! ## Overview
//! The `stratum` binary loads `stratum.toml`, installs the tracing subscriber
//! described by its `[logging]` section, and dispatches one command:
//! - `config validate` checks the file and every environment's attributes
//!   against its provider schema.
//! - `config boilerplate` prints a commented sample for a provider.
//! - `sources list` prints the metadata sources an environment resolves.
//! - `bootstrap` and `destroy` run the environment lifecycle.
//! - `upgrade run` applies the declared upgrade steps against the configured
//!   cluster state store.
//!
//! Command output goes to stdout; logs and errors go to stderr.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use stratum_config::LogFormat;
use stratum_config::LoggingConfig;
use stratum_config::StratumConfig;
use stratum_core::BootstrapParams;
use stratum_core::ClusterStateStore;
use stratum_core::Constraints;
use stratum_core::Environment;
use stratum_core::InMemoryClusterStateStore;
use stratum_core::MachineId;
use stratum_core::NodeRole;
use stratum_core::OperationContext;
use stratum_core::Version;
use stratum_core::common_schema;
use stratum_providers::MemoryCloud;
use stratum_providers::ProviderRegistry;
use stratum_providers::SigmaProviderConfig;
use stratum_store_sqlite::SqliteClusterStore;
use stratum_upgrades::UpgradeContext;
use stratum_upgrades::perform_upgrade;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "stratum", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Config file path (defaults to stratum.toml or `STRATUM_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Metadata source utilities.
    Sources {
        /// Selected sources subcommand.
        #[command(subcommand)]
        command: SourcesCommand,
    },
    /// Bootstrap a configured environment.
    Bootstrap(BootstrapCommand),
    /// Tear down a configured environment.
    Destroy(EnvironmentArgs),
    /// Agent upgrade utilities.
    Upgrade {
        /// Selected upgrade subcommand.
        #[command(subcommand)]
        command: UpgradeCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the config file and every declared environment.
    Validate,
    /// Print a commented sample environment for a provider.
    Boilerplate(BoilerplateCommand),
}

/// Sources subcommands.
#[derive(Subcommand, Debug)]
enum SourcesCommand {
    /// List metadata sources in resolution order.
    List(EnvironmentArgs),
}

/// Upgrade subcommands.
#[derive(Subcommand, Debug)]
enum UpgradeCommand {
    /// Run the upgrade steps between two versions.
    Run(UpgradeRunCommand),
}

/// Arguments naming a declared environment.
#[derive(Args, Debug)]
struct EnvironmentArgs {
    /// Environment name as declared in the config file.
    #[arg(long, value_name = "NAME")]
    environment: String,
}

/// Arguments for boilerplate output.
#[derive(Args, Debug)]
struct BoilerplateCommand {
    /// Provider type to describe.
    #[arg(long, value_name = "TYPE")]
    provider: String,
}

/// Arguments for bootstrap.
#[derive(Args, Debug)]
struct BootstrapCommand {
    /// Target environment.
    #[command(flatten)]
    target: EnvironmentArgs,
    /// Series for the control instance (defaults to `default-series`).
    #[arg(long, value_name = "SERIES")]
    series: Option<String>,
    /// Constraints such as `arch=amd64 mem=4G`.
    #[arg(long, value_name = "CONSTRAINTS")]
    constraints: Option<Constraints>,
    /// Placement directive passed to the provider.
    #[arg(long, value_name = "DIRECTIVE")]
    placement: Option<String>,
}

/// Arguments for an upgrade run.
#[derive(Args, Debug)]
struct UpgradeRunCommand {
    /// Version the agent is upgrading from.
    #[arg(long, value_name = "VERSION")]
    from: Version,
    /// Version the agent is upgrading to.
    #[arg(long, value_name = "VERSION")]
    to: Version,
    /// Role of the node running the upgrade.
    #[arg(long, value_enum)]
    role: RoleArg,
    /// Machine the agent runs on.
    #[arg(long, value_name = "ID", default_value = "0")]
    machine: String,
}

/// Node roles accepted on the command line.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum RoleArg {
    /// Ordinary workload host.
    HostMachine,
    /// Control node.
    StateServer,
    /// Control node holding canonical state.
    DatabaseMaster,
}

impl From<RoleArg> for NodeRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::HostMachine => Self::HostMachine,
            RoleArg::StateServer => Self::StateServer,
            RoleArg::DatabaseMaster => Self::DatabaseMaster,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        print_line(&format!("stratum {}", env!("CARGO_PKG_VERSION")))?;
        return Ok(ExitCode::SUCCESS);
    }
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    if let Commands::Config {
        command: ConfigCommand::Boilerplate(command),
    } = &command
    {
        return command_config_boilerplate(command);
    }

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging)?;
    match command {
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate => command_config_validate(&config),
            ConfigCommand::Boilerplate(command) => command_config_boilerplate(&command),
        },
        Commands::Sources {
            command: SourcesCommand::List(args),
        } => command_sources_list(&config, &args),
        Commands::Bootstrap(command) => command_bootstrap(&config, &command),
        Commands::Destroy(args) => command_destroy(&config, &args),
        Commands::Upgrade {
            command: UpgradeCommand::Run(command),
        } => command_upgrade_run(&config, &command),
    }
}

/// Emits the top-level help message for the CLI.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| output_error(&err))?;
    print_line("")
}

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Loads and validates the process config.
fn load_config(path: Option<&Path>) -> CliResult<StratumConfig> {
    StratumConfig::load(path)
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Installs the tracing subscriber described by `[logging]`.
///
/// `RUST_LOG` overrides the configured level when set.
fn init_logging(logging: &LoggingConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|err| CliError::new(format!("invalid log filter: {err}")))?;
    let (text, json) = match logging.format {
        LogFormat::Text => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(std::io::stderr))),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .map_err(|err| CliError::new(format!("failed to install logging: {err}")))
}

/// Builds the registry of built-in providers.
fn provider_registry() -> CliResult<ProviderRegistry> {
    let sigma = SigmaProviderConfig::default();
    ProviderRegistry::with_builtin_providers(sigma, MemoryCloud::default())
        .map_err(|err| CliError::new(err.to_string()))
}

/// Opens and configures a declared environment.
fn open_environment(
    config: &StratumConfig,
    registry: &ProviderRegistry,
    name: &str,
) -> CliResult<Environment> {
    let declared = config
        .environment(name)
        .ok_or_else(|| CliError::new(format!("environment not declared: {name}")))?;
    let environment = registry
        .open_environment(
            declared.environment_name(),
            &declared.provider,
            config.metadata.resolver(),
        )
        .map_err(|err| CliError::new(format!("environment {name}: {err}")))?;
    let raw = declared.raw_config().map_err(|err| CliError::new(err.to_string()))?;
    environment
        .set_config(&raw)
        .map_err(|err| CliError::new(format!("environment {name}: {err}")))?;
    Ok(environment)
}

/// Opens the cluster state store named by `[state]`.
fn open_state_store(config: &StratumConfig) -> CliResult<Arc<dyn ClusterStateStore>> {
    match config.state.sqlite() {
        Some(sqlite) => {
            let store = SqliteClusterStore::open(&sqlite)
                .map_err(|err| CliError::new(format!("failed to open state store: {err}")))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryClusterStateStore::new())),
    }
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Validates the config file and every declared environment.
fn command_config_validate(config: &StratumConfig) -> CliResult<ExitCode> {
    let registry = provider_registry()?;
    for declared in &config.environments {
        open_environment(config, &registry, &declared.name)?;
    }
    print_line(&format!("config valid ({} environments)", config.environments.len()))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints a commented sample environment for a provider.
fn command_config_boilerplate(command: &BoilerplateCommand) -> CliResult<ExitCode> {
    let registry = provider_registry()?;
    let provider = registry.get(&command.provider).ok_or_else(|| {
        let known: Vec<&str> = registry.provider_types().collect();
        CliError::new(format!(
            "unknown provider {}; known providers: {}",
            command.provider,
            known.join(", ")
        ))
    })?;
    let schema = common_schema().extend(&provider.schema());
    print_line(schema.boilerplate(provider.provider_type()).trim_end())?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Environment Commands
// ============================================================================

/// Lists an environment's metadata sources in resolution order.
fn command_sources_list(config: &StratumConfig, args: &EnvironmentArgs) -> CliResult<ExitCode> {
    let registry = provider_registry()?;
    let environment = open_environment(config, &registry, &args.environment)?;
    let sources = config
        .metadata
        .resolver()
        .resolve(&environment)
        .map_err(|err| CliError::new(err.to_string()))?;
    if sources.is_empty() {
        print_line("no metadata sources")?;
    }
    for source in sources {
        print_line(&format!("{}\t{}", source.description, source.url))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Bootstraps an environment and runs its finalizer.
fn command_bootstrap(config: &StratumConfig, command: &BootstrapCommand) -> CliResult<ExitCode> {
    let registry = provider_registry()?;
    let name = &command.target.environment;
    let environment = open_environment(config, &registry, name)?;
    let params = BootstrapParams {
        series: command.series.clone(),
        constraints: command.constraints.clone().unwrap_or_default(),
        placement: command.placement.clone(),
    };
    let ctx = OperationContext::new();
    let result = environment
        .bootstrap(&ctx, &params)
        .map_err(|err| CliError::new(format!("bootstrap {name}: {err}")))?;
    let summary = format!(
        "{} control instance {} ({}/{})",
        if result.reused { "reused" } else { "started" },
        result.instance.id,
        result.series,
        result.arch
    );
    let machine =
        result.finalize(&ctx).map_err(|err| CliError::new(format!("bootstrap {name}: {err}")))?;
    info!(environment = %name, instance = %machine.instance_id, "bootstrap complete");
    print_line(&summary)?;
    Ok(ExitCode::SUCCESS)
}

/// Destroys an environment.
fn command_destroy(config: &StratumConfig, args: &EnvironmentArgs) -> CliResult<ExitCode> {
    let registry = provider_registry()?;
    let environment = open_environment(config, &registry, &args.environment)?;
    environment
        .destroy(&OperationContext::new())
        .map_err(|err| CliError::new(format!("destroy {}: {err}", args.environment)))?;
    print_line(&format!("destroyed {}", args.environment))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Upgrade Commands
// ============================================================================

/// Runs the declared upgrade steps and prints each applied step.
fn command_upgrade_run(
    config: &StratumConfig,
    command: &UpgradeRunCommand,
) -> CliResult<ExitCode> {
    let ctx = UpgradeContext::new(open_state_store(config)?, MachineId::new(&command.machine));
    let report = perform_upgrade(&command.from, &command.to, command.role.into(), &ctx)
        .map_err(|err| CliError::new(err.to_string()))?;
    for step in &report.applied {
        print_line(&format!("{}: {}", step.version, step.description))?;
    }
    print_line(&format!(
        "upgraded {} to {} as {} ({} steps)",
        report.from,
        report.to,
        report.role,
        report.applied.len()
    ))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stdout, mapping failures into CLI errors.
fn print_line(message: &str) -> CliResult<()> {
    write_stdout_line(message).map_err(|err| output_error(&err))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure.
fn output_error(error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write output: {error}"))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
