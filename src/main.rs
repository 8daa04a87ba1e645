//! pi_relay - relay board controller binary
//!
//! Serves the web dashboard by default; the other subcommands poke the relays
//! directly or check the host before installation.

use clap::{Args, Parser, Subcommand, ValueEnum};
use pi_relay::{
    check::{self, Severity},
    RelayConfig, RelayController, RelayError, RelayState, CHANNEL_COUNT,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pi_relay")]
#[command(about = "16-channel GPIO relay controller")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Relay board controller for Raspberry Pi with web interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Web server bind address
    #[arg(long)]
    host: Option<String>,

    /// Web server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Skip GPIO probing and run in simulation mode
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server (default)
    Serve(ServeArgs),

    /// Print the state of every relay
    Status,

    /// Switch one relay on or off
    Set {
        /// Relay number (1-16)
        relay: usize,
        #[arg(value_enum)]
        state: StateArg,
    },

    /// Flip one relay
    Toggle {
        /// Relay number (1-16)
        relay: usize,
    },

    /// Check system requirements
    Check,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Static files directory (optional)
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Disable HTTP authentication
    #[arg(long)]
    no_auth: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StateArg {
    On,
    Off,
}

impl From<StateArg> for RelayState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::On => RelayState::On,
            StateArg::Off => RelayState::Off,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = load_config(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(config, args).await?,
        None => serve_command(config, &ServeArgs::default()).await?,
        Some(Commands::Status) => {
            let name = config.name.clone();
            one_shot(&config, move |controller| status_command(controller, &name)).await?
        }
        Some(Commands::Set { relay, state }) => {
            let (relay, state) = (*relay, RelayState::from(*state));
            one_shot(&config, move |controller| set_command(controller, relay, state)).await?
        }
        Some(Commands::Toggle { relay }) => {
            let relay = *relay;
            one_shot(&config, move |controller| toggle_command(controller, relay)).await?
        }
        Some(Commands::Check) => check_command(&config),
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn load_config(cli: &Cli) -> pi_relay::Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.web = config.web.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config.web = config.web.with_port(port);
    }
    Ok(config.with_simulation(cli.simulate))
}

/// Build and initialize a controller, treating a port mismatch as fatal.
fn start_controller(config: &RelayConfig) -> pi_relay::Result<RelayController> {
    let controller = RelayController::from_config(config);
    initialize_checked(&controller, &config.ports)?;
    Ok(controller)
}

fn initialize_checked(controller: &RelayController, ports: &[u32]) -> pi_relay::Result<()> {
    if !controller.initialize(ports)? {
        return Err(RelayError::config_error(format!(
            "expected {} relay ports, got {}",
            CHANNEL_COUNT,
            ports.len()
        )));
    }
    Ok(())
}

/// Run a short controller command; Ctrl-C or SIGTERM releases the lines.
async fn one_shot<F>(config: &RelayConfig, command: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&RelayController) -> pi_relay::Result<()> + Send + 'static,
{
    let controller = Arc::new(RelayController::from_config(config));
    run_until_interrupted(
        controller,
        config.ports.clone(),
        command,
        pi_relay::web::shutdown_signal(),
    )
    .await
}

async fn run_until_interrupted<F>(
    controller: Arc<RelayController>,
    ports: Vec<u32>,
    command: F,
    interrupt: impl Future<Output = ()>,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&RelayController) -> pi_relay::Result<()> + Send + 'static,
{
    let worker = {
        let controller = controller.clone();
        tokio::task::spawn_blocking(move || {
            initialize_checked(&controller, &ports)?;
            command(controller.as_ref())
        })
    };

    let outcome: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        joined = worker => match joined {
            Ok(result) => result.map_err(Into::into),
            Err(e) => Err(e.into()),
        },
        _ = interrupt => {
            warn!("Interrupted, releasing GPIO lines");
            Err("interrupted before the command finished".into())
        }
    };

    let releasing = controller.clone();
    tokio::task::spawn_blocking(move || releasing.release()).await?;
    outcome
}

async fn serve_command(
    mut config: RelayConfig,
    args: &ServeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting {}...", config.name);

    if let Some(static_dir) = &args.static_dir {
        config.web = config.web.clone().with_static_path(Some(static_dir.clone()));
        info!("Using static files from: {}", static_dir);
    }
    config.web = config.web.clone().with_cors(!args.no_cors);
    if args.no_auth {
        config.auth = None;
    }

    let startup = config.clone();
    let controller = tokio::task::spawn_blocking(move || {
        let controller = start_controller(&startup)?;
        let inactive = controller.inactive_ports();
        if !inactive.is_empty() {
            info!("Switching off {} inactive channels", inactive.len());
            controller.all_off(&inactive);
        }
        Ok::<_, RelayError>(controller)
    })
    .await??;

    info!("Relay backend: {}", controller.backend_kind());
    info!("Web server configuration:");
    info!("  - Bind address: {}", config.web.bind_address());
    info!("  - CORS enabled: {}", config.web.enable_cors);
    info!("  - Authentication: {}", config.auth.is_some());

    pi_relay::start_web_server(config, Arc::new(controller)).await?;

    Ok(())
}

fn status_command(controller: &RelayController, name: &str) -> pi_relay::Result<()> {
    println!("{} ({} backend)", name, controller.backend_kind());
    for channel in controller.channels() {
        let state = controller.query(channel.number)?;
        println!(
            "  {:>2}. {:<16} pin {:>2}  {}{}",
            channel.number,
            channel.name,
            channel.port.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            if state.is_on() { "ON" } else { "OFF" },
            if channel.active { "" } else { "  (inactive)" },
        );
    }

    Ok(())
}

fn set_command(controller: &RelayController, relay: usize, state: RelayState) -> pi_relay::Result<()> {
    let outcome = controller.set(relay, state)?;
    println!("Relay {} {:?} ({:?})", relay, state, outcome);
    Ok(())
}

fn toggle_command(controller: &RelayController, relay: usize) -> pi_relay::Result<()> {
    controller.toggle(relay)?;
    let state = controller.query(relay)?;
    println!("Relay {} is now {:?}", relay, state);
    Ok(())
}

fn check_command(config: &RelayConfig) {
    println!("Pi Relay Controller System Check");
    println!("================================");

    let diags = check::run_checks(config);
    for item in &diags {
        println!("{:<7} {:<8} {}", item.severity.icon(), item.category, item.message);
    }

    let warnings = diags.iter().filter(|d| d.severity == Severity::Warn).count();
    println!();
    if check::has_failures(&diags) {
        println!("Critical checks failed. Fix the errors above before installing.");
        std::process::exit(1);
    }
    if warnings > 0 {
        warn!("{} warnings", warnings);
        println!("All critical checks passed ({} warnings).", warnings);
    } else {
        println!("All checks passed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["pi_relay", "--port", "9090", "--simulate"]).unwrap();
        assert_eq!(cli.port, Some(9090));
        assert!(cli.simulate);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_set_subcommand() {
        let cli = Cli::try_parse_from(["pi_relay", "set", "3", "on"]).unwrap();
        match cli.command {
            Some(Commands::Set { relay, state }) => {
                assert_eq!(relay, 3);
                assert_eq!(RelayState::from(state), RelayState::On);
            }
            _ => panic!("expected set"),
        }
        assert!(Cli::try_parse_from(["pi_relay", "set", "3", "maybe"]).is_err());
    }

    fn simulated_controller(dir: &std::path::Path) -> Arc<RelayController> {
        Arc::new(RelayController::new(
            Box::new(pi_relay::SimulatedBackend::new()),
            pi_relay::relay::StateStore::new(dir.join("relay_states.json")),
        ))
    }

    #[tokio::test]
    async fn test_one_shot_runs_then_releases() {
        let dir = tempfile::tempdir().unwrap();
        let controller = simulated_controller(dir.path());

        run_until_interrupted(
            controller.clone(),
            pi_relay::DEFAULT_PORTS.to_vec(),
            |c| set_command(c, 2, RelayState::On),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert!(controller.is_released());
        assert!(controller.channels()[1].state.is_on());
    }

    #[tokio::test]
    async fn test_interrupt_releases_controller() {
        let dir = tempfile::tempdir().unwrap();
        let controller = simulated_controller(dir.path());

        let result = run_until_interrupted(
            controller.clone(),
            pi_relay::DEFAULT_PORTS.to_vec(),
            |_| {
                std::thread::sleep(std::time::Duration::from_millis(300));
                Ok(())
            },
            tokio::time::sleep(std::time::Duration::from_millis(20)),
        )
        .await;

        assert!(result.is_err());
        assert!(controller.is_released());
    }

    #[tokio::test]
    async fn test_bad_port_count_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let controller = simulated_controller(dir.path());

        let result = run_until_interrupted(
            controller.clone(),
            vec![10, 12],
            |_| Ok(()),
            std::future::pending(),
        )
        .await;

        assert!(result.is_err());
        assert!(controller.is_released());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli =
            Cli::try_parse_from(["pi_relay", "--host", "127.0.0.1", "--port", "8081"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.web.bind_address(), "127.0.0.1:8081");
        assert_eq!(config.ports.len(), CHANNEL_COUNT);
    }
}
