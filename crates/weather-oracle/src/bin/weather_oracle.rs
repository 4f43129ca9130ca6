//! Weather oracle CLI
//!
//! Usage:
//!   weather-oracle run [-c config.yaml]            # Chain, gateway and relay
//!   weather-oracle fetch --lat 40 --lon -74        # One-shot temperature lookup
//!   weather-oracle address --key <secret>          # Relayer address for a key

use anyhow::Context;
use argh::FromArgs;
use std::path::PathBuf;
use weather_oracle::{
    fetch_with_retry, install_shutdown_handler, run_oracle, Config, OpenMeteoClient, RetryPolicy,
};

/// Weather oracle - relays ledger weather requests to Open-Meteo
#[derive(FromArgs)]
struct Args {
    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArgs),
    Fetch(FetchArgs),
    Address(AddressArgs),
}

/// Run the local chain, the consumer gateway and the relay
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// path to the YAML config file (defaults are used when absent)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

/// Fetch the current temperature for a coordinate and print it
#[derive(FromArgs)]
#[argh(subcommand, name = "fetch")]
struct FetchArgs {
    /// latitude in whole degrees
    #[argh(option)]
    lat: i64,

    /// longitude in whole degrees
    #[argh(option)]
    lon: i64,

    /// path to the YAML config file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

/// Print the relayer address derived from a key
#[derive(FromArgs)]
#[argh(subcommand, name = "address")]
struct AddressArgs {
    /// relayer key (defaults to ORACLE_RELAYER_KEY)
    #[argh(option, short = 'k')]
    key: Option<String>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(path.map(PathBuf::as_path))?;
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

async fn run_command(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;
    let (_shutdown_tx, shutdown_rx) = install_shutdown_handler()?;
    run_oracle(config, shutdown_rx).await?;
    Ok(())
}

async fn fetch_command(args: FetchArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_ref())?;
    let client = OpenMeteoClient::new(&config.weather)?;
    let policy = RetryPolicy::from_config(&config.relay);
    match fetch_with_retry(&client, args.lat, args.lon, policy).await {
        Ok((value, _)) => println!("{}", value),
        Err(e) => {
            log::warn!("{}; falling back to {:?}", e, config.relay.sentinel);
            println!("{}", config.relay.sentinel);
        }
    }
    Ok(())
}

fn address_command(args: AddressArgs) -> anyhow::Result<()> {
    let key = match args.key {
        Some(key) => key,
        None => {
            let mut config = Config::default();
            config.apply_env()?;
            config
                .relayer_key()
                .context("pass --key or set ORACLE_RELAYER_KEY")?
                .to_string()
        }
    };
    println!("{}", oracle_ledger::Address::from_key(&key));
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let args: Args = argh::from_env();

    if args.version {
        println!("weather-oracle {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match args.command {
        Some(Command::Run(args)) => run_command(args).await,
        Some(Command::Fetch(args)) => fetch_command(args).await,
        Some(Command::Address(args)) => address_command(args),
        None => {
            eprintln!("Weather oracle - relays ledger weather requests to Open-Meteo\n");
            eprintln!("Usage: weather-oracle <command>\n");
            eprintln!("Commands:");
            eprintln!("  run       Run the local chain, gateway and relay");
            eprintln!("              -c, --config <path>: YAML config file");
            eprintln!("  fetch     Fetch the temperature for --lat/--lon once");
            eprintln!("  address   Print the relayer address for --key");
            eprintln!("\nRun 'weather-oracle <command> --help' for more information.");
            Ok(())
        }
    }
}
