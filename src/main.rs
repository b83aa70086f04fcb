use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcplease_client::{
    ClientConfig, DeadlineTimers, Driver, LeaseClient, LeaseFileSink, Result, UdpTransport,
};

#[derive(Parser)]
#[command(name = "dhcplease-client")]
#[command(author, version, about = "A small DHCP lease client", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "client.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Run,
    ShowConfig,
    ShowLease,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = ClientConfig::load_or_create(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting DHCP client with config: {:?}", cli.config);
            let client = LeaseClient::from_config(
                &config,
                UdpTransport::new(config.client_port, config.interface_index),
                DeadlineTimers::new(),
                LeaseFileSink::new(&config.lease_file),
            )?;

            let tick_interval = Duration::from_millis(config.tick_interval_millis);
            let mut driver = Driver::new(client, tick_interval);
            driver
                .run(async {
                    if let Err(error) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for shutdown signal: {}", error);
                        std::future::pending::<()>().await;
                    }
                    info!("Received shutdown signal, stopping client...");
                })
                .await
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::ShowLease => {
            match LeaseFileSink::load(&config.lease_file)? {
                None => println!("No active lease."),
                Some(record) => {
                    let lease = record.config;
                    println!("{:<12} {}/{}", "Address", lease.address, lease.prefix_len());
                    println!("{:<12} {}", "Subnet mask", lease.subnet_mask);
                    println!(
                        "{:<12} {}",
                        "Gateway",
                        lease.gateway.map_or("-".to_string(), |ip| ip.to_string())
                    );
                    println!(
                        "{:<12} {}",
                        "DNS",
                        lease.dns_server.map_or("-".to_string(), |ip| ip.to_string())
                    );
                    println!(
                        "{:<12} {}",
                        "Applied at",
                        record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                }
            }
            Ok(())
        }
    }
}
