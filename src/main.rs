//! SOAP call command-line client.
//!
//! Run with: `soap-call --config client.yaml call request.xml --action urn:GetUser`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use soap_middleware::{ClientBuilder, ClientConfig, HttpTransport, HttpWsdlProvider, WsdlProvider};
use std::io::Write;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Send SOAP calls through a configured middleware chain.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "client.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send an envelope and print the response body
    Call {
        /// File holding the SOAP envelope
        envelope: PathBuf,

        /// SOAP action of the operation
        #[arg(short, long)]
        action: String,

        /// Override the configured endpoint
        #[arg(short, long)]
        endpoint: Option<String>,
    },
    /// Fetch a WSDL through the WSDL chain and print it
    Wsdl {
        /// WSDL location (defaults to the configured one, then `<endpoint>?wsdl`)
        location: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the response
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("soap-call v{}", env!("CARGO_PKG_VERSION"));

    let mut config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .with_context(|| format!("Failed to read config file {}", args.config.display()))?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!(config = %args.config.display(), "Config file not found, using defaults");
        ClientConfig::default()
    };

    let transport = HttpTransport::new().context("Failed to create HTTP transport")?;

    let body = match args.command {
        Command::Call {
            envelope,
            action,
            endpoint,
        } => {
            if let Some(endpoint) = endpoint {
                config.endpoint = endpoint;
            }
            let envelope = tokio::fs::read(&envelope)
                .await
                .with_context(|| format!("Failed to read envelope {}", envelope.display()))?;

            let client = ClientBuilder::from_config(transport, &config)
                .context("Invalid client configuration")?
                .build();

            let response = tokio::select! {
                result = client.call(&action, envelope) => result.context("SOAP call failed")?,
                _ = signal::ctrl_c() => anyhow::bail!("Interrupted"),
            };

            info!(status = %response.status(), "Response received");
            if !response.status().is_success() {
                warn!(status = %response.status(), "Service returned an error status");
            }
            response.body().clone()
        }
        Command::Wsdl { location } => {
            let location = location
                .or_else(|| config.wsdl_location())
                .context("No WSDL location given and no endpoint configured")?;

            let chain = config
                .wsdl
                .build_chain()
                .context("Invalid WSDL configuration")?;
            let provider = HttpWsdlProvider::new(transport)
                .with_chain(chain)
                .with_options(config.call_options());

            provider
                .provide(&location)
                .await
                .with_context(|| format!("Failed to fetch WSDL from {}", location))?
        }
    };

    std::io::stdout()
        .write_all(&body)
        .context("Failed to write response")?;
    Ok(())
}
