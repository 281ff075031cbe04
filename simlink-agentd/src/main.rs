use anyhow::Context;
use clap::Parser;
use simlink_agentd::config::SimlinkConfig;
use simlink_agentd::run;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Simlink agent bridge daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "TOML configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override the gRPC listen address")]
    listen: Option<SocketAddr>,

    #[arg(
        long,
        help = "OTLP endpoint for metrics export (e.g., http://localhost:4318)"
    )]
    otlp_endpoint: Option<String>,

    #[arg(long, help = "Print the effective configuration as TOML and exit")]
    print_config: bool,
}

impl Cli {
    fn effective_config(&self) -> anyhow::Result<SimlinkConfig> {
        let mut config = match &self.config {
            Some(path) => SimlinkConfig::load(path)?,
            None => SimlinkConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.grpc.listen = listen;
        }
        if let Some(endpoint) = &self.otlp_endpoint {
            config.telemetry.otlp_endpoint = Some(endpoint.clone());
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = cli.effective_config()?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    run(config).await
}
