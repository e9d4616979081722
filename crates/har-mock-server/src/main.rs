use anyhow::Context;
use clap::{Parser, ValueEnum};
use har_mock_server::config::Config;
use har_mock_server::proxy::{serve_metrics, ProxyServer};
use har_mock_server::{ReloadSupervisor, TraceStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Serve responses captured in HAR files and forward everything else to the real API
#[derive(Parser, Debug)]
#[command(name = "har-mock-server", version)]
struct Args {
    /// Base URL of the real API for requests no capture matches
    #[arg(long, env = "HAR_MOCK_API_URL")]
    api_url: Option<String>,

    /// Directory containing *.har capture files (default: working directory)
    #[arg(long, env = "HAR_MOCK_HARS_FOLDER")]
    hars_folder: Option<PathBuf>,

    #[arg(short, long, env = "HAR_MOCK_PORT")]
    port: Option<u16>,

    #[arg(long, env = "HAR_MOCK_HOST")]
    host: Option<String>,

    /// YAML configuration file; command-line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> Result<Config, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(api_url) = self.api_url {
            config.api_url = Some(api_url);
        }
        if let Some(folder) = self.hars_folder {
            config.hars_folder = Some(folder);
        }
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(host) = self.host {
            config.listen.host = host;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.into_config()?;
    let hars_folder = config.hars_folder()?;

    let store = Arc::new(TraceStore::new());
    let supervisor = ReloadSupervisor::start(&hars_folder, Arc::clone(&store))
        .await
        .with_context(|| format!("Failed to load HAR files from {}", hars_folder.display()))?;

    let shutdown = CancellationToken::new();

    if config.metrics.enabled {
        let addr = SocketAddr::new(config.listen.socket_addr()?.ip(), config.metrics.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics listener on {addr}"))?;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(listener, shutdown).await {
                error!("Metrics listener failed: {}", e);
            }
        });
    }

    let server = ProxyServer::new(&config, store)?;
    let mut server_task = tokio::spawn(server.run(shutdown.clone()));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            shutdown.cancel();
            server_task.await?
        }
        result = &mut server_task => {
            shutdown.cancel();
            result?
        }
    };

    supervisor.shutdown().await;
    result
}
