use std::io;
use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use serialmemory_forward::ApiForwarder;
use serialmemory_mcp::config::DEFAULT_LOG_FILTER;
use serialmemory_mcp::{
    logging, serve_stdio, tls, Config, HttpServer, McpServer, StartupError, StdioExit,
};
use tracing::{error, info, warn};

/// MCP adapter for the SerialMemory API over stdio and HTTP.
#[derive(Debug, Parser)]
#[command(name = "serialmemory-mcp", version, about)]
struct Cli {
    /// Serve HTTP only, without the stdio transport.
    #[arg(long)]
    http_only: bool,

    /// Serve HTTP only, bound to all interfaces.
    #[arg(long)]
    container: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env(cli.container) {
        Ok(config) => config,
        Err(err) => {
            logging::init(DEFAULT_LOG_FILTER);
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_filter);

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "serialmemory-mcp stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, config: &Config) -> Result<(), StartupError> {
    let catalog = Arc::new(config.load_catalog()?);
    let forwarder = ApiForwarder::new(config.forwarder_config())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let server = Arc::new(McpServer::new(
        catalog,
        Arc::new(forwarder),
        config.catalog_mode(),
    ));
    let http = HttpServer::new(
        Arc::clone(&server),
        runtime.handle().clone(),
        config.mcp_token.as_deref(),
    )
    .with_exit_hook(Arc::new(|| std::process::exit(0)));

    let http_only = cli.http_only || cli.container;
    let https = config.https(cli.container);
    info!(
        endpoint = %config.endpoint,
        mode = ?config.catalog_mode(),
        tools = server.catalog().len(),
        http_addr = %config.http_addr,
        https_addr = https.map(|_| config.https_addr.as_str()),
        stdio = !http_only,
        "SerialMemory MCP starting"
    );

    if let Some((cert, key)) = https {
        let secure = http.clone().with_tls(tls::server_config(cert, key)?);
        spawn_listener(secure, &config.https_addr);
    }

    if http_only {
        let listener = TcpListener::bind(&config.http_addr)?;
        http.serve(listener)?;
        return Ok(());
    }

    spawn_listener(http, &config.http_addr);

    let stdin = io::stdin();
    let stdout = io::stdout();
    match serve_stdio(&server, runtime.handle(), stdin.lock(), stdout.lock())? {
        StdioExit::ExitRequested => std::process::exit(0),
        StdioExit::Eof => Ok(()),
    }
}

/// Binds and serves on a background thread. A bind failure is logged and the
/// process keeps its other transports.
fn spawn_listener(server: HttpServer, addr: &str) {
    match TcpListener::bind(addr) {
        Ok(listener) => {
            thread::spawn(move || {
                if let Err(err) = server.serve(listener) {
                    error!(error = %err, "http transport stopped");
                }
            });
        }
        Err(err) => {
            warn!(addr, error = %err, "listener unavailable, continuing without it");
        }
    }
}
