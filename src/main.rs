//! Mudgate binary entry point.
//!
//! A console harness around the gateway: every stdin line is handled
//! as one inbound chat event from a fixed "console" identity, replies
//! print to stdout, and ambient game output arrives between prompts.
//! Useful for trying a game server before wiring a real chat platform
//! adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use mudgate::config::Config;
use mudgate::gateway::{ChatSink, Gateway, GatewayOptions, InboundMessage};
use mudgate::output::format_text;
use mudgate::session::SessionRegistry;
use mudgate::store::JsonFileStore;
use mudgate::transport::TcpConnector;
use mudgate::{cli, logging};

const CONSOLE_IDENTITY: &str = "console";
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sink that prints gateway output straight to stdout.
struct ConsoleSink;

impl ConsoleSink {
    async fn write_line(&self, text: &str) -> mudgate::Result<()> {
        let mut out = tokio::io::stdout();
        out.write_all(text.as_bytes()).await.map_err(to_delivery)?;
        out.write_all(b"\n").await.map_err(to_delivery)?;
        out.flush().await.map_err(to_delivery)?;
        Ok(())
    }
}

fn to_delivery(e: std::io::Error) -> mudgate::GatewayError {
    mudgate::GatewayError::Delivery(e.to_string())
}

#[async_trait]
impl ChatSink for ConsoleSink {
    async fn reply(&self, text: &str) -> mudgate::Result<()> {
        self.write_line(text).await
    }

    async fn send(&self, text: &str) -> mudgate::Result<()> {
        self.write_line(text).await
    }

    async fn ack(&self) -> mudgate::Result<()> {
        self.write_line("(no output)").await
    }
}

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("mudgate: {}", e);
            eprintln!("Try 'mudgate --help' for usage.");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return;
    }
    if args.version {
        cli::print_version();
        return;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mudgate: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(Some(config.log_filter()));

    let options = match config.gateway_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("mudgate: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config, options).await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config, options: GatewayOptions) -> mudgate::Result<()> {
    info!("mudgate v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "game server: {}:{}, store: {}",
        config.remote.host,
        config.remote.port,
        config.store.path.display()
    );

    let format = options.format.clone();

    let store = Arc::new(JsonFileStore::open(config.store.path.clone())?);
    info!("credential store loaded: {} users", store.len());

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(TcpConnector),
        config.session_config(),
    ));
    let gateway = Gateway::new(options, Arc::clone(&registry), store);

    // Ambient output from the console identity's session prints
    // directly, fragmented like a regular reply.
    let (ambient_tx, mut ambient_rx) = mpsc::channel::<String>(64);
    let session = registry.get_or_create(CONSOLE_IDENTITY)?;
    session.set_ambient_sender(ambient_tx);
    let ambient_task = tokio::spawn(async move {
        while let Some(burst) = ambient_rx.recv().await {
            for fragment in format_text(&burst, &format) {
                println!("{}", fragment);
            }
        }
    });

    let sweep_registry = Arc::clone(&registry);
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let evicted = sweep_registry.sweep().await;
            if evicted > 0 {
                info!("idle sweep evicted {} session(s)", evicted);
            } else {
                debug!("idle sweep: nothing to evict");
            }
        }
    });

    println!("mudgate console: type commands, 'help' for built-ins, ctrl-c to quit");

    let sink = ConsoleSink;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                let msg = InboundMessage {
                    identity: CONSOLE_IDENTITY.to_string(),
                    display_name: "Console".to_string(),
                    text: line,
                    public_channel: false,
                };
                if let Err(e) = gateway.handle_message(&msg, &sink).await {
                    error!("delivery failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    sweeper.abort();
    ambient_task.abort();
    registry.close_all().await;
    info!("shutdown complete");

    Ok(())
}
