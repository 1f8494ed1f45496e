//! QueryDeck CLI: search a remote endpoint from the terminal.
//!
//! `search` sends one request right away. `interactive` drives the debounced
//! controller from stdin lines, the way a search box drives it from keystrokes.

mod input;
mod render;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use querydeck_core::controller::QueryController;
use querydeck_core::fetch::{execute, settle};
use querydeck_core::request::SearchRequest;
use querydeck_core::transport::{HttpTransport, SearchTransport};
use querydeck_core::types::*;
use querydeck_core::{load_config_file, load_querydeck_config, QueryDeckConfig};

use input::{parse_line, Input, HELP};

/// QueryDeck CLI: debounced search against a remote endpoint.
#[derive(Parser)]
#[command(name = "qd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./.querydeck.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Search endpoint URL
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Endpoint variant: simple or extended
    #[arg(long, global = true)]
    variant: Option<ApiVariant>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single search and print the results
    Search(SearchArgs),
    /// Read search terms and filter commands from stdin, searching as you type
    Interactive,
    /// Serve a stub search endpoint from a JSON fixture
    ServeStub {
        /// JSON array of records (objects or plain strings)
        #[arg(long)]
        fixture: PathBuf,

        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: String,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Search term
    term: String,

    /// Relevance threshold in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,

    /// Maximum number of results
    #[arg(long)]
    limit: Option<u32>,

    /// Use the optimized (fast) mode
    #[arg(long, overrides_with = "no_fast")]
    fast: bool,

    /// Turn off the optimized mode even if the config file enables it
    #[arg(long, overrides_with = "fast")]
    no_fast: bool,

    /// Processing speed: 0, 1 or 2
    #[arg(long)]
    speed: Option<Speed>,

    /// Dataset to search
    #[arg(long)]
    dataset: Option<String>,
}

impl SearchArgs {
    /// Flags given on the command line win over `defaults` from the config file.
    fn params(&self, defaults: &QueryParams) -> QueryParams {
        let fast = if self.fast {
            true
        } else if self.no_fast {
            false
        } else {
            defaults.fast
        };
        QueryParams {
            search_term: self.term.clone(),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            fast,
            limit: self.limit.unwrap_or(defaults.limit),
            speed: self.speed.unwrap_or(defaults.speed),
            dataset: self.dataset.clone().unwrap_or_else(|| defaults.dataset.clone()),
        }
        .clamped()
    }
}

fn resolve_config(cli: &Cli) -> QueryDeckConfig {
    let mut config = match &cli.config {
        Some(path) => load_config_file(path).unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            load_querydeck_config(&cwd)
        }
    };
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(variant) = cli.variant {
        config.variant = variant;
    }
    config
}

fn build_transport(config: &QueryDeckConfig) -> Arc<dyn SearchTransport> {
    match HttpTransport::new(&config.endpoint) {
        Ok(t) => {
            info!(endpoint = t.endpoint(), variant = %config.variant, "Using search endpoint");
            Arc::new(t)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("querydeck_core=warn".parse().unwrap())
                .add_directive("querydeck_http=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Search(args) => {
            let config = resolve_config(&cli);
            let params = args.params(&config.defaults);

            if params.is_blank() {
                eprintln!("Search term is empty");
                std::process::exit(1);
            }

            let transport = build_transport(&config);
            let request = SearchRequest::new(params, config.variant);
            let state = settle(&args.term, execute(transport.as_ref(), &request).await);
            render::print_state(&state, cli.json);

            if state.results().is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Interactive => {
            let config = resolve_config(&cli);
            run_interactive(&config, cli.json).await;
        }
        Commands::ServeStub { fixture, addr } => {
            let fixture = querydeck_http::load_fixture(fixture).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            let listener = tokio::net::TcpListener::bind(addr.as_str()).await.unwrap_or_else(|e| {
                eprintln!("Error: could not bind {addr}: {e}");
                std::process::exit(1);
            });
            let state = querydeck_http::StubState::new(fixture);
            eprintln!("Stub search endpoint on http://{addr}/search");
            if let Err(e) = querydeck_http::serve(listener, state, shutdown_signal()).await {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn run_interactive(config: &QueryDeckConfig, json: bool) {
    let controller =
        QueryController::spawn(build_transport(config), config.controller_config());

    let mut rx = controller.subscribe();
    let view = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            render::print_snapshot(&snapshot, json);
        }
    });

    eprintln!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut quit = false;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(Input::Edit(edit)) => controller.edit(edit),
                Ok(Input::Help) => eprintln!("{HELP}"),
                Ok(Input::Quit) => {
                    quit = true;
                    break;
                }
                Err(msg) => eprintln!("{msg}"),
            },
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading stdin: {e}");
                break;
            }
        }
    }

    // Piped input ends without :quit; let the last edit settle first.
    if !quit {
        let debounce = Duration::from_millis(config.debounce_ms);
        tokio::time::sleep(debounce + Duration::from_millis(50)).await;
        let mut settled = controller.subscribe();
        let _ = tokio::time::timeout(
            Duration::from_secs(30),
            settled.wait_for(|s| !s.request.is_loading()),
        )
        .await;
    }

    controller.shutdown().await;
    let _ = view.await;
}
