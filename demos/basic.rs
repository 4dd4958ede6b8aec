//! Two instrumented routes and a scrape endpoint.
//!
//! Run with:
//!   cargo run --example basic -- --log-level debug
//!
//! Try:
//!   curl http://localhost:8081/test
//!   curl http://localhost:8081/test/error
//!   curl -s http://localhost:8081/metrics | grep test_

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use routemeter::middleware::MetricsHandler;
use routemeter::{health, metrics, Request, ResponseWriter, Router, Server, StatusCode};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// routemeter demo server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address
    #[arg(long, env = "ROUTEMETER_ADDR", default_value = "0.0.0.0:8081")]
    addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> routemeter::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let registry = prometheus::default_registry().clone();
    let hello = Arc::new(MetricsHandler::new(&registry, "/test", &["GET"], hello)?);
    let failing = Arc::new(MetricsHandler::new(&registry, "/test/error", &["GET"], bad_request)?);

    let app = Router::new()
        .instrument(Arc::clone(&hello))
        .instrument(Arc::clone(&failing))
        .get("/metrics", metrics::exporter(registry))
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness);

    Server::bind_addr(args.addr).serve(app).await?;

    for handler in [&hello, &failing] {
        if let Err(e) = handler.cleanup() {
            error!(path = handler.path(), "cleanup failed: {e}");
        }
    }
    info!("bye");
    Ok(())
}

// GET /test → 200 "Hello, world!"
fn hello(w: &mut dyn ResponseWriter, _req: &Request) {
    w.write_head(StatusCode::OK);
    let _ = w.write(b"Hello, world!");
}

// GET /test/error → 400, counted in test_error_get_total_errors
fn bad_request(w: &mut dyn ResponseWriter, _req: &Request) {
    w.write_head(StatusCode::BAD_REQUEST);
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
