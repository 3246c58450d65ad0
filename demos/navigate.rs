//! Navigation demonstration against a running browser.
//!
//! Demonstrates:
//! - Connecting to a DevTools WebSocket endpoint
//! - Creating and attaching to a page target
//! - Navigating with `load` + `networkidle0`
//! - Logging every request through interception
//!
//! Usage:
//!   chrome --headless --remote-debugging-port=9222
//!   cargo run --example navigate -- ws://127.0.0.1:9222/devtools/browser/<id> [url] [--debug]

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use cdp_session::{
    ConnectOptions, Connection, Error, InterceptDecision, NavigateOptions, NavigationOutcome,
    Page, Result, TargetId, WaitUntil,
};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "https://example.com";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|arg| arg == "--debug");
    init_logging(debug);

    let positional: Vec<&str> = args
        .iter()
        .filter(|arg| !arg.starts_with("--"))
        .map(String::as_str)
        .collect();
    let Some(endpoint) = positional.first().copied() else {
        eprintln!("usage: navigate <ws-endpoint> [url] [--debug]");
        std::process::exit(2);
    };
    let url = positional.get(1).copied().unwrap_or(DEFAULT_URL);

    if let Err(e) = run(endpoint, url).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug { "cdp_session=debug" } else { "cdp_session=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(endpoint: &str, url: &str) -> Result<()> {
    println!("=== Navigate ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    let options = ConnectOptions::builder()
        .navigation_timeout(Duration::from_secs(20))
        .build()?;
    let connection = Connection::connect(endpoint, options).await?;

    let created = connection
        .send("Target.createTarget", json!({ "url": "about:blank" }))
        .await?;
    let target_id = created
        .get("targetId")
        .and_then(|id| id.as_str())
        .map(TargetId::from)
        .ok_or_else(|| Error::invalid_argument("Target.createTarget returned no targetId"))?;

    let session = connection.create_session(target_id).await?;
    let page = Page::attach(session).await?;
    println!("[Setup] Attached to {:?}", page.session().target_id());

    // ========================================================================
    // Interception
    // ========================================================================

    page.intercept_requests(|request| {
        println!("  -> {} {}", request.method(), request.url());
        InterceptDecision::proceed()
    })
    .await?;

    // ========================================================================
    // Navigation
    // ========================================================================

    let navigate = NavigateOptions::new()
        .wait_until(WaitUntil::Load)
        .wait_until(WaitUntil::NetworkIdle0);

    match page.goto(url, navigate).await? {
        NavigationOutcome::Satisfied { response } => match response {
            Some(response) => println!("\n[Done] {} {}", response.status(), response.url()),
            None => println!("\n[Done] same-document navigation"),
        },
        NavigationOutcome::Superseded => println!("\n[Done] superseded by another navigation"),
        NavigationOutcome::FrameDetached => println!("\n[Done] frame detached"),
    }
    println!("[Done] in flight after idle: {}", page.network().in_flight_count());

    // ========================================================================
    // Cleanup
    // ========================================================================

    page.close().await?;
    connection.close();
    connection.closed().await;
    Ok(())
}
