//! Basic admin API server example
//!
//! Run with: cargo run -p harbormaster --example basic_server

use harbormaster::{Fleet, HarbormasterBuilder, MemoryFleet};
use kvstore::MemoryDriver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // In-memory backends; a real deployment wires a durable store and the
    // registry's control-plane client here instead.
    let store = MemoryDriver::with_tables(&["tokens", "accounts"]);
    let fleet = Fleet::new(MemoryFleet::new());

    // Build the admin service
    let (app, harbormaster) = HarbormasterBuilder::new()
        .store(store.into())
        .fleet(fleet)
        .require_auth(true)
        .build_with_handle();

    // Bootstrap: every other call requires a token, so mint the first one
    // before serving.
    let token = harbormaster.tokens().create("admin").await?;
    tracing::info!("Bootstrap token for user 'admin': {token}");

    // Bind to address
    let addr = "127.0.0.1:9090";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Harbormaster listening on http://{}", addr);
    tracing::info!("Try: curl -u admin:{token} http://{}/account", addr);

    // Serve the admin API
    axum::serve(listener, app).await?;

    Ok(())
}
