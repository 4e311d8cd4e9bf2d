//! Attested Channel Echo Example
//!
//! Runs either an echo server or an interactive client over TCP.
//!
//! Environment variables:
//! - ECHO_MODE: "server" or "client" (default "server")
//! - ECHO_ADDR: Bind address (server) or server address (client),
//!   default 127.0.0.1:7000
//! - ECHO_EVIDENCE: Attestation evidence the server presents (default empty)
//! - ECHO_EXPECTED_EVIDENCE: Evidence the client requires; unset accepts any peer
//! - RUST_LOG: tracing filter, e.g. `attested_channel=debug`

mod client;
mod server;

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:7000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = std::env::var("ECHO_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;

    match std::env::var("ECHO_MODE").as_deref() {
        Ok("client") => {
            let expected = std::env::var("ECHO_EXPECTED_EVIDENCE").ok();
            client::run(addr, expected.map(String::into_bytes)).await
        }
        Ok("server") | Err(_) => {
            let evidence = std::env::var("ECHO_EVIDENCE").unwrap_or_default();
            server::run(addr, evidence.into_bytes()).await
        }
        Ok(other) => Err(format!("unknown ECHO_MODE: {other}").into()),
    }
}
