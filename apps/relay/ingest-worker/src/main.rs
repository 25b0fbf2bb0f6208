//! Relay Ingest Worker - Entry Point
//!
//! Background worker that relays ingested events through the message pipeline.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    relay_ingest_worker::run().await
}
