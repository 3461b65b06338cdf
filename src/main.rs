//! Gatewatch service entry point.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatewatch::server::run().await
}
