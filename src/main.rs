#[tokio::main]
async fn main() -> anyhow::Result<()> {
    delve_cli::run().await
}
