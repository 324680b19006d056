#[tokio::main]
async fn main() -> anyhow::Result<()> {
    matcha_server::run().await
}
