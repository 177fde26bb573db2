#[tokio::main]
async fn main() -> anyhow::Result<()> {
    learning_backend::run().await
}
