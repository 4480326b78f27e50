#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fetchwarden_lib::run().await
}
