#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gridmark_rust::run().await {
        eprintln!("gridmark fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
