#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = gridmark_rust::run_worker().await {
        eprintln!("gridmark-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
