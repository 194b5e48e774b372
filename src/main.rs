#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = report_intake::run().await {
        eprintln!("report-intake fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
