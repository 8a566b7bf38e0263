use evmeter_bridge::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let options = Options::new();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // Handle Ctrl+C
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        if let Err(e) = shutdown_tx.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    });

    if let Err(e) = evmeter_bridge::app(options, shutdown_rx).await {
        error!("{:#}", e);
        std::process::exit(255);
    }

    Ok(())
}
