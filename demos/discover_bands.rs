//! Basic example: Discover nearby Mi Bands
//!
//! Run with: cargo run --example discover_bands

use miband_rust_ble::{MemoryHealthRecords, MiBand, Result, SessionConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("miband_rust_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Starting Mi Band discovery...\n");

    let band = MiBand::new(SessionConfig::default(), Arc::new(MemoryHealthRecords::new())).await?;
    band.start_scan().await?;

    println!("Scanning for 15 seconds...");
    println!("Press Ctrl+C to exit early.\n");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(15)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted!");
        }
    }

    let devices = band.discovered_devices().await?;

    println!("\n--- Scan Complete ---");
    println!("Total bands found: {}", devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device);
    }

    band.shutdown().await?;
    println!("\nDone!");

    Ok(())
}
