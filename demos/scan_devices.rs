//! Basic example: scan for advertising BLE peripherals
//!
//! Run with: cargo run --example scan_devices

use kiosk_ble::{Result, Scanner, DEFAULT_SCAN_WINDOW};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kiosk_ble=debug".parse().unwrap()),
        )
        .init();

    println!("Scanning for BLE devices...");

    let scanner = Scanner::new().await?;
    let devices = scanner.discover(DEFAULT_SCAN_WINDOW).await?;

    for device in &devices {
        println!(
            "Name: {}, Address: {}, RSSI: {}",
            device.display_name(),
            device.address,
            device
                .rssi
                .map(|r| format!("{} dBm", r))
                .unwrap_or_else(|| "N/A".to_string())
        );
    }

    println!("\n{} device(s) found.", devices.len());

    Ok(())
}
