//! Scan for a target peripheral, connect, and print its GATT topology.
//!
//! Run with: cargo run --example connect_and_enumerate -- <ADDRESS>

use kiosk_ble::{
    ConnectionManager, DeviceAddress, Result, Scanner, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_SCAN_WINDOW,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kiosk_ble=debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let target = match args.get(1) {
        Some(address) => DeviceAddress::new(address),
        None => {
            eprintln!("Usage: {} <ADDRESS>", args[0]);
            std::process::exit(1);
        }
    };

    println!("Scanning for {}...", target);

    let scanner = Scanner::new().await?;
    let found = scanner
        .find(|d| d.address == target, DEFAULT_SCAN_WINDOW)
        .await?;

    match found {
        Some(device) => {
            println!(
                "Found target device: {} ({})",
                device.display_name(),
                device.address
            );
        }
        None => {
            println!("Target device {} not found during scan.", target);
            std::process::exit(1);
        }
    }

    let manager = ConnectionManager::with_adapter(scanner.adapter().clone());
    let handle = manager.connect(&target, DEFAULT_CONNECT_TIMEOUT).await?;

    println!("Connected to {}\n", handle.address());
    println!("Services and characteristics:");

    let services = manager.enumerate(&handle).await?;
    for service in &services {
        println!("Service UUID: {}", service.uuid);
        for characteristic in &service.characteristics {
            let props: Vec<String> = characteristic
                .properties
                .iter()
                .map(|p| p.to_string())
                .collect();
            println!(
                "  Characteristic UUID: {}, Properties: {}",
                characteristic.uuid,
                props.join(", ")
            );
        }
    }

    manager.disconnect(&handle).await?;
    println!("\nDisconnected.");

    Ok(())
}
