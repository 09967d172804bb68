// Bridge diagnostic: READ-ONLY check of the I/O bridge board
//
// Pings the bridge and samples the battery ADC a few times. No duty or pin writes,
// so the motors never move. Run this before the full runtime on new hardware.
//
// Usage: cargo run --example bridge_diagnostic -- <port>
// Example: cargo run --example bridge_diagnostic -- /dev/ttyUSB0

use diffbot_runtime::board::bridge::BridgeBus;
use diffbot_runtime::sensor::VoltageCalibration;
use std::thread::sleep;
use std::time::Duration;

const SAMPLES: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    println!("Bridge diagnostic (read-only)");
    println!("Serial port: {}", port);
    println!();

    println!("Step 1: Opening serial port...");
    let mut bus = match BridgeBus::open(&port) {
        Ok(bus) => {
            println!("  ok");
            bus
        }
        Err(e) => {
            println!("  failed: {}", e);
            println!("  - Check the port path is correct");
            println!("  - Verify the USB cable is connected");
            return Err(e.into());
        }
    };
    println!();

    println!("Step 2: Pinging bridge...");
    match bus.ping() {
        Ok(true) => println!("  responding"),
        Ok(false) => {
            println!("  no response - check bridge power and baud rate");
            return Ok(());
        }
        Err(e) => {
            println!("  error: {}", e);
            return Err(e.into());
        }
    }
    println!();

    println!("Step 3: Sampling battery ADC...");
    let calibration = VoltageCalibration::default();
    for i in 0..SAMPLES {
        match bus.read_adc() {
            Ok(raw) => println!(
                "  sample {}: raw={} ({:.2} V)",
                i + 1,
                raw,
                calibration.to_volts(raw)
            ),
            Err(e) => println!("  sample {}: ERROR - {}", i + 1, e),
        }
        sleep(Duration::from_millis(100));
    }
    println!();

    println!("If the bridge responded and voltages look right, run the runtime with:");
    println!("  cargo run -- --port {}", port);

    Ok(())
}
