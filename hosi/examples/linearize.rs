use std::env;

use anyhow::{anyhow, bail, Context, Result};

use hosi::linearization::run_linearization;
use hosi::serial::SerialPortAdapter;
use hosi::{AcquisitionConfig, HosiDriver};

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        bail!("Usage: {} <config.toml>", args[0]);
    }
    let config = AcquisitionConfig::from_toml_file(&args[1])
        .with_context(|| format!("unable to load {}", args[1]))?;
    let port = SerialPortAdapter::from_config(&config.serial)?;
    let mut driver = HosiDriver::new(port, config.serial.idle_poll_limit);

    println!("Point the scanner at a stable light source.");
    let report = run_linearization(&mut driver, config.base_integration_offset_us)
        .map_err(|err| anyhow!("{}", err))?;
    println!("integration (µs), observed, expected");
    for point in &report.points {
        println!(
            "{}, {:.1}, {:.1}",
            point.integration_time_us, point.observed, point.expected
        );
    }
    println!(
        "linCoefs: {}, {}",
        report.linearization.exponent, report.linearization.offset
    );
    if report.r_squared < 0.999 {
        println!("R² is only {:.5}, the light may not have been stable", report.r_squared);
    } else {
        println!("R² = {:.5}", report.r_squared);
    }
    Ok(())
}
