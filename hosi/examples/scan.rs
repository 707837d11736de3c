use std::env;

use anyhow::{anyhow, bail, Context, Result};

use hosi::cube::AxisRange;
use hosi::export::export_receptor_images;
use hosi::serial::SerialPortAdapter;
use hosi::{
    AcquisitionConfig, CalibrationLibrary, DirectorySink, HosiDriver, ScanGeometry, ScanSession,
};

fn parse_axis(arg: &str) -> Result<AxisRange> {
    let parts: Vec<i32> = arg
        .split(':')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid axis range {:?}", arg))?;
    match parts.as_slice() {
        [start, stop, step] => Ok(AxisRange::new(*start, *stop, *step)),
        _ => bail!("axis ranges are start:stop:step, not {:?}", arg),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 6 {
        bail!(
            "Usage: {} <config.toml> <calibration.csv> <spectral.csv> <pan start:stop:step> \
             <tilt start:stop:step> [receptor…]",
            args[0]
        );
    }
    let config = AcquisitionConfig::from_toml_file(&args[1])
        .with_context(|| format!("unable to load {}", args[1]))?;
    let library = CalibrationLibrary::from_paths(&args[2], &args[3])?;
    let geometry = ScanGeometry {
        pan: parse_axis(&args[4])?,
        tilt: parse_axis(&args[5])?,
        max_integration_us: 50000,
        boxcar: 2,
        dark_repeat_ms: 500,
    };
    let receptors = &args[6..];

    let port = SerialPortAdapter::from_config(&config.serial)?;
    let mut driver = HosiDriver::new(port, config.serial.idle_poll_limit);
    let mut sink = DirectorySink::from_config(&config);
    let mut session = ScanSession::new(library, config);

    println!("Starting scan.");
    let finished = driver
        .scan(&mut session, &geometry, &mut sink, || false)
        .map_err(|err| anyhow!("{}", err))?;
    println!("{}", session.status());
    let finished = match finished {
        Some(finished) => finished,
        None => return Ok(()),
    };
    println!(
        "{} of {} cells filled",
        finished.cube().filled_count(),
        finished.cube().pan_dim() * finished.cube().tilt_dim()
    );
    if let Some(base) = sink.last_base() {
        let written =
            export_receptor_images(&session, base, receptors.iter().map(String::as_str))?;
        for path in written {
            println!("Wrote {}", path.display());
        }
    }
    driver.home().map_err(|err| anyhow!("{}", err))?;
    Ok(())
}
