// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Device output for scripted scans.
use std::fmt::Write;

use crate::PIXEL_COUNT;

pub const DARK: u8 = 0;
pub const LIGHT: u8 = 1;
pub const SKIP: u8 = 2;

pub const TERMINATOR: &str = "x";

/// Pan start, stop, and step.
pub type Axis = (i32, i32, i32);

pub fn header_line(
    unit: u32,
    pan: Axis,
    tilt: Axis,
    max_integration_us: u32,
    boxcar: usize,
    dark_repeat_ms: u32,
) -> String {
    format!(
        "h,{},{},{},{},{},{},{},{},{},{},",
        unit, pan.0, pan.1, pan.2, tilt.0, tilt.1, tilt.2, max_integration_us, boxcar, dark_repeat_ms
    )
}

pub fn sample_line(
    pan: i32,
    tilt: i32,
    kind: u8,
    integration_us: u32,
    saturation: i32,
    counts: &[u32],
) -> String {
    let mut line = format!("{},{},{},{},{}", pan, tilt, kind, integration_us, saturation);
    for count in counts {
        let _ = write!(line, ",{}", count);
    }
    line
}

pub fn bins(boxcar: usize) -> usize {
    (PIXEL_COUNT + boxcar - 1) / boxcar
}

pub fn dark_counts(boxcar: usize) -> Vec<u32> {
    vec![120; bins(boxcar)]
}

/// A broad hump of counts over a dark level, peaking at `peak` counts above it.
pub fn light_counts(boxcar: usize, peak: u32) -> Vec<u32> {
    let length = bins(boxcar);
    let center = length as f64 * 0.55;
    let width = length as f64 * 0.2;
    (0..length)
        .map(|bin| {
            let shape = (-0.5 * ((bin as f64 - center) / width).powi(2)).exp();
            120 + (f64::from(peak) * shape).round() as u32
        })
        .collect()
}

/// Unit 1, pan and tilt 0 through 8 in steps of 4, 50 ms maximum integration, boxcar of 2,
/// and half a second between dark readings. One dark reading and one light reading at the
/// origin.
pub fn single_cell_scan() -> Vec<String> {
    let boxcar = 2;
    vec![
        header_line(1, (0, 8, 4), (0, 8, 4), 50000, boxcar, 500),
        sample_line(0, 0, DARK, 1000, 0, &dark_counts(boxcar)),
        sample_line(0, 0, LIGHT, 1000, 0, &light_counts(boxcar, 800)),
        TERMINATOR.to_string(),
    ]
}

/// Every cell of the 3×3 scan, with two dark sweeps and some lines the pipeline has to drop.
pub fn full_scan() -> Vec<String> {
    let boxcar = 2;
    let mut lines = vec![
        "Starting scan".to_string(),
        header_line(1, (0, 8, 4), (0, 8, 4), 50000, boxcar, 500),
    ];
    for integration in [1000, 2000, 4000] {
        lines.push(sample_line(0, 0, DARK, integration, 0, &dark_counts(boxcar)));
    }
    let mut cell = 0;
    for tilt in [0, 4, 8] {
        if tilt == 4 {
            // A new sweep starts at a shorter integration time than the last dark.
            for integration in [1000, 2000, 4000] {
                lines.push(sample_line(0, tilt, DARK, integration, 0, &dark_counts(boxcar)));
            }
        }
        for pan in [0, 4, 8] {
            let integration = [1000, 2000, 4000][cell % 3];
            let saturation = if cell == 4 { 3 } else { 0 };
            let peak = 300 + 90 * cell as u32;
            lines.push(sample_line(
                pan,
                tilt,
                LIGHT,
                integration,
                saturation,
                &light_counts(boxcar, peak),
            ));
            cell += 1;
        }
    }
    // No dark at this integration time.
    lines.push(sample_line(4, 4, LIGHT, 3000, 0, &light_counts(boxcar, 500)));
    // Wrong field count.
    lines.push("4,4,1,1000,0,1,2,3".to_string());
    lines.push(sample_line(8, 8, SKIP, 1000, 0, &light_counts(boxcar, 500)));
    lines.push(TERMINATOR.to_string());
    lines
}

/// A spectrum read response (`r` command) with every pixel at the same count.
pub fn probe_line(integration_us: u32, count: u32) -> String {
    sample_line(0, 0, 0, integration_us, 0, &vec![count; PIXEL_COUNT])
}
