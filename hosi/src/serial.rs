// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! `embedded-hal` serial traits for host serial ports.
use std::io::{self, Read, Write};
use std::time::Duration;

use embedded_hal::serial;
use log::info;
use serialport::SerialPort;

use crate::config::SerialConfig;
use crate::error::LibraryError;

/// Adapts a [`serialport::SerialPort`] to the byte-at-a-time `embedded-hal` serial traits.
///
/// A read that times out, or that is interrupted, is reported as `WouldBlock`.
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
}

impl SerialPortAdapter {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, baud_rate).timeout(timeout).open()?;
        info!("Opened {} at {} baud", path, baud_rate);
        Ok(Self::new(port))
    }

    pub fn from_config(config: &SerialConfig) -> Result<Self, LibraryError> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| LibraryError::Config("no serial port path is configured".into()))?;
        Ok(Self::open(
            path,
            config.baud_rate,
            Duration::from_millis(config.timeout_ms),
        )?)
    }

    pub fn into_inner(self) -> Box<dyn SerialPort> {
        self.port
    }
}

fn would_block(err: io::Error) -> nb::Error<io::Error> {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            nb::Error::WouldBlock
        }
        _ => nb::Error::Other(err),
    }
}

impl serial::Read<u8> for SerialPortAdapter {
    type Error = io::Error;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            // A zero length read without an error means the port went away.
            Ok(_) => Err(nb::Error::Other(io::ErrorKind::UnexpectedEof.into())),
            Err(err) => Err(would_block(err)),
        }
    }
}

impl serial::Write<u8> for SerialPortAdapter {
    type Error = io::Error;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        match self.port.write(&[word]) {
            Ok(1) => Ok(()),
            Ok(_) => Err(nb::Error::WouldBlock),
            Err(err) => Err(would_block(err)),
        }
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        self.port.flush().map_err(would_block)
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use super::would_block;

    #[test]
    fn timeouts_would_block() {
        assert!(matches!(
            would_block(io::ErrorKind::TimedOut.into()),
            nb::Error::WouldBlock
        ));
        assert!(matches!(
            would_block(io::ErrorKind::BrokenPipe.into()),
            nb::Error::Other(_)
        ));
    }
}
