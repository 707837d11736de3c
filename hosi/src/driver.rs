// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Talking to a scanner over a serial link.
use core::fmt::Debug;

use embedded_hal::serial;
use log::{debug, warn};

use crate::cube::ScanGeometry;
use crate::error::{Error, LibraryError};
use crate::export::ScanSink;
use crate::protocol::{Command, ProbeSpectrum};
use crate::session::{FinishedScan, ScanSession};

/// DRY macro for the commands that take a single value and wait for the device to acknowledge
/// them.
macro_rules! acknowledged_command {
    { $name:ident, $variant:ident, $typ:ty, $doc:literal } => {
        #[doc = $doc]
        pub fn $name(&mut self, value: $typ) -> Result<(), Error<E>> {
            self.acknowledged(Command::$variant(value))?;
            Ok(())
        }
    };
}

/// A HOSI scanner on a serial link.
///
/// The link is read a byte at a time through the non-blocking `embedded-hal` serial traits. A
/// read that would block means "nothing yet", and too many of them in a row while waiting for an
/// acknowledgement is a [`LibraryError::Timeout`].
#[derive(Clone, Debug)]
pub struct HosiDriver<S> {
    serial: S,

    /// Bytes of a partially received line.
    line: Vec<u8>,

    /// Consecutive idle polls before giving up on a reply.
    idle_poll_limit: u32,
}

impl<S, E> HosiDriver<S>
where
    S: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
    E: Debug,
{
    pub fn new(serial: S, idle_poll_limit: u32) -> Self {
        Self {
            serial,
            line: Vec::new(),
            idle_poll_limit: idle_poll_limit.max(1),
        }
    }

    /// Give the serial link back.
    pub fn release(self) -> S {
        self.serial
    }

    /// Write a command, then flush to mark its end.
    pub fn send(&mut self, command: &Command) -> Result<(), Error<E>> {
        let encoded = command.to_string();
        debug!("Sending {:?}", encoded);
        for byte in encoded.bytes() {
            nb::block!(self.serial.write(byte)).map_err(Error::Transport)?;
        }
        nb::block!(self.serial.flush()).map_err(Error::Transport)
    }

    /// Read until a complete line is available, without the line ending.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn poll_line(&mut self) -> nb::Result<String, Error<E>> {
        loop {
            match self.serial.read() {
                Ok(b'\n') => {
                    let line = String::from_utf8_lossy(&self.line)
                        .trim_end_matches('\r')
                        .to_owned();
                    self.line.clear();
                    return Ok(line);
                }
                Ok(byte) => self.line.push(byte),
                Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
                Err(nb::Error::Other(err)) => return Err(nb::Error::Other(Error::Transport(err))),
            }
        }
    }

    /// Wait for a line starting with `prefix`, skipping any others.
    pub fn wait_for(&mut self, prefix: char) -> Result<String, Error<E>> {
        let mut idle = 0;
        loop {
            match self.poll_line() {
                Ok(line) if line.starts_with(prefix) => return Ok(line),
                Ok(line) => {
                    debug!("Skipping {:?} while waiting for {:?}", line, prefix);
                    idle = 0;
                }
                Err(nb::Error::WouldBlock) => {
                    idle += 1;
                    if idle >= self.idle_poll_limit {
                        return Err(LibraryError::Timeout(prefix).into());
                    }
                }
                Err(nb::Error::Other(err)) => return Err(err),
            }
        }
    }

    /// Send a command and wait for its acknowledgement, returning the acknowledging line.
    fn acknowledged(&mut self, command: Command) -> Result<String, Error<E>> {
        self.send(&command)?;
        match command.acknowledgement() {
            Some(prefix) => self.wait_for(prefix),
            None => Ok(String::new()),
        }
    }

    acknowledged_command! {
        move_tilt,
        Tilt,
        i32,
        "Move the tilt axis to an absolute position."
    }

    acknowledged_command! {
        move_pan,
        Pan,
        i32,
        "Move the pan axis to an absolute position."
    }

    acknowledged_command! {
        set_integration_time,
        IntegrationTime,
        u32,
        "Set the integration time (in microseconds) used by [`probe`](Self::probe)."
    }

    /// Move to a position, tilt first.
    pub fn move_to(&mut self, pan: i32, tilt: i32) -> Result<(), Error<E>> {
        self.move_tilt(tilt)?;
        self.move_pan(pan)
    }

    pub fn home(&mut self) -> Result<(), Error<E>> {
        self.move_to(0, 0)
    }

    /// Take a single reading.
    pub fn probe(&mut self) -> Result<ProbeSpectrum, Error<E>> {
        let line = self.acknowledged(Command::Read)?;
        Ok(ProbeSpectrum::parse(&line)?)
    }

    /// Ask the device to start a scan. The geometry is checked before anything is sent.
    pub fn start_scan(
        &mut self,
        session: &mut ScanSession,
        geometry: &ScanGeometry,
    ) -> Result<(), Error<E>> {
        session.request_start(geometry)?;
        self.send(&Command::StartScan(*geometry))
    }

    /// Feed lines into `session` until a scan finishes, saving each finished scan to `sink`.
    ///
    /// `should_stop` is checked before every poll; when it returns `true` the scan is stopped and
    /// what has been collected so far is saved. A transport failure marks the session
    /// disconnected (after saving the partial scan) and is returned. Going `idle_poll_limit`
    /// polls without a line is a timeout.
    pub fn run_scan<K, F>(
        &mut self,
        session: &mut ScanSession,
        sink: &mut K,
        mut should_stop: F,
    ) -> Result<Option<FinishedScan>, Error<E>>
    where
        K: ScanSink + ?Sized,
        F: FnMut() -> bool,
    {
        let mut idle = 0;
        loop {
            if should_stop() {
                return Self::save(session.request_stop(), sink);
            }
            match self.poll_line() {
                Ok(line) => {
                    idle = 0;
                    match session.handle_line(&line) {
                        Ok(Some(finished)) => {
                            sink.save(&finished)?;
                            if !session.is_scanning() {
                                return Ok(Some(finished));
                            }
                        }
                        Ok(None) => (),
                        // The session already warned; the running scan is untouched.
                        Err(err @ LibraryError::ScanInProgress) => {
                            debug!("Dropped scan header: {}", err);
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(nb::Error::WouldBlock) => {
                    session.tick();
                    idle += 1;
                    if idle >= self.idle_poll_limit {
                        let prefix = if session.is_scanning() { 'x' } else { 'h' };
                        warn!("No data from the scanner, stopping");
                        Self::save(session.request_stop(), sink)?;
                        return Err(LibraryError::Timeout(prefix).into());
                    }
                }
                Err(nb::Error::Other(err)) => {
                    warn!("Serial link failed: {}", err);
                    let partial = Self::save(session.request_stop(), sink);
                    session.set_disconnected();
                    partial?;
                    return Err(err);
                }
            }
        }
    }

    /// Start a scan and run it to completion.
    pub fn scan<K, F>(
        &mut self,
        session: &mut ScanSession,
        geometry: &ScanGeometry,
        sink: &mut K,
        should_stop: F,
    ) -> Result<Option<FinishedScan>, Error<E>>
    where
        K: ScanSink + ?Sized,
        F: FnMut() -> bool,
    {
        self.start_scan(session, geometry)?;
        self.run_scan(session, sink, should_stop)
    }

    fn save<K: ScanSink + ?Sized>(
        finished: Option<FinishedScan>,
        sink: &mut K,
    ) -> Result<Option<FinishedScan>, Error<E>> {
        if let Some(finished) = &finished {
            sink.save(finished)?;
        }
        Ok(finished)
    }
}

#[cfg(test)]
mod test {
    use hosi_test_data::{transcript, MockSerial, MockSerialError};

    use super::HosiDriver;
    use crate::config::{AcquisitionConfig, HeaderPolicy};
    use crate::error::{Error, LibraryError};
    use crate::export::ScanSink;
    use crate::session::{FinishedScan, ScanSession, Status};
    use crate::test::{calibration_library, example_geometry};

    #[derive(Default)]
    struct CountingSink(usize);

    impl ScanSink for CountingSink {
        fn save(&mut self, _scan: &FinishedScan) -> Result<(), LibraryError> {
            self.0 += 1;
            Ok(())
        }
    }

    fn acknowledging_mock() -> MockSerial {
        MockSerial::with_responder(|command| match command.chars().next() {
            Some('l') => vec![format!("t{}", &command[1..])],
            Some('p') => vec![format!("p{}", &command[1..])],
            Some('t') => vec!["i".to_string()],
            Some('r') => vec![transcript::probe_line(12000, 400)],
            _ => Vec::new(),
        })
    }

    #[test]
    fn move_tilt_then_pan() {
        let mock = acknowledging_mock();
        let mut driver = HosiDriver::new(mock.clone(), 10);
        driver.move_to(-20, 500).unwrap();
        driver.home().unwrap();
        assert_eq!(mock.commands(), vec!["l500", "p-20", "l0", "p0"]);
        assert!(mock.is_drained());
    }

    #[test]
    fn probe_reads_spectrum() {
        let mock = acknowledging_mock();
        let mut driver = HosiDriver::new(mock.clone(), 10);
        driver.set_integration_time(8000).unwrap();
        let probe = driver.probe().unwrap();
        assert_eq!(probe.integration_time_us, 12000);
        assert_eq!(probe.counts.len(), 288);
        assert_eq!(mock.commands(), vec!["t8000", "r"]);
    }

    #[test]
    fn missing_acknowledgement_times_out() {
        let mock = MockSerial::new();
        let mut driver = HosiDriver::new(mock, 5);
        assert!(matches!(
            driver.move_pan(4),
            Err(Error::Library(LibraryError::Timeout('p')))
        ));
    }

    #[test]
    fn lines_split_across_reads() {
        let mock = MockSerial::new();
        let mut driver = HosiDriver::new(mock.clone(), 5);
        assert!(driver.poll_line().is_err());
        mock.queue_line("t500\r");
        assert_eq!(driver.poll_line().unwrap(), "t500");
    }

    #[test]
    fn invalid_scan_sends_nothing() {
        let mock = MockSerial::new();
        let mut driver = HosiDriver::new(mock.clone(), 5);
        let mut session = ScanSession::new(calibration_library(), AcquisitionConfig::default());
        let mut geometry = example_geometry();
        geometry.pan.step = 0;
        assert!(driver.start_scan(&mut session, &geometry).is_err());
        assert!(mock.commands().is_empty());
        assert_eq!(session.status(), Status::InvalidPanTilt);
    }

    #[test]
    fn scan_saves_once() {
        let mock = MockSerial::new();
        let mut driver = HosiDriver::new(mock.clone(), 5);
        let mut session = ScanSession::new(calibration_library(), AcquisitionConfig::default());
        let mut sink = CountingSink::default();
        driver.start_scan(&mut session, &example_geometry()).unwrap();
        assert_eq!(mock.commands(), vec!["h0,8,4,0,8,4,50000,2,500,"]);
        for line in transcript::single_cell_scan() {
            mock.queue_line(&line);
        }
        let finished = driver
            .run_scan(&mut session, &mut sink, || false)
            .unwrap()
            .unwrap();
        assert_eq!(sink.0, 1);
        assert_eq!(finished.cube().filled_count(), 1);
    }

    #[test]
    fn rejected_header_keeps_scan_running() {
        let lines = transcript::single_cell_scan();
        let mut fed: Vec<String> = lines[..3].to_vec();
        fed.push(lines[0].clone());
        fed.extend_from_slice(&lines[3..]);
        let mock = MockSerial::with_lines(&fed);
        let mut driver = HosiDriver::new(mock.clone(), 5);
        let config = AcquisitionConfig {
            header_policy: HeaderPolicy::Reject,
            ..AcquisitionConfig::default()
        };
        let mut session = ScanSession::new(calibration_library(), config);
        let mut sink = CountingSink::default();
        let finished = driver
            .run_scan(&mut session, &mut sink, || false)
            .unwrap()
            .unwrap();
        assert_eq!(sink.0, 1);
        assert_eq!(finished.cube().filled_count(), 1);
        assert_eq!(session.status(), Status::Done);
        assert!(mock.is_drained());
    }

    #[test]
    fn disconnect_is_reported() {
        let mock = MockSerial::with_lines(transcript::single_cell_scan().iter().take(2));
        let mut driver = HosiDriver::new(mock.clone(), 50);
        let mut session = ScanSession::new(calibration_library(), AcquisitionConfig::default());
        let mut sink = CountingSink::default();
        let mut polls = 0;
        let result = driver.run_scan(&mut session, &mut sink, || {
            polls += 1;
            if polls == 4 {
                mock.disconnect();
            }
            false
        });
        assert!(matches!(
            result,
            Err(Error::Transport(MockSerialError::Disconnected))
        ));
        assert_eq!(session.status(), Status::Disconnected);
        // The scan had started, so the partial scan is still saved.
        assert_eq!(sink.0, 1);
    }
}
