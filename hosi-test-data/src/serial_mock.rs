// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::serial;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockSerialError {
    /// The device was unplugged.
    Disconnected,
}

type Responder = Box<dyn FnMut(&str) -> Vec<String>>;

/// A scripted serial device.
///
/// Bytes queued with [`MockSerial::queue_line`] are returned by reads, and reads with nothing
/// queued return `WouldBlock`. Each flush ends a command. Commands are recorded, and if a
/// responder is set its lines are queued in reply. Clones share the same state.
#[derive(Clone)]
pub struct MockSerial {
    incoming: Rc<RefCell<VecDeque<u8>>>,
    outgoing: Rc<RefCell<Vec<u8>>>,
    commands: Rc<RefCell<Vec<String>>>,
    responder: Rc<RefCell<Option<Responder>>>,
    disconnected: Rc<RefCell<bool>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            incoming: Rc::default(),
            outgoing: Rc::default(),
            commands: Rc::default(),
            responder: Rc::new(RefCell::new(None)),
            disconnected: Rc::default(),
        }
    }

    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mock = Self::new();
        for line in lines {
            mock.queue_line(line.as_ref());
        }
        mock
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + 'static,
    {
        let mock = Self::new();
        *mock.responder.borrow_mut() = Some(Box::new(responder));
        mock
    }

    /// Queue a line (a newline is appended) for the host to read.
    pub fn queue_line(&self, line: &str) {
        let mut incoming = self.incoming.borrow_mut();
        incoming.extend(line.bytes());
        incoming.push_back(b'\n');
    }

    /// Every command the host has sent, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Whether everything queued has been read.
    pub fn is_drained(&self) -> bool {
        self.incoming.borrow().is_empty()
    }

    /// Make every later read and write fail.
    pub fn disconnect(&self) {
        *self.disconnected.borrow_mut() = true;
    }

    fn check_connected(&self) -> nb::Result<(), MockSerialError> {
        if *self.disconnected.borrow() {
            Err(nb::Error::Other(MockSerialError::Disconnected))
        } else {
            Ok(())
        }
    }
}

impl Default for MockSerial {
    fn default() -> Self {
        Self::new()
    }
}

impl serial::Read<u8> for MockSerial {
    type Error = MockSerialError;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.check_connected()?;
        self.incoming
            .borrow_mut()
            .pop_front()
            .ok_or(nb::Error::WouldBlock)
    }
}

impl serial::Write<u8> for MockSerial {
    type Error = MockSerialError;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.check_connected()?;
        self.outgoing.borrow_mut().push(word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        self.check_connected()?;
        let bytes: Vec<u8> = self.outgoing.borrow_mut().drain(..).collect();
        if bytes.is_empty() {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&bytes).into_owned();
        let replies = match self.responder.borrow_mut().as_mut() {
            Some(responder) => responder(&command),
            None => Vec::new(),
        };
        self.commands.borrow_mut().push(command);
        for reply in replies {
            self.queue_line(&reply);
        }
        Ok(())
    }
}
