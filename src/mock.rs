//! We use this mocking module in unit tests to emulate the scale link.
//!
//! [`MockSerial`] emulates a byte-stream port for [`SerialTransport`](crate::transport::SerialTransport).
//! [`ScriptedTransport`] plays back canned replies for engine and scheduler tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    config::ChannelRoute,
    error::CommError,
    frame::Frame,
    transport::Transport,
};

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, 256>,
    /// Buffer containing pre-configured response data to be read
    read_buffer: heapless::Vec<u8, 256>,
    /// Current position in the read buffer
    read_position: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Error returned by every read, if set
    read_error: Option<MockSerialError>,
    /// How long each read blocks before returning
    read_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSerialError {
    /// Simulated timeout error
    Timeout,
    /// Simulated buffer overflow
    BufferOverflow,
    /// Generic simulated error for testing
    SimulatedError,
    /// Would block - no data available
    WouldBlock,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MockSerialError::Timeout => f.write_str("mock serial timed out"),
            MockSerialError::BufferOverflow => f.write_str("mock serial buffer overflow"),
            MockSerialError::SimulatedError => f.write_str("simulated mock serial error"),
            MockSerialError::WouldBlock => f.write_str("no mock serial data available"),
        }
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
            MockSerialError::WouldBlock => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        if let Some(err) = self.read_error {
            return Err(err);
        }
        if self.read_position >= self.read_buffer.len() {
            return Err(MockSerialError::WouldBlock);
        }

        let available_bytes = self.read_buffer.len() - self.read_position;
        let bytes_to_read = core::cmp::min(buf.len(), available_bytes);
        buf[..bytes_to_read].copy_from_slice(
            &self.read_buffer[self.read_position..self.read_position + bytes_to_read],
        );
        self.read_position += bytes_to_read;
        Ok(bytes_to_read)
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            read_buffer: heapless::Vec::new(),
            read_position: 0,
            should_error_on_write: false,
            read_error: None,
            read_delay: Duration::ZERO,
        }
    }

    /// Set the data that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) -> Result<(), MockSerialError> {
        self.read_buffer.clear();
        self.read_position = 0;
        self.read_buffer
            .extend_from_slice(data)
            .map_err(|_| MockSerialError::BufferOverflow)
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure an error for every read to return
    pub fn set_read_error(&mut self, error: Option<MockSerialError>) {
        self.read_error = error;
    }

    /// Make every read block the calling thread for `delay`
    pub fn set_read_delay(&mut self, delay: Duration) {
        self.read_delay = delay;
    }
}

/// What a [`ScriptedTransport`] does with one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(Frame),
    Fail(CommError),
    /// Never answer; the engine's timeout has to fire.
    Hang,
}

/// Shared view of what a [`ScriptedTransport`] has seen.
#[derive(Clone, Default)]
pub struct TransportStats {
    sent: Arc<Mutex<Vec<(Frame, ChannelRoute)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl TransportStats {
    pub fn sent(&self) -> Vec<(Frame, ChannelRoute)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn exchanges(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Plays back a script of replies, then repeats `fallback` forever.
pub struct ScriptedTransport {
    script: VecDeque<Scripted>,
    fallback: Scripted,
    latency: Duration,
    /// Only requests written to this characteristic are answered.
    listening_on: Option<String>,
    stats: TransportStats,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: Scripted::Fail(CommError::Timeout),
            latency: Duration::ZERO,
            listening_on: None,
            stats: TransportStats::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: Scripted) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn listening_on(mut self, write_id: impl Into<String>) -> Self {
        self.listening_on = Some(write_id.into());
        self
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn exchange(
        &mut self,
        request: &[u8],
        route: &ChannelRoute,
    ) -> Result<Frame, CommError> {
        let _guard = InFlight::enter(&self.stats);
        self.stats
            .sent
            .lock()
            .unwrap()
            .push((Frame::from_slice(request).unwrap(), route.clone()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let step = if self
            .listening_on
            .as_ref()
            .is_some_and(|id| *id != route.write_id)
        {
            Scripted::Fail(CommError::Timeout)
        } else {
            self.script
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        };

        match step {
            Scripted::Reply(frame) => Ok(frame),
            Scripted::Fail(err) => Err(err),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Counts an exchange as in flight until dropped, including when a timeout
/// abandons it.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(stats: &TransportStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats.in_flight.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Read, Write};

    #[test]
    fn test_write_multiple_times() {
        let mut mock = MockSerial::new();
        mock.write(b"Hello, ").unwrap();
        mock.write(b"World!").unwrap();
        assert_eq!(mock.written_data(), b"Hello, World!");
    }

    #[test]
    fn test_read_multiple_calls() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hello World").unwrap();

        let mut buffer1 = [0u8; 5];
        let mut buffer2 = [0u8; 6];
        assert_eq!(mock.read(&mut buffer1).unwrap(), 5);
        assert_eq!(mock.read(&mut buffer2).unwrap(), 6);
        assert_eq!(&buffer1, b"Hello");
        assert_eq!(&buffer2, b" World");
        assert_eq!(mock.read(&mut buffer1), Err(MockSerialError::WouldBlock));
    }

    #[test]
    fn test_errors_display() {
        assert_eq!(MockSerialError::Timeout.to_string(), "mock serial timed out");
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let result = mock.write(&[0u8; 300]);
        assert_eq!(result, Err(MockSerialError::BufferOverflow));
    }

    #[tokio::test]
    async fn scripted_transport_plays_script_then_fallback() {
        let reply = Frame::from_slice(&[0x01, 0x02]).unwrap();
        let mut transport = ScriptedTransport::new([Scripted::Reply(reply.clone())])
            .with_fallback(Scripted::Fail(CommError::ChecksumMismatch));
        let stats = transport.stats();
        let route = crate::config::ScaleConfig::default().route();

        assert_eq!(transport.exchange(&[0xAA], &route).await, Ok(reply));
        assert_eq!(
            transport.exchange(&[0xBB], &route).await,
            Err(CommError::ChecksumMismatch)
        );
        assert_eq!(stats.exchanges(), 2);
        assert_eq!(stats.in_flight(), 0);
        assert_eq!(stats.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn scripted_transport_ignores_other_channels() {
        let reply = Frame::from_slice(&[0x01, 0x02]).unwrap();
        let config = crate::config::ScaleConfig::default();
        let swapped = config.with_swap_channels(true);
        let mut transport = ScriptedTransport::new([Scripted::Reply(reply.clone())])
            .listening_on(swapped.route().write_id);

        assert_eq!(
            transport.exchange(&[0xAA], &config.route()).await,
            Err(CommError::Timeout)
        );
        assert_eq!(transport.exchange(&[0xAA], &swapped.route()).await, Ok(reply));
    }
}
