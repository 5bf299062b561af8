//! The link between the engine and the scale.
//!
//! The engine never touches a radio or serial port itself. It hands a
//! [`Transport`] one request frame at a time and waits for the reply.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::trace;

use crate::{
    config::ChannelRoute,
    error::CommError,
    frame::{FRAME_CAPACITY, Frame, FunctionCode},
};

/// Something that can deliver a request frame and return the reply.
///
/// Implementations must not retry on their own; the engine applies the
/// configured timeout and retry policy around each call.
#[async_trait]
pub trait Transport: Send {
    /// Send `request` and wait for one reply.
    ///
    /// `route` says which characteristic to write and which to listen on,
    /// with any channel swap already applied. Byte-stream links ignore it.
    async fn exchange(&mut self, request: &[u8], route: &ChannelRoute)
    -> Result<Frame, CommError>;
}

/// Length of a complete Modbus RTU reply, once enough of it has arrived to tell.
fn expected_reply_len(buff: &[u8]) -> Option<usize> {
    let function = *buff.get(1)?;
    if FunctionCode::is_exception(function) {
        return Some(5);
    }
    match function {
        0x05 | 0x06 => Some(8),
        _ => buff.get(2).map(|&count| 3 + count as usize + 2),
    }
}

/// You can create a SerialTransport using any interface which implements
/// [embedded_io::Read] & [embedded_io::Write], e.g. an RS485 adapter or a
/// BLE UART bridge exposed as a serial port.
///
/// Reads and writes block, so each exchange runs on tokio's blocking pool and
/// the engine's reply timeout still fires while the port is waiting. An
/// exchange abandoned by that timeout keeps the port until its read returns;
/// the next exchange waits for it.
pub struct SerialTransport<S: embedded_io::Read + embedded_io::Write> {
    interface: Arc<Mutex<S>>,
}

impl<S: embedded_io::Read + embedded_io::Write> SerialTransport<S> {
    pub fn new(interface: S) -> Self {
        Self {
            interface: Arc::new(Mutex::new(interface)),
        }
    }

    /// Give back the interface, or `None` while an abandoned exchange still holds it.
    pub fn into_inner(self) -> Option<S> {
        Arc::into_inner(self.interface)
            .map(|interface| interface.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

fn exchange_blocking<S>(interface: &mut S, request: &[u8]) -> Result<Frame, CommError>
where
    S: embedded_io::Read + embedded_io::Write,
{
    interface.write_all(request).map_err(CommError::from_io)?;
    interface.flush().map_err(CommError::from_io)?;

    let mut buff: heapless::Vec<u8, FRAME_CAPACITY> = heapless::Vec::new();
    // Read until the reply header tells us we have everything, or the port runs dry.
    let mut temp_buf = [0u8; 16];
    loop {
        match interface.read(&mut temp_buf) {
            Ok(0) if buff.is_empty() => return Err(CommError::Timeout),
            Ok(0) => break,
            Ok(bytes_read) => {
                if buff.extend_from_slice(&temp_buf[..bytes_read]).is_err() {
                    return Err(CommError::UnexpectedResponse);
                }
                if expected_reply_len(&buff).is_some_and(|len| buff.len() >= len) {
                    break;
                }
            }
            Err(e) => {
                if matches!(
                    embedded_io::Error::kind(&e),
                    embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut
                ) && !buff.is_empty()
                {
                    break;
                }
                return Err(CommError::from_io(e));
            }
        }
    }

    if let Some(len) = expected_reply_len(&buff) {
        buff.truncate(len);
    }
    trace!(reply = %crate::hex::format(&buff), "Serial reply");
    Frame::from_slice(&buff).map_err(|_| CommError::UnexpectedResponse)
}

#[async_trait]
impl<S> Transport for SerialTransport<S>
where
    S: embedded_io::Read + embedded_io::Write + Send + 'static,
{
    async fn exchange(
        &mut self,
        request: &[u8],
        _route: &ChannelRoute,
    ) -> Result<Frame, CommError> {
        let interface = self.interface.clone();
        let request = Frame::from_slice(request).map_err(|_| CommError::UnexpectedResponse)?;
        tokio::task::spawn_blocking(move || {
            let mut interface = interface.lock().unwrap_or_else(PoisonError::into_inner);
            exchange_blocking(&mut *interface, &request)
        })
        .await
        .map_err(|_| CommError::Io(embedded_io::ErrorKind::Other))?
    }
}
