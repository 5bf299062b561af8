use std::sync::{Mutex, PoisonError};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, trace, warn};

use crate::{
    config::ScaleConfig,
    crc,
    decode::{self, ReadOutcome},
    diagnostics::{ChannelValidation, DiagnosticState, FaultDiagnostics, ValidationStep},
    error::{CommError, Error, Result},
    frame::{self, Frame},
    hex,
    transport::Transport,
    validate,
};

/// Result of a channel validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelValidationReport {
    /// [`ChannelValidation::Ok`] or [`ChannelValidation::Fail`].
    pub state: ChannelValidation,
    /// Reads made: one or two.
    pub attempts: u8,
    /// Config to persist. Has `swap_channels` set if the swapped read worked.
    pub config: ScaleConfig,
    pub outcome: Option<ReadOutcome>,
}

/// Drives read, tare and channel validation over a [`Transport`].
///
/// Only one exchange is ever outstanding. The transport lives behind an async
/// mutex and every operation takes it with `try_lock`, so a second operation
/// started while one is in flight fails fast with [`Error::Busy`] instead of
/// queueing behind it.
pub struct ScaleEngine<T: Transport> {
    transport: AsyncMutex<T>,
    diagnostics: Mutex<FaultDiagnostics>,
}

impl<T: Transport> ScaleEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: AsyncMutex::new(transport),
            diagnostics: Mutex::new(FaultDiagnostics::new()),
        }
    }

    fn with_diagnostics<R>(&self, f: impl FnOnce(&mut FaultDiagnostics) -> R) -> R {
        let mut diagnostics = self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut diagnostics)
    }

    /// Current diagnostic counters.
    pub fn diagnostics(&self) -> DiagnosticState {
        self.with_diagnostics(|d| d.state())
    }

    pub fn reset_diagnostics(&self) {
        self.with_diagnostics(FaultDiagnostics::reset);
    }

    /// `config` with function 0x03, if repeated 0x04 failures suggest it.
    ///
    /// Fails only if a raw read template no longer validates after its
    /// function byte is rewritten.
    pub fn fallback_config(&self, config: &ScaleConfig) -> Result<Option<ScaleConfig>> {
        self.with_diagnostics(|d| d.fallback_config(config))
    }

    /// True while a read or tare exchange is outstanding.
    pub fn is_busy(&self) -> bool {
        self.transport.try_lock().is_err()
    }

    /// Send `request` and wait for the reply, retrying only after timeouts.
    async fn round_trip(transport: &mut T, request: &[u8], config: &ScaleConfig) -> Result<Frame> {
        let route = config.route();
        let mut attempt = 0;
        loop {
            trace!(request = %hex::format(request), attempt, "Sending frame");
            let result = tokio::time::timeout(config.timeout(), transport.exchange(request, &route))
                .await
                .unwrap_or(Err(CommError::Timeout));
            match result {
                Ok(reply) => {
                    trace!(reply = %reply, "Received frame");
                    return Ok(reply);
                }
                Err(CommError::Timeout) if attempt < config.max_retries => {
                    attempt += 1;
                    debug!(attempt, max_retries = config.max_retries, "Timed out, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn read_with(&self, transport: &mut T, config: &ScaleConfig) -> Result<ReadOutcome> {
        let request = frame::build_read_frame(config)?;
        let payload_len = request.len() - if config.auto_checksum { 2 } else { 0 };
        validate::validate_read_frame(&request[..payload_len])?;

        let result = async {
            let reply = Self::round_trip(transport, &request, config).await?;
            decode::verify_reply(&request, &reply, config.auto_checksum)?;
            let weight_kg = decode::decode(&reply, config.byte_order)?;
            Ok::<_, Error>(ReadOutcome {
                raw_response_frame: reply,
                weight_kg,
            })
        }
        .await;

        self.with_diagnostics(|d| match &result {
            Ok(_) => d.record_success(),
            Err(err) => {
                warn!(%err, function = request[1], "Weight read failed");
                d.record_failure(request[1]);
            }
        });
        result
    }

    /// Read the current weight once.
    ///
    /// Build and validation errors come back before anything is sent and are
    /// not counted as failures. Anything that goes wrong after the frame is
    /// sent is counted by the diagnostics.
    pub async fn read_weight(&self, config: &ScaleConfig) -> Result<ReadOutcome> {
        let mut transport = self.transport.try_lock().map_err(|_| Error::Busy)?;
        self.read_with(&mut transport, config).await
    }

    /// Send the configured tare command and check the scale echoed it.
    pub async fn tare(&self, config: &ScaleConfig) -> Result<Frame> {
        let (payload, _) = crc::strip_checksum(&config.tare_frame_template);
        validate::validate_tare_frame(payload)?;
        let request = frame::build_tare_frame(payload, config)?;

        let mut transport = self.transport.try_lock().map_err(|_| Error::Busy)?;
        let reply = Self::round_trip(&mut transport, &request, config).await?;
        decode::verify_reply(&request, &reply, config.auto_checksum)?;
        if !reply.starts_with(payload) {
            return Err(CommError::UnexpectedResponse.into());
        }
        info!(request = %request, "Tare acknowledged");
        Ok(reply)
    }

    /// Check the scale answers on the configured channels, trying once more
    /// with write and notify swapped if it does not.
    ///
    /// Holds the in-flight guard for the whole run, so at most two reads are
    /// made and nothing else can interleave. If the swapped read also fails,
    /// the returned config keeps the original swap flag.
    pub async fn validate_channel(&self, config: &ScaleConfig) -> Result<ChannelValidationReport> {
        let mut transport = self.transport.try_lock().map_err(|_| Error::Busy)?;

        let mut state = ChannelValidation::Reading;
        let mut current = config.clone();
        let mut attempts = 0;
        self.with_diagnostics(|d| d.set_channel_validation(state));

        let outcome = loop {
            attempts += 1;
            let result = self.read_with(&mut transport, &current).await;
            let (next, step) = state.advance(result.is_ok(), current.channel.swap_channels);
            state = next;
            self.with_diagnostics(|d| d.set_channel_validation(state));

            match step {
                ValidationStep::RetryWithSwap => {
                    debug!("No reply on configured channels, retrying with channels swapped");
                    current = current.with_swap_channels(true);
                }
                ValidationStep::Done => break result.ok(),
            }
        };

        if state == ChannelValidation::Ok {
            info!(
                attempts,
                swap_channels = current.channel.swap_channels,
                "Channel validation succeeded"
            );
        } else {
            warn!(attempts, "Channel validation failed");
            current = config.clone();
        }

        Ok(ChannelValidationReport {
            state,
            attempts,
            config: current,
            outcome,
        })
    }
}
