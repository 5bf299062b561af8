//! Fault tracking for read attempts.
//!
//! [`FaultDiagnostics`] watches the outcome of every read and suggests
//! remediation: switching from function 0x04 to 0x03 after repeated failures,
//! and swapping the write/notify characteristics during channel validation.

use tracing::warn;

use crate::{
    config::{ReadFunctionCode, ScaleConfig},
    crc,
    error::Result,
    frame::{Frame, FunctionCode},
    validate,
};

/// Consecutive failures with function 0x04 before a fallback is suggested.
pub const FALLBACK_THRESHOLD: u32 = 2;

/// Progress of a channel validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelValidation {
    #[default]
    Idle,
    /// First read on the configured channels.
    Reading,
    /// Second read with the channels swapped.
    TryingSwap,
    Ok,
    Fail,
}

/// What to do after a read made during channel validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStep {
    /// Flip `swap_channels` on and read once more.
    RetryWithSwap,
    /// The run is over; the state is [`ChannelValidation::Ok`] or [`ChannelValidation::Fail`].
    Done,
}

impl ChannelValidation {
    /// Advance after a read in state `self`.
    ///
    /// `swap_active` is the swap flag the read was made with.
    pub fn advance(self, read_ok: bool, swap_active: bool) -> (ChannelValidation, ValidationStep) {
        use ChannelValidation as CV;
        match (self, read_ok) {
            (CV::Reading | CV::TryingSwap, true) => (CV::Ok, ValidationStep::Done),
            (CV::Reading, false) if !swap_active => (CV::TryingSwap, ValidationStep::RetryWithSwap),
            (CV::Reading | CV::TryingSwap, false) => (CV::Fail, ValidationStep::Done),
            // Not inside a run; nothing to advance.
            (state, _) => (state, ValidationStep::Done),
        }
    }
}

/// Snapshot of the diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticState {
    pub consecutive_failures: u32,
    pub suggest_function_code_fallback: bool,
    pub channel_validation: ChannelValidation,
}

/// Tracks read outcomes. Never persisted; starts from zero with the engine.
#[derive(Debug, Default)]
pub struct FaultDiagnostics {
    state: DiagnosticState,
}

impl FaultDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DiagnosticState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = DiagnosticState::default();
    }

    pub fn record_success(&mut self) {
        self.state.consecutive_failures = 0;
        self.state.suggest_function_code_fallback = false;
    }

    /// Count a failed read whose request carried function byte `function`.
    pub fn record_failure(&mut self, function: u8) {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        if function == u8::from(FunctionCode::ReadInputRegisters)
            && self.state.consecutive_failures >= FALLBACK_THRESHOLD
            && !self.state.suggest_function_code_fallback
        {
            warn!(
                failures = self.state.consecutive_failures,
                "Reads with function 0x04 keep failing, suggesting fallback to 0x03"
            );
            self.state.suggest_function_code_fallback = true;
        }
    }

    pub fn set_channel_validation(&mut self, state: ChannelValidation) {
        self.state.channel_validation = state;
    }

    /// The config to use if the suggested fallback is accepted.
    ///
    /// A raw read template gets its function byte rewritten too, with any
    /// stored checksum dropped.
    pub fn fallback_config(&self, config: &ScaleConfig) -> Result<Option<ScaleConfig>> {
        if !self.state.suggest_function_code_fallback {
            return Ok(None);
        }
        let mut next = config.with_read_function_code(ReadFunctionCode::Holding);
        if let Some(template) = config.raw_read_template.as_deref() {
            let (payload, _) = crc::strip_checksum(template);
            let rewritten = apply_function_code_fallback(payload)?;
            validate::validate_read_frame(&rewritten)?;
            next.raw_read_template = Some(rewritten.to_vec());
        }
        Ok(Some(next))
    }
}

/// Rewrite the function byte of a read command to 0x03.
///
/// Every other byte is left alone, including any checksum, so the caller has
/// to sanitize and validate again before sending.
pub fn apply_function_code_fallback(frame: &[u8]) -> Result<Frame> {
    Frame::from_slice(frame)?.with_byte(1, FunctionCode::ReadHoldingRegisters.into())
}
