//! Parser for the platform's "instance exited" log lines.
//!
//! The platform API logs instance exits as
//!
//! ```text
//! App instance exited with guid <guid> payload: {"index"=>0, "reason"=>"CRASHED", ...}
//! ```
//!
//! The payload uses `=>` as its key/value separator. Replacing it with `:`
//! yields JSON.

use serde::Deserialize;

use appwatch_core::LogMessage;

use crate::error::CrashLogError;

pub const EXIT_PREFIX: &str = "App instance exited with guid ";
const PAYLOAD_MARKER: &str = " payload: {";
const CRASHED: &str = "CRASHED";

/// The fields of an exit payload the exporter cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstanceExit {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub reason: String,
}

impl InstanceExit {
    pub fn is_crash(&self) -> bool {
        self.reason == CRASHED
    }

    /// The instance slot, if the index is non-negative.
    pub fn instance_index(&self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }
}

/// Extract the exit payload from a log envelope.
///
/// Lines not written by the platform API on stdout, or not starting with
/// [`EXIT_PREFIX`], yield `Ok(None)`.
pub fn parse_exit(log: &LogMessage) -> Result<Option<InstanceExit>, CrashLogError> {
    if !log.is_platform_api_output() {
        return Ok(None);
    }
    parse_exit_message(&log.message)
}

/// Extract the exit payload from a raw log line.
pub fn parse_exit_message(message: &str) -> Result<Option<InstanceExit>, CrashLogError> {
    if !message.starts_with(EXIT_PREFIX) {
        return Ok(None);
    }

    let marker = message
        .find(PAYLOAD_MARKER)
        .ok_or_else(|| CrashLogError::MissingPayload(message.to_string()))?;
    // Keep the opening brace.
    let payload = &message[marker + PAYLOAD_MARKER.len() - 1..];

    let json = payload.replace("=>", ":");
    let exit = serde_json::from_str(&json)
        .map_err(|e| CrashLogError::InvalidPayload(e.to_string()))?;
    Ok(Some(exit))
}
