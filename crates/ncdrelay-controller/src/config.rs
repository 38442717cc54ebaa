use std::time::Duration;

/// Default per-command budget used by [`ControllerConfig::default`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Budget used by `Controller::deadline` when callers want a deadline
    /// relative to now.
    pub default_timeout: Duration,
    /// Payload bytes requested for a single-channel 10-bit ADC read.
    ///
    /// The command table requests 1 byte, the same as the 8-bit read that
    /// shares its request bytes, yet a 10-bit sample needs 2. The default
    /// keeps the table's value, so the read reports a short payload unless
    /// the board is known to answer with 2 bytes and this is set to 2.
    pub ad10_single_payload_len: usize,
    /// Name of the thread that owns the stream (blocking controller only).
    pub worker_name: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            ad10_single_payload_len: 1,
            worker_name: "ncdrelay-io".to_string(),
        }
    }
}
