use std::io;
use std::sync::Arc;
use std::time::Instant;

use ncdrelay_packet::{read_response_async, write_packet_async, Packet};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::command::{
    decode_10bit, decode_all_10bit, decode_all_8bit, decode_relay_status, first_byte, Command,
    Response, ACK_RESPONSE_LEN, AD_CHANNELS,
};
use crate::config::ControllerConfig;
use crate::controller::{checked_payload, remaining, Outcome};
use crate::error::{ControllerError, Result};

/// Async driver for one relay/ADC controller board.
///
/// Each exchange runs in its own spawned task that holds the stream lock
/// for the whole write+read, so exchanges never interleave. The caller
/// awaits that task under its deadline; on timeout the task is detached,
/// not aborted, and finishes (or stays blocked) on its own.
pub struct AsyncController<S> {
    stream: Arc<Mutex<S>>,
    config: ControllerConfig,
}

impl<S> AsyncController<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, ControllerConfig::default())
    }

    pub fn with_config(stream: S, config: ControllerConfig) -> Self {
        Self {
            stream: Arc::new(Mutex::new(stream)),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// A deadline `default_timeout` from now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.config.default_timeout
    }

    pub async fn turn_on_relay(&self, deadline: Instant, relay: u16) -> Result<()> {
        self.execute(deadline, &Command::RelayOn(relay)).await.map(drop)
    }

    pub async fn turn_off_relay(&self, deadline: Instant, relay: u16) -> Result<()> {
        self.execute(deadline, &Command::RelayOff(relay))
            .await
            .map(drop)
    }

    pub async fn relay_status(&self, deadline: Instant, relay: u16) -> Result<bool> {
        let payload = self.execute(deadline, &Command::RelayStatus(relay)).await?;
        decode_relay_status(&payload).map_err(ControllerError::InvalidResponse)
    }

    pub async fn set_bank_status(&self, deadline: Instant, bank: u8, status: u8) -> Result<()> {
        self.execute(deadline, &Command::SetBankStatus { bank, status })
            .await
            .map(drop)
    }

    pub async fn bank_status(&self, deadline: Instant, bank: u8) -> Result<u8> {
        let payload = self.execute(deadline, &Command::BankStatus(bank)).await?;
        first_byte(&payload).map_err(ControllerError::InvalidResponse)
    }

    pub async fn turn_on_relay_by_bank(&self, deadline: Instant, bank: u8, index: u8) -> Result<()> {
        self.execute(deadline, &Command::BankRelayOn { bank, index })
            .await
            .map(drop)
    }

    pub async fn turn_off_relay_by_bank(
        &self,
        deadline: Instant,
        bank: u8,
        index: u8,
    ) -> Result<()> {
        self.execute(deadline, &Command::BankRelayOff { bank, index })
            .await
            .map(drop)
    }

    pub async fn read_ad8(&self, deadline: Instant, channel: u8) -> Result<u8> {
        let payload = self.execute(deadline, &Command::ReadAd8(channel)).await?;
        first_byte(&payload).map_err(ControllerError::InvalidResponse)
    }

    pub async fn read_all_ad8(&self, deadline: Instant) -> Result<[u8; AD_CHANNELS]> {
        let payload = self.execute(deadline, &Command::ReadAllAd8).await?;
        decode_all_8bit(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// See [`crate::Controller::read_ad10`] for the payload length caveat.
    pub async fn read_ad10(&self, deadline: Instant, channel: u8) -> Result<u16> {
        let payload = self.execute(deadline, &Command::ReadAd10(channel)).await?;
        decode_10bit(&payload).map_err(ControllerError::InvalidResponse)
    }

    pub async fn read_all_ad10(&self, deadline: Instant) -> Result<[u16; AD_CHANNELS]> {
        let payload = self.execute(deadline, &Command::ReadAllAd10).await?;
        decode_all_10bit(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// Run a command and return its validated payload (empty for acks).
    pub async fn execute(&self, deadline: Instant, command: &Command) -> Result<Vec<u8>> {
        let packet = command.packet()?;
        debug!(command = command.name(), "executing command");
        match command.response(&self.config) {
            Response::Ack => self
                .execute_command(deadline, &packet)
                .await
                .map(|()| Vec::new()),
            Response::Read(len) => self.execute_read(deadline, &packet, len).await,
        }
    }

    pub async fn execute_command(&self, deadline: Instant, packet: &Packet) -> Result<()> {
        let response = self.exchange(deadline, packet, ACK_RESPONSE_LEN).await?;
        checked_payload(&response).map(drop)
    }

    pub async fn execute_read(
        &self,
        deadline: Instant,
        packet: &Packet,
        response_len: usize,
    ) -> Result<Vec<u8>> {
        let response = self
            .exchange(deadline, packet, Response::Read(response_len).wire_len())
            .await?;
        checked_payload(&response)
    }

    async fn exchange(
        &self,
        deadline: Instant,
        request: &Packet,
        response_len: usize,
    ) -> Result<Packet> {
        let budget = remaining(deadline)?;
        let stream = Arc::clone(&self.stream);
        let job = request.clone();

        let task = tokio::spawn(async move {
            let mut stream = stream.lock().await;
            if Instant::now() >= deadline {
                warn!(request = ?job, "deadline passed while queued; request not sent");
                return Outcome::Expired;
            }

            debug!(request = ?job, response_len, "exchange");
            let result = match write_packet_async(&mut *stream, &job).await {
                Ok(()) => read_response_async(&mut *stream, response_len).await,
                Err(err) => Err(err),
            };
            Outcome::Done(result)
        });

        match tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), task).await {
            Ok(Ok(Outcome::Done(result))) => Ok(result?),
            Ok(Ok(Outcome::Expired)) => Err(ControllerError::Timeout(budget)),
            Ok(Err(join_err)) => Err(io::Error::other(join_err).into()),
            Err(_) => {
                warn!(?request, ?budget, "exchange timed out");
                Err(ControllerError::Timeout(budget))
            }
        }
    }
}

impl<S> std::fmt::Debug for AsyncController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
