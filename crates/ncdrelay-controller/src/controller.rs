use std::io::{self, ErrorKind, Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use ncdrelay_packet::{read_response, write_packet, Packet};
use tracing::{debug, warn};

use crate::command::{
    decode_10bit, decode_all_10bit, decode_all_8bit, decode_relay_status, first_byte, Command,
    Response, ACK_RESPONSE_LEN, AD_CHANNELS,
};
use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};

/// What the stream owner reports back for one queued exchange.
pub(crate) enum Outcome {
    /// The write+read ran to completion or failed with an I/O error.
    Done(io::Result<Packet>),
    /// The deadline had passed before the exchange reached the stream.
    Expired,
}

/// Time left until `deadline`, or a timeout if none is left.
pub(crate) fn remaining(deadline: Instant) -> Result<Duration> {
    match deadline.checked_duration_since(Instant::now()) {
        Some(budget) if !budget.is_zero() => Ok(budget),
        _ => {
            debug!("deadline already elapsed; exchange not started");
            Err(ControllerError::Timeout(Duration::ZERO))
        }
    }
}

/// Validate a response and hand back its payload.
pub(crate) fn checked_payload(response: &Packet) -> Result<Vec<u8>> {
    response
        .validate()
        .map_err(ControllerError::InvalidResponse)?;
    Ok(response.payload().to_vec())
}

struct Job {
    request: Packet,
    response_len: usize,
    deadline: Instant,
    reply: mpsc::Sender<Outcome>,
}

/// Blocking driver for one relay/ADC controller board.
///
/// The stream is moved onto a dedicated worker thread for the lifetime of
/// the controller. Commands are queued to that thread one at a time, so the
/// half-duplex protocol never sees interleaved requests, even when one
/// `Controller` is shared by reference between threads.
///
/// Each command races the worker's reply against the caller's deadline.
/// Cancellation is advisory: a timed-out exchange keeps running on the
/// worker, which reads and discards its late response before starting the
/// next queued request. A board that never answers (or answers short)
/// leaves the worker blocked on the stream, and later commands time out
/// behind it.
pub struct Controller {
    jobs: mpsc::Sender<Job>,
    config: ControllerConfig,
}

impl Controller {
    /// Take ownership of an already-open duplex stream.
    pub fn new<S>(stream: S) -> Result<Self>
    where
        S: Read + Write + Send + 'static,
    {
        Self::with_config(stream, ControllerConfig::default())
    }

    /// Take ownership of a stream with explicit configuration.
    pub fn with_config<S>(stream: S, config: ControllerConfig) -> Result<Self>
    where
        S: Read + Write + Send + 'static,
    {
        let (jobs, queue) = mpsc::channel();
        thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || run_worker(stream, queue))?;
        Ok(Self { jobs, config })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// A deadline `default_timeout` from now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.config.default_timeout
    }

    /// Turn on a relay (1-based index).
    pub fn turn_on_relay(&self, deadline: Instant, relay: u16) -> Result<()> {
        self.execute(deadline, &Command::RelayOn(relay)).map(drop)
    }

    /// Turn off a relay (1-based index).
    pub fn turn_off_relay(&self, deadline: Instant, relay: u16) -> Result<()> {
        self.execute(deadline, &Command::RelayOff(relay)).map(drop)
    }

    /// Whether a relay (1-based index) is on.
    pub fn relay_status(&self, deadline: Instant, relay: u16) -> Result<bool> {
        let payload = self.execute(deadline, &Command::RelayStatus(relay))?;
        decode_relay_status(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// Set all 8 relays of a bank from one bitmask.
    pub fn set_bank_status(&self, deadline: Instant, bank: u8, status: u8) -> Result<()> {
        self.execute(deadline, &Command::SetBankStatus { bank, status })
            .map(drop)
    }

    /// Bitmask of the 8 relays in a bank, bit order as reported by the board.
    pub fn bank_status(&self, deadline: Instant, bank: u8) -> Result<u8> {
        let payload = self.execute(deadline, &Command::BankStatus(bank))?;
        first_byte(&payload).map_err(ControllerError::InvalidResponse)
    }

    pub fn turn_on_relay_by_bank(&self, deadline: Instant, bank: u8, index: u8) -> Result<()> {
        self.execute(deadline, &Command::BankRelayOn { bank, index })
            .map(drop)
    }

    pub fn turn_off_relay_by_bank(&self, deadline: Instant, bank: u8, index: u8) -> Result<()> {
        self.execute(deadline, &Command::BankRelayOff { bank, index })
            .map(drop)
    }

    /// One ADC channel with 8-bit resolution (0-255).
    pub fn read_ad8(&self, deadline: Instant, channel: u8) -> Result<u8> {
        let payload = self.execute(deadline, &Command::ReadAd8(channel))?;
        first_byte(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// All ADC channels with 8-bit resolution.
    pub fn read_all_ad8(&self, deadline: Instant) -> Result<[u8; AD_CHANNELS]> {
        let payload = self.execute(deadline, &Command::ReadAllAd8)?;
        decode_all_8bit(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// One ADC channel with 10-bit resolution (0-1023).
    ///
    /// Sends the same request as [`Controller::read_ad8`] and, by default,
    /// reads a 1-byte payload, which cannot hold a 10-bit sample: the call
    /// then fails with [`ControllerError::InvalidResponse`]. Set
    /// [`ControllerConfig::ad10_single_payload_len`] to 2 once the board has
    /// been confirmed to answer with two bytes.
    pub fn read_ad10(&self, deadline: Instant, channel: u8) -> Result<u16> {
        let payload = self.execute(deadline, &Command::ReadAd10(channel))?;
        decode_10bit(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// All ADC channels with 10-bit resolution.
    pub fn read_all_ad10(&self, deadline: Instant) -> Result<[u16; AD_CHANNELS]> {
        let payload = self.execute(deadline, &Command::ReadAllAd10)?;
        decode_all_10bit(&payload).map_err(ControllerError::InvalidResponse)
    }

    /// Run a command and return its validated payload (empty for acks).
    pub fn execute(&self, deadline: Instant, command: &Command) -> Result<Vec<u8>> {
        let packet = command.packet()?;
        debug!(command = command.name(), "executing command");
        match command.response(&self.config) {
            Response::Ack => self.execute_command(deadline, &packet).map(|()| Vec::new()),
            Response::Read(len) => self.execute_read(deadline, &packet, len),
        }
    }

    /// Send a request that is answered with a bare acknowledgement.
    pub fn execute_command(&self, deadline: Instant, packet: &Packet) -> Result<()> {
        let response = self.exchange(deadline, packet, ACK_RESPONSE_LEN)?;
        checked_payload(&response).map(drop)
    }

    /// Send a request answered by `response_len` payload bytes.
    pub fn execute_read(
        &self,
        deadline: Instant,
        packet: &Packet,
        response_len: usize,
    ) -> Result<Vec<u8>> {
        let response = self.exchange(deadline, packet, Response::Read(response_len).wire_len())?;
        checked_payload(&response)
    }

    fn exchange(&self, deadline: Instant, request: &Packet, response_len: usize) -> Result<Packet> {
        let budget = remaining(deadline)?;
        let (reply, outcome) = mpsc::channel();

        self.jobs
            .send(Job {
                request: request.clone(),
                response_len,
                deadline,
                reply,
            })
            .map_err(|_| worker_stopped())?;

        match outcome.recv_timeout(budget) {
            Ok(Outcome::Done(result)) => Ok(result?),
            Ok(Outcome::Expired) => Err(ControllerError::Timeout(budget)),
            Err(RecvTimeoutError::Timeout) => {
                warn!(?request, ?budget, "exchange timed out");
                Err(ControllerError::Timeout(budget))
            }
            Err(RecvTimeoutError::Disconnected) => Err(worker_stopped().into()),
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn worker_stopped() -> io::Error {
    io::Error::new(ErrorKind::BrokenPipe, "controller I/O worker has stopped")
}

fn run_worker<S: Read + Write>(mut stream: S, queue: mpsc::Receiver<Job>) {
    for job in queue {
        if Instant::now() >= job.deadline {
            warn!(request = ?job.request, "deadline passed while queued; request not sent");
            let _ = job.reply.send(Outcome::Expired);
            continue;
        }

        debug!(request = ?job.request, response_len = job.response_len, "exchange");
        let result = write_packet(&mut stream, &job.request)
            .and_then(|()| read_response(&mut stream, job.response_len));

        match &result {
            Ok(response) => debug!(?response, "exchange complete"),
            Err(err) => debug!(error = %err, "exchange failed"),
        }

        if job.reply.send(Outcome::Done(result)).is_err() {
            warn!(request = ?job.request, "late response discarded");
        }
    }
    debug!("controller dropped; I/O worker exiting");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::os::unix::net::UnixStream;
    use std::sync::{Arc, Mutex};

    use ncdrelay_packet::PacketError;

    use super::*;

    /// Serves pre-loaded response bytes and records everything written.
    struct ScriptedStream {
        responses: VecDeque<u8>,
        written: Arc<Mutex<Vec<u8>>>,
        chunk: usize,
        read_error: Option<ErrorKind>,
    }

    impl ScriptedStream {
        fn new(responses: &[&[u8]]) -> (Self, Arc<Mutex<Vec<u8>>>) {
            let written = Arc::new(Mutex::new(Vec::new()));
            let stream = Self {
                responses: responses.iter().flat_map(|r| r.iter().copied()).collect(),
                written: Arc::clone(&written),
                chunk: usize::MAX,
                read_error: None,
            };
            (stream, written)
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(kind) = self.read_error {
                return Err(kind.into());
            }
            let n = self.chunk.min(buf.len()).min(self.responses.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.responses.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len());
            self.written.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reply(payload: &[u8]) -> Vec<u8> {
        Packet::build(payload).unwrap().as_bytes().to_vec()
    }

    fn ack() -> Vec<u8> {
        reply(&[0x55])
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn turn_on_relay_writes_request_and_accepts_ack() {
        let (stream, written) = ScriptedStream::new(&[&ack()]);
        let controller = Controller::new(stream).unwrap();

        controller.turn_on_relay(soon(), 1).unwrap();

        assert_eq!(
            written.lock().unwrap().as_slice(),
            &[0xAA, 0x04, 0xFE, 0x30, 0x00, 0x00, 0xDC]
        );
    }

    #[test]
    fn short_writes_and_reads_are_completed() {
        let (mut stream, written) = ScriptedStream::new(&[&reply(&[1])]);
        stream.chunk = 1;
        let controller = Controller::new(stream).unwrap();

        assert!(controller.relay_status(soon(), 3).unwrap());
        assert_eq!(
            written.lock().unwrap().as_slice(),
            Command::RelayStatus(3).packet().unwrap().as_bytes()
        );
    }

    #[test]
    fn relay_status_only_true_for_one() {
        let (stream, _) = ScriptedStream::new(&[&reply(&[1]), &reply(&[0]), &reply(&[2])]);
        let controller = Controller::new(stream).unwrap();

        assert!(controller.relay_status(soon(), 1).unwrap());
        assert!(!controller.relay_status(soon(), 1).unwrap());
        assert!(!controller.relay_status(soon(), 1).unwrap());
    }

    #[test]
    fn bank_commands() {
        let (stream, written) =
            ScriptedStream::new(&[&ack(), &reply(&[0b1000_0001]), &ack(), &ack()]);
        let controller = Controller::new(stream).unwrap();

        controller.set_bank_status(soon(), 1, 0x81).unwrap();
        assert_eq!(controller.bank_status(soon(), 1).unwrap(), 0b1000_0001);
        controller.turn_on_relay_by_bank(soon(), 1, 2).unwrap();
        controller.turn_off_relay_by_bank(soon(), 1, 2).unwrap();

        let mut expected = Vec::new();
        for payload in [
            &[254, 140, 0x81, 1][..],
            &[254, 124, 1],
            &[254, 48, 109, 1],
            &[254, 101, 1],
        ] {
            expected.extend_from_slice(Packet::build(payload).unwrap().as_bytes());
        }
        assert_eq!(written.lock().unwrap().as_slice(), expected.as_slice());
    }

    #[test]
    fn adc_reads() {
        let ten_bit: Vec<u8> = [0x03, 0xFF].repeat(AD_CHANNELS);
        let (stream, _) = ScriptedStream::new(&[
            &reply(&[200]),
            &reply(&[1, 2, 3, 4, 5, 6, 7, 8]),
            &reply(&ten_bit),
        ]);
        let controller = Controller::new(stream).unwrap();

        assert_eq!(controller.read_ad8(soon(), 1).unwrap(), 200);
        assert_eq!(
            controller.read_all_ad8(soon()).unwrap(),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
        assert_eq!(controller.read_all_ad10(soon()).unwrap(), [1023; 8]);
    }

    #[test]
    fn single_channel_ad10_reports_short_payload_by_default() {
        let (stream, _) = ScriptedStream::new(&[&reply(&[0x02])]);
        let controller = Controller::new(stream).unwrap();

        let err = controller.read_ad10(soon(), 1).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidResponse(PacketError::PayloadTooShort {
                needed: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn single_channel_ad10_with_two_byte_payload() {
        let (stream, _) = ScriptedStream::new(&[&reply(&[0x02, 0x10])]);
        let config = ControllerConfig {
            ad10_single_payload_len: 2,
            ..ControllerConfig::default()
        };
        let controller = Controller::with_config(stream, config).unwrap();

        assert_eq!(controller.read_ad10(soon(), 1).unwrap(), 0x210);
    }

    #[test]
    fn corrupted_checksum_is_invalid_response() {
        let mut bad = ack();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        let (stream, _) = ScriptedStream::new(&[&bad]);
        let controller = Controller::new(stream).unwrap();

        let err = controller.turn_off_relay(soon(), 1).unwrap_err();
        assert!(err.is_invalid_response());
        assert!(matches!(
            err,
            ControllerError::InvalidResponse(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn wrong_handshake_is_invalid_response() {
        let (stream, _) = ScriptedStream::new(&[&[0x00, 0x01, 0x01, 0x02]]);
        let controller = Controller::new(stream).unwrap();

        let err = controller.bank_status(soon(), 1).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidResponse(PacketError::InvalidHandshake { found: 0 })
        ));
    }

    #[test]
    fn read_error_propagates_verbatim() {
        let (mut stream, _) = ScriptedStream::new(&[]);
        stream.read_error = Some(ErrorKind::ConnectionReset);
        let controller = Controller::new(stream).unwrap();

        let err = controller.turn_on_relay(soon(), 1).unwrap_err();
        assert!(matches!(err, ControllerError::Io(e) if e.kind() == ErrorKind::ConnectionReset));
    }

    #[test]
    fn stream_closed_mid_response_is_io_error() {
        let (stream, _) = ScriptedStream::new(&[&[0xAA, 0x01]]);
        let controller = Controller::new(stream).unwrap();

        let err = controller.turn_on_relay(soon(), 1).unwrap_err();
        assert!(matches!(err, ControllerError::Io(e) if e.kind() == ErrorKind::UnexpectedEof));
    }

    #[test]
    fn relay_zero_never_reaches_the_stream() {
        let (stream, written) = ScriptedStream::new(&[&ack()]);
        let controller = Controller::new(stream).unwrap();

        let err = controller.turn_on_relay(soon(), 0).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidRequest(_)));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn expired_deadline_times_out_without_io() {
        let (stream, written) = ScriptedStream::new(&[&ack()]);
        let controller = Controller::new(stream).unwrap();

        let started = Instant::now();
        let err = controller.turn_on_relay(Instant::now(), 1).unwrap_err();

        assert!(matches!(err, ControllerError::Timeout(d) if d.is_zero()));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(written.lock().unwrap().is_empty());
    }

    #[test]
    fn silent_device_times_out() {
        let (host, _device) = UnixStream::pair().unwrap();
        let controller = Controller::new(host).unwrap();

        let started = Instant::now();
        let err = controller
            .relay_status(Instant::now() + Duration::from_millis(50), 1)
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn late_response_is_discarded_before_next_command() {
        let (host, mut device) = UnixStream::pair().unwrap();
        let controller = Controller::new(host).unwrap();

        let board = thread::spawn(move || {
            let mut request = [0u8; 7];
            device.read_exact(&mut request).unwrap();
            thread::sleep(Duration::from_millis(150));
            device.write_all(&reply(&[1])).unwrap();

            device.read_exact(&mut request).unwrap();
            device.write_all(&reply(&[0])).unwrap();
        });

        let first = controller.relay_status(Instant::now() + Duration::from_millis(30), 1);
        assert!(matches!(first, Err(ControllerError::Timeout(_))));

        let second = controller.relay_status(soon(), 1).unwrap();
        assert!(!second, "second command must see its own response");

        board.join().unwrap();
    }

    #[test]
    fn request_expired_in_queue_is_never_written() {
        let (host, mut device) = UnixStream::pair().unwrap();
        let controller = Arc::new(Controller::new(host).unwrap());
        let (got_first, first_seen) = mpsc::channel();
        let (release, released) = mpsc::channel::<()>();

        let board = thread::spawn(move || {
            let mut request = [0u8; 7];
            device.read_exact(&mut request).unwrap();
            got_first.send(()).unwrap();
            released.recv().unwrap();
            device.write_all(&reply(&[1])).unwrap();

            device.read_exact(&mut request).unwrap();
            device.write_all(&reply(&[0])).unwrap();
            request
        });

        let first = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.relay_status(soon(), 1))
        };
        first_seen.recv().unwrap();

        // Queued behind the first exchange; its deadline passes while waiting.
        let queued = controller.turn_on_relay(Instant::now() + Duration::from_millis(30), 2);
        assert!(matches!(queued, Err(ControllerError::Timeout(_))));

        release.send(()).unwrap();
        assert!(first.join().unwrap().unwrap());

        assert!(!controller.relay_status(soon(), 5).unwrap());
        let next = board.join().unwrap();
        assert_eq!(next, Command::RelayStatus(5).packet().unwrap().as_bytes());
    }

    #[test]
    fn shared_controller_serializes_exchanges() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 8;

        let (host, mut device) = UnixStream::pair().unwrap();
        let controller = Arc::new(Controller::new(host).unwrap());

        let board = thread::spawn(move || {
            for _ in 0..THREADS * PER_THREAD {
                let mut request = [0u8; 7];
                device.read_exact(&mut request).unwrap();
                assert!(Packet::from_bytes(request.to_vec()).is_valid());
                device.write_all(&ack()).unwrap();
            }
        });

        let callers: Vec<_> = (0..THREADS)
            .map(|i| {
                let controller = Arc::clone(&controller);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        controller.turn_on_relay(soon(), i as u16 + 1).unwrap();
                    }
                })
            })
            .collect();

        for caller in callers {
            caller.join().unwrap();
        }
        board.join().unwrap();
    }
}
