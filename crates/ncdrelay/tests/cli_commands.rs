#![cfg(feature = "cli")]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

use ncdrelay::packet::Packet;

/// Relay index the simulated board never answers for.
const SILENT_RELAY: u16 = 999;
/// Bank whose status reply carries a corrupt checksum.
const CORRUPT_BANK: u8 = 0xEE;

#[derive(Default)]
struct BoardState {
    relays: HashMap<u16, bool>,
    banks: HashMap<u8, u8>,
}

fn framed(payload: &[u8]) -> Vec<u8> {
    Packet::build(payload)
        .expect("payload fits")
        .as_bytes()
        .to_vec()
}

fn ack() -> Vec<u8> {
    framed(&[0x55])
}

/// Reply the simulated board sends for one request payload, if any.
fn respond(payload: &[u8], state: &Mutex<BoardState>) -> Option<Vec<u8>> {
    let mut state = state.lock().expect("board state lock");
    match payload {
        [254, 48, lo, hi] => {
            let relay = u16::from_le_bytes([*lo, *hi]) + 1;
            state.relays.insert(relay, true);
            Some(ack())
        }
        [254, 47, lo, hi] => {
            let relay = u16::from_le_bytes([*lo, *hi]) + 1;
            state.relays.insert(relay, false);
            Some(ack())
        }
        [254, 44, lo, hi] => {
            let relay = u16::from_le_bytes([*lo, *hi]) + 1;
            if relay == SILENT_RELAY {
                return None;
            }
            let on = state.relays.get(&relay).copied().unwrap_or(false);
            Some(framed(&[u8::from(on)]))
        }
        [254, 140, status, bank] => {
            state.banks.insert(*bank, *status);
            Some(ack())
        }
        [254, 124, bank] if *bank == CORRUPT_BANK => {
            let mut reply = framed(&[0x01]);
            let last = reply.len() - 1;
            reply[last] ^= 0xFF;
            Some(reply)
        }
        [254, 124, bank] => Some(framed(&[state.banks.get(bank).copied().unwrap_or(0)])),
        [254, 99..=106, _bank] => Some(ack()),
        [254, 166] => {
            let mut samples = Vec::new();
            for channel in 0u16..8 {
                samples.extend_from_slice(&(channel * 100).to_be_bytes());
            }
            Some(framed(&samples))
        }
        [254, command @ 149..=156] => Some(framed(&[(command - 149) * 10])),
        _ => None,
    }
}

fn serve(mut conn: TcpStream, state: Arc<Mutex<BoardState>>) {
    loop {
        let mut header = [0u8; 2];
        if conn.read_exact(&mut header).is_err() {
            return;
        }
        let mut rest = vec![0u8; usize::from(header[1]) + 1];
        if conn.read_exact(&mut rest).is_err() {
            return;
        }
        let payload = &rest[..rest.len() - 1];
        if let Some(reply) = respond(payload, &state) {
            if conn.write_all(&reply).is_err() {
                return;
            }
        }
    }
}

/// Start a simulated board and return its address.
fn spawn_board() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind board");
    let addr = listener.local_addr().expect("board addr").to_string();
    let state = Arc::new(Mutex::new(BoardState::default()));

    thread::spawn(move || {
        for conn in listener.incoming() {
            let Ok(conn) = conn else { return };
            let state = Arc::clone(&state);
            thread::spawn(move || serve(conn, state));
        }
    });
    addr
}

fn ncdrelay(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ncdrelay"))
        .env_remove("NCDRELAY_PORT")
        .env_remove("NCDRELAY_TCP")
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("ncdrelay should run")
}

fn against(addr: &str, args: &[&str]) -> Output {
    let mut full = vec!["--format", "json", "--tcp", addr];
    full.extend_from_slice(args);
    ncdrelay(&full)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn relay_on_then_status_reports_on() {
    let board = spawn_board();

    let output = against(&board, &["relay", "on", "3"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"command\":\"relay_on\""));
    assert!(stdout(&output).contains("\"ok\":true"));

    let output = against(&board, &["relay", "status", "3"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"relay\":3"));
    assert!(stdout(&output).contains("\"on\":true"));

    let output = against(&board, &["relay", "off", "3"]);
    assert!(output.status.success(), "{output:?}");

    let output = against(&board, &["relay", "status", "3"]);
    assert!(stdout(&output).contains("\"on\":false"));
}

#[test]
fn bank_set_then_get_roundtrips_bitmask() {
    let board = spawn_board();

    let output = against(&board, &["bank", "set", "2", "0xA5"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"status\":165"));

    let output = against(&board, &["bank", "get", "2"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"status\":165"));
    assert!(stdout(&output).contains("\"bits\":\"10100101\""));
}

#[test]
fn bank_relay_off_is_acknowledged() {
    let board = spawn_board();

    let output = against(&board, &["bank", "off", "1", "4"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"command\":\"bank_relay_off\""));
}

#[test]
fn adc_reads() {
    let board = spawn_board();

    let output = against(&board, &["adc", "read", "3"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("{\"channel\":3,\"value\":30}"));

    let output = against(&board, &["adc", "all", "--bits", "10"]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("\"bits\":10"));
    assert!(stdout(&output).contains("{\"channel\":7,\"value\":700}"));
}

#[test]
fn ten_bit_single_read_with_one_byte_payload_is_invalid_response() {
    let board = spawn_board();

    let output = against(&board, &["adc", "read", "2", "--bits", "10"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid response"));
}

#[test]
fn corrupt_checksum_returns_60() {
    let board = spawn_board();
    let bank = CORRUPT_BANK.to_string();

    let output = against(&board, &["bank", "get", &bank]);
    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn silent_board_returns_124() {
    let board = spawn_board();
    let relay = SILENT_RELAY.to_string();

    let output = against(&board, &["--timeout", "300ms", "relay", "status", &relay]);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn relay_zero_is_a_usage_error() {
    let board = spawn_board();

    let output = against(&board, &["relay", "on", "0"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn missing_device_is_a_usage_error() {
    let output = ncdrelay(&["relay", "status", "1"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn refused_connection_returns_3() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").to_string()
    };

    let output = against(&addr, &["relay", "status", "1"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn watch_prints_requested_number_of_samples() {
    let board = spawn_board();

    let output = against(&board, &["watch", "--count", "2", "--interval", "5ms"]);
    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        assert!(line.contains("\"readings\""));
        assert!(line.contains("\"channel\":4,\"raw\":400,\"volts\":1.953125"));
    }
}

#[test]
fn watch_pretty_matches_voltmeter_layout() {
    let board = spawn_board();

    let output = ncdrelay(&[
        "--format", "pretty", "--tcp", &board, "watch", "--count", "1",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("[07, 0700, 3.418V]"));
}

#[test]
fn version_reports_package_version() {
    let output = ncdrelay(&["version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}
