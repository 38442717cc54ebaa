use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct RelayStatusOutput {
    relay: u16,
    on: bool,
}

#[derive(Serialize)]
struct BankStatusOutput {
    bank: u8,
    status: u8,
    bits: String,
}

#[derive(Serialize)]
struct Sample {
    channel: u8,
    value: u16,
}

#[derive(Serialize)]
struct SamplesOutput<'a> {
    bits: u8,
    samples: &'a [Sample],
}

/// One voltmeter row: a 10-bit sample scaled against the reference voltage.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub channel: u8,
    pub raw: u16,
    pub volts: f64,
}

impl Reading {
    pub fn new(channel: u8, raw: u16, reference: f64) -> Self {
        Self {
            channel,
            raw,
            volts: f64::from(raw) * reference / 1024.0,
        }
    }
}

#[derive(Serialize)]
struct ReadingsOutput<'a> {
    timestamp_ms: u64,
    readings: &'a [Reading],
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<String>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// Report a command that the board acknowledged.
pub fn print_ack(command: &str, fields: &[(&str, u64)], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let mut out = Map::new();
            out.insert("command".into(), Value::from(command));
            for (name, value) in fields {
                out.insert((*name).into(), Value::from(*value));
            }
            out.insert("ok".into(), Value::Bool(true));
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut header = vec!["COMMAND".to_string()];
            header.extend(fields.iter().map(|(name, _)| name.to_uppercase()));
            header.push("RESULT".to_string());

            let mut row = vec![command.to_string()];
            row.extend(fields.iter().map(|(_, value)| value.to_string()));
            row.push("ok".to_string());

            let mut table = new_table(header);
            table.add_row(row);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let args: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{command} {}: ok", args.join(" "));
        }
    }
}

pub fn print_relay_status(relay: u16, on: bool, format: OutputFormat) {
    let state = if on { "on" } else { "off" };
    match format {
        OutputFormat::Json => print_json(&RelayStatusOutput { relay, on }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["RELAY".into(), "STATE".into()]);
            table.add_row(vec![relay.to_string(), state.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("relay {relay}: {state}"),
    }
}

pub fn print_bank_status(bank: u8, status: u8, format: OutputFormat) {
    let bits = format!("{status:08b}");
    match format {
        OutputFormat::Json => print_json(&BankStatusOutput { bank, status, bits }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["BANK".into(), "STATUS".into(), "BITS".into()]);
            table.add_row(vec![bank.to_string(), status.to_string(), bits]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("bank {bank}: {status} (0b{bits})"),
    }
}

/// Print ADC samples as `(channel, value)` pairs.
pub fn print_samples(bits: u8, samples: &[(u8, u16)], format: OutputFormat) {
    let samples: Vec<Sample> = samples
        .iter()
        .map(|&(channel, value)| Sample { channel, value })
        .collect();
    match format {
        OutputFormat::Json => print_json(&SamplesOutput {
            bits,
            samples: &samples,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["CHANNEL".into(), format!("{bits}-BIT VALUE")]);
            for sample in &samples {
                table.add_row(vec![sample.channel.to_string(), sample.value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let line: Vec<String> = samples
                .iter()
                .map(|s| format!("ch{}={}", s.channel, s.value))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

pub fn print_readings(readings: &[Reading], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReadingsOutput {
            timestamp_ms: now_unix_millis(),
            readings,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["CHANNEL".into(), "RAW".into(), "VOLTS".into()]);
            for reading in readings {
                table.add_row(vec![
                    reading.channel.to_string(),
                    reading.raw.to_string(),
                    format!("{:.3}", reading.volts),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", pretty_readings(readings)),
    }
}

fn pretty_readings(readings: &[Reading]) -> String {
    readings
        .iter()
        .map(|r| format!("[{:02}, {:04}, {:.3}V]", r.channel, r.raw, r.volts))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
