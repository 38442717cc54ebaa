use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::info;

use crate::cmd::{connect, parse_duration, ConnectionArgs, WatchArgs};
use crate::exit::{controller_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_readings, OutputFormat, Reading};

pub fn run(args: WatchArgs, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    if !(args.reference.is_finite() && args.reference > 0.0) {
        return Err(CliError::usage(format!(
            "reference voltage must be positive, got {}",
            args.reference
        )));
    }

    let controller = connect(connection)?;
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0u64;
    while running.load(Ordering::SeqCst) {
        let samples = controller
            .read_all_ad10(controller.deadline())
            .map_err(|err| controller_error("adc read failed", err))?;
        let readings: Vec<Reading> = (0u8..)
            .zip(samples)
            .map(|(channel, raw)| Reading::new(channel, raw, args.reference))
            .collect();
        print_readings(&readings, format);

        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            return Ok(SUCCESS);
        }
        thread::sleep(interval);
    }

    info!(samples = printed, "interrupted");
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
