use crate::cmd::{connect, ConnectionArgs, RelayCommand};
use crate::exit::{controller_error, CliResult, SUCCESS};
use crate::output::{print_ack, print_relay_status, OutputFormat};

pub fn run(command: RelayCommand, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let controller = connect(connection)?;

    match command {
        RelayCommand::On(args) => {
            controller
                .turn_on_relay(controller.deadline(), args.relay)
                .map_err(|err| controller_error("relay on failed", err))?;
            print_ack("relay_on", &[("relay", u64::from(args.relay))], format);
        }
        RelayCommand::Off(args) => {
            controller
                .turn_off_relay(controller.deadline(), args.relay)
                .map_err(|err| controller_error("relay off failed", err))?;
            print_ack("relay_off", &[("relay", u64::from(args.relay))], format);
        }
        RelayCommand::Status(args) => {
            let on = controller
                .relay_status(controller.deadline(), args.relay)
                .map_err(|err| controller_error("relay status failed", err))?;
            print_relay_status(args.relay, on, format);
        }
    }

    Ok(SUCCESS)
}
