use crate::cmd::{connect, BankCommand, ConnectionArgs};
use crate::exit::{controller_error, CliResult, SUCCESS};
use crate::output::{print_ack, print_bank_status, OutputFormat};

pub fn run(command: BankCommand, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let controller = connect(connection)?;

    match command {
        BankCommand::Get(args) => {
            let status = controller
                .bank_status(controller.deadline(), args.bank)
                .map_err(|err| controller_error("bank status failed", err))?;
            print_bank_status(args.bank, status, format);
        }
        BankCommand::Set(args) => {
            controller
                .set_bank_status(controller.deadline(), args.bank, args.status)
                .map_err(|err| controller_error("bank set failed", err))?;
            print_ack(
                "bank_set",
                &[
                    ("bank", u64::from(args.bank)),
                    ("status", u64::from(args.status)),
                ],
                format,
            );
        }
        BankCommand::On(args) => {
            controller
                .turn_on_relay_by_bank(controller.deadline(), args.bank, args.index)
                .map_err(|err| controller_error("bank relay on failed", err))?;
            print_ack(
                "bank_relay_on",
                &[("bank", u64::from(args.bank)), ("index", u64::from(args.index))],
                format,
            );
        }
        BankCommand::Off(args) => {
            controller
                .turn_off_relay_by_bank(controller.deadline(), args.bank, args.index)
                .map_err(|err| controller_error("bank relay off failed", err))?;
            print_ack(
                "bank_relay_off",
                &[("bank", u64::from(args.bank)), ("index", u64::from(args.index))],
                format,
            );
        }
    }

    Ok(SUCCESS)
}
