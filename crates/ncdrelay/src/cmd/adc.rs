use ncdrelay_controller::ControllerConfig;

use crate::cmd::{connect, connect_with, AdcCommand, ConnectionArgs, Resolution};
use crate::exit::{controller_error, CliResult, SUCCESS};
use crate::output::{print_samples, OutputFormat};

pub fn run(command: AdcCommand, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        AdcCommand::Read(args) => {
            let config = ControllerConfig {
                ad10_single_payload_len: args.payload_len,
                ..ControllerConfig::default()
            };
            let controller = connect_with(connection, config)?;
            let deadline = controller.deadline();
            let value = match args.bits {
                Resolution::Eight => controller.read_ad8(deadline, args.channel).map(u16::from),
                Resolution::Ten => controller.read_ad10(deadline, args.channel),
            }
            .map_err(|err| controller_error("adc read failed", err))?;
            print_samples(args.bits.bits(), &[(args.channel, value)], format);
        }
        AdcCommand::All(args) => {
            let controller = connect(connection)?;
            let deadline = controller.deadline();
            let values: Vec<u16> = match args.bits {
                Resolution::Eight => controller
                    .read_all_ad8(deadline)
                    .map(|all| all.into_iter().map(u16::from).collect::<Vec<u16>>()),
                Resolution::Ten => controller.read_all_ad10(deadline).map(Vec::from),
            }
            .map_err(|err| controller_error("adc read failed", err))?;
            let samples: Vec<(u8, u16)> = (0u8..).zip(values).collect();
            print_samples(args.bits.bits(), &samples, format);
        }
    }

    Ok(SUCCESS)
}
