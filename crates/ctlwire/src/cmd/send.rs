use ctlwire_frame::CommandKind;
use ctlwire_session::{CancelToken, PollOutcome};
use tracing::warn;

use crate::cmd::probe::handshake;
use crate::cmd::SendArgs;
use crate::exit::{CliResult, FAILURE, SUCCESS};
use crate::output::{print_command_report, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoints.load()?;
    let (mut coordinator, outcome) = handshake(&config, args.ticks, &CancelToken::new())?;
    if !matches!(outcome, PollOutcome::AllReady { .. }) {
        warn!(outcome = ?outcome, "not every endpoint is ready; sending to those that are");
    }

    let kind = CommandKind::from(args.command);
    let report = coordinator.broadcast_command(kind, &args.params.to_params());
    print_command_report(&report, format);
    coordinator.shutdown();

    Ok(if report.is_success() { SUCCESS } else { FAILURE })
}
