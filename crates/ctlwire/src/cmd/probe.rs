use ctlwire_session::{
    CancelToken, Coordinator, CoordinatorConfig, PollOutcome, PollScheduler, TracingSink,
};

use crate::cmd::ProbeArgs;
use crate::exit::{config_error, CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_statuses, OutputFormat};

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoints.load()?;
    let (mut coordinator, outcome) = handshake(&config, args.ticks, &CancelToken::new())?;

    print_statuses(
        &coordinator.statuses(),
        &coordinator.backend_statuses(),
        coordinator.is_all_ready(),
        format,
    );
    coordinator.shutdown();

    match outcome {
        PollOutcome::AllReady { .. } => Ok(SUCCESS),
        PollOutcome::GaveUp { .. } | PollOutcome::Cancelled => Ok(HEALTH_CHECK_FAILED),
    }
}

/// Build a coordinator and tick it until ready or `ticks` run out.
pub(crate) fn handshake(
    config: &CoordinatorConfig,
    ticks: u32,
    cancel: &CancelToken,
) -> CliResult<(Coordinator, PollOutcome)> {
    let mut coordinator = Coordinator::new(config)
        .map_err(|err| config_error("invalid configuration", err))?
        .with_sink(TracingSink);

    let mut policy = config.reconnect.clone();
    policy.max_attempts = Some(ticks.max(1));
    policy.stop_when_ready = true;

    let outcome = PollScheduler::new(policy).run_until_ready(&mut coordinator, cancel);
    Ok((coordinator, outcome))
}
