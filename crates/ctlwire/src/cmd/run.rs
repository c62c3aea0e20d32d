use std::thread;
use std::time::Duration;

use ctlwire_frame::CommandKind;
use ctlwire_session::{
    CancelToken, Coordinator, PollOutcome, PollScheduler, RecordingToggle, TracingSink,
};
use tracing::{info, warn};

use crate::cmd::RunArgs;
use crate::exit::{config_error, CliError, CliResult, FAILURE, HEALTH_CHECK_FAILED, INTERNAL, SUCCESS};
use crate::output::{print_command_report, print_statuses, OutputFormat};

const WATCH_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoints.load()?;
    let params = args.params.to_params();

    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone())?;
    if let Some(duration) = args.duration {
        let timer = cancel.clone();
        thread::spawn(move || {
            thread::sleep(duration);
            timer.cancel();
        });
    }

    let mut coordinator = Coordinator::new(&config)
        .map_err(|err| config_error("invalid configuration", err))?
        .with_sink(TracingSink);
    let mut scheduler = PollScheduler::new(config.reconnect.clone());
    let mut toggle = RecordingToggle::default();
    let mut ever_ready = false;
    let mut commands_ok = true;

    loop {
        match scheduler.run_until_ready(&mut coordinator, &cancel) {
            PollOutcome::AllReady { ticks } => {
                info!(ticks, "all endpoints ready");
                ever_ready = true;
                print_statuses(
                    &coordinator.statuses(),
                    &coordinator.backend_statuses(),
                    true,
                    format,
                );
            }
            PollOutcome::Cancelled => break,
            PollOutcome::GaveUp { attempts } => {
                warn!(attempts, "endpoints did not become ready");
                print_statuses(
                    &coordinator.statuses(),
                    &coordinator.backend_statuses(),
                    false,
                    format,
                );
                break;
            }
        }

        if args.start && !toggle.is_recording() {
            let report = coordinator.broadcast_command(CommandKind::Start, &params);
            toggle.apply(&report);
            commands_ok &= report.is_success();
            print_command_report(&report, format);
        }

        while !cancel.is_cancelled() && coordinator.is_all_ready() {
            thread::sleep(WATCH_INTERVAL);
            coordinator.check_links();
        }
        if cancel.is_cancelled() {
            break;
        }
        warn!("endpoint lost, restarting polling");
        print_statuses(
            &coordinator.statuses(),
            &coordinator.backend_statuses(),
            false,
            format,
        );
        scheduler.restart();
    }

    if toggle.is_recording() {
        let report = coordinator.broadcast_command(CommandKind::Stop, &params);
        toggle.apply(&report);
        commands_ok &= report.is_success();
        print_command_report(&report, format);
    }
    coordinator.shutdown();

    if !ever_ready {
        Ok(HEALTH_CHECK_FAILED)
    } else if commands_ok {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

pub(crate) fn install_ctrlc_handler(cancel: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || cancel.cancel()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })
}
