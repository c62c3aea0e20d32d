use std::thread;
use std::time::Duration;

use ctlwire_frame::FrameConfig;
use ctlwire_session::{BackendResponder, CancelToken};
use ctlwire_transport::{ControlListener, ControlStream};
use tracing::{info, warn};

use crate::cmd::run::install_ctrlc_handler;
use crate::cmd::ServeArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_listening, print_responder_event, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone())?;

    let mut listeners = Vec::with_capacity(args.ports.len());
    for &port in &args.ports {
        let listener = ControlListener::bind(&args.host, port)
            .map_err(|err| transport_error("bind failed", err))?;
        print_listening(listener.local_addr());
        listeners.push(listener);
    }

    let reserved = args.reserved.into_bytes();
    for listener in listeners {
        let reserved = reserved.clone();
        thread::spawn(move || accept_loop(listener, reserved, format));
    }

    while !cancel.is_cancelled() {
        thread::sleep(Duration::from_millis(50));
    }
    info!("serve stopped");
    Ok(SUCCESS)
}

fn accept_loop(listener: ControlListener, reserved: Vec<u8>, format: OutputFormat) {
    let port = listener.local_addr().port();
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!(port, peer = %peer, "client connected");
                let reserved = reserved.clone();
                thread::spawn(move || serve_client(stream, port, reserved, format));
            }
            Err(err) => {
                warn!(port, error = %err, "accept failed, listener stopped");
                return;
            }
        }
    }
}

fn serve_client(stream: ControlStream, port: u16, reserved: Vec<u8>, format: OutputFormat) {
    let mut responder = match BackendResponder::new(stream, FrameConfig::default()) {
        Ok(responder) => responder.with_reserved_body(reserved),
        Err(err) => {
            warn!(port, error = %err, "failed to set up client stream");
            return;
        }
    };

    if let Err(err) = responder.serve(|event| print_responder_event(port, event, format)) {
        warn!(port, error = %err, "client session ended with error");
    }
}
