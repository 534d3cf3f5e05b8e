//! Daemon runtime.
//!
//! Wires the CPAL device, the TCP transport and the player together, then
//! runs the single-threaded control loop: commands and ticks are handled one
//! at a time, in arrival order.

use std::net::TcpListener;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, select};
use playd_engine::command::dispatch;
use playd_engine::decode::SymphoniaOpener;
use playd_engine::device;
use playd_engine::output::CpalOutput;
use playd_engine::player::{Player, PlayerState};
use playd_engine::response::Response;

use crate::config::DaemonConfig;
use crate::net::{self, Broadcast, Clients, ControlEvent};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)?;
    Ok(())
}

/// Run the daemon until a `quit` command or a shutdown signal.
pub fn run(config: DaemonConfig, install_ctrlc: bool) -> Result<()> {
    let host = cpal::default_host();
    let device = match device::pick_device(&host, config.device.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            if let Ok(names) = device::device_names(&host) {
                for (i, name) in names.iter().enumerate() {
                    tracing::info!(index = i, device = %name, "available output device");
                }
            }
            return Err(e.into());
        }
    };
    let output = CpalOutput::new(device, config.engine.chunk_frames);
    tracing::info!(device = %output.name(), "output device");

    let listener =
        TcpListener::bind(config.bind).with_context(|| format!("bind {}", config.bind))?;
    tracing::info!(bind = %config.bind, "listening");

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    if install_ctrlc {
        let tx = events_tx.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = tx.send(ControlEvent::Shutdown);
        }) {
            tracing::warn!("failed to install signal handler: {e}");
        }
    }
    let _acceptor = net::spawn_acceptor(listener, events_tx);

    let clients = Clients::default();
    let player = Player::new(
        Box::new(SymphoniaOpener),
        Box::new(output),
        Box::new(Broadcast::new(clients.clone())),
    )
    .with_engine_config(config.engine.clone())
    .with_position_period(config.position_period_us);

    let outcome = control_loop(player, &clients, &events_rx, config.tick);
    clients.close_all();
    outcome?;
    tracing::info!("shut down");
    Ok(())
}

/// Serve events and ticks until the player quits.
///
/// Returns an error only for fatal engine errors.
pub fn control_loop(
    mut player: Player,
    clients: &Clients,
    events: &Receiver<ControlEvent>,
    tick: Duration,
) -> playd_engine::Result<()> {
    let ticker = crossbeam_channel::tick(tick);
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(ControlEvent::Connected { id, client }) => {
                    clients.insert(id, client);
                    clients.send(id, &ohai(id).pack());
                    for response in player.snapshot() {
                        clients.send(id, &response.pack());
                    }
                }
                Ok(ControlEvent::Line { id, line }) => {
                    let out = dispatch(&mut player, &line)?;
                    clients.send(id, &out.pack());
                }
                Ok(ControlEvent::Disconnected { id }) => clients.remove(id),
                Ok(ControlEvent::Shutdown) | Err(_) => {
                    tracing::info!("shutdown requested");
                    if player.state() != PlayerState::Quitting {
                        player.quit()?;
                    }
                    return Ok(());
                }
            },
            recv(ticker) -> _ => {
                if !player.update() {
                    return Ok(());
                }
            }
        }
    }
}

fn ohai(id: net::ClientId) -> Response {
    Response::Ohai {
        client_id: id,
        server: format!("playd {}", env!("CARGO_PKG_VERSION")),
    }
}
