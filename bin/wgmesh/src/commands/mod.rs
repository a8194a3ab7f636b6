//! Command implementations.

pub mod bootstrap;
pub mod info;
pub mod join;
pub mod rtt;
pub mod tags;
pub mod ui;

mod runtime;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};

/// Block until SIGINT, SIGTERM or SIGQUIT arrives.
pub(crate) async fn wait_for_signal() -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}
