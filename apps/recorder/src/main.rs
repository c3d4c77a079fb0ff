use anyhow::{bail, Context};
use std::path::PathBuf;
use tracing::{info, warn};

use forza_recorder::{init_tracing, RecorderConfig, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => RecorderConfig::load(&path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => RecorderConfig::default(),
    };
    config.validate().context("invalid config")?;

    let (display_tx, display_rx) = iox::display_channel();
    let renderer = iox::spawn_console_renderer(display_rx, std::io::stdout());

    let supervisor = Supervisor::configure(config.sessions).with_display(display_tx);
    let stopper = supervisor.stopper();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping sessions");
            stopper.stop();
        }
    });

    info!(sessions = supervisor.sessions().len(), "starting multi-car recorder");
    let handles = supervisor.start_all().await;
    // the renderer exits once every session has dropped its display
    drop(supervisor);
    let outcomes = Supervisor::join_all(handles).await;
    if !matches!(tokio::task::spawn_blocking(move || renderer.join()).await, Ok(Ok(_))) {
        warn!("console renderer stopped unexpectedly");
    }

    let mut failed = 0;
    for o in &outcomes {
        match &o.result {
            Ok(history) => println!("-- {} has {} states", o.descriptor.output.display(), history.len()),
            Err(err) => {
                failed += 1;
                eprintln!("-- {} failed: {err}", o.descriptor.output.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} sessions failed", outcomes.len());
    }
    Ok(())
}
