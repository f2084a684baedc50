use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use tilecast_core::cli::Cli;
use tilecast_core::logging::{self, LogConfig};
use tilecast_core::{Dispatcher, Reporter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("tilecast: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    logging::init(&LogConfig::from(&cli.logging)).context("failed to initialise logging")?;
    let config = cli.to_run_config().context("invalid configuration")?;

    let (reporter, mut events) = Reporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{event}");
        }
    });

    let dispatcher = Arc::new(Dispatcher::new(reporter));
    let stopper = Arc::clone(&dispatcher);
    // shutdown also covers an interrupt that lands while the source is loading
    let interrupt = tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received");
                stopper.shutdown();
            }
            Err(err) => warn!(error = %err, "failed to listen for interrupts"),
        }
    });

    let result = dispatcher.run(&config).await;
    interrupt.abort();
    let _ = interrupt.await;
    // the printer exits once every reporter clone is gone
    drop(dispatcher);
    let _ = printer.await;

    let report = result.context("run failed")?;
    Ok(report.succeeded())
}
