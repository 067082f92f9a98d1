mod args;
mod config;
mod core;

use anyhow::{Context, Result};
use config::{IngestConfig, SourceKind};
use core::{Output, run_file_reader, run_udp_listener, run_writer};
use msgtrack_helpers::{logging, shutdown};
use msgtrack_parser::Classifier;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let log_target = logging::init_logging(
        "msgtrack_ingest=info,msgtrack_parser=info,sqlx=warn,tokio=warn",
        "MSGTRACK_LOG",
        "msgtrack-ingest",
    );

    let config = IngestConfig::load().context("failed to load configuration")?;
    let classifier =
        config.year.map_or_else(Classifier::for_current_year, Classifier::new);

    info!(
        "ingest starting: source={}, output={}, year={}, queue_capacity={}, log_target={:?}",
        config.source,
        config.output,
        classifier.year(),
        config.queue_capacity,
        log_target
    );

    let output = Output::open(&config.output).await?;
    let (records_tx, records_rx) = mpsc::channel(config.queue_capacity);
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown::listen_shutdown(shutdown.clone()));

    let writer_task = tokio::spawn(run_writer(
        output,
        records_rx,
        config.stats_interval,
        shutdown.clone(),
    ));

    // The source owns the only sender; the writer finishes once it returns.
    let source_result = match config.source.kind {
        SourceKind::File => {
            run_file_reader(
                config.source.path.clone(),
                classifier,
                records_tx,
                shutdown.clone(),
            )
            .await
        }
        SourceKind::Udp => {
            run_udp_listener(
                config.source.listen_udp,
                classifier,
                records_tx,
                shutdown.clone(),
            )
            .await
        }
    };

    let interrupted = shutdown.is_cancelled();
    let writer_result = writer_task.await.context("writer task join failed")?;
    shutdown.cancel();

    let written = writer_result.context("writer stopped with error")?;
    match source_result {
        Ok(classified) => {
            info!("ingest finished: interrupted={interrupted}, {written}");
            if !interrupted && classified != written.received {
                warn!(
                    "classified and received counts differ: classified=({classified}), received=({})",
                    written.received
                );
            }
            Ok(())
        }
        Err(err) => Err(err.context("input source stopped with error")),
    }
}
