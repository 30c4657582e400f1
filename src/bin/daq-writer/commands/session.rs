use crate::exit_codes;
use crate::output;
use crate::signal;
use daq_window::{
    BoxedSink, Container, DispatchReport, Dispatcher, IngestError, IngestResult, ListElement422,
    PacketSource, SinkFactory, WindowEngine, WriterConfig,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

type WriterEngine =
    WindowEngine<ListElement422, Box<dyn Container<ListElement422> + Send>, BoxedSink>;

#[derive(Serialize)]
struct DigitizerOutput {
    digitizer_id: u32,
    output: String,
    events_processed: u64,
    events_rejected: u64,
    batches_written: u64,
    overflow_flushes: u64,
    epochs: u64,
    error: Option<String>,
}

#[derive(Serialize)]
struct SessionOutput {
    source: String,
    packets_forwarded: u64,
    packets_malformed: u64,
    packets_routed: u64,
    packets_dropped: u64,
    events_processed: u64,
    digitizers: Vec<DigitizerOutput>,
}

/// Builds the engine of a digitizer the first time it sends a packet
fn engine_factory(config: &WriterConfig) -> impl FnMut(u32) -> IngestResult<WriterEngine> {
    let output_dir = config.output_dir.clone();
    let format = config.format;
    let container = config.container;
    let capacity = config.capacity;
    let channels = config.channels;

    move |digitizer_id| {
        let setup_error = |message: String| IngestError::Setup {
            digitizer_id,
            message,
        };
        let sink = SinkFactory::create(format, &output_dir, digitizer_id)
            .map_err(|e| setup_error(e.to_string()))?;
        log::info!(
            "Digitizer {}: writing to {}",
            digitizer_id,
            format.output_path(&output_dir, digitizer_id).display()
        );
        WindowEngine::new(sink, digitizer_id, channels, || container.create(capacity))
            .map_err(|e| setup_error(e.to_string()))
    }
}

/// Run one source through the dispatcher until it ends or a signal arrives
pub async fn run(mut source: Box<dyn PacketSource>, config: &WriterConfig) -> i32 {
    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        eprintln!(
            "Error: cannot create output directory '{}': {}",
            config.output_dir.display(),
            e
        );
        return exit_codes::IO_ERROR;
    }

    if let Err(e) = source.connect().await {
        eprintln!("Error: {}: {}", source.describe(), e);
        return exit_codes::IO_ERROR;
    }

    let token = CancellationToken::new();
    signal::cancel_on_shutdown(token.clone());

    let (packet_tx, packet_rx) = crossbeam::channel::bounded(config.queue_depth);
    let dispatcher = Dispatcher::new(
        engine_factory(config),
        config.dispatch_config(),
        token.clone(),
    );
    let dispatch_thread = match std::thread::Builder::new()
        .name("dispatcher".to_string())
        .spawn(move || dispatcher.run(packet_rx))
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: failed to start dispatcher: {}", e);
            return exit_codes::RUNTIME_ERROR;
        }
    };

    log::info!("Reading packets from {}", source.describe());
    let source_result = source.run(packet_tx, token.clone()).await;
    if let Err(e) = &source_result {
        log::error!("{} failed: {}", source.describe(), e);
        token.cancel();
    }

    let report = match tokio::task::spawn_blocking(move || dispatch_thread.join()).await {
        Ok(Ok(report)) => report,
        _ => {
            eprintln!("Error: dispatcher thread panicked");
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let stats = source_result.as_ref().copied().unwrap_or_default();
    let summary = SessionOutput {
        source: source.describe(),
        packets_forwarded: stats.packets_forwarded,
        packets_malformed: stats.packets_malformed,
        packets_routed: report.packets_routed,
        packets_dropped: report.packets_dropped,
        events_processed: report.events_processed(),
        digitizers: digitizer_outputs(&report, config),
    };
    if let Err(e) = output::print_json(&summary, false) {
        eprintln!("Error: {}", e);
    }

    if let Err(e) = source_result {
        eprintln!("Error: {}", e);
        return exit_codes::IO_ERROR;
    }
    if !report.is_success() {
        for (_, result) in &report.workers {
            if let Err(e) = result {
                eprintln!("Error: {}", e);
            }
        }
        return exit_codes::RUNTIME_ERROR;
    }

    eprintln!(
        "Wrote {} events from {} digitizer(s) to {}",
        summary.events_processed,
        summary.digitizers.len(),
        config.output_dir.display()
    );
    exit_codes::SUCCESS
}

fn digitizer_outputs(report: &DispatchReport, config: &WriterConfig) -> Vec<DigitizerOutput> {
    report
        .workers
        .iter()
        .map(|(digitizer_id, result)| {
            let output = config
                .format
                .output_path(&config.output_dir, *digitizer_id)
                .display()
                .to_string();
            match result {
                Ok(summary) => DigitizerOutput {
                    digitizer_id: *digitizer_id,
                    output,
                    events_processed: summary.events_processed,
                    events_rejected: summary.engine.events_rejected,
                    batches_written: summary.engine.batches_delivered,
                    overflow_flushes: summary.engine.overflow_flushes,
                    epochs: summary.engine.swaps + 1,
                    error: None,
                },
                Err(e) => DigitizerOutput {
                    digitizer_id: *digitizer_id,
                    output,
                    events_processed: 0,
                    events_rejected: 0,
                    batches_written: 0,
                    overflow_flushes: 0,
                    epochs: 0,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect()
}
