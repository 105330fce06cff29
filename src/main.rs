//! FScan - Double-sided document scanning with NAPS2
//!
//! Main entry point for the console application.
//!
//! # Overview
//!
//! This binary wires the scan session processor to a terminal front-end. It initializes:
//! - Configuration ([`ConfigStore`]: `fscan.yaml` beside the executable, `~/fscan.yaml`, environment)
//! - Logging infrastructure (daily file rotation + console output on stderr)
//! - Tokio async runtime (HTTP downloads and NAPS2 output streaming)
//! - The processor and its collaborators
//! - The console controller
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Renders processor events (blocking)
//! - **Input thread**: Reads stdin and submits commands
//! - **Processor thread**: Executes commands one at a time
//! - **Tokio workers**: Async I/O entered from the processor thread with `block_on`
//!
//! # Execution Flow
//!
//! 1. Load settings
//! 2. Initialize logging → `<LOG_DIR>/fscan.<date>`
//! 3. Create tokio runtime with 4 worker threads
//! 4. Build resolvers, scan invoker, and processor
//! 5. Run the console until `quit`, end of input, or a crash
//! 6. Shutdown tokio runtime with 5s timeout
//!
//! # Platform
//!
//! Primary platform: Windows 10/11 (NAPS2 is Windows-only)

use anyhow::{Context, Result, anyhow};
use fscan::logging::{LogSettings, setup_logging};
use fscan::metrics::Metrics;
use fscan::processor::Collaborators;
use fscan::services::{
    ConsoleScanInvoker, Naps2InstallationResolver, Naps2ProfileResolver, PortableInstaller,
    ScanOutputPolicy,
};
use fscan::ui::{ConsoleController, ConsoleOutcome};
use fscan::{APP_NAME, ConfigStore, Processor, ProcessorOptions, VERSION};
use std::sync::Arc;
use std::time::Duration;

const WORKER_THREADS: usize = 4;

fn main() -> Result<()> {
    let config = Arc::new(ConfigStore::for_current_exe().context("Failed to load settings")?);

    // Hold the guard until exit so buffered log lines are flushed
    let _log_guard = setup_logging(&LogSettings::from_config(&config))?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!(
        "Settings: defaults={}, user={}",
        config.defaults_path(),
        config.user_path()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("fscan-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let installer = PortableInstaller::new(runtime.handle().clone(), config.base_dir())
        .context("Failed to create HTTP client")?;
    let collaborators = Collaborators {
        installations: Box::new(Naps2InstallationResolver::new(Arc::clone(&config), installer)),
        profiles: Box::new(Naps2ProfileResolver::new(Arc::clone(&config))),
        scanner: Box::new(ConsoleScanInvoker::new(runtime.handle().clone())),
        output: ScanOutputPolicy::from_config(&config),
    };
    tracing::info!("Scans will be written to {}", collaborators.output.output_dir());

    let metrics = Arc::new(Metrics::new());
    let processor = Processor::new(collaborators, ProcessorOptions::default(), Arc::clone(&metrics));

    // Subscribe before spawning so the startup Bootstrap events are seen
    let events = processor.subscribe();
    let (handle, processor_thread) = processor.spawn()?;

    let outcome = ConsoleController::new(handle, events).run(std::io::BufReader::new(std::io::stdin()));

    if processor_thread.join().is_err() {
        tracing::error!("Processor thread panicked");
    }

    metrics.log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    match outcome? {
        ConsoleOutcome::Finished => {
            tracing::info!("Application shutdown complete");
            Ok(())
        }
        ConsoleOutcome::Crashed(diagnostic) => {
            tracing::error!("Exiting after fatal error");
            Err(anyhow!("Scan session processor crashed: {}", diagnostic))
        }
    }
}
