use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hololink::backend::common::BackendError;
use hololink::backend::holographic::holographic_run;
use hololink::state::AppState;

/// Stereo presentation host for the holographic compositor
#[derive(Default, Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Stop after this many frames
    #[arg(long, value_name = "COUNT")]
    frames: Option<u64>,

    /// Path to write logs to
    #[arg(short, long, value_name = "FILE_PATH")]
    log_to: Option<String>,
}

fn main() {
    let mut args = Args::parse();
    logging_init(&mut args);

    log::info!(
        "Welcome to {} version {}!",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let running = Arc::new(AtomicBool::new(true));
    let _ = ctrlc::set_handler({
        let running = running.clone();
        move || {
            running.store(false, Ordering::Relaxed);
        }
    });

    let mut app = AppState::new();

    match holographic_run(running, &mut app, args.frames) {
        Ok(()) => {}
        Err(BackendError::NotSupported) => {
            log::error!("No holographic compositor available.");
        }
        Err(e) => log::error!("{e:?}"),
    }
}

fn logging_init(args: &mut Args) {
    let log_file_path = args
        .log_to
        .take()
        .or_else(|| std::env::var("HOLOLINK_LOGFILE").ok());

    let file_writer = log_file_path.and_then(|path| {
        match std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => {
                println!("Logging to {}", &path);
                Some(file)
            }
            Err(e) => {
                println!("Failed to open log file (path: {e:?}): {path}");
                None
            }
        }
    });

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr),
        )
        .with(
            /* read RUST_LOG env var */
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );

    if let Some(writer) = file_writer {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(true)
                    .with_line_number(true)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry.init();
    }

    log_panics::init();
}
