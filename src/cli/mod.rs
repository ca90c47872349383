pub mod command_loop;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use command_loop::CommandLoop;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    storage::activity_storage::{create_store, StorageFormat},
    tracking::{
        live_display::{ConsoleSink, DisplaySink},
        shutdown::detect_shutdown,
    },
    utils::{
        clock::DefaultClock,
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "time-tracker", version, long_about = None)]
#[command(about = "Interactive tracker for timing activities", long_about = None)]
pub struct Args {
    #[arg(long, value_enum, default_value_t = StorageFormat::Csv, help = "Layout of the activity log")]
    format: StorageFormat,
    #[arg(
        long,
        help = "File activities are saved to. By default activity_log.csv or output.json in the current directory"
    )]
    file: Option<PathBuf>,
    #[arg(
        long,
        help = "Application directory used for logs. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, help = "Print logs to the console")]
    log: bool,
    #[arg(long = "log-filter", help = "Level of saved logs. Overrides RUST_LOG")]
    log_filter: Option<LevelFilter>,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = args
        .dir
        .map_or_else(create_application_default_path, ensure_dir)?;
    let logging_level = args
        .log_filter
        .or_else(|| args.log.then_some(LevelFilter::TRACE));
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;
    info!("Starting with {} storage at {:?}", args.format, args.file);

    let shutdown = CancellationToken::new();
    tokio::spawn(detect_shutdown(shutdown.clone()));

    let command_loop = CommandLoop::new(
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        create_store(args.format, args.file),
        Arc::new(DefaultClock),
        Box::new(|| Box::new(ConsoleSink::stdout()) as Box<dyn DisplaySink>),
        shutdown.clone(),
    );
    let result = command_loop.run().await;
    shutdown.cancel();
    result
}
