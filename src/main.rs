use clap::Parser;
use crossbeam_channel::{Receiver, Sender, unbounded};
use ratatui::DefaultTerminal;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cdrview::backend::{self, BackendCommand};
use cdrview::client::ApiClient;
use cdrview::config::{ViewerConfig, expand_path};
use cdrview::controller::Controller;
use cdrview::domain::{Message, ViewerError};
use cdrview::model::{Model, Status};
use cdrview::ui::TableUI;

/// Browse, filter and sort call detail records served by a cdr api.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Toml file with viewer settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Api endpoint, e.g. http://localhost:8000/api
    #[arg(short, long)]
    base_url: Option<String>,

    /// Hide the upload bar
    #[arg(long)]
    no_upload: bool,

    /// Milliseconds between redraws while idle
    #[arg(long)]
    event_poll_time: Option<u64>,

    /// Where to write the log, the terminal belongs to the ui
    #[arg(long, default_value = "cdrview.log")]
    log_file: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn build_config(cli: &Cli) -> Result<ViewerConfig, ViewerError> {
    let mut config = ViewerConfig::load(cli.config.as_deref())?;
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if cli.no_upload {
        config.upload_enabled = false;
    }
    if let Some(ms) = cli.event_poll_time {
        config.event_poll_time = ms;
    }
    config.validate()
}

fn init_logging(log_file: &str) -> Result<(), ViewerError> {
    let file = File::create(expand_path(log_file)?)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .map_err(|e| ViewerError::Logging(e.to_string()))
}

fn run(cli: Cli) -> Result<(), ViewerError> {
    let config = build_config(&cli)?;
    init_logging(&cli.log_file)?;
    info!("Starting cdrview against {}", config.base_url);

    let client = ApiClient::new(&config)?;
    let (cmd_tx, cmd_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    backend::spawn(client, cmd_rx, event_tx)?;

    let mut terminal = ratatui::init();
    let result = event_loop(&mut terminal, &config, cmd_tx, event_rx);
    ratatui::restore();
    info!("Stopping cdrview");
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    config: &ViewerConfig,
    cmd_tx: Sender<BackendCommand>,
    event_rx: Receiver<Message>,
) -> Result<(), ViewerError> {
    let size = terminal.size()?;
    let mut model = Model::init(config, cmd_tx, size.width as usize, size.height as usize);
    let mut ui = TableUI::new();
    let controller = Controller::new(config);
    model.reload();

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Results from the backend worker
        for message in event_rx.try_iter() {
            model.update(Some(message))?;
        }

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }
    Ok(())
}
