use clap::Parser;
use color_eyre::Result;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use snapsolve::capture::CommandCapture;
use snapsolve::cli::{Cli, ReplCommand, HELP};
use snapsolve::config::Config;
use snapsolve::controller::{Controller, ControllerDeps, ControllerHandle};
use snapsolve::events::{ChannelSink, UiEvent};
use snapsolve::llm::HttpModelClient;
use snapsolve::logging;
use snapsolve::solution::SolutionView;
use snapsolve::state::{OverlayState, SettingsStore};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: failed to set up logging: {}", e);
    }

    let config_path = cli.config.clone().or_else(Config::default_path);
    let config = match &config_path {
        Some(path) => Config::load_from(path).unwrap_or_else(|e| {
            eprintln!(
                "Warning: Failed to load config, using defaults. Error: {}",
                e
            );
            Config::default()
        }),
        None => Config::default(),
    };
    if !config.has_credentials() {
        let location = config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "the config file".to_string());
        eprintln!("No api_key set in {}; captures will be ignored.", location);
    }
    tracing::info!("Starting snapsolve with provider {:?}", config.provider);

    let settings = SettingsStore::new(config);
    let overlay = OverlayState::new(!cli.inactive);
    let (sink, mut events) = ChannelSink::channel();

    let handle = Controller::spawn(ControllerDeps {
        settings: settings.clone(),
        overlay: overlay.clone(),
        client: Arc::new(HttpModelClient::new()),
        capture: Arc::new(CommandCapture::new(settings.clone())),
        sink: Arc::new(sink),
    });

    let renderer = tokio::spawn(async move {
        let mut view = SolutionView::new();
        while let Some(event) = events.recv().await {
            render(&view, &event);
            view.apply(&event);
        }
    });

    eprintln!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ReplCommand::parse(&line) {
            Ok(ReplCommand::Quit) => break,
            Ok(command) => run_command(&handle, &overlay, command).await,
            Err(message) if message.is_empty() => {}
            Err(message) => eprintln!("{}", message),
        }
    }

    handle.stop().await;
    renderer.abort();
    tracing::info!("Exiting");
    Ok(())
}

async fn run_command(handle: &ControllerHandle, overlay: &OverlayState, command: ReplCommand) {
    match command {
        ReplCommand::Capture => handle.new_capture(),
        ReplCommand::Append => handle.append_capture(),
        ReplCommand::Stop => {
            if !handle.stop().await {
                eprintln!("[nothing to stop]");
            }
        }
        ReplCommand::Ask(question) => {
            let result = handle.follow_up(question).await;
            if let Some(error) = result.error {
                eprintln!("[follow-up rejected: {}]", error);
            }
        }
        ReplCommand::Overlay(active) => {
            overlay.set_active(active);
            eprintln!("[overlay {}]", if active { "on" } else { "off" });
        }
        ReplCommand::Status => {
            let snapshot = handle.snapshot().await;
            eprintln!(
                "[overlay {}, {} messages, {} screenshots, {}]",
                if overlay.is_active() { "on" } else { "off" },
                snapshot.history.len(),
                snapshot.screenshots.len(),
                if snapshot.generating { "generating" } else { "idle" }
            );
        }
        ReplCommand::Help => eprintln!("{}", HELP),
        ReplCommand::Quit => {}
    }
}

/// Answer text goes to stdout as it streams; everything else is a status
/// line on stderr.
fn render(view: &SolutionView, event: &UiEvent) {
    match event {
        UiEvent::Chunk(text) => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        UiEvent::ConversationCleared => eprintln!("\n[new problem]"),
        UiEvent::ScreenshotTaken(_) => eprintln!("[screenshot captured]"),
        UiEvent::ScreenshotsUpdated(shots) => eprintln!("[{} screenshot(s) in view]", shots.len()),
        UiEvent::LoadingStart => eprintln!("[thinking...]"),
        UiEvent::Complete => {
            if !view.text.ends_with('\n') {
                println!();
            }
            eprintln!("[done]");
        }
        UiEvent::Stopped => eprintln!("\n[stopped]"),
        UiEvent::Error(message) => eprintln!("\n[error] {}", message),
        UiEvent::LoadingEnd => {}
    }
}
