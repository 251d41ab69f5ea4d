use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossterm::tty::IsTty;
use log::{info, warn};
use tokio::sync::mpsc::UnboundedSender;

use transcribe_engine::audio::{CpalSink, DeviceManager, FormatParser, PlaybackEngine, SymphoniaBackend};
use transcribe_engine::cli::terminal::{self, RawMode};
use transcribe_engine::cli::{CliApp, Commands, ConfigAction, StatusDisplay};
use transcribe_engine::config::{ConfigManager, PumpPreference};
use transcribe_engine::logging::{PlaybackLogger, LOG_LEVEL_ENV};
use transcribe_engine::session::{Session, SessionInput};
use transcribe_engine::TranscribeError;

#[tokio::main]
async fn main() {
    let app = CliApp::parse();

    // Flags win over the environment
    if let Some(level) = app.log_level() {
        std::env::set_var(LOG_LEVEL_ENV, level);
    }
    if let Err(e) = PlaybackLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let result = match app.command {
        Commands::Play {
            file,
            transcript,
            native,
            device,
        } => play(&file, transcript, native, device).await,
        Commands::Info { file } => show_header(&file),
        Commands::Config { action } => configure(action),
        Commands::Devices => list_devices(),
    };

    if let Err(e) = result {
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }
}

async fn play(
    file: &Path,
    transcript: Option<PathBuf>,
    native: bool,
    device: Option<String>,
) -> Result<(), TranscribeError> {
    let manager = ConfigManager::new()?;
    let mut config = manager.get_config().clone();
    if native {
        config.pump_mode = PumpPreference::Native;
    }

    let devices = DeviceManager::new()?;
    let device_name = device.or_else(|| config.output_device.clone());
    let output = devices.select_device_with_fallback(device_name.as_deref())?;
    let sink = CpalSink::new(output, config.period_ms, config.buffer_ms);
    let engine = PlaybackEngine::new(Box::new(sink), Box::new(SymphoniaBackend));

    let mut session = Session::with_config_manager(engine, manager);
    // --native applies to this session only
    session.engine_mut().apply_config(&config);

    let path = CliApp::expand_path(&file.to_string_lossy());
    let opened = session.open(&path);
    for notice in session.take_notices() {
        StatusDisplay::display_notice(&notice);
    }
    let mode = opened?;
    info!("Playing {} with the {} pump", path.display(), mode.as_str());

    if let Some(transcript) = transcript {
        session.set_transcript(&CliApp::expand_path(&transcript.to_string_lossy()))?;
    }

    StatusDisplay::display_compact_status(&session.status());
    StatusDisplay::display_interactive_help();
    println!();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        StatusDisplay::display_notice("Received interrupt signal. Shutting down gracefully...");
        shutdown_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Cannot install the Ctrl-C handler: {}", e);
    }

    // Key presses from a terminal, whole lines from anything else
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<SessionInput>();
    let raw_mode = if io::stdin().is_tty() {
        match RawMode::enable() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("Cannot read single keys, falling back to lines: {}", e);
                None
            }
        }
    } else {
        None
    };
    if raw_mode.is_some() {
        terminal::spawn_key_reader(tx, shutdown.clone())?;
    } else {
        spawn_line_reader(tx);
    }

    let result = session.run(rx, shutdown).await;
    drop(raw_mode);
    result?;

    println!();
    StatusDisplay::display_compact_status(&session.status());
    println!("Goodbye!");
    Ok(())
}

/// Blocking stdin reads stay off the event loop
fn spawn_line_reader(tx: UnboundedSender<SessionInput>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => match CliApp::parse_input(&line) {
                    Ok(input) => {
                        if tx.send(input).is_err() {
                            break;
                        }
                    }
                    Err(e) => StatusDisplay::display_input_error(&e),
                },
            }
        }
    });
}

fn show_header(file: &Path) -> Result<(), TranscribeError> {
    let path = CliApp::expand_path(&file.to_string_lossy());
    let mut reader = BufReader::new(File::open(&path)?);
    let header = FormatParser::parse(&mut reader)?;
    StatusDisplay::display_header(&path, &header);
    Ok(())
}

fn configure(action: ConfigAction) -> Result<(), TranscribeError> {
    let mut manager = ConfigManager::new()?;
    match action {
        ConfigAction::Show => {}
        ConfigAction::SetWait { ms } => {
            let kept = manager.set_wait_timeout(ms)?;
            println!("Wait timeout set to {} ms", kept);
        }
        ConfigAction::SetType { ms } => {
            let kept = manager.set_type_timeout(ms)?;
            println!("Type timeout set to {} ms", kept);
        }
        ConfigAction::SetBoost { db } => {
            let kept = manager.set_boost_db(db)?;
            println!("Boost set to {:+} dB", kept);
        }
        ConfigAction::SetMode { mode } => {
            manager.set_pump_mode(mode)?;
            println!("Buffer source set to {}", mode.as_str());
        }
        ConfigAction::SetDevice { name } => {
            if let Some(name) = &name {
                let devices = DeviceManager::new()?;
                if !devices.device_infos().iter().any(|d| &d.name == name) {
                    warn!("No output device named '{}' right now; the default is used until it appears", name);
                }
            }
            manager.set_output_device(name)?;
        }
        ConfigAction::SetSeek { secs } => {
            let kept = manager.set_seek_step(secs)?;
            println!("Skip distance set to {} s", kept);
        }
        ConfigAction::Reset => {
            manager.reset_to_defaults()?;
            println!("Configuration reset to defaults");
        }
    }
    StatusDisplay::display_config(manager.get_config(), manager.config_path());
    Ok(())
}

fn list_devices() -> Result<(), TranscribeError> {
    let manager = DeviceManager::new()?;
    StatusDisplay::display_devices(manager.device_infos());
    Ok(())
}
