use crate::cli::args::{Args, Command, ConfigCommand, OutputFormat};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::line::LogEntry;
use crate::core::session::{SessionController, SessionEvent};
use crate::core::watcher::PortWatcher;
use crate::domain::config::PortLogConfig;
use crate::domain::error::{PortLogError, PortLogResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{SerialDevice, SystemPorts};
use std::io::{BufRead, IsTerminal};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// When the render loop should end besides Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderUntil {
    Interrupted,
    LoggingStopped,
}

/// Execute CLI command
pub async fn execute_command(args: Args) -> PortLogResult<()> {
    let config_manager = ConfigManager::new()?;
    let config = match &args.config {
        Some(path) => config_manager.load_config_from_path(path)?,
        None => config_manager.load_config()?,
    };

    if !args.quiet {
        init_logging(&config.global.log_level, args.verbose)?;
    }

    let color = config.global.color
        && args.output == OutputFormat::Text
        && std::io::stdout().is_terminal();
    let mut writer = ConsoleWriter::new(args.output, color);

    match args.command {
        Command::Watch => execute_watch(&config, &mut writer).await,
        Command::Connect { port } => execute_connect(&config, &port, &mut writer).await,
        Command::Ports => {
            let ports = SystemPorts::new().describe()?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::View { file } => execute_view(&file, &mut writer),
        Command::Config(config_args) => match config_args.command {
            ConfigCommand::Show => {
                writer.write_config(&config)?;
                Ok(())
            }
            ConfigCommand::Init { global } => {
                let path = if global {
                    let path = config_manager.get_global_config_path_ref().clone();
                    config_manager.save_config_to_path(&path, &PortLogConfig::default())?;
                    path
                } else {
                    let current_dir = std::env::current_dir().map_err(|e| PortLogError::Config {
                        message: format!("Failed to get current directory: {}", e),
                    })?;
                    config_manager.init_project_config(&current_dir)?
                };
                writer.write_message(&format!("Configuration initialized at '{}'", path.display()))?;
                Ok(())
            }
        },
        Command::Version => {
            writer.write_message(&format!("portlog {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

async fn execute_watch(config: &PortLogConfig, writer: &mut impl OutputWriter) -> PortLogResult<()> {
    let (controller, events) = SessionController::new(&config.global.log_dir);
    let watcher = tokio::spawn(PortWatcher::system(controller.clone()).run());

    writer.write_message("Watching for serial ports (Ctrl+C to exit)")?;
    let result = render_session(&controller, events, writer, RenderUntil::Interrupted).await;

    watcher.abort();
    result
}

async fn execute_connect(
    config: &PortLogConfig,
    port: &str,
    writer: &mut impl OutputWriter,
) -> PortLogResult<()> {
    let (controller, events) = SessionController::new(&config.global.log_dir);

    let device = SerialDevice::open(port)?;
    controller.connect(Box::new(device)).await;
    controller.start().await?;

    render_session(&controller, events, writer, RenderUntil::LoggingStopped).await
}

fn execute_view(file: &Path, writer: &mut impl OutputWriter) -> PortLogResult<()> {
    let content = std::fs::read_to_string(file)?;
    for line in content.lines() {
        writer.write_event(&SessionEvent::Entry(LogEntry::from_plain(line)))?;
    }
    Ok(())
}

/// Forward stdin lines from a detached thread
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
        debug!("stdin closed, comments disabled");
    });
    rx
}

/// Render session events until interrupted; stdin lines become log comments
async fn render_session(
    controller: &SessionController,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    writer: &mut impl OutputWriter,
    until: RenderUntil,
) -> PortLogResult<()> {
    let mut comments = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                writer.write_event(&event)?;
                if until == RenderUntil::LoggingStopped && event == SessionEvent::status("Logging stopped.") {
                    break;
                }
            }
            line = comments.recv(), if stdin_open => match line {
                Some(text) if !text.trim().is_empty() => {
                    if let Err(e) = controller.comment(text.trim()).await {
                        warn!("Failed to record comment: {}", e);
                    }
                }
                Some(_) => {}
                None => stdin_open = false,
            },
        }
    }

    controller.shutdown().await;
    while let Ok(event) = events.try_recv() {
        writer.write_event(&event)?;
    }
    Ok(())
}
