//! Sends a form email to every address in a CSV file whenever it changes.
//!
//! - `check`: validate the form in the configuration and exit
//! - `send`: run one batch now and exit
//! - `watch`: poll the recipient source and run a batch whenever it changes;
//!   `SIGUSR1` runs one immediately, `SIGINT`/`SIGTERM` shut down

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use mailwatch::{
    config::{find_config_file, load},
    controller::{Command, Controller},
    surface::{Console, Surface},
};
use mailwatch_common::{internal, logging};
use tokio::{
    signal::unix::{SignalKind, signal},
    sync::mpsc,
};

/// Mail everyone on a CSV list whenever the list changes
#[derive(Parser, Debug)]
#[command(name = "mailwatch")]
#[command(about = "Mail everyone on a CSV list whenever the list changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file (default: $MAILWATCH_CONFIG, then
    /// ./mailwatch.config.ron, then /etc/mailwatch/mailwatch.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the form and exit
    Check,
    /// Send one batch now
    Send,
    /// Watch the recipient source and send whenever it changes
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init();

    let config_path = find_config_file(cli.config.as_deref())?;
    let config = load(&config_path)?;
    internal!(level = DEBUG, path = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Check => Ok(match config.form.validate() {
            Ok(form) => {
                Console.status(&format!(
                    "Ready to send from {} via {}",
                    form.smtp.username,
                    form.smtp.address()
                ));
                ExitCode::SUCCESS
            }
            Err(invalid) => {
                Console.notify_error(&invalid.to_string());
                ExitCode::FAILURE
            }
        }),

        Commands::Send => {
            let mut controller = Controller::new(config, Console);
            Ok(match controller.send_once().await {
                Ok(Some(_)) => ExitCode::SUCCESS,
                Ok(None) => ExitCode::FAILURE,
                Err(rejection) => {
                    Console.notify_error(&rejection.to_string());
                    ExitCode::FAILURE
                }
            })
        }

        Commands::Watch => {
            let (commands, receiver) = mpsc::channel(8);
            tokio::spawn(async move {
                if let Err(err) = forward_signals(commands).await {
                    tracing::error!(error = %err, "Unable to listen for signals");
                }
            });

            Controller::new(config, Console)
                .reloading_from(config_path)
                .watch(receiver)
                .await;

            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `SIGUSR1` asks for a batch; `SIGINT` and `SIGTERM` ask to shut down.
async fn forward_signals(commands: mpsc::Sender<Command>) -> std::io::Result<()> {
    let mut user = signal(SignalKind::user_defined1())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        let command = tokio::select! {
            _ = user.recv() => {
                internal!("SIGUSR1 received, starting a batch");
                Command::Send
            }
            _ = tokio::signal::ctrl_c() => {
                internal!("CTRL+C entered -- Enter it again to abandon a running batch");
                Command::Shutdown
            }
            _ = terminate.recv() => {
                internal!("Terminate Signal received, shutting down");
                Command::Shutdown
            }
        };

        if commands.send(command).await.is_err() {
            return Ok(());
        }
    }
}
