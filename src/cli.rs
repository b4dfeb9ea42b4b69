//! Interactive command shell
//!
//! Owns the terminal: renders the status display, reads operator
//! commands from stdin and forwards them to the supervisor. Redraw
//! triggers from the status reporter and commands injected by the
//! Ctrl+C handler arrive over channels and are handled in one select
//! loop, so every path to shutdown funnels through `stop_all`.

use std::io::Write;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::info;

use crate::supervisor::Supervisor;

/// How long a notice stays on screen before the status display returns.
const NOTICE_DELAY: Duration = Duration::from_secs(2);

/// Commands accepted by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Remove(String),
    Start(String),
    Stop(String),
    Quit,
}

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Empty,
    Unrecognized,
}

impl Input {
    /// Parse one input line. Extra arguments beyond the channel id are
    /// ignored; unknown commands and missing arguments are rejected.
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Input::Empty;
        };
        let arg = parts.next();

        match (keyword.to_ascii_lowercase().as_str(), arg) {
            ("quit", _) => Input::Command(Command::Quit),
            ("add", Some(id)) => Input::Command(Command::Add(id.to_string())),
            ("remove", Some(id)) => Input::Command(Command::Remove(id.to_string())),
            ("start", Some(id)) => Input::Command(Command::Start(id.to_string())),
            ("stop", Some(id)) => Input::Command(Command::Stop(id.to_string())),
            _ => Input::Unrecognized,
        }
    }
}

/// Run the shell until `quit` or an injected shutdown command.
///
/// `command_rx` carries commands from outside the terminal (the Ctrl+C
/// handler); stdin lines are parsed in-loop.
pub async fn run_shell(
    supervisor: &Supervisor,
    mut redraw_rx: mpsc::UnboundedReceiver<()>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) {
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    render(supervisor);

    loop {
        tokio::select! {
            Some(command) = command_rx.recv() => {
                if dispatch(supervisor, command).await {
                    break;
                }
            }
            Some(line) = line_rx.recv() => {
                match Input::parse(&line) {
                    Input::Empty => render(supervisor),
                    Input::Unrecognized => notice(supervisor, "Unrecognized command").await,
                    Input::Command(command) => {
                        if dispatch(supervisor, command).await {
                            break;
                        }
                    }
                }
            }
            Some(()) = redraw_rx.recv() => render(supervisor),
            else => break,
        }
    }
}

/// Apply one command. Returns true when the shell should exit.
async fn dispatch(supervisor: &Supervisor, command: Command) -> bool {
    let message = match command {
        Command::Quit => {
            clear_screen();
            println!("Shutting down, stopping all captures...");
            info!("Shutdown requested");
            supervisor.stop_all();
            return true;
        }
        Command::Add(id) => match supervisor.add_channel(&id) {
            Ok(()) => format!("Channel {} added", id),
            Err(e) => e.to_string(),
        },
        Command::Remove(id) => match supervisor.remove_channel(&id) {
            Ok(()) => format!("Channel {} removed", id),
            Err(e) => e.to_string(),
        },
        Command::Start(id) => match supervisor.start_channel(&id) {
            Ok(()) => format!("Channel {} started", id),
            Err(e) => e.to_string(),
        },
        Command::Stop(id) => match supervisor.stop_channel(&id) {
            Ok(()) => format!("Channel {} stopped", id),
            Err(e) => e.to_string(),
        },
    };

    notice(supervisor, &message).await;
    false
}

/// Show a transient message, then return to the status display.
async fn notice(supervisor: &Supervisor, message: &str) {
    println!("{}", message);
    tokio::time::sleep(NOTICE_DELAY).await;
    render(supervisor);
}

fn clear_screen() {
    print!("\x1b[2J\x1b[1;1H");
}

/// Repaint the full status display and command surface.
pub fn render(supervisor: &Supervisor) {
    clear_screen();

    println!("Available commands:");
    println!("  add <channel>     Register a channel and start monitoring it");
    println!("  remove <channel>  Unregister a channel");
    println!("  start <channel>   Resume monitoring a stopped channel");
    println!("  stop <channel>    Halt monitoring and any active capture");
    println!("  quit              Stop all captures and exit");
    println!();

    println!("=== Channel status ===");
    let rows = supervisor.status_rows();
    if rows.is_empty() {
        println!("No channels registered.");
        println!("Use 'add <channel>' to register one.");
    } else {
        for (id, recording) in rows {
            println!("{}: {}", id, if recording { "YES" } else { "NO" });
        }
    }
    println!("======================");
    println!();
    println!(
        "Recordings directory: {}",
        supervisor.recordings_dir().display()
    );
    println!();
    print!("Command: ");
    let _ = std::io::stdout().flush();
}
