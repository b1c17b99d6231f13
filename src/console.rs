//! Line-oriented console control: `mute`, `unmute`, `exit`, `stats`, `help`

use std::io::{self, BufRead, Write};
use std::thread::{self, JoinHandle};

use crate::session::{SessionContext, SharedContext};

const HINT: &str = "Commands: mute, unmute, exit, stats, help";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Mute,
    Unmute,
    Exit,
    Stats,
    Help,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    /// Case-insensitive, surrounding whitespace ignored
    pub fn parse(line: &str) -> Self {
        let word = line.trim().to_ascii_lowercase();
        match word.as_str() {
            "" => Self::Empty,
            "mute" => Self::Mute,
            "unmute" => Self::Unmute,
            "exit" | "quit" => Self::Exit,
            "stats" => Self::Stats,
            "help" | "?" => Self::Help,
            _ => Self::Unknown(word),
        }
    }
}

/// Apply a command to the session and write any response to `out`.
///
/// Returns `false` once the listener should stop.
pub fn apply(ctx: &SessionContext, command: &ConsoleCommand, out: &mut impl Write) -> io::Result<bool> {
    match command {
        ConsoleCommand::Mute => {
            ctx.set_muted(true);
            tracing::info!("Mic muted");
            writeln!(out, "Muted")?;
        }
        ConsoleCommand::Unmute => {
            ctx.set_muted(false);
            tracing::info!("Mic unmuted");
            writeln!(out, "Unmuted")?;
        }
        ConsoleCommand::Exit => {
            tracing::info!("Exit requested from console");
            ctx.stop();
            return Ok(false);
        }
        ConsoleCommand::Stats => writeln!(out, "{}", ctx.stats())?,
        ConsoleCommand::Help => writeln!(out, "{}", HINT)?,
        ConsoleCommand::Empty => {}
        ConsoleCommand::Unknown(word) => writeln!(out, "Unknown command '{}'. {}", word, HINT)?,
    }
    Ok(true)
}

/// Read commands until `exit`, end of input, or the session stops.
///
/// End of input only ends the listener; the session keeps streaming.
pub fn run_console(ctx: &SessionContext, input: impl BufRead, mut out: impl Write) -> io::Result<()> {
    writeln!(out, "{}", HINT)?;

    for line in input.lines() {
        let line = line?;
        if !ctx.is_running() {
            break;
        }
        if !apply(ctx, &ConsoleCommand::parse(&line), &mut out)? {
            break;
        }
        out.flush()?;
    }

    tracing::debug!("Console listener finished");
    Ok(())
}

/// Spawn the console listener on stdin.
///
/// The thread is detached in practice: a blocked stdin read cannot be
/// interrupted, so shutdown never waits for it.
pub fn spawn_console(ctx: SharedContext) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = io::stdin();
            if let Err(e) = run_console(&ctx, stdin.lock(), io::stdout()) {
                tracing::warn!("Console input error: {}", e);
            }
        })
}
