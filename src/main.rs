//! `clientdesk`: daily upkeep for the local desk database.
//!
//! Usage:
//!   clientdesk due [--days N]   print plans needing a reminder, as JSON
//!   clientdesk catch-up         roll past-due plans forward, apply step-ups
//!
//! Reads ~/.clientdesk/config.json; `RUST_LOG` controls log verbosity.

use std::process::ExitCode;

use chrono::Local;

use clientdesk_lib::services::obligations::{catch_up, due_reminders};
use clientdesk_lib::{DeskError, DeskState, ErrorPayload};

enum Command {
    Due { lead_days: Option<u32> },
    CatchUp,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        Some("due") => {
            let lead_days = match args.get(1).map(String::as_str) {
                None => None,
                Some("--days") => {
                    let raw = args.get(2).ok_or("--days needs a value")?;
                    Some(
                        raw.parse()
                            .map_err(|_| format!("--days must be a whole number, got {}", raw))?,
                    )
                }
                Some(other) => return Err(format!("unexpected argument: {}", other)),
            };
            Ok(Command::Due { lead_days })
        }
        Some("catch-up") => Ok(Command::CatchUp),
        Some(other) => Err(format!("unknown command: {}", other)),
        None => Err("usage: clientdesk <due [--days N] | catch-up>".to_string()),
    }
}

fn run(state: &DeskState, command: Command) -> Result<String, DeskError> {
    let today = Local::now().date_naive();
    let store = state.store.as_ref();
    let json = match command {
        Command::Due { lead_days } => {
            let lead_days = lead_days.unwrap_or(state.config.reminder_lead_days);
            serde_json::to_string_pretty(&due_reminders(store, today, lead_days)?)
        }
        Command::CatchUp => serde_json::to_string_pretty(&catch_up(store, today)?),
    };
    json.map_err(|e| DeskError::Store(e.to_string()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let state = match DeskState::open() {
        Ok(state) => state,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&state, command) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let payload = ErrorPayload::from(&e);
            log::error!("{} ({})", payload.message, payload.recovery_suggestion);
            ExitCode::FAILURE
        }
    }
}
