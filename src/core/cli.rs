use crate::session::history::{DateRange, TimePeriod};
use crate::utils::time::parse_api_date;
use anyhow::{anyhow, bail, Context, Result};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: attendance [--config <path>] <command>

Commands:
  login <email> <password>          Sign in and store the session token
  logout                            Remove the stored session token
  me                                Show the signed-in user's profile
  today                             Show today's attendance and the next action
  scan <qr-payload>                 Record attendance from a scanned QR code
  history [week|month|quarter]      Show attendance history and statistics
  history custom <start> <end>      Same, for dates given as YYYY-MM-DD
  help                              Show this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    Me,
    Today,
    Scan { payload: String },
    History { period: TimePeriod, range: Option<DateRange> },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub command: Command,
}

/// Parse arguments without the program name
pub fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut config_path = PathBuf::from("config.toml");
    let mut rest = args;

    if let Some(first) = rest.first() {
        if first == "--config" || first == "-c" {
            let path = rest
                .get(1)
                .ok_or_else(|| anyhow!("--config requires a path"))?;
            config_path = PathBuf::from(path);
            rest = &rest[2..];
        }
    }

    let command = match rest.first().map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => Command::Help,
        Some("login") => match &rest[1..] {
            [email, password] => Command::Login {
                email: email.clone(),
                password: password.clone(),
            },
            _ => bail!("login expects <email> <password>"),
        },
        Some("logout") => Command::Logout,
        Some("me") => Command::Me,
        Some("today") => Command::Today,
        Some("scan") => match &rest[1..] {
            [payload] => Command::Scan {
                payload: payload.clone(),
            },
            _ => bail!("scan expects exactly one QR payload"),
        },
        Some("history") => parse_history(&rest[1..])?,
        Some(other) => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    Ok(CliArgs {
        config_path,
        command,
    })
}

fn parse_history(args: &[String]) -> Result<Command> {
    let period = match args.first() {
        Some(p) => p.parse::<TimePeriod>().map_err(|e| anyhow!(e))?,
        None => TimePeriod::Week,
    };

    if period != TimePeriod::Custom {
        if args.len() > 1 {
            bail!("history {} takes no dates", period);
        }
        return Ok(Command::History { period, range: None });
    }

    let (start, end) = match &args[1..] {
        [start, end] => (start, end),
        _ => bail!("history custom expects <start> <end>"),
    };
    let start = parse_api_date(start).context(format!("Invalid start date '{}'", start))?;
    let end = parse_api_date(end).context(format!("Invalid end date '{}'", end))?;
    let range = DateRange::new(start, end)?;

    Ok(Command::History {
        period,
        range: Some(range),
    })
}
