use anyhow::{anyhow, bail, Context, Result};
use attendance::core::cli::{parse_args, CliArgs, Command, USAGE};
use attendance::core::config::Config;
use attendance::core::state::AppState;
use attendance::core::tracing_init::init_tracing;
use attendance::models::attendance::{Attendance, AttendanceStatus, NextAction};
use attendance::models::user::User;
use attendance::session::auth::Route;
use attendance::session::history::TimePeriod;
use attendance::session::scan::{LogNotifier, ScanState};
use std::env;
use std::sync::Arc;
use tracing::{debug, info};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let CliArgs {
        config_path,
        command,
    } = parse_args(&args)?;

    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load_or_default(&config_path).context(format!(
        "Failed to load configuration from '{}'",
        config_path.display()
    ))?;

    init_tracing(&config.logging);

    // One request at a time; a single-threaded runtime is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, command))
}

async fn async_main(config: Config, command: Command) -> Result<()> {
    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        "Attendance client starting"
    );

    let state = AppState::new(config, Arc::new(LogNotifier))?;

    match command {
        Command::Help => println!("{}", USAGE),
        Command::Login { email, password } => {
            let user = state.auth.sign_in(&email, &password).await?;
            println!("Signed in as {} <{}>", user.full_name(), user.email);
        }
        Command::Logout => {
            state.auth.sign_out().await?;
            println!("Signed out");
        }
        Command::Me => {
            let user = require_session(&state).await?;
            println!("Name:   {}", user.full_name());
            println!("Email:  {}", user.email);
            println!("Status: {:?}", user.status);
            if let Some(agency) = &user.agency_id {
                println!("Agency: {}", agency);
            }
        }
        Command::Today => {
            require_session(&state).await?;
            state.today.reload().await;
            print_today(&state);
        }
        Command::Scan { payload } => {
            require_session(&state).await?;
            state.scan.load_today().await;
            state.scan.start_scanning();
            match state.scan.handle_scan(&payload).await {
                ScanState::Success { message, .. } => println!("{}", message),
                ScanState::Error { message } => bail!(message),
                other => debug!(state = other.name(), "Scan ended in an unexpected state"),
            }
        }
        Command::History { period, range } => {
            require_session(&state).await?;
            let scheduled = match range {
                Some(range) => state.history.set_custom_range(range)?,
                None => state.history.set_period(period),
            };
            match scheduled {
                Some(handle) => {
                    handle.await.context("History fetch task failed")?;
                }
                None => {
                    state.history.refetch().await;
                }
            }
            print_history(&state)?;
        }
    }

    Ok(())
}

/// Restore the stored session and return its user
async fn require_session(state: &AppState) -> Result<User> {
    if state.auth.restore().await != Route::Main {
        bail!("Not signed in. Run `attendance login <email> <password>` first.");
    }
    state
        .auth
        .current_user()
        .ok_or_else(|| anyhow!("Session restored without a user"))
}

fn status_label(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::OnTime => "on time",
        AttendanceStatus::Late => "late",
    }
}

fn dash_if_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "--:--"
    } else {
        value
    }
}

fn print_today(state: &AppState) {
    let snapshot = state.today.snapshot();
    if let Some(error) = &snapshot.error {
        println!("Could not load today's attendance: {}", error);
        return;
    }

    match &snapshot.attendance {
        Some(a) => {
            println!("Date:      {}", a.date);
            println!("Check-in:  {} ({})", dash_if_empty(&a.check_in_time), status_label(a.status));
            println!("Check-out: {}", dash_if_empty(&a.check_out_time));
            if let Some(worked) = snapshot.worked_duration(state.clock.now_time()) {
                let suffix = if snapshot.has_checked_out { "worked" } else { "so far" };
                println!(
                    "Worked:    {}h {}m {}",
                    worked.num_hours(),
                    worked.num_minutes() % 60,
                    suffix
                );
            }
        }
        None => println!("No attendance recorded today"),
    }

    let next = match snapshot.next_action {
        NextAction::CheckIn => "check in",
        NextAction::CheckOut => "check out",
        NextAction::Completed => "nothing, the day is complete",
    };
    println!("Next:      {}", next);
}

fn print_row(a: &Attendance) {
    println!(
        "{:<12} {:>6} {:>6}  {}",
        a.date,
        dash_if_empty(&a.check_in_time),
        dash_if_empty(&a.check_out_time),
        status_label(a.status)
    );
}

fn print_history(state: &AppState) -> Result<()> {
    let snapshot = state.history.snapshot();
    if let Some(error) = snapshot.error {
        bail!(error);
    }

    let label = match snapshot.period {
        TimePeriod::Custom => "custom range".to_string(),
        period => format!("last {}", period),
    };
    println!(
        "Attendance {} ({} to {})",
        label, snapshot.range.start, snapshot.range.end
    );

    for record in &snapshot.records {
        print_row(record);
    }

    let stats = snapshot.stats;
    println!();
    println!("Days recorded:   {}", stats.total_days);
    println!("Days present:    {}", stats.present_days);
    println!("On time / late:  {} / {}", stats.on_time_days, stats.late_days);
    println!("Attendance rate: {:.1}%", stats.attendance_rate);
    println!("Punctuality:     {:.1}%", stats.punctuality_rate);
    Ok(())
}
