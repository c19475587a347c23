use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gym_attendance::{
    AppConfig, AttendanceClient, AttendanceReport, Credentials, GymDirectory, Monitor,
    MonitorError, Reporter, TokenSession, poll_interval,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "gym-attendance")]
#[command(about = "PureGym attendance monitor")]
struct Args {
    /// PureGym email address (defaults to PUREGYM_USER)
    #[arg(short, long)]
    email: Option<String>,

    /// PureGym PIN (defaults to PUREGYM_PASS)
    #[arg(short, long)]
    pin: Option<String>,

    /// Gym name, or 'home' for your home gym
    #[arg(short, long)]
    gym: Option<String>,

    /// Update interval in minutes (0 for a single check)
    #[arg(short, long, allow_negative_numbers = true)]
    interval: Option<i64>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Extra configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List gyms, optionally filtered by a search term
    Gyms {
        search: Option<String>,
    },
}

/// Renders each check as one console line.
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, report: &AttendanceReport) {
        println!(
            "[{}] Attendance at {}: {} ({}) - Last updated: {}",
            report.checked_at.with_timezone(&chrono::Local).format("%H:%M:%S"),
            report.gym_name,
            report.people,
            report.level,
            report.refreshed_at.format("%H:%M UTC"),
        );
    }

    fn report_error(&self, error: &MonitorError) {
        eprintln!("Error checking attendance ({}): {}", error.reason(), error);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_with(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(gym) = &args.gym {
        config.monitor.gym = gym.clone();
    }
    if let Some(minutes) = args.interval {
        config.monitor.interval_minutes = minutes;
    }
    if let Some(email) = &args.email {
        config.credentials.email = Some(email.clone());
    }
    if let Some(pin) = &args.pin {
        config.credentials.pin = Some(pin.clone());
    }
    config.monitor.debug |= args.debug;

    // Initialize logging
    let directive = if config.monitor.debug {
        "gym_attendance=debug"
    } else {
        "gym_attendance=info"
    };
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .parse_lossy(directive);

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let credentials = config.credentials.to_credentials().context(
        "Email and PIN are required: pass --email/--pin or set PUREGYM_USER and PUREGYM_PASS",
    )?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let result = match args.command {
        Some(Command::Gyms { search }) => rt.block_on(run_finder(&config, &credentials, search)),
        None => rt.block_on(run_monitor(&config, credentials)),
    };

    // The stdin reader sits on a blocking thread; don't wait for it.
    rt.shutdown_background();
    result
}

/// Authenticate, resolve the gym and report attendance until Ctrl+C.
async fn run_monitor(config: &AppConfig, credentials: Credentials) -> Result<()> {
    println!("PureGym Attendance Monitor");
    println!("==========================");
    println!("Email: {}", credentials.identity());
    println!("PIN: {}", credentials.masked_secret());
    println!("Gym: {}\n", config.monitor.gym);

    let mut monitor = Monitor::from_config(config, credentials, Arc::new(ConsoleReporter))?;

    let gym = match monitor.initialize().await {
        Ok(gym) => gym,
        Err(e) => anyhow::bail!(init_failure_message(&e)),
    };
    println!("Found: {} (ID: {})\n", gym.name, gym.id);

    let interval = poll_interval(config.monitor.interval_minutes);
    monitor.start_polling(interval).await?;

    let Some(trigger) = monitor.trigger() else {
        return Ok(());
    };

    println!(
        "Monitoring every {} minutes. Press Ctrl+C to stop or Enter to check now.\n",
        config.monitor.interval_minutes
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => {
                    if !trigger.check_now() {
                        tracing::debug!("Manual check not queued");
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    println!("\nStopping monitor...");
    tokio::time::timeout(Duration::from_secs(5), monitor.stop_polling())
        .await
        .context("Timed out stopping the monitor")?;
    Ok(())
}

fn init_failure_message(error: &MonitorError) -> String {
    match error {
        MonitorError::BadCredentials => {
            "Credentials rejected. Check your email and PIN and try again.".to_string()
        }
        MonitorError::Transport(e) => format!("Network problem while contacting PureGym: {e}"),
        MonitorError::GymNotFound(name) => format!(
            "Gym '{name}' not found. Run `gym-attendance gyms <search>` to list gym names."
        ),
        MonitorError::HomeGymUnavailable => {
            "Could not get your home gym. Pass --gym with a gym name instead.".to_string()
        }
        other => format!("Failed to initialize: {other}"),
    }
}

/// List the gym directory, like the vendor's finder screen.
async fn run_finder(
    config: &AppConfig,
    credentials: &Credentials,
    search: Option<String>,
) -> Result<()> {
    let session = TokenSession::new(&config.api, &config.network)?;
    if !session
        .authenticate(credentials)
        .await
        .context("Failed to reach the identity endpoint")?
    {
        anyhow::bail!(init_failure_message(&MonitorError::BadCredentials));
    }

    let directory = GymDirectory::new(session.clone());
    let term = search.unwrap_or_default();
    let gyms = directory
        .search(&term)
        .await
        .context("Failed to fetch gym list")?;

    match AttendanceClient::new(session).get_home_gym().await {
        Ok(home) => println!("Home gym: {} (ID: {})\n", home.name, home.id),
        Err(e) => tracing::debug!("No home gym: {}", e),
    }

    if term.is_empty() {
        println!("All gyms:");
    } else {
        println!("Gyms containing '{term}':");
    }
    println!("{}", "-".repeat(60));
    for gym in &gyms {
        println!("ID: {:<6} Name: {}", gym.id, gym.name);
    }
    println!("{}", "-".repeat(60));
    println!("Total: {} gym(s)", gyms.len());
    Ok(())
}
