mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveTime, Weekday};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use catchup_core::{
    Component, ContactMethod, Frequency, Person, TimeSelection, TimeWindow,
};
use catchup_scheduler::{
    CatchUpScheduler, LogNotifier, NotificationDispatcher, NotificationWorker,
    ReconciliationLoop, StaticGate, TimerArmer,
};
use catchup_store::{FileKv, PersonStore, ScheduleStore};

use config::Config;

#[derive(Parser)]
#[command(name = "catchup")]
#[command(about = "Catch-up reminders — never lose touch with the people who matter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reminder engine (timers + reconciliation loop)
    Run,
    /// Show upcoming catch-ups, soonest first
    List {
        /// Maximum entries to show
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
    /// Add or update a person
    Add {
        /// Person name
        #[arg(long)]
        name: String,
        /// daily | weekly | biweekly | monthly | random
        #[arg(long)]
        frequency: String,
        /// call | text | dm | other
        #[arg(long, default_value = "other")]
        method: String,
        /// Fixed clock time, HH:MM
        #[arg(long)]
        time: Option<String>,
        /// Anchor weekday for weekly/biweekly (e.g. mon)
        #[arg(long)]
        weekday: Option<String>,
        /// Anchor day of month for monthly (1-31)
        #[arg(long)]
        day_of_month: Option<u32>,
        /// Random window: morning | afternoon | evening
        #[arg(long)]
        window: Option<String>,
        /// Existing person id to update instead of creating
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Remove a person and cancel their reminder
    Remove { id: Uuid },
    /// Confirm a catch-up happened; reschedules from now
    Confirm { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_engine(config).await,
        Commands::List { limit } => {
            let (scheduler, _fire_rx) = build_scheduler(&config)?;
            for occ in scheduler.upcoming(limit) {
                println!(
                    "{}  {}  {}  ({})",
                    occ.fire_at().format("%a %b %e %H:%M"),
                    occ.person_name,
                    occ.method.emoji(),
                    occ.person_id
                );
            }
            Ok(())
        }
        Commands::Add {
            name,
            frequency,
            method,
            time,
            weekday,
            day_of_month,
            window,
            id,
        } => {
            let person = Person {
                id: id.unwrap_or_else(Uuid::new_v4),
                name,
                frequency: parse_frequency(&frequency)?,
                time: parse_time_selection(time, weekday, day_of_month, window)?,
                method: parse_method(&method)?,
            };
            let (scheduler, _fire_rx) = build_scheduler(&config)?;
            let occ = scheduler.upsert_person(person.clone())?;
            println!("Scheduled {} at {} (id {})", person.name, occ.fire_at(), person.id);
            Ok(())
        }
        Commands::Remove { id } => {
            let (scheduler, _fire_rx) = build_scheduler(&config)?;
            if scheduler.remove_person(id)? {
                println!("Removed {id}");
            } else {
                println!("No person with id {id}");
            }
            Ok(())
        }
        Commands::Confirm { id } => {
            let (scheduler, _fire_rx) = build_scheduler(&config)?;
            match scheduler.confirm_catch_up(id)? {
                Some(occ) => println!("Next catch-up with {} at {}", occ.person_name, occ.fire_at()),
                None => println!("No person with id {id}"),
            }
            Ok(())
        }
    }
}

/// Wire stores, armer, and dispatcher. Returns the scheduler plus the fire
/// receiver the reconciliation loop will consume.
fn build_scheduler(config: &Config) -> Result<(Arc<CatchUpScheduler>, mpsc::Receiver<Uuid>)> {
    let kv = Arc::new(
        FileKv::open(&config.data_dir)
            .with_context(|| format!("open data dir {}", config.data_dir.display()))?,
    );
    let people = Arc::new(PersonStore::open(kv.clone()));
    let schedule = Arc::new(ScheduleStore::open(kv));
    let (fire_tx, fire_rx) = mpsc::channel(256);

    let gate: Arc<StaticGate> = Arc::new(match config.permission.as_str() {
        "denied" => StaticGate::denied(),
        "unsupported" => StaticGate::unsupported(),
        _ => StaticGate::granted(),
    });
    let dispatcher = NotificationDispatcher::new(gate, Arc::new(LogNotifier));

    let scheduler = Arc::new(CatchUpScheduler::new(
        people,
        schedule,
        TimerArmer::new(fire_tx),
        dispatcher,
    ));
    Ok((scheduler, fire_rx))
}

async fn run_engine(config: Config) -> Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        tick_secs = config.tick_secs,
        "Starting catch-up reminder engine"
    );

    let kv = Arc::new(FileKv::open(&config.data_dir)?);
    let people = Arc::new(PersonStore::open(kv.clone()));
    let schedule = Arc::new(ScheduleStore::open(kv));

    let (fire_tx, fire_rx) = mpsc::channel(256);
    let (worker_tx, worker_rx) = mpsc::channel(256);
    let (hint_tx, hint_rx) = mpsc::channel(256);

    let gate: Arc<StaticGate> = Arc::new(match config.permission.as_str() {
        "denied" => StaticGate::denied(),
        "unsupported" => StaticGate::unsupported(),
        _ => StaticGate::granted(),
    });
    let dispatcher = NotificationDispatcher::new(gate, Arc::new(LogNotifier));

    let scheduler = Arc::new(
        CatchUpScheduler::new(people, schedule, TimerArmer::new(fire_tx), dispatcher)
            .with_worker(worker_tx),
    );

    // Background alert context; sends Confirm hints back through hint_tx.
    let worker = Arc::new(NotificationWorker::new(Arc::new(LogNotifier), hint_tx));
    {
        let worker = worker.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.start(worker_rx).await {
                tracing::error!(error = %e, "Notification worker exited");
            }
        });
    }

    scheduler.rearm_all();

    let recon = ReconciliationLoop::with_tick(
        scheduler,
        fire_rx,
        Duration::from_secs(config.tick_secs),
    );
    recon.start(hint_rx).await
}

fn parse_frequency(s: &str) -> Result<Frequency> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "daily" => Frequency::Daily,
        "weekly" => Frequency::Weekly,
        "biweekly" => Frequency::Biweekly,
        "monthly" => Frequency::Monthly,
        "random" => Frequency::Random,
        other => bail!("unknown frequency '{other}'"),
    })
}

fn parse_method(s: &str) -> Result<ContactMethod> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "call" => ContactMethod::Call,
        "text" => ContactMethod::Text,
        "dm" => ContactMethod::Dm,
        "other" => ContactMethod::Other,
        other => bail!("unknown contact method '{other}'"),
    })
}

fn parse_window(s: &str) -> Result<TimeWindow> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "morning" => TimeWindow::Morning,
        "afternoon" => TimeWindow::Afternoon,
        "evening" => TimeWindow::Evening,
        other => bail!("unknown time window '{other}'"),
    })
}

fn parse_time_selection(
    time: Option<String>,
    weekday: Option<String>,
    day_of_month: Option<u32>,
    window: Option<String>,
) -> Result<TimeSelection> {
    match (time, window) {
        (Some(time), None) => {
            let time = NaiveTime::parse_from_str(&time, "%H:%M")
                .with_context(|| format!("invalid time '{time}', expected HH:MM"))?;
            let weekday = weekday
                .map(|w| {
                    w.parse::<Weekday>()
                        .map_err(|_| anyhow::anyhow!("invalid weekday '{w}'"))
                })
                .transpose()?;
            Ok(TimeSelection::Fixed {
                time,
                weekday,
                day_of_month,
            })
        }
        (None, Some(window)) => Ok(TimeSelection::RandomWindow {
            window: parse_window(&window)?,
        }),
        (Some(_), Some(_)) => bail!("--time and --window are mutually exclusive"),
        (None, None) => bail!("one of --time or --window is required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frequency() {
        assert_eq!(parse_frequency("weekly").unwrap(), Frequency::Weekly);
        assert_eq!(parse_frequency("RANDOM").unwrap(), Frequency::Random);
        assert!(parse_frequency("fortnightly").is_err());
    }

    #[test]
    fn test_parse_time_selection_fixed() {
        let sel = parse_time_selection(Some("09:30".into()), Some("mon".into()), None, None).unwrap();
        match sel {
            TimeSelection::Fixed { time, weekday, .. } => {
                assert_eq!(time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
                assert_eq!(weekday, Some(Weekday::Mon));
            }
            other => panic!("unexpected selection: {other:?}"),
        }
    }

    #[test]
    fn test_parse_time_selection_window() {
        let sel = parse_time_selection(None, None, None, Some("evening".into())).unwrap();
        assert_eq!(
            sel,
            TimeSelection::RandomWindow {
                window: TimeWindow::Evening
            }
        );
    }

    #[test]
    fn test_parse_time_selection_rejects_both_and_neither() {
        assert!(parse_time_selection(Some("09:00".into()), None, None, Some("morning".into())).is_err());
        assert!(parse_time_selection(None, None, None, None).is_err());
    }
}
