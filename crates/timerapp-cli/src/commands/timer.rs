use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use timerapp_core::view::{self, CategoryFilter};
use timerapp_core::{
    Config, CountdownScheduler, Event, LogNotifier, NewTimer, Notifier, Timer, TimerId,
    TimerStatus,
};
use tracing::{debug, info};

use super::{open_store, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Create a paused timer
    Add {
        /// Display name
        name: String,
        /// Duration in seconds
        duration: String,
        /// Grouping category
        category: String,
        /// Skip the halfway alert for this timer
        #[arg(long)]
        no_halfway: bool,
    },
    /// List timers grouped by category
    List {
        /// Only show one category
        #[arg(long)]
        category: Option<String>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run timers in the foreground until they complete (Ctrl-C pauses them)
    Run {
        /// Timer ids or unique id prefixes; defaults to every paused timer
        ids: Vec<String>,
    },
    /// Reset a timer to its full duration
    Reset {
        id: String,
    },
    /// Delete a timer
    Delete {
        id: String,
    },
}

/// Prints halfway and completion alerts to the terminal.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, event: &Event) {
        match (event, event.alert_message()) {
            (Event::HalfwayReached { .. }, Some(message)) => println!("⏰ {message}"),
            (Event::TimerCompleted { .. }, Some(message)) => println!("🎉 {message}"),
            _ => {}
        }
    }
}

/// Find a timer by exact id, or by a prefix matching exactly one timer.
fn resolve_id(timers: &[Timer], query: &str) -> Result<Option<TimerId>, String> {
    let query = query.trim();
    if query.is_empty() {
        return Err("timer id must not be empty".to_string());
    }
    if let Some(timer) = timers.iter().find(|t| t.id().as_str() == query) {
        return Ok(Some(timer.id().clone()));
    }
    let matches: Vec<&Timer> = timers
        .iter()
        .filter(|t| t.id().as_str().starts_with(query))
        .collect();
    match matches.as_slice() {
        [] => Ok(None),
        [timer] => Ok(Some(timer.id().clone())),
        _ => Err(format!("id prefix '{query}' matches {} timers", matches.len())),
    }
}

fn short_id(id: &TimerId) -> &str {
    id.as_str().get(..8).unwrap_or(id.as_str())
}

fn print_sections(timers: &[Timer], filter: &CategoryFilter) {
    let sections = view::sections(timers, filter);
    if sections.is_empty() {
        println!("No timers yet.");
        return;
    }
    for section in sections {
        println!("{}", section.title);
        for row in section.rows {
            println!(
                "  {:<8}  {:<20}  ⏳ {:>8}  {:<9}  {:>3}%",
                row.id.get(..8).unwrap_or(&row.id),
                row.name,
                row.remaining,
                row.status.to_string(),
                row.percent
            );
        }
    }
}

fn run_in_foreground(queries: Vec<String>, config: &Config) -> CliResult {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_until_done(queries, config))
}

async fn run_until_done(queries: Vec<String>, config: &Config) -> CliResult {
    let store = open_store(config)?;
    let notifier: Arc<dyn Notifier> = if config.notifications.enabled {
        Arc::new(TerminalNotifier)
    } else {
        Arc::new(LogNotifier)
    };
    let scheduler = CountdownScheduler::from_config(store, notifier, config)?;

    let timers = scheduler.timers();
    let targets: Vec<TimerId> = if queries.is_empty() {
        timers
            .iter()
            .filter(|t| t.status() == TimerStatus::Paused)
            .map(|t| t.id().clone())
            .collect()
    } else {
        let mut ids = Vec::with_capacity(queries.len());
        for query in &queries {
            match resolve_id(&timers, query)? {
                Some(id) => ids.push(id),
                None => eprintln!("no timer with id {query}"),
            }
        }
        ids
    };

    let mut started = 0;
    for id in &targets {
        if let Some(Event::TimerStarted { remaining_secs, .. }) = scheduler.start_timer(id) {
            let name = scheduler.get(id).map(|t| t.name().to_string()).unwrap_or_default();
            println!("▶ {name} ({})", view::format_time(remaining_secs));
            debug!(timer_id = %id, remaining_secs, "started countdown");
            started += 1;
        }
    }
    if started == 0 {
        println!("Nothing to run.");
        return Ok(());
    }

    let mut active = scheduler.subscribe_active();
    tokio::select! {
        done = active.wait_for(|n| *n == 0) => {
            done?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            let paused = scheduler.pause_all();
            info!(count = paused.len(), "interrupted; paused active timers");
            println!("Paused {} timer(s).", paused.len());
        }
    }

    print_sections(&scheduler.timers(), &CategoryFilter::All);
    Ok(())
}

pub fn run(action: TimerAction) -> CliResult {
    let config = Config::load()?;

    match action {
        TimerAction::Add {
            name,
            duration,
            category,
            no_halfway,
        } => match NewTimer::parse(&name, &duration, &category) {
            Ok(input) => {
                let mut store = open_store(&config)?;
                let halfway_alert = config.timer.halfway_alert && !no_halfway;
                let id = store.add(input.with_halfway_alert(halfway_alert));
                println!("{id}");
            }
            Err(e) => {
                eprintln!("timer not added: {e}");
            }
        },
        TimerAction::List { category, json } => {
            let store = open_store(&config)?;
            let filter = CategoryFilter::from_option(category.as_deref());
            if json {
                let sections = view::sections(store.timers(), &filter);
                println!("{}", serde_json::to_string_pretty(&sections)?);
            } else {
                print_sections(store.timers(), &filter);
            }
        }
        TimerAction::Run { ids } => run_in_foreground(ids, &config)?,
        TimerAction::Reset { id } => {
            let mut store = open_store(&config)?;
            match resolve_id(store.timers(), &id)? {
                Some(id) => match store.reset_timer(&id, Utc::now()) {
                    Some(_) => println!("reset {}", short_id(&id)),
                    None => println!("{} is already reset", short_id(&id)),
                },
                None => eprintln!("no timer with id {id}"),
            }
        }
        TimerAction::Delete { id } => {
            let mut store = open_store(&config)?;
            match resolve_id(store.timers(), &id)? {
                Some(id) => {
                    store.delete_timer(&id, Utc::now());
                    println!("deleted {}", short_id(&id));
                }
                None => eprintln!("no timer with id {id}"),
            }
        }
    }
    Ok(())
}
