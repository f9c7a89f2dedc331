//! seatwatch CLI: watch a course section until a seat can be reserved.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use seatwatch::classify::Classifier;
use seatwatch::config::Config;
use seatwatch::engine::{Engine, EngineConfig, MonitorRequest};
use seatwatch::model::TaskKey;
use seatwatch::notification::Notification;
use seatwatch::reserve::http::{self, HttpReserver, Listing, Page, SearchFilters};
use seatwatch::reserve::{AttemptContext, Reserve};
use seatwatch::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "seatwatch", about = "Keep trying to reserve a course seat")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor a section until a seat is reserved or Ctrl-C
    Watch {
        #[command(flatten)]
        target: Target,
        /// Seconds between attempts (defaults to SEATWATCH_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<u64>,
        /// Classifier rules file (defaults to SEATWATCH_RULES)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Make a single reservation attempt and print the outcome
    Select {
        #[command(flatten)]
        target: Target,
        /// Classifier rules file (defaults to SEATWATCH_RULES)
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Search the course catalogue of a category
    Search {
        /// Course category (public_jingyue, major_jingyue, public_benbu, major_benbu)
        category: String,
        #[command(flatten)]
        filters: FilterArgs,
        #[command(flatten)]
        listing: ListingArgs,
    },
    /// List the sections of a course, with the ids `watch` expects
    Sections {
        /// Course category (public_jingyue, major_jingyue, public_benbu, major_benbu)
        category: String,
        /// Course id (kcptdm) from `search`
        course_id: String,
        #[command(flatten)]
        listing: ListingArgs,
    },
    /// Print the effective classifier rules as TOML
    Rules {
        /// Rules file to validate and print instead of the defaults
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct Target {
    /// Course category (public_jingyue, major_jingyue, public_benbu, major_benbu)
    category: String,
    /// Section id (kcrwdm)
    resource_id: String,
    /// Course title (kcmc)
    display_name: String,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Course title keyword
    #[arg(long, default_value = "")]
    keyword: String,
    /// Offering department code
    #[arg(long, default_value = "")]
    department: String,
    /// Campus code
    #[arg(long, default_value = "")]
    campus: String,
    /// Day of week (1-7)
    #[arg(long, default_value = "")]
    weekday: String,
    /// Class period
    #[arg(long, default_value = "")]
    period: String,
    /// Only courses already chosen
    #[arg(long)]
    mine: bool,
}

impl FilterArgs {
    fn into_filters(self) -> SearchFilters {
        SearchFilters {
            keyword: self.keyword,
            department: self.department,
            campus: self.campus,
            weekday: self.weekday,
            period: self.period,
            mine_only: self.mine,
            ..SearchFilters::default()
        }
    }
}

#[derive(clap::Args)]
struct ListingArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Rows per page
    #[arg(long, default_value_t = 60)]
    rows: u32,
    /// Print raw JSON rows instead of a table
    #[arg(long)]
    json: bool,
}

fn check_category(category: &str) -> anyhow::Result<()> {
    if http::category_code(category).is_none() {
        let known: Vec<_> = http::categories().collect();
        anyhow::bail!(
            "unknown category '{category}' (expected one of: {})",
            known.join(", ")
        );
    }
    Ok(())
}

impl Target {
    fn key(&self) -> anyhow::Result<TaskKey> {
        check_category(&self.category)?;
        Ok(TaskKey::new(&self.category, &self.resource_id))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Watch {
            target,
            interval,
            rules,
        } => cmd_watch(target, interval, rules).await,
        Command::Select { target, rules } => cmd_select(target, rules).await,
        Command::Search {
            category,
            filters,
            listing,
        } => cmd_search(category, filters, listing).await,
        Command::Sections {
            category,
            course_id,
            listing,
        } => cmd_sections(category, course_id, listing).await,
        Command::Rules { rules } => cmd_rules(rules),
    }
}

fn load_classifier(path: Option<PathBuf>) -> anyhow::Result<Classifier> {
    Ok(match path {
        Some(path) => Classifier::load(&path)?,
        None => Classifier::default(),
    })
}

async fn cmd_watch(
    target: Target,
    interval: Option<u64>,
    rules: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "seatwatch".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let key = target.key()?;
    let classifier = load_classifier(rules.or(config.rules_path.clone()))?;
    let reserver = HttpReserver::new(&config.base_url, config.request_timeout)?;
    let interval = match interval {
        Some(0) => anyhow::bail!("--interval must be at least 1"),
        Some(secs) => Duration::from_secs(secs),
        None => config.interval,
    };

    if !reserver.validate(&config.cookies).await? {
        anyhow::bail!("session cookie was rejected; log in again and update SEATWATCH_COOKIES");
    }

    let engine = Engine::new(
        Arc::new(reserver),
        classifier,
        EngineConfig {
            default_interval: interval,
            ..EngineConfig::default()
        },
    );
    engine.start(MonitorRequest::new(
        key.clone(),
        target.display_name,
        config.cookies,
    ))?;

    let mut waiter = {
        let engine = engine.clone();
        let key = key.clone();
        tokio::spawn(async move { engine.wait(&key).await })
    };

    let mut last_seen = print_new(&engine, None);
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                // Either way the task is over; NotFound only means it already finished.
                let _ = engine.stop(&key);
                break;
            }
            exit = &mut waiter => {
                let exit = exit??;
                last_seen = print_new(&engine, last_seen);
                println!("monitor finished: {} after {} attempt(s)", exit.status(), exit.attempts());
                break;
            }
            _ = tick.tick() => {
                last_seen = print_new(&engine, last_seen);
            }
        }
    }

    engine.shutdown().await;
    print_new(&engine, last_seen);
    Ok(())
}

/// Print notifications newer than `last_seen`; returns the newest id printed.
fn print_new(engine: &Engine, last_seen: Option<u64>) -> Option<u64> {
    let fresh: Vec<Notification> = match last_seen {
        Some(id) => engine.notifications_since(id),
        None => engine.notifications(),
    };
    for n in &fresh {
        println!("[{}] {:<7} {}", n.formatted_time, n.level, n.message);
    }
    fresh.last().map(|n| n.id).or(last_seen)
}

async fn cmd_select(target: Target, rules: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let key = target.key()?;
    let classifier = load_classifier(rules.or(config.rules_path.clone()))?;
    let reserver = HttpReserver::new(&config.base_url, config.request_timeout)?;

    let raw = reserver
        .attempt(
            &key,
            &AttemptContext {
                display_name: target.display_name,
                credentials: config.cookies,
            },
        )
        .await;
    let classification = classifier.classify(&raw);

    println!("Outcome:  {}", classification.outcome);
    println!("Message:  {}", classification.message);
    println!("Raw:      {}", serde_json::to_string(&raw)?);
    Ok(())
}

async fn cmd_search(
    category: String,
    filters: FilterArgs,
    listing: ListingArgs,
) -> anyhow::Result<()> {
    check_category(&category)?;
    let config = Config::from_env()?;
    let reserver = HttpReserver::new(&config.base_url, config.request_timeout)?;

    let page = Page::new(listing.page, listing.rows);
    let result = reserver
        .search(&config.cookies, &category, &filters.into_filters(), page)
        .await?;
    print_listing(&result, &["kcptdm", "kcmc"], listing.json)
}

async fn cmd_sections(
    category: String,
    course_id: String,
    listing: ListingArgs,
) -> anyhow::Result<()> {
    check_category(&category)?;
    let config = Config::from_env()?;
    let reserver = HttpReserver::new(&config.base_url, config.request_timeout)?;

    let page = Page::new(listing.page, listing.rows);
    let result = reserver
        .sections(&config.cookies, &category, &course_id, page)
        .await?;
    print_listing(&result, &["kcrwdm", "kcmc"], listing.json)
}

/// Print rows either as JSON lines or as a table of `columns`.
fn print_listing(listing: &Listing, columns: &[&str], json: bool) -> anyhow::Result<()> {
    for row in &listing.rows {
        if json {
            println!("{}", serde_json::to_string(row)?);
            continue;
        }
        let cells: Vec<String> = columns
            .iter()
            .map(|column| match row.get(*column) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => "-".to_string(),
                Some(other) => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    match listing.total {
        Some(total) => println!("{} of {total} row(s)", listing.rows.len()),
        None => println!("{} row(s)", listing.rows.len()),
    }
    Ok(())
}

fn cmd_rules(rules: Option<PathBuf>) -> anyhow::Result<()> {
    let classifier = load_classifier(rules)?;
    print!("{}", classifier.to_toml()?);
    Ok(())
}
