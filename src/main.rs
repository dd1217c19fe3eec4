use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use validator::Validate;

use price_sentinel::config::{AppConfig, LoggingConfig};
use price_sentinel::database::{SqliteStore, Store};
use price_sentinel::dispatcher::{ExtractionDispatcher, ExtractionReport};
use price_sentinel::models::{
    NewNotificationChannel, NewSubject, NotificationChannel, NotificationMethod, Subject,
};
use price_sentinel::notification::NotificationDispatcher;
use price_sentinel::plugins::PluginManager;
use price_sentinel::scheduler::BatchScheduler;
use price_sentinel::site_profiles::SiteCatalog;
use price_sentinel::subject_manager::SubjectManager;

#[derive(Parser)]
#[command(name = "price-sentinel", version, about = "Watches product prices and alerts on target crossings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check every active subject once
    Batch {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check one subject now and print the extraction report
    Check { subject_id: String },
    /// Price history and statistics for a subject
    History {
        subject_id: String,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Run batches on the configured cron schedule
    Watch,
    /// Start monitoring a product page
    Add {
        url: String,
        #[arg(long)]
        target_price: f64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        target_discount: Option<f64>,
    },
    /// Attach a notification channel to a subject
    Subscribe {
        subject_id: String,
        #[arg(long)]
        method: NotificationMethod,
        #[arg(long)]
        contact: String,
    },
}

fn init_tracing(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("price_sentinel=info"));

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

struct App {
    store: Arc<SqliteStore>,
    manager: SubjectManager,
}

async fn build(config: &AppConfig) -> Result<App> {
    let store = Arc::new(
        SqliteStore::connect(&config.database)
            .await
            .context("opening database")?,
    );

    let catalog = match &config.sites.catalog_path {
        Some(path) => SiteCatalog::load(path).with_context(|| format!("loading site catalog {}", path))?,
        None => SiteCatalog::builtin()?,
    };
    info!("Loaded {} site profiles", catalog.len());

    let plugins = PluginManager::new();
    plugins.initialize_default_plugins(config).await?;

    let dispatcher = ExtractionDispatcher::new(Arc::new(catalog), plugins.clone());
    let notifications = NotificationDispatcher::new(store.clone(), plugins);
    let manager = SubjectManager::new(store.clone(), dispatcher, notifications);

    Ok(App { store, manager })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("loading configuration")?;
    let _guard = init_tracing(&config.logging);
    let app = build(&config).await?;

    match cli.command {
        Command::Batch { json } => {
            let scheduler = BatchScheduler::new(app.store.clone(), app.manager, config.scheduler.clone());
            let summary = scheduler.run_batch().await?;
            if json {
                print_json(&summary)?;
            } else {
                println!("{}", summary);
            }
        }
        Command::Check { subject_id } => {
            let started = Instant::now();
            match app.manager.check_by_id(&subject_id).await {
                Ok(outcome) => print_json(&outcome.report)?,
                Err(e) => {
                    let report = ExtractionReport::from_error(&e, started.elapsed().as_millis() as u64);
                    print_json(&report)?;
                    if let Some(error) = &report.error {
                        eprintln!("{}", error);
                    }
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::History { subject_id, days } => {
            let history = app.manager.ledger().history(&subject_id, days).await?;
            print_json(&history)?;
        }
        Command::Watch => {
            if config.metrics.enabled {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(([0, 0, 0, 0], config.metrics.port))
                    .install()
                    .context("starting metrics exporter")?;
                info!("Metrics exposed on port {}", config.metrics.port);
            }
            let scheduler = Arc::new(BatchScheduler::new(
                app.store.clone(),
                app.manager,
                config.scheduler.clone(),
            ));
            scheduler.watch().await?;
        }
        Command::Add {
            url,
            target_price,
            name,
            target_discount,
        } => {
            let new_subject = NewSubject {
                url,
                product_name: name,
                target_price,
                target_discount_percent: target_discount,
            };
            new_subject.validate()?;
            let subject = Subject::new(new_subject);
            app.store.insert_subject(&subject).await?;
            print_json(&subject)?;
        }
        Command::Subscribe {
            subject_id,
            method,
            contact,
        } => {
            if app.store.get_subject(&subject_id).await?.is_none() {
                anyhow::bail!("subject {} not found", subject_id);
            }
            let new_channel = NewNotificationChannel {
                subject_id,
                method,
                contact_info: contact,
            };
            new_channel.validate()?;
            let channel = NotificationChannel::new(new_channel);
            app.store.insert_channel(&channel).await?;
            print_json(&channel)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
