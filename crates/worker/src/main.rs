use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lookbook_pipeline::attribution::TemplateLibrary;
use lookbook_worker::config::{LogFormat, WorkerConfig};
use lookbook_worker::event::{parse_event, AttributionEvent, ProductAttributionEvent, TryOnEvent};
use lookbook_worker::run;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Runs one pipeline stage for one job and prints the stage result as JSON.
#[derive(Parser, Debug)]
#[command(name = "lookbook-worker")]
#[command(about = "Product-photo enrichment stage worker")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    stage: Stage,
}

#[derive(Subcommand, Debug)]
enum Stage {
    /// Classify the garment, resolve model images and run virtual try-on.
    TryOn {
        /// Event JSON file; read from stdin when omitted.
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Generate product attribution from a use-case prompt template.
    Attribution {
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Record detected labels and generate attribution for the product.
    ProductAttribution {
        #[arg(long)]
        event: Option<PathBuf>,
    },
}

impl Stage {
    fn event_path(&self) -> Option<&PathBuf> {
        match self {
            Self::TryOn { event }
            | Self::Attribution { event }
            | Self::ProductAttribution { event } => event.as_ref(),
        }
    }
}

fn read_event(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read event from stdin")?;
            Ok(text)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lookbook_worker=info,lookbook_pipeline=info".into());
    // Logs go to stderr; stdout carries the stage result only.
    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_format = match std::env::var("LOG_FORMAT") {
        Ok(raw) => raw.parse()?,
        Err(_) => LogFormat::default(),
    };
    init_tracing(log_format);

    let args = Args::parse();
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    let event = read_event(args.stage.event_path())?;

    let ctx = run::connect(&config).await?;
    tracing::info!(stage = ?args.stage, "Worker starting");

    let result = match args.stage {
        Stage::TryOn { .. } => {
            let event = parse_event::<TryOnEvent>(&event).context("Invalid try-on event")?;
            run::run_try_on(&ctx, event).await?
        }
        Stage::Attribution { .. } => {
            let event =
                parse_event::<AttributionEvent>(&event).context("Invalid attribution event")?;
            let templates = TemplateLibrary::load_dir(&config.template_dir).await?;
            run::run_attribution(&ctx, &templates, event).await?
        }
        Stage::ProductAttribution { .. } => {
            let event = parse_event::<ProductAttributionEvent>(&event)
                .context("Invalid product attribution event")?;
            let templates = TemplateLibrary::load_dir(&config.template_dir).await?;
            run::run_product_attribution(&ctx, &templates, event).await?
        }
    };

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
