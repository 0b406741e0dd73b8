use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use catalog_client::{
    AddImageForm, CatalogController, ControllerOptions, DefaultResourceFactory, HttpImageApi,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::{domain::PolicyId, protocol::ImageRecord};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::info;

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Browse and populate a remote image catalog")]
struct Cli {
    /// Path to a TOML settings file (defaults to ./catalog.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured image service base URL.
    #[arg(long)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query the catalog and print the resulting image list.
    List {
        /// One of: all, tag, id, url.
        #[arg(long, default_value = "all")]
        by: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Query the catalog, mark every loaded image selected, and print it.
    SelectAll {
        #[arg(long, default_value = "all")]
        by: String,
        #[arg(long)]
        content: Option<String>,
    },
    /// Add one image and/or a file of newline-separated URLs.
    Add {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        bulk_file: Option<PathBuf>,
        /// Comma-separated tags applied to every added image.
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        rfw_tag: Option<String>,
        #[arg(long)]
        policy: Option<String>,
    },
    /// Print the RFW policies and whether RFW is enabled.
    Policies,
    /// Print the job status for an RFW policy.
    Job { policy_id: String },
}

#[derive(Serialize)]
struct ImageRow<'a> {
    id: Option<&'a str>,
    url: &'a str,
    tags: &'a [String],
    selected: bool,
}

impl<'a> From<&'a ImageRecord> for ImageRow<'a> {
    fn from(image: &'a ImageRecord) -> Self {
        Self {
            id: image.id.as_ref().map(|id| id.as_str()),
            url: &image.url,
            tags: image.tags.as_deref().unwrap_or_default(),
            selected: image.selected,
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `init` already loaded the unfiltered catalog; only re-query for a filter.
async fn query(controller: &CatalogController, by: &str, content: Option<&str>) {
    if by != "all" || content.is_some() {
        controller.get_images_by(by, content).await;
    }
}

fn print_images(controller: &CatalogController) -> Result<()> {
    let state = controller.snapshot();
    let rows: Vec<ImageRow<'_>> = state.images.iter().map(ImageRow::from).collect();
    print_json(&rows)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .with_writer(std::io::stderr)
        .init();
    info!(api = %settings.api_base_url, "catalog: starting");

    let api = HttpImageApi::new(&settings.api_base_url)?;
    let controller = CatalogController::new(
        Arc::new(api),
        Arc::new(DefaultResourceFactory),
        ControllerOptions {
            product_enabled: settings.product_enabled,
        },
    );
    let mut alerts = controller.subscribe_alerts();
    controller.init().await;

    match cli.command {
        Command::List { by, content } => {
            query(&controller, &by, content.as_deref()).await;
            print_images(&controller)?;
        }
        Command::SelectAll { by, content } => {
            query(&controller, &by, content.as_deref()).await;
            controller.select_all_images();
            print_images(&controller)?;
        }
        Command::Add {
            url,
            id,
            bulk_file,
            tags,
            rfw_tag,
            policy,
        } => {
            let bulk_urls = match bulk_file {
                Some(path) => Some(
                    fs::read_to_string(&path)
                        .with_context(|| format!("failed to read '{}'", path.display()))?,
                ),
                None => None,
            };
            controller.go_add_images();
            controller.update_form(|form| {
                *form = AddImageForm {
                    image_id: id,
                    image_url: url,
                    bulk_urls,
                    tags,
                    rfw_tag,
                    rfw_policy: policy.map(PolicyId::from),
                }
            });

            let outcome = controller.submit_form().await;
            loop {
                match alerts.try_recv() {
                    Ok(alert) => eprintln!("{alert}"),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            let created = outcome?;
            controller.tasks().wait_idle().await;
            println!("added {created} image(s)");
        }
        Command::Policies => {
            let state = controller.snapshot();
            print_json(&serde_json::json!({
                "rfw_enabled": state.rfw_enabled,
                "policies": state.rfw_policies,
            }))?;
        }
        Command::Job { policy_id } => match controller.get_job(&PolicyId::from(policy_id)).await {
            Some(status) => print_json(&status)?,
            None => eprintln!("no job status available"),
        },
    }

    Ok(())
}
