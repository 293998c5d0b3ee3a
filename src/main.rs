use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use shoplink::catalog::{Admin, Catalog};
use shoplink::config;
use shoplink::db;
use shoplink::links::{HttpLinkClient, LinkPipeline};
use shoplink::model::{BundlePatch, NewBundle, NewProduct, ProductPatch};
use shoplink::sweep::{self, SweepOptions};

#[derive(Debug, Parser)]
#[command(author, version, about = "Product catalog with link sanitization")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Admin password for write and maintenance commands
    #[arg(long, env = "SHOPLINK_ADMIN_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read the public feed
    #[command(subcommand)]
    Public(PublicCommand),
    /// Run link health sweeps on the configured interval
    Watch(SweepArgs),
    #[command(flatten)]
    Admin(AdminCommand),
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    /// Manage products
    #[command(subcommand)]
    Product(ProductCommand),
    /// Manage bundles
    #[command(subcommand)]
    Bundle(BundleCommand),
    /// Show or change feed settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Preview how link text would be stored ("-" reads stdin)
    Sanitize { text: String },
    /// Resolve redirector links and fetch their titles
    Resolve { urls: Vec<String> },
    /// Run one link health sweep
    Sweep(SweepArgs),
    /// Show catalog counts
    Stats,
}

#[derive(Debug, Subcommand)]
enum ProductCommand {
    List,
    Get { id: String },
    Create(ProductFields),
    Update {
        id: String,
        #[command(flatten)]
        fields: ProductUpdate,
    },
    Delete { id: String },
}

#[derive(Debug, Args)]
struct ProductFields {
    #[arg(long)]
    title: String,
    /// Raw link text; one or more URLs with optional `Label |` prefixes
    #[arg(long)]
    url: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
    #[arg(long)]
    feed: Option<String>,
    #[arg(long)]
    publish: bool,
}

#[derive(Debug, Args)]
struct ProductUpdate {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    url: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
    #[arg(long)]
    feed: Option<String>,
    #[arg(long)]
    published: Option<bool>,
}

#[derive(Debug, Subcommand)]
enum BundleCommand {
    List,
    Get { id: String },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        feed: Option<String>,
        #[arg(long)]
        publish: bool,
        /// Member product id (repeatable)
        #[arg(long = "product")]
        products: Vec<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        feed: Option<String>,
        #[arg(long)]
        published: Option<bool>,
        /// Replace the member set (repeatable)
        #[arg(long = "product")]
        products: Option<Vec<String>>,
    },
    Delete { id: String },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Get {
        #[arg(long)]
        feed: Option<String>,
    },
    Set {
        #[arg(long)]
        feed: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum PublicCommand {
    Feed {
        #[arg(long)]
        feed: Option<String>,
    },
    Product { slug: String },
    Bundle { slug: String },
}

#[derive(Debug, Clone, Copy, Args)]
struct SweepArgs {
    /// Apply changes instead of only reporting them
    #[arg(long)]
    live: bool,
    /// Publish every product and skip link checks
    #[arg(long)]
    republish: bool,
    /// Relink broken products to the placeholder instead of unpublishing
    #[arg(long)]
    safe_mode: bool,
}

impl From<SweepArgs> for SweepOptions {
    fn from(args: SweepArgs) -> Self {
        SweepOptions {
            dry_run: !args.live,
            republish_all: args.republish,
            safe_mode: args.safe_mode,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let cfg = config::load(Some(&cli.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = Arc::new(HttpLinkClient::from_config(&cfg)?);
    let pipeline = Arc::new(LinkPipeline::from_config(&cfg, client));
    let catalog = Catalog::new(pool, pipeline, &cfg);
    let password = cli.password.unwrap_or_default();

    match cli.command {
        Command::Public(cmd) => match cmd {
            PublicCommand::Feed { feed } => print_json(&catalog.public_feed(feed.as_deref()).await?),
            PublicCommand::Product { slug } => print_json(&catalog.public_product(&slug).await?),
            PublicCommand::Bundle { slug } => print_json(&catalog.public_bundle(&slug).await?),
        },
        Command::Watch(args) => {
            catalog.admin(&password)?;
            watch(&catalog, &cfg, args.into()).await
        }
        Command::Admin(command) => {
            let admin = catalog.admin(&password)?;
            run_admin(&admin, command).await
        }
    }
}

async fn run_admin(admin: &Admin<'_>, command: AdminCommand) -> Result<()> {
    match command {
        AdminCommand::Product(cmd) => match cmd {
            ProductCommand::List => print_json(&admin.list_products().await?),
            ProductCommand::Get { id } => print_json(&admin.get_product(&id).await?),
            ProductCommand::Create(fields) => {
                let new = NewProduct {
                    title: fields.title,
                    description: fields.description,
                    image_url: fields.image_url,
                    product_url: fields.url,
                    is_published: fields.publish,
                    feed: fields.feed,
                };
                print_json(&admin.create_product(new).await?)
            }
            ProductCommand::Update { id, fields } => {
                let patch = ProductPatch {
                    title: fields.title,
                    description: fields.description,
                    image_url: fields.image_url,
                    product_url: fields.url,
                    is_published: fields.published,
                    feed: fields.feed,
                };
                print_json(&admin.update_product(&id, patch).await?)
            }
            ProductCommand::Delete { id } => {
                admin.delete_product(&id).await?;
                println!("deleted product {}", id);
                Ok(())
            }
        },
        AdminCommand::Bundle(cmd) => match cmd {
            BundleCommand::List => print_json(&admin.list_bundles().await?),
            BundleCommand::Get { id } => print_json(&admin.get_bundle(&id).await?),
            BundleCommand::Create {
                title,
                description,
                feed,
                publish,
                products,
            } => {
                let new = NewBundle {
                    title,
                    description,
                    is_published: publish,
                    feed,
                    product_ids: products,
                };
                print_json(&admin.create_bundle(new).await?)
            }
            BundleCommand::Update {
                id,
                title,
                description,
                feed,
                published,
                products,
            } => {
                let patch = BundlePatch {
                    title,
                    description,
                    is_published: published,
                    feed,
                    product_ids: products,
                };
                print_json(&admin.update_bundle(&id, patch).await?)
            }
            BundleCommand::Delete { id } => {
                admin.delete_bundle(&id).await?;
                println!("deleted bundle {}", id);
                Ok(())
            }
        },
        AdminCommand::Settings(cmd) => match cmd {
            SettingsCommand::Get { feed } => {
                print_json(&admin.feed_settings(feed.as_deref()).await?)
            }
            SettingsCommand::Set { feed, avatar_url } => print_json(
                &admin
                    .update_feed_settings(feed.as_deref(), avatar_url.as_deref())
                    .await?,
            ),
        },
        AdminCommand::Sanitize { text } => {
            let raw = if text == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("failed to read link text from stdin")?;
                buf
            } else {
                text
            };
            println!("{}", admin.sanitize_links(&raw).await);
            Ok(())
        }
        AdminCommand::Resolve { urls } => print_json(&admin.resolve_urls(&urls).await),
        AdminCommand::Sweep(args) => print_json(&admin.run_sweep(args.into()).await?),
        AdminCommand::Stats => print_json(&admin.stats().await?),
    }
}

/// Sweep forever on `sweep.interval_secs`; a failed run is logged and the
/// next tick tries again.
async fn watch(catalog: &Catalog, cfg: &config::Config, opts: SweepOptions) -> Result<()> {
    let pool = catalog.pool().clone();
    let client = catalog.pipeline().client();
    let placeholder = cfg.sweep.placeholder_url.trim().to_string();
    let period = Duration::from_secs(cfg.sweep.interval_secs);

    info!(interval_secs = period.as_secs(), mode = opts.mode(), "starting link watch");
    let worker = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match sweep::run_sweep(&pool, client.as_ref(), &placeholder, opts).await {
                Ok(report) => info!(
                    flagged = report.flagged.len(),
                    committed = report.committed,
                    "scheduled sweep done"
                ),
                Err(err) => error!(?err, "scheduled sweep failed"),
            }
        }
    });
    worker.await.context("link watch task ended")?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
