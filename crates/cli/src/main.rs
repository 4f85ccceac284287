//! Komorebi CLI - drive the client state layer from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! komorebi catalog list --category sweets
//!
//! # Cart operations (synced when signed in)
//! KOMOREBI_PASSWORD=... komorebi --email hana@komorebi.jp cart add <product-id>
//! komorebi cart show
//!
//! # Seller notifications
//! KOMOREBI_PASSWORD=... komorebi --email hana@komorebi.jp notifications list
//! ```
//!
//! # Commands
//!
//! - `catalog` - List products and categories
//! - `cart` - Show and edit the cart
//! - `favorites` - Show and edit favorites
//! - `notifications` - Seller notification feed
//! - `outbox` - Inspect and flush pending cart writes
//! - `sell` - Publish a listing
//! - `profile` - Show and edit the signed-in profile

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use komorebi_client::{AppState, KomorebiConfig, SupabaseClient};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "komorebi")]
#[command(author, version, about = "Komorebi marketplace client")]
struct Cli {
    /// Sign in as this account (password read from `KOMOREBI_PASSWORD`)
    #[arg(short, long, global = true)]
    email: Option<String>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Show and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Show and edit favorites (requires --email)
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Seller notification feed (requires --email)
    Notifications {
        #[command(subcommand)]
        action: NotificationsAction,
    },
    /// Pending remote cart writes
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
    /// Publish a product listing (requires --email)
    Sell {
        /// Product name
        #[arg(short, long)]
        name: String,

        /// Price in minor units of the configured currency
        #[arg(short, long)]
        price: i64,

        /// Category slug
        #[arg(short, long)]
        category: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,

        /// Image file to upload
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Show or edit the signed-in profile (requires --email)
    Profile {
        /// New display name
        #[arg(long)]
        display_name: Option<String>,

        /// New bio
        #[arg(long)]
        bio: Option<String>,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List products
    List {
        /// Only products in this category
        #[arg(short, long)]
        category: Option<String>,

        /// Case-insensitive name/vendor search
        #[arg(short, long)]
        search: Option<String>,
    },
    /// List categories
    Categories,
    /// Show one product and its comments
    Show { product_id: String },
    /// Comment on a product (requires --email)
    Comment { product_id: String, text: String },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show items and totals
    Show,
    /// Add one unit of a product
    Add { product_id: String },
    /// Remove a product
    Remove { product_id: String },
    /// Set a quantity (0 or less removes)
    Set {
        product_id: String,
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Empty the cart
    Clear,
    /// Replace the local cart with the remote one (requires --email)
    Pull,
}

#[derive(Subcommand)]
enum FavoritesAction {
    /// List favorites
    List,
    /// Add or remove a favorite
    Toggle { product_id: String },
}

#[derive(Subcommand)]
enum NotificationsAction {
    /// Refresh and list the feed
    List,
    /// Mark one notification read
    Read { id: String },
    /// Mark every notification read
    ReadAll,
}

#[derive(Subcommand)]
enum OutboxAction {
    /// List pending writes
    Show,
    /// Deliver pending writes now, ignoring backoff
    Flush,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &KomorebiConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match KomorebiConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "komorebi_client=info,komorebi_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &KomorebiConfig) -> commands::CommandResult {
    let state: AppState<SupabaseClient> = AppState::from_config(config)?;
    let ctx = commands::Context::new(state, cli.email, cli.json).await?;

    match cli.command {
        Commands::Catalog { action } => match action {
            CatalogAction::List { category, search } => {
                commands::catalog::list(&ctx, category.as_deref(), search.as_deref()).await?;
            }
            CatalogAction::Categories => commands::catalog::categories(&ctx).await?,
            CatalogAction::Show { product_id } => commands::catalog::show(&ctx, &product_id).await?,
            CatalogAction::Comment { product_id, text } => {
                commands::catalog::comment(&ctx, &product_id, &text).await?;
            }
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx)?,
            CartAction::Add { product_id } => commands::cart::add(&ctx, &product_id).await?,
            CartAction::Remove { product_id } => commands::cart::remove(&ctx, &product_id).await?,
            CartAction::Set {
                product_id,
                quantity,
            } => commands::cart::set(&ctx, &product_id, quantity).await?,
            CartAction::Clear => commands::cart::clear(&ctx).await?,
            CartAction::Pull => commands::cart::pull(&ctx).await?,
        },
        Commands::Favorites { action } => match action {
            FavoritesAction::List => commands::favorites::list(&ctx)?,
            FavoritesAction::Toggle { product_id } => {
                commands::favorites::toggle(&ctx, &product_id).await?;
            }
        },
        Commands::Notifications { action } => match action {
            NotificationsAction::List => commands::notifications::list(&ctx)?,
            NotificationsAction::Read { id } => commands::notifications::read(&ctx, &id).await?,
            NotificationsAction::ReadAll => commands::notifications::read_all(&ctx).await?,
        },
        Commands::Outbox { action } => match action {
            OutboxAction::Show => commands::outbox::show(&ctx)?,
            OutboxAction::Flush => commands::outbox::flush(&ctx).await?,
        },
        Commands::Sell {
            name,
            price,
            category,
            description,
            image,
        } => {
            commands::sell::create(
                &ctx,
                commands::sell::SellArgs {
                    name,
                    price,
                    category,
                    description,
                    image,
                },
            )
            .await?;
        }
        Commands::Profile { display_name, bio } => {
            commands::profile::show_or_update(&ctx, display_name, bio).await?;
        }
    }
    Ok(())
}
