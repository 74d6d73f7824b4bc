//! Tierline CLI - Database migrations and order management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! tl-cli migrate
//!
//! # Wait for the order created by a paid checkout session
//! tl-cli order reconcile cs_test_123 --base-url http://127.0.0.1:3000
//!
//! # Record fulfillment progress
//! tl-cli order set-status 42 shipped --tracking 1Z999AA10123456784
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `order reconcile` - Poll the storefront until a session's order exists
//! - `order set-status` - Move an order through its fulfillment states

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

use tierline_core::OrderStatus;

mod commands;

#[derive(Parser)]
#[command(name = "tl-cli")]
#[command(author, version, about = "Tierline CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Inspect and manage orders
    Order {
        #[command(subcommand)]
        action: OrderAction,
    },
}

#[derive(Subcommand)]
enum OrderAction {
    /// Wait for the order of a paid checkout session and print it
    Reconcile {
        /// Payment processor checkout session id
        session_id: String,

        /// Storefront base URL
        #[arg(long, env = "STOREFRONT_BASE_URL", default_value = "http://127.0.0.1:3000")]
        base_url: String,
    },
    /// Change an order's fulfillment status
    SetStatus {
        /// Order id
        id: i32,

        /// New status (`processing`, `shipped`, `delivered`, `cancelled`)
        status: OrderStatus,

        /// Carrier tracking number
        #[arg(long)]
        tracking: Option<String>,

        /// Internal notes
        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Order { action } => match action {
            OrderAction::Reconcile {
                session_id,
                base_url,
            } => commands::order::reconcile(&session_id, &base_url).await?,
            OrderAction::SetStatus {
                id,
                status,
                tracking,
                notes,
            } => commands::order::set_status(id, status, tracking, notes).await?,
        },
    }
    Ok(())
}
