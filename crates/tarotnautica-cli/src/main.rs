//! Tarotnautica CLI - a command line client for the Tarotnautica API.
//!
//! Logs in, keeps the session tokens in the OS keyring (or a token file)
//! and calls the API through the same session layer the app uses.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tarotnautica_core::auth::{FileTokenStore, KeyringTokenStore};
use tarotnautica_core::config::API_URL_ENV;
use tarotnautica_core::models::{CatalogItem, PurchaseOutcome, Reading, ReadingKind};
use tarotnautica_core::{ApiClient, ApiError, Config, RequestOptions, SessionEvent, TokenStorage, TokenStore};

#[derive(Parser, Debug)]
#[command(name = "tarotnautica", version, about = "Command line client for the Tarotnautica API")]
struct Cli {
    /// API base URL (overrides the config file)
    #[arg(long, env = API_URL_ENV)]
    api_url: Option<String>,

    /// Keep tokens in this file instead of the configured store
    #[arg(long)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session tokens
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
    },
    /// Forget the stored session
    Logout,
    /// Show whether a session is stored and when its access token expires
    Status,
    /// Show gems, subscription and remaining readings
    Profile,
    /// Buy gems
    BuyGems { amount: u32 },
    /// Manage the subscription
    Subscription {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
    /// Tarot readings
    Readings {
        #[command(subcommand)]
        action: ReadingAction,
    },
    /// Spells: list a category, show owned, buy
    Spells {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Potions: list a category, show owned, buy (subscription required)
    Potions {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// GET an arbitrary API endpoint and print the JSON body
    Get { endpoint: String },
}

#[derive(Subcommand, Debug)]
enum ReadingAction {
    /// List the available reading types
    Types,
    /// Show past readings
    History,
    /// Draw a reading
    Draw {
        /// Reading type id, as shown by `readings types`
        #[arg(long = "type")]
        reading_type: i64,
        question: String,
    },
}

#[derive(Subcommand, Debug)]
enum CatalogAction {
    List {
        #[arg(long, default_value = "amor")]
        category: String,
    },
    Owned,
    Buy { id: i64 },
}

#[derive(Subcommand, Debug)]
enum SubscriptionAction {
    Activate,
    Cancel,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // RUST_LOG controls the level (e.g. RUST_LOG=tarotnautica_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn token_store(cli: &Cli, config: &Config) -> Result<Arc<dyn TokenStore>> {
    if let Some(path) = &cli.token_file {
        return Ok(Arc::new(FileTokenStore::new(path.clone())));
    }
    Ok(match config.token_storage {
        TokenStorage::Keyring => Arc::new(KeyringTokenStore::new()),
        TokenStorage::File => Arc::new(FileTokenStore::in_dir(config.cache_dir()?)),
    })
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(value) => eprint!("{} [{}]: ", label, value),
        None => eprint!("{}: ", label),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    match (line.is_empty(), default) {
        (true, Some(value)) => Ok(value.to_string()),
        (true, None) => bail!("{} is required", label),
        (false, _) => Ok(line.to_string()),
    }
}

fn print_reading(reading: &Reading) {
    println!("{} - {}", reading.type_name, reading.question);
    for card in &reading.cards {
        let reversed = if card.reversed { " (reversed)" } else { "" };
        println!("  {}{}", card.name, reversed);
    }
    if let Some(text) = reading.interpretation.as_ref().or(reading.general_interpretation.as_ref()) {
        println!("\n{}", text);
    }
    if let Some(advice) = &reading.advice {
        println!("\n{}", advice);
    }
}

fn print_catalog(items: &[CatalogItem], owned: &[i64]) {
    for item in items {
        let mark = if owned.contains(&item.id) { "*" } else { " " };
        println!("{} {:>4}  {:<32} {} gems", mark, item.id, item.title, item.gem_price);
    }
}

fn print_purchase(outcome: PurchaseOutcome) {
    match outcome {
        PurchaseOutcome::Purchased { gems_remaining: Some(gems) } => println!("Purchased. Gems left: {}", gems),
        PurchaseOutcome::Purchased { gems_remaining: None } => println!("Purchased."),
        PurchaseOutcome::AlreadyOwned { message } => {
            println!("{}", message.unwrap_or_else(|| "Already owned.".to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        if e.downcast_ref::<ApiError>().is_some_and(ApiError::is_transient) {
            eprintln!("The server could not be reached right now; try again in a moment.");
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(url) = &cli.api_url {
        config.api_url = url.clone();
    }

    let store = token_store(&cli, &config)?;
    let client = ApiClient::new(&config, store)?;
    let _session_notice = client.events().add_listener(SessionEvent::AuthReset, |_| {
        eprintln!("Session expired. Run `tarotnautica login` to sign in again.");
    });
    info!(api_url = %config.base_url(), "Tarotnautica CLI starting");

    match cli.command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => prompt("Email", config.last_email.as_deref())?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            client.login(&email, &password).await?;

            config.last_email = Some(email);
            config.save().context("Failed to save config")?;
            println!("Logged in.");
        }
        Command::Register { email } => {
            let password = rpassword::prompt_password("Password: ")?;
            let confirm = rpassword::prompt_password("Repeat password: ")?;
            client.register(&email, &password, &confirm).await?;
            println!("Account created. Run `tarotnautica login --email {}` to sign in.", email);
        }
        Command::Logout => {
            client.logout()?;
            println!("Logged out.");
        }
        Command::Status => {
            let status = client.session_status();
            if !status.logged_in {
                println!("Not logged in.");
                return Ok(());
            }
            println!("Logged in to {}", config.base_url());
            match (status.access_expires_at, status.access_expired) {
                (Some(at), expired) => {
                    let at = at.with_timezone(&chrono::Local);
                    let verb = if expired == Some(true) { "expired" } else { "expires" };
                    println!("Access token {} {}", verb, at.format("%Y-%m-%d %H:%M:%S"));
                }
                (None, _) => println!("Access token expiry unknown"),
            }
        }
        Command::Profile => {
            let profile = client.fetch_profile().await?;
            println!("Gems: {}", profile.gems);
            if profile.has_subscription {
                println!("Subscription: active");
                for (label, kind) in [
                    ("Basic", ReadingKind::Basic),
                    ("Clarity", ReadingKind::Clarity),
                    ("Deep", ReadingKind::Deep),
                ] {
                    println!(
                        "  {:<8} {} of {} left",
                        label,
                        profile.readings_remaining(kind),
                        kind.subscription_limit()
                    );
                }
            } else {
                println!("Subscription: none");
            }
        }
        Command::BuyGems { amount } => {
            let balance = client.buy_gems(amount).await?;
            println!("Bought {} gems. Balance: {}", amount, balance.gems);
        }
        Command::Subscription { action } => match action {
            SubscriptionAction::Activate => {
                client.activate_subscription().await?;
                println!("Subscription activated.");
            }
            SubscriptionAction::Cancel => {
                client.cancel_subscription().await?;
                println!("Subscription cancelled.");
            }
        },
        Command::Readings { action } => match action {
            ReadingAction::Types => {
                for kind in client.fetch_reading_types().await? {
                    println!("{:>4}  {:<28} {} gems", kind.id, kind.name, kind.gem_cost);
                }
            }
            ReadingAction::History => {
                let history = client.fetch_reading_history().await?;
                if history.is_empty() {
                    println!("No readings yet.");
                }
                for reading in &history {
                    print_reading(reading);
                    println!();
                }
            }
            ReadingAction::Draw { reading_type, question } => {
                let result = client.perform_reading(reading_type, &question).await?;
                if let Some(message) = &result.message {
                    println!("{}\n", message);
                }
                print_reading(&result.reading);
            }
        },
        Command::Spells { action } => match action {
            CatalogAction::List { category } => {
                let items = client.fetch_spells(&category).await?;
                let owned = client.fetch_owned_spells().await?;
                print_catalog(&items, &owned);
            }
            CatalogAction::Owned => println!("{:?}", client.fetch_owned_spells().await?),
            CatalogAction::Buy { id } => print_purchase(client.buy_spell(id).await?),
        },
        Command::Potions { action } => match action {
            CatalogAction::List { category } => {
                let items = client.fetch_potions(&category).await?;
                let owned = client.fetch_owned_potions().await?;
                print_catalog(&items, &owned);
            }
            CatalogAction::Owned => println!("{:?}", client.fetch_owned_potions().await?),
            CatalogAction::Buy { id } => print_purchase(client.buy_potion(id).await?),
        },
        Command::Get { endpoint } => {
            let endpoint = if endpoint.starts_with('/') {
                endpoint
            } else {
                format!("/{}", endpoint)
            };
            let response = client
                .execute(&endpoint, RequestOptions::get())
                .await
                .error_for_status()?;
            match response.json::<Value>() {
                Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
                Err(_) => println!("{}", response.text()),
            }
        }
    }

    Ok(())
}
