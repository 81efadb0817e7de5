//! Cart Guard CLI
//!
//! Inspect a cart for rule violations, rehearse a correction cycle against an
//! in-memory copy, or correct a live cart.
//!
//! ## Usage
//!
//! ```bash
//! # What is wrong with this cart?
//! cart-guard check --file cart.json --trigger 10
//!
//! # Run a full cycle in memory, with a product form on the page
//! cart-guard simulate --file cart.json --form 300=4
//!
//! # Correct a live cart
//! CART_GUARD_BASE_URL=https://shop.example.com cart-guard resolve --trigger 10
//! ```

use std::path::{Path, PathBuf};

use cart_guard::{
    evaluate, plan, CartGuard, CartPayload, CartSnapshot, GuardConfig, ItemAdded, LogHooks,
    MemoryCartService, ProductForm, ProductId, RestCartService, VariantId,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cart-guard")]
#[command(about = "Keep a cart consistent with its incompatibility and quantity rules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a cart file and print the violations and the correction plan
    Check {
        /// Cart JSON, as returned by the cart read endpoint
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        trigger: TriggerArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a full cycle against an in-memory copy of a cart file
    Simulate {
        /// Cart JSON, as returned by the cart read endpoint
        #[arg(short, long)]
        file: PathBuf,

        #[command(flatten)]
        trigger: TriggerArg,

        /// Product form on the page, as VARIANT or VARIANT=QUANTITY (repeatable)
        #[arg(long = "form", value_parser = parse_form)]
        forms: Vec<ProductForm>,

        /// Guard configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run a cycle against a live cart endpoint
    Resolve {
        /// Guard configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        trigger: TriggerArg,

        /// Evaluate and plan only, write nothing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args, Debug)]
struct TriggerArg {
    /// Product that was just added, if known
    #[arg(short, long)]
    trigger: Option<u64>,
}

impl TriggerArg {
    fn event(&self) -> ItemAdded {
        ItemAdded {
            product_id: self.trigger.map(ProductId),
        }
    }
}

fn parse_form(raw: &str) -> Result<ProductForm, String> {
    let (variant, value) = match raw.split_once('=') {
        Some((variant, value)) => (variant, Some(value)),
        None => (raw, None),
    };

    let variant: u64 = variant
        .trim()
        .parse()
        .map_err(|_| format!("invalid variant id: {:?}", variant))?;
    let form = ProductForm::new(VariantId(variant));

    match value {
        Some(value) => {
            let value: u32 = value
                .trim()
                .parse()
                .map_err(|_| format!("invalid quantity: {:?}", value))?;
            Ok(form.with_value(value))
        }
        None => Ok(form),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr, reports to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cart_guard=info,cart_guard_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Check {
            file,
            trigger,
            json,
        } => check(&file, trigger.event(), json),
        Command::Simulate {
            file,
            trigger,
            forms,
            config,
        } => simulate(&file, trigger.event(), forms, config.as_deref()).await,
        Command::Resolve {
            config,
            trigger,
            dry_run,
        } => resolve(config.as_deref(), trigger.event(), dry_run).await,
    }
}

fn load_cart(path: &Path) -> Result<CartPayload, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read cart file {}: {}", path.display(), e))?;
    let payload = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse cart JSON: {}", e))?;
    Ok(payload)
}

/// Config file (or defaults) with environment overrides applied
fn load_config(path: Option<&Path>) -> Result<GuardConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => GuardConfig::from_file(path)?,
        None => GuardConfig::default(),
    };

    if let Ok(base_url) = std::env::var("CART_GUARD_BASE_URL") {
        config.cart.base_url = base_url;
    }

    if let Ok(raw) = std::env::var("CART_GUARD_TIMEOUT_MS") {
        let ms: u64 = raw
            .parse()
            .map_err(|_| format!("CART_GUARD_TIMEOUT_MS is not a number: {:?}", raw))?;
        config.cart.timeout_ms = Some(ms);
    }

    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn check(file: &Path, event: ItemAdded, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = CartSnapshot::from_payload(load_cart(file)?);
    let violations = evaluate(&snapshot, event.product_id);
    let plan = plan(&violations);

    if json {
        return print_json(&serde_json::json!({
            "violations": violations,
            "plan": plan,
        }));
    }

    println!("Cart: {} line(s), {} item(s)", snapshot.len(), snapshot.item_count());

    if violations.is_empty() {
        println!("No violations.");
        return Ok(());
    }

    for conflict in &violations.conflicts {
        println!(
            "  incompatible: \"{}\" removed, \"{}\" kept (lines {:?})",
            conflict.removed_title,
            conflict.kept_title,
            conflict.removed_lines.iter().map(|l| l.0).collect::<Vec<_>>()
        );
    }
    for clamp in violations.clamps.values() {
        println!(
            "  over limit: line {} \"{}\" {} > {}",
            clamp.line, clamp.title, clamp.quantity, clamp.limit
        );
    }

    println!("Plan:");
    for action in plan.actions() {
        println!("  {:?}", action);
    }

    Ok(())
}

async fn simulate(
    file: &Path,
    event: ItemAdded,
    forms: Vec<ProductForm>,
    config: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => GuardConfig::from_file(path)?,
        None => GuardConfig::default(),
    };
    let service = std::sync::Arc::new(MemoryCartService::from_payload(load_cart(file)?));
    let guard = CartGuard::with_hooks(config, service.clone(), LogHooks::with_forms(forms));

    let outcome = guard.trigger(event).await;

    print_json(&serde_json::json!({
        "cycles": outcome.reports(),
        "writes": service.writes().await,
        "cart": service.items().await,
    }))
}

async fn resolve(
    config: Option<&Path>,
    event: ItemAdded,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config)?;
    let service = RestCartService::new(&config.cart)?;
    tracing::info!(cart_url = service.cart_url(), dry_run, "Resolving live cart");

    let guard = CartGuard::with_hooks(config, service, LogHooks::new());

    if dry_run {
        let (violations, plan) = guard.check(event).await?;
        return print_json(&serde_json::json!({
            "violations": violations,
            "plan": plan,
        }));
    }

    let outcome = guard.trigger(event).await;
    print_json(&outcome.reports())
}
