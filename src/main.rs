//! Gate dashboard - live gate transactions and manual completion
//!
//! Thin client over the facility REST backend. Polls the latest transaction
//! per gate, backfills data missing from incomplete captures and runs the
//! manual completion protocol (submit, open portal, delayed red buzzer).
//!
//! Module structure:
//! - `domain/` - Transaction, Lane, Camera, Status
//! - `io/` - Backend API (trait + reqwest client)
//! - `services/` - Poller, backfill, workflow, pending exits, coordinator
//! - `infra/` - Config, session, metrics

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use gate_dashboard::domain::display::{format_display_time, or_missing, picture_url};
use gate_dashboard::domain::status::{priority, requires_manual_intervention, translate_entry, translate_exit};
use gate_dashboard::domain::types::camera_for_transaction;
use gate_dashboard::domain::{Lane, Transaction, TransactionId};
use gate_dashboard::infra::{Config, Metrics, SessionContext};
use gate_dashboard::io::{GateApi, HttpGateApi, TransactionQuery};
use gate_dashboard::services::backfill::{available_rfid_tags, backfill_from_api, prepare_detail};
use gate_dashboard::services::pending_exit::fetch_pending_exits;
use gate_dashboard::services::{
    CoordinatorOptions, DetailCompletion, GateDashboardCoordinator, GateSnapshot,
    ManualCompletionWorkflow, ManualEntryForm, PendingExitSelection,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Gate dashboard - weighbridge gate operations client
#[derive(Parser, Debug)]
#[command(name = "gate-dashboard", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every gate and log transaction changes until Ctrl+C
    Watch,

    /// List lanes and their cameras
    Lanes,

    /// Page through historical transactions
    Transactions {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        rows: u32,
        /// First day, yyyy-mm-dd
        #[arg(long)]
        from: Option<String>,
        /// Last day, yyyy-mm-dd
        #[arg(long)]
        to: Option<String>,
        /// Plate number (partial match)
        #[arg(long)]
        plate: Option<String>,
        /// Lane name
        #[arg(long)]
        lane: Option<String>,
    },

    /// Show one transaction with its pictures and live-view camera
    Show {
        /// Transaction id
        id: i64,
    },

    /// Show pending exits ranked for a lane
    Pending {
        /// Lane name
        #[arg(long)]
        lane: String,
    },

    /// Register a manual entry (entry lane) or manual exit (exit lane)
    ManualEntry {
        /// Lane name
        #[arg(long)]
        lane: String,
        #[arg(long, default_value = "")]
        dispatch: String,
        #[arg(long, default_value = "")]
        tag: String,
        #[arg(long, default_value = "")]
        plate: String,
        #[arg(long, default_value = "")]
        reason: String,
        /// Exit lanes: transaction to complete instead of the automatic pick
        #[arg(long)]
        transaction: Option<i64>,
    },

    /// Complete the missing data of an existing transaction
    Complete {
        /// Lane name the transaction is shown on
        #[arg(long)]
        lane: String,
        #[arg(long)]
        transaction: i64,
        /// Fields left out keep the (backfilled) transaction's value
        #[arg(long)]
        dispatch: Option<String>,
        #[arg(long)]
        plate: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value = "")]
        reason: String,
    },
}

struct App {
    config: Config,
    api: Arc<dyn GateApi>,
    metrics: Arc<Metrics>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "gate-dashboard starting");

    let config = match &args.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };
    info!(
        config_file = %config.config_file(),
        api_base_url = %config.api_base_url(),
        api_timeout_ms = %config.api_timeout_ms(),
        default_interval_secs = %config.default_interval_secs(),
        auto_refresh = %config.auto_refresh(),
        buzzer_delay_ms = %config.buzzer_delay_ms(),
        "config_loaded"
    );

    let session = Arc::new(SessionContext::new());
    match config.resolve_token()? {
        Some(token) => {
            session.set_token(token);
            if session.is_expired(Utc::now()) {
                warn!("session_token_expired_or_unreadable");
            }
        }
        None => warn!("session_token_missing"),
    }

    let api: Arc<dyn GateApi> = Arc::new(
        HttpGateApi::from_config(&config, session).context("Failed to build HTTP client")?,
    );
    let app = App { config, api, metrics: Arc::new(Metrics::new()) };

    match args.command {
        Command::Watch => watch(&app).await,
        Command::Lanes => lanes(&app).await,
        Command::Transactions { page, rows, from, to, plate, lane } => {
            let lane_id = match lane {
                Some(name) => Some(find_lane(&app, &name).await?.id),
                None => None,
            };
            let query = TransactionQuery {
                page: Some(page.max(1)),
                rows_per_page: Some(rows.max(1)),
                date_from: from.as_deref().map(parse_day).transpose()?,
                date_to: to.as_deref().map(parse_day).transpose()?,
                plate_number: plate,
                lane_id,
            };
            transactions(&app, &query).await
        }
        Command::Show { id } => show(&app, TransactionId(id)).await,
        Command::Pending { lane } => pending(&app, &lane).await,
        Command::ManualEntry { lane, dispatch, tag, plate, reason, transaction } => {
            let form = ManualEntryForm {
                dispatch_id: dispatch,
                tag_id: tag,
                name: lane.clone(),
                plate_number: plate,
                reason,
            };
            manual_entry(&app, &lane, form, transaction.map(TransactionId)).await
        }
        Command::Complete { lane, transaction, dispatch, plate, tag, reason } => {
            complete(&app, &lane, TransactionId(transaction), dispatch, plate, tag, reason).await
        }
    }
}

fn log_snapshot(snapshot: &GateSnapshot, utc_offset_hours: i32) {
    let watched = snapshot.transaction.as_ref().and_then(|tx| tx.status(snapshot.side));
    let rank = watched.map_or(0, priority);
    let manual = watched.is_some_and(requires_manual_intervention);
    match &snapshot.transaction {
        Some(tx) => info!(
            gate = %snapshot.lane_name,
            transaction = %tx.id,
            plate = %or_missing(tx.plate_number.as_deref()),
            dispatch = %or_missing(tx.dispatch_id.as_deref()),
            tag = %or_missing(tx.tag_id.as_deref()),
            entry = %tx.entry_status.as_ref().map_or("-", translate_entry),
            exit = %tx.exit_status.as_ref().map_or("-", translate_exit),
            time = %format_display_time(tx.date_time, utc_offset_hours),
            attention = %snapshot.needs_attention,
            manual = %manual,
            rank = %rank,
            "gate_transaction"
        ),
        None => info!(gate = %snapshot.lane_name, "gate_empty"),
    }
}

async fn watch(app: &App) -> anyhow::Result<()> {
    let mut coordinator = GateDashboardCoordinator::load(
        Arc::clone(&app.api),
        Arc::clone(&app.metrics),
        CoordinatorOptions::from(&app.config),
    )
    .await
    .context("Failed to load lanes")?;

    let utc_offset_hours = app.config.utc_offset_hours();
    for (_, mut rx) in coordinator.subscribe_all() {
        tokio::spawn(async move {
            let mut shown: Option<Option<Transaction>> = None;
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                if snapshot.loaded && shown.as_ref() != Some(&snapshot.transaction) {
                    log_snapshot(&snapshot, utc_offset_hours);
                    shown = Some(snapshot.transaction);
                }
            }
        });
    }

    // Start metrics reporter
    let metrics = Arc::clone(&app.metrics);
    let metrics_interval = app.config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics.report().log();
        }
    });

    coordinator.start();
    info!(gates = %coordinator.len(), refresh_all = %coordinator.refresh_all(), "dashboard_started");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;
    info!("shutdown_signal_received");
    coordinator.dispose();
    app.metrics.report().log();
    Ok(())
}

async fn lanes(app: &App) -> anyhow::Result<()> {
    let lookup = app.api.lane_lookup().await.context("Failed to load lane lookup")?;
    let lanes = app.api.lanes().await.context("Failed to load lanes")?;
    let cameras = app.api.cameras().await.context("Failed to load cameras")?;

    for entry in &lookup {
        let lane = lanes.iter().find(|l| l.id == entry.id);
        let kind = lane.map(Lane::type_label).unwrap_or_default();
        println!("{:>4}  {:<20} {}", entry.id.0, or_missing(entry.name.as_deref()), kind);
        for camera in cameras.iter().filter(|c| c.lane_id == Some(entry.id)) {
            let stream = camera.stream_endpoint().map(|s| s.url).unwrap_or_else(|| "-".to_string());
            println!(
                "      camera {:>3}  {:<15} {:<12} {}",
                camera.id.0,
                or_missing(camera.ip_address.as_deref()),
                or_missing(camera.model.as_deref()),
                stream
            );
        }
    }
    Ok(())
}

/// Validate a `yyyy-mm-dd` day argument
fn parse_day(raw: &str) -> anyhow::Result<String> {
    let day = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date {raw}, expected yyyy-mm-dd"))?;
    Ok(day.format("%Y-%m-%d").to_string())
}

async fn transactions(app: &App, query: &TransactionQuery) -> anyhow::Result<()> {
    let page = app.api.list_transactions(query).await.context("Failed to load transactions")?;
    let offset = app.config.utc_offset_hours();
    for tx in &page.items {
        println!(
            "{:>6}  {}  {:<12} {:<12} {:<12} {:<16} {}",
            tx.id.0,
            format_display_time(tx.date_time, offset),
            or_missing(tx.plate_number.as_deref()),
            or_missing(tx.dispatch_id.as_deref()),
            or_missing(tx.tag_id.as_deref()),
            tx.entry_status.as_ref().map_or("-", translate_entry),
            tx.exit_status.as_ref().map_or("-", translate_exit),
        );
    }
    println!("page {} of {}", query.page.unwrap_or(1), page.total_pages);
    Ok(())
}

async fn show(app: &App, id: TransactionId) -> anyhow::Result<()> {
    let tx = app.api.transaction_detail(id).await.context("Failed to fetch transaction")?;
    let offset = app.config.utc_offset_hours();

    println!("transaction {}", tx.id);
    println!("  plate     {}", or_missing(tx.plate_number.as_deref()));
    println!("  dispatch  {}", or_missing(tx.dispatch_id.as_deref()));
    println!("  tag       {}", or_missing(tx.tag_id.as_deref()));
    println!(
        "  entry     {} {} / {}",
        tx.entry_status.as_ref().map_or("-", translate_entry),
        format_display_time(tx.start_entry_time, offset),
        format_display_time(tx.finish_entry_time, offset),
    );
    println!(
        "  exit      {} {} / {}",
        tx.exit_status.as_ref().map_or("-", translate_exit),
        format_display_time(tx.start_exit_time, offset),
        format_display_time(tx.finish_exit_time, offset),
    );
    if let Some(reason) = &tx.reason {
        println!("  reason    {reason}");
    }
    for picture in &tx.pictures {
        println!("  picture   {}", picture_url(app.config.api_base_url(), picture.id));
    }

    // Stream parameters come from the camera's own record
    let cameras = app.api.cameras().await.context("Failed to load cameras")?;
    if let Some(listed) = camera_for_transaction(&cameras, &tx) {
        let camera = app.api.camera(listed.id).await.context("Failed to fetch camera")?;
        let stream = camera.stream_endpoint().map(|s| s.url).unwrap_or_else(|| "-".to_string());
        println!("  camera    {} {}", camera.id, stream);
    }
    Ok(())
}

async fn find_lane(app: &App, name: &str) -> anyhow::Result<Lane> {
    let lanes = app.api.lanes().await.context("Failed to load lanes")?;
    lanes
        .into_iter()
        .find(|l| l.display_name() == name)
        .with_context(|| format!("Unknown lane {name}"))
}

async fn pending(app: &App, lane_name: &str) -> anyhow::Result<()> {
    let lane = find_lane(app, lane_name).await?;
    let pending = fetch_pending_exits(app.api.as_ref(), app.config.rows_per_page(), Some(lane.id))
        .await
        .context("Failed to load pending exits")?;

    let offset = app.config.utc_offset_hours();
    for tx in &pending.candidates {
        let marker = if Some(tx.id) == pending.auto_selected { "*" } else { " " };
        println!(
            "{marker} {:>6}  {:<12} {:<12} {:<10} lane {:<4} {}",
            tx.id.0,
            or_missing(tx.plate_number.as_deref()),
            or_missing(tx.dispatch_id.as_deref()),
            tx.exit_status.as_ref().map_or("-", translate_exit),
            tx.exit_lane_id.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            format_display_time(tx.start_exit_time, offset),
        );
    }
    if pending.auto_selected.is_none() {
        println!("no automatic selection");
    }
    Ok(())
}

async fn manual_entry(
    app: &App,
    lane_name: &str,
    form: ManualEntryForm,
    transaction: Option<TransactionId>,
) -> anyhow::Result<()> {
    let lane = find_lane(app, lane_name).await?;
    let workflow = ManualCompletionWorkflow::new(Arc::clone(&app.api), Arc::clone(&app.metrics))
        .with_buzzer_delay(Duration::from_millis(app.config.buzzer_delay_ms()));

    let mut selection = PendingExitSelection::new(Some(lane.id));
    if lane.is_exit() {
        let page = app
            .api
            .list_transactions(&TransactionQuery::bulk(app.config.rows_per_page()))
            .await
            .context("Failed to load pending transactions")?;
        selection.reload(&page.items);
        if let Some(id) = transaction {
            if !selection.select(id) {
                anyhow::bail!("Transaction {id} is not pending exit");
            }
        }
    }

    let outcome = workflow.register_manual_event(&lane, &form, selection.selected()).await?;
    println!("{}", outcome.message);
    outcome.settle().await;

    // Show what the gate reports now
    match app.api.latest_transaction(&lane.display_name()).await {
        Ok(Some(tx)) => println!("latest: {} {}", tx.id, or_missing(tx.plate_number.as_deref())),
        Ok(None) => println!("latest: -"),
        Err(e) => warn!(lane = %lane_name, error = %e, "gate_fetch_failed"),
    }
    Ok(())
}

async fn complete(
    app: &App,
    lane_name: &str,
    id: TransactionId,
    dispatch: Option<String>,
    plate: Option<String>,
    tag: Option<String>,
    reason: String,
) -> anyhow::Result<()> {
    let lane = find_lane(app, lane_name).await?;
    let detail = app.api.transaction_detail(id).await.context("Failed to fetch transaction")?;

    // Start from what the gate card would show when it is this transaction
    let shown = match app.api.latest_transaction(&lane.display_name()).await {
        Ok(Some(shown)) if shown.id == id => Some(shown),
        Ok(_) => None,
        Err(e) => {
            warn!(lane = %lane_name, error = %e, "gate_fetch_failed");
            None
        }
    };
    let tx = match shown {
        Some(shown) => {
            let shown = backfill_from_api(app.api.as_ref(), shown, app.config.rows_per_page(), &app.metrics).await;
            prepare_detail(&shown, detail)
        }
        None => backfill_from_api(app.api.as_ref(), detail, app.config.rows_per_page(), &app.metrics).await,
    };

    if let Ok(cameras) = app.api.cameras().await {
        if let Some(camera) = camera_for_transaction(&cameras, &tx) {
            let stream = camera.stream_endpoint().map(|s| s.url).unwrap_or_else(|| "-".to_string());
            println!("camera {}: {}", camera.id, stream);
        }
    }

    let mut form = DetailCompletion::prefilled(&tx);
    form.reason = reason;
    if let Some(dispatch) = dispatch {
        form.dispatch_id = dispatch;
    }
    if let Some(plate) = plate {
        form.plate_number = plate;
    }
    if let Some(tag) = tag {
        form.tag_id = tag;
    }
    if form.tag_id.is_empty() {
        if let Ok(page) = app.api.list_transactions(&TransactionQuery::bulk(app.config.rows_per_page())).await {
            println!("available tags: {}", available_rfid_tags(&page.items, Some(&tx)).join(", "));
        }
    }

    let workflow = ManualCompletionWorkflow::new(Arc::clone(&app.api), Arc::clone(&app.metrics))
        .with_buzzer_delay(Duration::from_millis(app.config.buzzer_delay_ms()));
    let outcome = workflow.complete_details(&lane, &tx, &form).await?;
    println!("{}", outcome.message);
    outcome.settle().await;
    Ok(())
}
