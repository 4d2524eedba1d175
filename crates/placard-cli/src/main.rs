//! Placard CLI - display session coordination for inspection crews

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use placard_core::application::Services;
use placard_core::config::Config;
use placard_core::domain::actor::{Actor, Role};
use placard_core::domain::directory::{Directory, User};
use placard_core::domain::session::{
    Applied, Day, DayStatus, NewDay, NewSession, Session, SessionStatus, SessionUpdate, SlotIndex,
};
use placard_core::storage::{Database, DatabaseConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;


#[derive(Parser)]
#[command(name = "placard")]
#[command(author, version, about = "Display session coordination for inspection crews", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Act as this directory user
    #[arg(long = "as", global = true, value_name = "USER_ID")]
    as_user: Option<Uuid>,

    /// Database file (overrides database.path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage display sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Claim and work display days
    Day {
        #[command(subcommand)]
        action: DayAction,
    },

    /// Manage directory users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage work schedule assignments
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Run the daily transition
    Scheduler {
        #[command(subcommand)]
        action: SchedulerAction,
    },

    /// Show the audit trail of a session or day
    History {
        /// Session or day ID
        id: Uuid,
        #[arg(short, long)]
        limit: Option<i32>,
    },

    /// Show notifications for the acting user
    Notifications {
        /// Only unread notifications
        #[arg(long)]
        unread: bool,
        /// Mark all notifications read after listing
        #[arg(long)]
        mark_read: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session
    Create {
        /// Period in YYYY-MM form
        #[arg(short, long)]
        period: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Day as DATE:NOTICES, repeated in display order
        #[arg(long = "day", value_name = "DATE:NOTICES", required = true)]
        days: Vec<String>,
    },
    /// Show session details
    Show { id: Uuid },
    /// List sessions
    List {
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long)]
        limit: Option<i32>,
    },
    /// Update a session
    Update {
        id: Uuid,
        #[arg(short, long)]
        period: Option<String>,
        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        /// Replacement day set; days with claims are kept
        #[arg(long = "day", value_name = "DATE:NOTICES")]
        days: Vec<String>,
    },
    /// Delete a session and its days
    Delete { id: Uuid },
}

#[derive(Subcommand)]
enum DayAction {
    /// List days open for claims
    Available {
        /// Reference date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List days the acting inspector holds
    Mine,
    /// Show day details
    Show { id: Uuid },
    /// Claim the first free slot
    Claim { id: Uuid },
    /// Release a slot
    Unclaim {
        id: Uuid,
        #[arg(short, long)]
        slot: Option<u8>,
    },
    /// Place an inspector into a slot
    Assign {
        id: Uuid,
        #[arg(short, long)]
        inspector: Uuid,
        #[arg(short, long)]
        slot: u8,
    },
    /// Mark a day completed
    Complete {
        id: Uuid,
        #[arg(short, long)]
        observations: Option<String>,
    },
    /// List users eligible for assignment
    ControlUsers {
        #[arg(short, long)]
        department: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Add a user
    Add {
        name: String,
        #[arg(short, long)]
        role: String,
        #[arg(short, long)]
        department: Option<String>,
    },
    /// List users
    List,
    /// Deactivate a user
    Deactivate { id: Uuid },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Record that a user works on a date
    Add { user: Uuid, date: NaiveDate },
}

#[derive(Subcommand)]
enum SchedulerAction {
    /// Run the transition once
    Run {
        /// Date to transition (defaults to today in the configured calendar)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run the transition every day until interrupted
    Serve,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so `--format json` output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("placard=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Config { action } = cli.command {
        return cmd_config(action, cli.quiet);
    }

    let config = Config::load()?;
    let mut db_config = DatabaseConfig::from_settings(&config.database);
    if let Some(path) = cli.database.clone() {
        db_config.path = path;
    }
    let db = Database::new(db_config).await?;
    let services = Services::new(&db, config);
    let ctx = Context {
        services,
        format: cli.format,
        quiet: cli.quiet,
        as_user: cli.as_user,
    };

    let result = match cli.command {
        Commands::Session { action } => cmd_session(&ctx, action).await,
        Commands::Day { action } => cmd_day(&ctx, action).await,
        Commands::User { action } => cmd_user(&ctx, action).await,
        Commands::Schedule { action } => cmd_schedule(&ctx, action).await,
        Commands::Scheduler { action } => cmd_scheduler(&ctx, action).await,
        Commands::History { id, limit } => cmd_history(&ctx, id, limit).await,
        Commands::Notifications { unread, mark_read } => {
            cmd_notifications(&ctx, unread, mark_read).await
        }
        Commands::Doctor => cmd_doctor(&ctx, &db).await,
        Commands::Config { .. } => Ok(()),
    };

    db.close().await;
    result
}

fn report_error(error: &anyhow::Error) {
    match error.downcast_ref::<placard_core::Error>() {
        Some(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", error),
    }
}

/// Shared state for one CLI invocation
struct Context {
    services: Services,
    format: OutputFormat,
    quiet: bool,
    as_user: Option<Uuid>,
}

impl Context {
    /// Resolve `--as` against the directory
    async fn actor(&self) -> anyhow::Result<Actor> {
        let id = self
            .as_user
            .ok_or_else(|| anyhow::anyhow!("This command needs an acting user. Pass --as <user-id>."))?;
        let user = self
            .services
            .directory
            .get_user(id)
            .await?
            .ok_or(placard_core::Error::UserNotFound(id))?;
        if !user.active {
            anyhow::bail!("User {} is inactive", user.name);
        }
        Ok(user.actor())
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn print_json(&self, value: &impl serde::Serialize) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

// ============================================================================
// Argument Parsing
// ============================================================================

/// Parse `DATE:NOTICES` day arguments; order follows position
fn parse_days(args: &[String]) -> anyhow::Result<Vec<NewDay>> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            let (date, count) = arg
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("Invalid day '{}' (expected DATE:NOTICES)", arg))?;
            let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Invalid date in '{}': {}", arg, e))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid notice count in '{}': {}", arg, e))?;
            Ok(NewDay::new(date, (i + 1) as u32, count))
        })
        .collect()
}

fn parse_slot(number: u8) -> anyhow::Result<SlotIndex> {
    SlotIndex::from_number(number)
        .ok_or_else(|| anyhow::anyhow!("Slot must be 1 or 2, got {}", number))
}

fn parse_role(role: &str) -> anyhow::Result<Role> {
    Role::from_str(role).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown role '{}' (expected admin, manager, inspector or staff)",
            role
        )
    })
}

fn parse_session_status(status: &str) -> anyhow::Result<SessionStatus> {
    SessionStatus::from_str(status)
        .ok_or_else(|| anyhow::anyhow!("Unknown session status '{}'", status))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_session(ctx: &Context, action: SessionAction) -> anyhow::Result<()> {
    let sessions = &ctx.services.sessions;
    match action {
        SessionAction::Create {
            period,
            description,
            days,
        } => {
            let actor = ctx.actor().await?;
            let mut spec = NewSession::new(period, parse_days(&days)?);
            if let Some(description) = description {
                spec = spec.with_description(description);
            }
            let session = sessions.create(&actor, spec).await?;
            if ctx.json() {
                ctx.print_json(&session)?;
            } else if ctx.quiet {
                println!("{}", session.id);
            } else {
                println!("Session created successfully!");
                print_session(&session);
            }
        }
        SessionAction::Show { id } => {
            let session = sessions.get(id).await?;
            if ctx.json() {
                ctx.print_json(&session)?;
            } else {
                print_session(&session);
            }
        }
        SessionAction::List { status, limit } => {
            let status = status.as_deref().map(parse_session_status).transpose()?;
            let list = sessions.list(status, limit).await?;
            if ctx.json() {
                ctx.print_json(&list)?;
            } else if list.is_empty() {
                if !ctx.quiet {
                    println!("No sessions found.");
                    println!("\nCreate one with: placard session create --period <YYYY-MM> --day <DATE:NOTICES>");
                }
            } else {
                if !ctx.quiet {
                    println!("Sessions:");
                }
                for s in list {
                    println!(
                        "  {} - {} [{}] {} day(s)",
                        s.id,
                        s.period,
                        s.status,
                        s.days.len()
                    );
                }
            }
        }
        SessionAction::Update {
            id,
            period,
            description,
            clear_description,
            days,
        } => {
            let actor = ctx.actor().await?;
            let update = SessionUpdate {
                period,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                days: if days.is_empty() {
                    None
                } else {
                    Some(parse_days(&days)?)
                },
            };
            let session = sessions.update(&actor, id, update).await?;
            if ctx.json() {
                ctx.print_json(&session)?;
            } else if !ctx.quiet {
                println!("Session updated.");
                print_session(&session);
            }
        }
        SessionAction::Delete { id } => {
            let actor = ctx.actor().await?;
            sessions.delete(&actor, id).await?;
            if ctx.json() {
                ctx.print_json(&serde_json::json!({ "deleted": id }))?;
            } else if !ctx.quiet {
                println!("Session '{}' deleted.", id);
            }
        }
    }
    Ok(())
}

async fn cmd_day(ctx: &Context, action: DayAction) -> anyhow::Result<()> {
    let market = &ctx.services.marketplace;
    match action {
        DayAction::Available { date } => {
            let today = match date {
                Some(date) => date,
                None => ctx.services.scheduler()?.calendar().today(),
            };
            let days = market.list_available(today).await?;
            print_days(ctx, &days, "No days open for claims.")?;
        }
        DayAction::Mine => {
            let actor = ctx.actor().await?;
            let days = market.list_mine(actor.id).await?;
            print_days(ctx, &days, "You hold no slots.")?;
        }
        DayAction::Show { id } => {
            let day = market.get_day(id).await?;
            if ctx.json() {
                ctx.print_json(&day)?;
            } else {
                print_day(&day);
            }
        }
        DayAction::Claim { id } => {
            let actor = ctx.actor().await?;
            let applied = market.claim(id, &actor).await?;
            print_applied(ctx, &applied, "Claimed")?;
        }
        DayAction::Unclaim { id, slot } => {
            let actor = ctx.actor().await?;
            let slot = slot.map(parse_slot).transpose()?;
            let applied = market.unclaim(id, &actor, slot).await?;
            print_applied(ctx, &applied, "Released")?;
        }
        DayAction::Assign {
            id,
            inspector,
            slot,
        } => {
            let actor = ctx.actor().await?;
            let applied = market
                .admin_assign(id, &actor, inspector, parse_slot(slot)?)
                .await?;
            print_applied(ctx, &applied, "Assigned")?;
        }
        DayAction::Complete { id, observations } => {
            let actor = ctx.actor().await?;
            let applied = market.complete(id, &actor, observations).await?;
            print_applied(ctx, &applied, "Completed")?;
        }
        DayAction::ControlUsers { department } => {
            let users = market.list_control_users(department.as_deref()).await?;
            print_users(ctx, &users)?;
        }
    }
    Ok(())
}

async fn cmd_user(ctx: &Context, action: UserAction) -> anyhow::Result<()> {
    let directory = &ctx.services.directory;
    match action {
        UserAction::Add {
            name,
            role,
            department,
        } => {
            let user = User::new(name, parse_role(&role)?, department);
            directory.add_user(&user).await?;
            if ctx.json() {
                ctx.print_json(&user)?;
            } else if ctx.quiet {
                println!("{}", user.id);
            } else {
                println!("Added user {} ({})", user.name, user.id);
            }
        }
        UserAction::List => {
            let users = directory.list_users().await?;
            print_users(ctx, &users)?;
        }
        UserAction::Deactivate { id } => {
            directory.set_active(id, false).await?;
            if !ctx.quiet {
                println!("User '{}' deactivated.", id);
            }
        }
    }
    Ok(())
}

async fn cmd_schedule(ctx: &Context, action: ScheduleAction) -> anyhow::Result<()> {
    match action {
        ScheduleAction::Add { user, date } => {
            ctx.services
                .directory
                .add_schedule_assignment(user, date)
                .await?;
            if !ctx.quiet {
                println!("Scheduled {} on {}", user, date);
            }
        }
    }
    Ok(())
}

async fn cmd_scheduler(ctx: &Context, action: SchedulerAction) -> anyhow::Result<()> {
    match action {
        SchedulerAction::Run { date } => {
            let report = match date {
                Some(date) => ctx.services.job.run(date).await?,
                None => ctx.services.scheduler()?.run_once().await?,
            };
            if ctx.json() {
                ctx.print_json(&report)?;
            } else {
                println!("Daily transition for {}", report.date);
                println!("  Promoted: {}", report.promoted.len());
                println!("  Skipped: {}", report.skipped.len());
                println!("  Unstaffed: {}", report.unstaffed.len());
                for day_id in &report.unstaffed {
                    println!("    [!!] {} has no full crew", day_id);
                }
                for failure in &report.failures {
                    println!("    [!!] {} failed: {}", failure.day_id, failure.error);
                }
            }
            if !report.failures.is_empty() {
                anyhow::bail!("{} day(s) failed to transition", report.failures.len());
            }
        }
        SchedulerAction::Serve => {
            if !ctx.services.config().scheduler.enabled {
                anyhow::bail!(
                    "The scheduler is disabled. Enable it with: placard config set scheduler.enabled true"
                );
            }
            let scheduler = ctx.services.scheduler()?;
            let cancel = CancellationToken::new();
            let handle = scheduler.spawn(cancel.clone());
            info!("Scheduler running, press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            info!("Shutting down scheduler");
            cancel.cancel();
            handle.await?;
        }
    }
    Ok(())
}

async fn cmd_history(ctx: &Context, id: Uuid, limit: Option<i32>) -> anyhow::Result<()> {
    let entries = ctx.services.history.list_for_id(id, limit).await?;
    if ctx.json() {
        return ctx.print_json(&entries);
    }
    if entries.is_empty() {
        println!("No history for {}.", id);
        return Ok(());
    }
    for entry in entries {
        let actor = entry
            .actor_id
            .map(|a| a.to_string())
            .unwrap_or_else(|| "system".to_string());
        println!(
            "  {} {} {} by {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.entity_type,
            entry.action,
            actor
        );
    }
    Ok(())
}

async fn cmd_notifications(ctx: &Context, unread: bool, mark_read: bool) -> anyhow::Result<()> {
    let actor = ctx.actor().await?;
    let outbox = &ctx.services.outbox;
    let notifications = outbox.list_for(actor.id, unread).await?;

    if ctx.json() {
        ctx.print_json(&notifications)?;
    } else if notifications.is_empty() {
        if !ctx.quiet {
            println!("No notifications.");
        }
    } else {
        for n in &notifications {
            let marker = if n.read { " " } else { "*" };
            println!("{} [{}] {}: {}", marker, n.kind, n.title, n.message);
        }
    }

    if mark_read {
        let marked = outbox.mark_all_read(actor.id).await?;
        if !ctx.quiet && !ctx.json() {
            println!("Marked {} notification(s) read.", marked);
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(ctx: &Context, db: &Database) -> anyhow::Result<()> {
    let mut all_ok = true;

    if !ctx.quiet {
        println!("Placard Health Check");
        println!("====================");
        println!();
    }

    match db.health_check().await {
        Ok(()) => println!("[OK] Database: {}", db.path().display()),
        Err(e) => {
            all_ok = false;
            println!("[!!] Database: {:#}", e);
        }
    }

    match db.migration_status().await {
        Ok(status) if !status.needs_migration => {
            println!("[OK] Schema: version {}", status.current_version)
        }
        Ok(status) => {
            all_ok = false;
            println!(
                "[!!] Schema: version {} (expected {})",
                status.current_version, status.target_version
            );
        }
        Err(e) => {
            all_ok = false;
            println!("[!!] Schema: {:#}", e);
        }
    }

    match ctx.services.scheduler() {
        Ok(scheduler) => println!(
            "[OK] Scheduler: today is {} ({})",
            scheduler.calendar().today(),
            if ctx.services.config().scheduler.enabled {
                "enabled"
            } else {
                "disabled"
            }
        ),
        Err(e) => {
            all_ok = false;
            println!("[!!] Scheduler: {}", e);
        }
    }

    if !all_ok {
        anyhow::bail!("Health check found problems");
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_session(session: &Session) {
    println!("Session: {}", session.period);
    println!("  ID: {}", session.id);
    println!("  Status: {}", session.status);
    if let Some(desc) = &session.description {
        println!("  Description: {}", desc);
    }
    println!(
        "  Updated: {}",
        session.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Days:");
    for day in &session.days {
        println!("    {}", day_line(day));
    }
}

fn print_day(day: &Day) {
    println!("Day {} of session {}", day.day_order, day.session_id);
    println!("  ID: {}", day.id);
    println!("  Date: {}", day.display_date);
    println!("  Status: {}", day.status());
    println!("  Notices: {}", day.notice_count);
    for slot in SlotIndex::ALL {
        match day.slots().get(slot) {
            Some(occupant) => println!(
                "  {}: {} (since {})",
                slot,
                occupant.inspector_id,
                occupant.claimed_at.format("%Y-%m-%d %H:%M")
            ),
            None => println!("  {}: free", slot),
        }
    }
    if let Some(completion) = day.completion() {
        println!("  Completed by: {}", completion.completed_by);
        if let Some(observations) = &completion.observations {
            println!("  Observations: {}", observations);
        }
    }
}

fn day_line(day: &Day) -> String {
    let free = 2 - day.slots().occupied_count();
    let slots = if day.status() == DayStatus::Open {
        format!(", {} slot(s) free", free)
    } else {
        String::new()
    };
    format!(
        "#{} {} {} [{}]{}",
        day.day_order,
        day.display_date,
        day.id,
        day.status(),
        slots
    )
}

fn print_days(ctx: &Context, days: &[Day], empty: &str) -> anyhow::Result<()> {
    if ctx.json() {
        return ctx.print_json(&days);
    }
    if days.is_empty() {
        if !ctx.quiet {
            println!("{}", empty);
        }
        return Ok(());
    }
    for day in days {
        println!("  {}", day_line(day));
    }
    Ok(())
}

fn print_applied(ctx: &Context, applied: &Applied, verb: &str) -> anyhow::Result<()> {
    if ctx.json() {
        return ctx.print_json(&serde_json::json!({
            "day": applied.day,
            "action": applied.action.as_str(),
            "session_status": applied.status.current,
        }));
    }
    if !ctx.quiet {
        println!("{} {}", verb, day_line(&applied.day));
        if applied.status.changed() {
            println!(
                "  Session status: {} -> {}",
                applied.status.previous, applied.status.current
            );
        }
    }
    Ok(())
}

fn print_users(ctx: &Context, users: &[User]) -> anyhow::Result<()> {
    if ctx.json() {
        return ctx.print_json(&users);
    }
    if users.is_empty() {
        if !ctx.quiet {
            println!("No users found.");
        }
        return Ok(());
    }
    for user in users {
        println!(
            "  {} - {} ({}{}){}",
            user.id,
            user.name,
            user.role,
            user.department
                .as_deref()
                .map(|d| format!(", {}", d))
                .unwrap_or_default(),
            if user.active { "" } else { " [inactive]" }
        );
    }
    Ok(())
}
