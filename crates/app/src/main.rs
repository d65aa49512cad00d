use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use buds_core::model::{
    ChildId, ChildProfileDraft, EndTrigger, ModuleId, ParentId, RoundTally, ScoringInput,
    SessionOutcome,
};
use clap::{Args, Parser, Subcommand};
use services::{AppServices, Clock, PipelineConfig, SessionContext};
use storage::remote::HttpStoreConfig;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Offline-first progress pipeline for BrightBuds learning sessions.
#[derive(Parser, Debug)]
#[command(name = "brightbuds", version, about)]
struct Cli {
    /// Local SQLite database (path or sqlite URL).
    #[arg(
        long = "db",
        global = true,
        env = "BRIGHTBUDS_DB_URL",
        default_value = "sqlite://brightbuds.sqlite3"
    )]
    db_url: String,

    /// Base URL of the remote document store. Without it sessions are only queued.
    #[arg(long, global = true, env = "BRIGHTBUDS_REMOTE_URL")]
    remote_url: Option<String>,

    #[arg(long, global = true, env = "BRIGHTBUDS_REMOTE_TOKEN", hide_env_values = true)]
    remote_token: Option<String>,

    /// Seconds before a remote request is abandoned.
    #[arg(long, global = true, env = "BRIGHTBUDS_REMOTE_TIMEOUT_SECS", default_value_t = 10)]
    remote_timeout_secs: u64,

    /// Seconds between background drain passes.
    #[arg(long, global = true, env = "BRIGHTBUDS_SYNC_INTERVAL_SECS", default_value_t = 60)]
    sync_interval_secs: u64,

    /// Modules counted by the rollup progress percentage.
    #[arg(long, global = true, env = "BRIGHTBUDS_TOTAL_MODULES", default_value_t = 7)]
    total_modules: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the five child slots of a parent.
    #[command(subcommand)]
    Children(ChildrenCommand),
    /// Record one finished module session.
    Record(RecordArgs),
    /// Set a module's completion percentage.
    Complete(CompleteArgs),
    /// Run one drain pass over unsynced rows and the retry queue.
    Sync,
    /// Drain on an interval until interrupted.
    Worker,
    /// Print report view-models as JSON.
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Subcommand, Debug)]
enum ChildrenCommand {
    /// Create any missing placeholder slots.
    Init {
        #[arg(long)]
        parent: String,
    },
    List {
        #[arg(long)]
        parent: String,
    },
    Edit(EditArgs),
    /// Restore a slot to its placeholder values.
    Reset(SlotArgs),
    /// Push a profile to the remote store.
    Publish(SlotArgs),
}

#[derive(Args, Debug)]
struct SlotArgs {
    #[arg(long)]
    parent: String,
    #[arg(long)]
    slot: u8,
}

#[derive(Args, Debug)]
struct EditArgs {
    #[command(flatten)]
    target: SlotArgs,
    #[arg(long)]
    name: String,
    #[arg(long)]
    age: u8,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long = "level")]
    learning_level: Option<String>,
    #[arg(long)]
    avatar: Option<String>,
    /// Custom word for the word builder; repeat for more.
    #[arg(long = "word")]
    words: Vec<String>,
}

#[derive(Args, Debug)]
struct SessionTarget {
    #[arg(long)]
    parent: String,
    #[arg(long)]
    child: String,
    /// Stable module id, e.g. `match_letter` or `abc_song`.
    #[arg(long)]
    module: ModuleId,
}

#[derive(Args, Debug)]
struct RecordArgs {
    #[command(flatten)]
    target: SessionTarget,
    #[arg(long, default_value_t = 0)]
    correct: u32,
    #[arg(long, default_value_t = 0)]
    incorrect: u32,
    #[arg(long)]
    duration_ms: u64,
    /// Song length, used to judge how much of it was watched.
    #[arg(long)]
    media_duration_ms: Option<u64>,
    /// Score reported by the screen itself, for completion-scored modules.
    #[arg(long)]
    score: Option<u32>,
    #[arg(long)]
    all_photos_viewed: bool,
}

#[derive(Args, Debug)]
struct CompleteArgs {
    #[command(flatten)]
    target: SessionTarget,
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
    percentage: u32,
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    Child {
        #[arg(long)]
        child: String,
    },
    Parent {
        #[arg(long)]
        parent: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brightbuds=info,services=info,storage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;

    let config = PipelineConfig {
        total_modules: cli.total_modules,
        sync_interval: Duration::from_secs(cli.sync_interval_secs.max(1)),
        ..PipelineConfig::default()
    };
    let remote = cli
        .remote_url
        .as_deref()
        .map(|url| {
            HttpStoreConfig::new(url)
                .with_token(cli.remote_token.clone())
                .with_timeout(Duration::from_secs(cli.remote_timeout_secs.max(1)))
        });
    if remote.is_none() {
        info!("no remote store configured; sessions are queued locally");
    }

    let app = AppServices::new_sqlite(&db_url, remote, Clock::default_clock(), config)
        .await
        .with_context(|| format!("failed to open services on {db_url}"))?;

    match cli.command {
        Command::Children(cmd) => children(&app, cmd).await,
        Command::Record(args) => record(&app, args).await,
        Command::Complete(args) => complete(&app, args).await,
        Command::Sync => {
            let drain = app.drain();
            let report = drain.drain_once(drain.batch_size()).await?;
            println!(
                "pushed {} failed {} skipped {}",
                report.pushed, report.failed, report.skipped
            );
            Ok(())
        }
        Command::Worker => worker(&app).await,
        Command::Report(cmd) => report(&app, cmd).await,
    }
}

async fn children(app: &AppServices, cmd: ChildrenCommand) -> Result<()> {
    let service = app.children();
    match cmd {
        ChildrenCommand::Init { parent } => {
            let profiles = service.ensure_default_slots(&parent_id(&parent)?).await?;
            print_json(&profiles)
        }
        ChildrenCommand::List { parent } => {
            let profiles = service.list_children(&parent_id(&parent)?).await?;
            print_json(&profiles)
        }
        ChildrenCommand::Edit(args) => {
            let child = slot_id(&args.target)?;
            let draft = ChildProfileDraft {
                name: args.name,
                age: args.age,
                gender: args.gender,
                learning_level: args.learning_level,
                avatar: args.avatar,
                words: args.words,
            };
            let profile = service
                .update_profile(&child, draft)
                .await
                .with_context(|| format!("could not update {child}"))?;
            print_json(&profile)
        }
        ChildrenCommand::Reset(target) => {
            let profile = service.reset_slot(&slot_id(&target)?).await?;
            print_json(&profile)
        }
        ChildrenCommand::Publish(target) => {
            let child = slot_id(&target)?;
            let saved = service.publish(&child).await?;
            println!("{child}: {saved:?}");
            Ok(())
        }
    }
}

async fn record(app: &AppServices, args: RecordArgs) -> Result<()> {
    let (parent_id, child_id) = session_ids(&args.target)?;
    let module = args.target.module;
    let tally = RoundTally {
        correct: args.correct,
        incorrect: args.incorrect,
        rounds: args.correct,
        all_photos_viewed: args.all_photos_viewed,
    };
    let input = ScoringInput {
        elapsed_ms: args.duration_ms,
        media_duration_ms: args.media_duration_ms,
        supplied_score: args.score,
    };
    let ended_at_ms = Clock::default_clock().now_millis();
    let elapsed = i64::try_from(args.duration_ms).context("--duration-ms is too large")?;

    let outcome = SessionOutcome {
        parent_id,
        child_id,
        module,
        started_at_ms: ended_at_ms.saturating_sub(elapsed),
        ended_at_ms,
        trigger: EndTrigger::Finished,
        tally,
        scored: module.scoring().evaluate(&tally, &input),
        word_builder: None,
    };
    let saved = app.recorder().record(&outcome).await?;
    println!(
        "{} {}: score {} stars {} completed {} ({saved:?})",
        outcome.child_id,
        module,
        outcome.scored.score.value(),
        outcome.scored.stars,
        outcome.scored.completed,
    );
    Ok(())
}

async fn complete(app: &AppServices, args: CompleteArgs) -> Result<()> {
    let (parent_id, child_id) = session_ids(&args.target)?;
    let ctx = SessionContext::new(parent_id, child_id);
    let saved = app
        .progress()
        .set_completion_percentage(&ctx, args.target.module, args.percentage)
        .await?;
    println!("{}: {saved:?}", args.target.module);
    Ok(())
}

async fn worker(app: &AppServices) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = app.spawn_sync_worker(shutdown_rx);
    info!(interval = ?app.config().sync_interval, "sync worker running; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down sync worker");
    shutdown_tx.send(true).ok();
    handle.await.context("sync worker panicked")?;
    Ok(())
}

async fn report(app: &AppServices, cmd: ReportCommand) -> Result<()> {
    match cmd {
        ReportCommand::Child { child } => {
            let child = ChildId::new(&child).context("invalid --child")?;
            print_json(&app.reports().child_report(&child).await?)
        }
        ReportCommand::Parent { parent } => {
            print_json(&app.reports().parent_overview(&parent_id(&parent)?).await?)
        }
    }
}

fn parent_id(raw: &str) -> Result<ParentId> {
    ParentId::new(raw).context("invalid --parent")
}

fn slot_id(target: &SlotArgs) -> Result<ChildId> {
    let parent = parent_id(&target.parent)?;
    ChildId::for_slot(&parent, target.slot).context("invalid --slot")
}

fn session_ids(target: &SessionTarget) -> Result<(ParentId, ChildId)> {
    let parent = parent_id(&target.parent)?;
    let child = ChildId::new(&target.child).context("invalid --child")?;
    Ok((parent, child))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_owned();
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its directory so the pool can open it.
fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("data/buds.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/buds.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url(" sqlite:///tmp/x.db "),
            "sqlite:///tmp/x.db"
        );
    }

    #[test]
    fn cli_reads_module_ids() {
        let cli = Cli::try_parse_from([
            "brightbuds",
            "record",
            "--parent",
            "p1",
            "--child",
            "p1_child_1",
            "--module",
            "match_letter",
            "--correct",
            "8",
            "--incorrect",
            "2",
            "--duration-ms",
            "45000",
        ])
        .unwrap();
        let Command::Record(args) = cli.command else {
            panic!("expected record");
        };
        assert_eq!(args.target.module, ModuleId::MatchLetter);
        assert_eq!(args.correct, 8);

        let over = Cli::try_parse_from([
            "brightbuds",
            "complete",
            "--parent",
            "p1",
            "--child",
            "p1_child_1",
            "--module",
            "abc_song",
            "--percentage",
            "120",
        ]);
        assert!(over.is_err());
    }
}
