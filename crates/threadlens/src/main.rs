//! # threadlens
//!
//! Command line front end for the Reddit thread-analysis backend. Submits a
//! query over WebSocket, streams the transcript to stdout as it arrives, and
//! browses the per-user session history over HTTP.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::debug;

use threadlens_client::{ControllerConfig, SessionController, WsConnector};
use threadlens_core::session::{
    Message, QueryParams, RepeatInterval, Role, SessionState, SortOrder,
};
use threadlens_history::{HistoryClient, HistoryStore};
use threadlens_settings::{Settings, load_settings};

#[derive(Debug, Parser)]
#[command(name = "threadlens", about = "Ask questions about Reddit threads")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit one analysis query and stream the transcript until it finishes.
    Ask {
        /// Subreddit to search (without the `r/` prefix).
        #[arg(long)]
        subreddit: String,

        /// Keyword to match posts against.
        #[arg(long)]
        keyword: String,

        /// Number of posts to analyze (1-25).
        #[arg(long)]
        limit: Option<u8>,

        /// Post ordering: `hot`, `new`, `top`, or `relevance`.
        #[arg(long)]
        sort: Option<String>,

        /// Re-run the query on a schedule, e.g. `--repeat-hours 6`.
        #[arg(long)]
        repeat_hours: Option<u32>,

        /// Minute component of the repeat schedule.
        #[arg(long)]
        repeat_minutes: Option<u32>,

        /// Suppress per-comment progress narration.
        #[arg(long, default_value_t = false)]
        quiet: bool,

        /// The question to answer from the matched threads.
        question: String,
    },

    /// List past sessions, or print one session's transcript.
    History {
        /// Session id to hydrate and print instead of the listing.
        #[arg(long)]
        select: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = load_settings().context("failed to load settings")?;
    threadlens_settings::apply_env_overrides(&mut settings, std::env::vars());
    debug!(ws_url = %settings.server.ws_url, api_url = %settings.server.api_url, "settings loaded");

    match args.command {
        Command::Ask {
            subreddit,
            keyword,
            limit,
            sort,
            repeat_hours,
            repeat_minutes,
            quiet,
            question,
        } => {
            let sort_name = sort.unwrap_or_else(|| settings.query.sort_order.clone());
            let sort_order = SortOrder::from_str(&sort_name).map_err(|e| anyhow::anyhow!(e))?;
            let repeat = match (repeat_hours, repeat_minutes) {
                (None, None) => None,
                (hours, minutes) => Some(RepeatInterval {
                    hours: hours.unwrap_or(0),
                    minutes: minutes.unwrap_or(0),
                }),
            };
            let params = QueryParams {
                subreddit,
                keyword,
                question,
                limit: limit.unwrap_or(settings.query.limit),
                sort_order,
                repeat,
            };
            run_ask(&settings, params, quiet).await
        }
        Command::History { select } => run_history(&settings, select.as_deref()).await,
    }
}

async fn run_ask(settings: &Settings, params: QueryParams, quiet: bool) -> Result<()> {
    let connector = WsConnector::new(&settings.server.ws_url, settings.auth.token.clone());
    let history = Arc::new(HistoryStore::new());
    let (tap, mut messages) = tokio::sync::mpsc::unbounded_channel();
    let config = ControllerConfig {
        emit_progress: settings.client.emit_progress && !quiet,
        message_tap: Some(tap),
    };
    let mut controller = SessionController::new(connector, history, config);

    controller.submit(params).await?;
    let printer = tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            print_message(&message);
        }
    });
    let state = controller.run().await;
    drop(controller);
    printer.await.context("transcript printer task failed")?;

    match state {
        SessionState::Completed | SessionState::Closed => Ok(()),
        SessionState::Failed => bail!("session failed"),
        other => bail!("session ended in unexpected state {other:?}"),
    }
}

async fn run_history(settings: &Settings, select: Option<&str>) -> Result<()> {
    let client = HistoryClient::new(&settings.server.api_url, settings.auth.token.clone());
    let store = HistoryStore::new();
    store.refresh(&client).await;

    match select {
        Some(id) => {
            let entry = store
                .select(id, &client)
                .await
                .with_context(|| format!("no session with id `{id}`"))?;
            println!("{}: {}", entry.key, entry.title);
            for message in &entry.transcript {
                print_message(message);
            }
        }
        None => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("No past sessions.");
            }
            for entry in entries {
                println!("{}  {}  {}", entry.key, entry.created_at, entry.title);
            }
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    let prefix = match message.role {
        Role::User => "you",
        Role::Assistant => "analysis",
        Role::System => "status",
    };
    println!("[{prefix}] {}", message.content);
    if let Some(sources) = &message.sources {
        for url in sources {
            println!("         source: {url}");
        }
    }
}
