//! Quadtodo - four-quadrant to-do lists with per-item time tracking.
//!
//! # Commands
//!
//! - `quadtodo list`: Show one or all quadrants
//! - `quadtodo add | done | rm | rename`: Edit items
//! - `quadtodo start | stop`: Start or stop an item's timer; a started timer
//!   keeps running between invocations
//! - `quadtodo track`: Start an item and show its timer live until Ctrl+C
//! - `quadtodo signup | login | logout | whoami`: Manage the remote account
//!
//! # Environment Variables
//!
//! See [`quadtodo_core::config`] for available configuration options.

mod board;
mod render;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use quadtodo_core::{
    AnyBackend, AuthClient, Category, Config, FileStore, KeyValueStore, ListContext,
    ListController, SessionHandle, SystemClock, TickEvent, TokioScheduler,
};

use crate::board::{resolve, Board};
use crate::render::{render_list, write_tick};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

/// Quadtodo - four-quadrant to-do lists with time tracking.
///
/// Items live in one of four urgency x importance quadrants. Each quadrant
/// can time one item at a time.
#[derive(Parser, Debug)]
#[command(name = "quadtodo")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
QUADRANTS:
    important-urgent, important-not-urgent,
    not-important-urgent, not-important-not-urgent

ITEMS:
    Select an item by its row number from 'list' or by an id prefix.

ENVIRONMENT VARIABLES:
    QUADTODO_BACKEND               local or remote (default: local)
    QUADTODO_DATA_DIR              Data directory (default: ~/.quadtodo)
    QUADTODO_SERVER_URL            Object store URL (required for remote)
    QUADTODO_APP_ID                Application id (required with a server URL)
    QUADTODO_API_KEY               REST API key (optional)
    QUADTODO_TICK_INTERVAL_MS      Timer refresh interval (default: 1000)
    QUADTODO_REQUEST_TIMEOUT_SECS  HTTP request timeout (default: 30)
    RUST_LOG                       Log filter (default: info)

EXAMPLES:
    # Add an item and time it
    quadtodo add important-urgent Write the quarterly report
    quadtodo track important-urgent 1

    # Use the remote object store
    export QUADTODO_BACKEND=remote
    export QUADTODO_SERVER_URL=https://parse.example.com/parse
    export QUADTODO_APP_ID=quadtodo
    quadtodo login alice
    quadtodo list
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show the items of one quadrant, or of all four.
    List {
        /// Quadrant to show.
        category: Option<Category>,
    },

    /// Add an item to a quadrant.
    Add {
        category: Category,

        /// Item name; several words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Toggle an item between open and done.
    ///
    /// A running item is stopped first and its time credited.
    Done { category: Category, item: String },

    /// Delete an item.
    ///
    /// A running item is stopped first and its time credited.
    Rm { category: Category, item: String },

    /// Rename an item.
    Rename {
        category: Category,
        item: String,

        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Start timing an item, stopping the quadrant's running item.
    ///
    /// The timer keeps running after the command exits; 'stop' credits the
    /// time spent.
    Start { category: Category, item: String },

    /// Stop timing an item and credit the elapsed time.
    Stop { category: Category, item: String },

    /// Start timing an item and show the timer until Ctrl+C.
    ///
    /// On exit the session is stopped and saved.
    Track { category: Category, item: String },

    /// Create an account on the remote object store and log in.
    Signup {
        username: String,

        #[arg(short, long)]
        email: Option<String>,

        /// Password; prompted for when omitted.
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Log in to the remote object store.
    Login {
        username: String,

        /// Password; prompted for when omitted.
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Log out and forget the saved session.
    Logout,

    /// Show the logged-in user.
    Whoami,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli.command))
}

/// Shared state for one invocation.
struct App {
    config: Config,
    session: SessionHandle,
    auth: Option<AuthClient>,
}

impl App {
    /// Loads configuration and restores any saved login.
    fn new() -> Result<Self> {
        let config = Config::from_env().context("Failed to load configuration")?;

        debug!(
            backend = %config.backend,
            data_dir = %config.data_dir.display(),
            "Configuration loaded"
        );

        let auth = match &config.remote {
            Some(remote) => {
                let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.data_dir));
                let client = AuthClient::new(remote)
                    .context("Failed to create HTTP client")?
                    .with_persistence(store);
                Some(client)
            }
            None => None,
        };
        let session = auth
            .as_ref()
            .map(AuthClient::session)
            .unwrap_or_default();

        Ok(Self {
            config,
            session,
            auth,
        })
    }

    fn auth(&self) -> Result<&AuthClient> {
        match &self.auth {
            Some(auth) => Ok(auth),
            None => bail!("Accounts need a remote server; set QUADTODO_SERVER_URL and QUADTODO_APP_ID"),
        }
    }

    /// A board whose ticks go to `ticks`, if given.
    fn board(&self, ticks: Option<mpsc::UnboundedSender<TickEvent>>) -> Result<Board<AnyBackend>> {
        let backend = AnyBackend::from_config(&self.config, self.session.clone())
            .context("Failed to open storage")?;
        let scheduler = TokioScheduler::current().context("No tokio runtime")?;

        let mut context = ListContext::new(Arc::new(SystemClock), Arc::new(scheduler))
            .with_tick_interval(self.config.tick_interval);
        if let Some(sender) = ticks {
            context = context.with_tick_channel(sender);
        }
        Ok(Board::new(Arc::new(backend), context))
    }
}

async fn run(command: Command) -> Result<()> {
    let app = App::new()?;

    match command {
        Command::List { category } => run_list(&app, category).await,
        Command::Add { category, name } => {
            let board = app.board(None)?;
            let mut list = board.open(category).await?;
            list.add(&name.join(" ")).await.context("Failed to add item")?;
            print_list(&list);
            Ok(())
        }
        Command::Done { category, item } => edit(&app, category, &item, Edit::Toggle).await,
        Command::Rm { category, item } => edit(&app, category, &item, Edit::Remove).await,
        Command::Rename {
            category,
            item,
            name,
        } => edit(&app, category, &item, Edit::Rename(name.join(" "))).await,
        Command::Start { category, item } => edit(&app, category, &item, Edit::Start).await,
        Command::Stop { category, item } => edit(&app, category, &item, Edit::Stop).await,
        Command::Track { category, item } => run_track(&app, category, &item).await,
        Command::Signup {
            username,
            email,
            password,
        } => {
            let password = password_or_prompt(password)?;
            let identity = app
                .auth()?
                .sign_up(&username, &password, email.as_deref())
                .await
                .context("Sign-up failed")?;
            println!("Signed up and logged in as {}", identity.username);
            Ok(())
        }
        Command::Login { username, password } => {
            let password = password_or_prompt(password)?;
            let identity = app
                .auth()?
                .log_in(&username, &password)
                .await
                .context("Login failed")?;
            println!("Logged in as {}", identity.username);
            Ok(())
        }
        Command::Logout => {
            app.auth()?.log_out().await.context("Logout failed")?;
            println!("Logged out");
            Ok(())
        }
        Command::Whoami => {
            match app.auth.as_ref().and_then(AuthClient::current_user) {
                Some(identity) => match &identity.email {
                    Some(email) => println!("{} <{}>", identity.username, email),
                    None => println!("{}", identity.username),
                },
                None => println!("Not logged in"),
            }
            Ok(())
        }
    }
}

/// A change to one selected item.
#[derive(Debug)]
enum Edit {
    Toggle,
    Remove,
    Rename(String),
    Start,
    Stop,
}

/// Opens `category`, resolves `item`, applies `edit` and prints the list.
async fn edit(app: &App, category: Category, item: &str, edit: Edit) -> Result<()> {
    let board = app.board(None)?;
    let mut list = board.open(category).await?;
    let id = resolve(&list.rows(), item)?;

    match edit {
        Edit::Toggle => list.toggle_done(&id).await,
        Edit::Remove => list.remove(&id).await,
        Edit::Rename(name) => list.rename(&id, &name).await,
        Edit::Start => list.start(&id).await,
        Edit::Stop => list.stop(&id).await,
    }
    .with_context(|| format!("Failed to update item '{item}'"))?;

    print_list(&list);
    Ok(())
}

async fn run_list(app: &App, category: Option<Category>) -> Result<()> {
    let board = app.board(None)?;
    match category {
        Some(category) => print_list(&board.open(category).await?),
        None => {
            let lists = board.open_all().await?;
            for (index, list) in lists.iter().enumerate() {
                if index > 0 {
                    println!();
                }
                print_list(list);
            }
        }
    }
    Ok(())
}

/// Runs the live timer until a shutdown signal, then saves the session.
async fn run_track(app: &App, category: Category, item: &str) -> Result<()> {
    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<TickEvent>();
    let board = app.board(Some(tick_tx))?;
    let mut list = board.open(category).await?;
    let id = resolve(&list.rows(), item)?;
    list.start(&id).await.context("Failed to start timer")?;

    let name = list
        .active_item()
        .map(|item| item.name.clone())
        .unwrap_or_default();
    info!(category = %category, item_id = %id, "Tracking. Press Ctrl+C to stop.");
    draw_tick(&list, &name);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                println!();
                info!("Shutdown signal received");
                break;
            }

            Some(event) = tick_rx.recv() => {
                if event.item_id == id {
                    draw_tick(&list, &name);
                }
            }
        }
    }

    match list
        .teardown_with_timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS))
        .await
    {
        Ok(Some(flushed)) => {
            println!(
                "Stopped '{}' after {}s, {}s in total",
                name, flushed.elapsed, flushed.total_time
            );
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            warn!(error = %e, "Session could not be saved");
            eprintln!("'{name}' is still running in storage; run 'quadtodo stop' to credit it.");
            Err(e).context("Failed to save the tracked session")
        }
    }
}

fn draw_tick(list: &ListController<AnyBackend>, name: &str) {
    let seconds = list
        .rows()
        .into_iter()
        .find(|row| row.active)
        .map_or(0, |row| row.display_time);
    if let Err(e) = write_tick(&mut io::stdout(), name, seconds) {
        warn!(error = %e, "Failed to draw timer line");
    }
}

fn print_list(list: &ListController<AnyBackend>) {
    print!("{}", render_list(list.category(), &list.rows()));
}

/// Returns `password`, or reads one line from stdin after a prompt.
fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read password")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// Initializes the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr so they never mix with list output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to listen for Ctrl+C") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => result,
        result = terminate => result,
    }
}
