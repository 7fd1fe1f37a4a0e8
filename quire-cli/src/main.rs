//! Quire command-line client
//!
//! Browses and acts on the blogging API through the Quire resource store:
//! reads are cached and coalesced, writes are applied optimistically and
//! rolled back if the server refuses.
//!
//! Usage:
//!   quire login --email ada@example.com --password ...
//!   quire articles --search rust --sort newest
//!   quire bookmark 66e5c5e67c08e2d53d08bd9a
//!   quire publish "Ownership" --description ... --content-file post.md
//!
//! The session token is kept in `--session-file` between runs.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use quire_client::api::collections;
use quire_client::{ArticleDraft, BlogApi, ClientError, Credentials, SignUp};
use quire_store::{MutationHandle, SearchResults, SessionStatus, SortOrder, StoreEvent};
use quire_cli::{
    article_line, clear_session, load_config, load_session, notification_line, outcome_line,
    save_session,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(about = "Command-line client for the blogging API")]
struct Args {
    /// Path to a JSON client config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// Where the session token is kept between runs
    #[arg(long, default_value = "quire-session.json")]
    session_file: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and keep the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    SignUp {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the session token
    Logout,
    /// List articles
    Articles {
        /// Only titles/descriptions containing this text
        #[arg(short, long)]
        search: Option<String>,
        /// Only articles in this category ("All" for every category)
        #[arg(long)]
        category: Option<String>,
        #[arg(long, value_enum)]
        sort: Option<Sort>,
    },
    /// Show one article and its related articles
    Article { id: String },
    /// Filter articles as you type, one line per keystroke state
    Search,
    /// Show the signed-in profile
    Profile,
    /// Show an author and their articles
    Author { user_id: String },
    /// Publish an article, optionally into a community
    Publish {
        title: String,
        #[arg(long)]
        description: String,
        /// File holding the article body
        #[arg(long)]
        content_file: PathBuf,
        #[arg(long)]
        image: Option<String>,
        #[arg(long = "category")]
        categories: Vec<String>,
        /// Post into this community instead
        #[arg(long)]
        community: Option<String>,
    },
    /// Bookmark an article
    Bookmark { article_id: String },
    /// Add an article to the library
    Library { article_id: String },
    /// Follow a user
    Follow { user_id: String },
    /// Unfollow a user
    Unfollow { user_id: String },
    /// List notifications, or act on one
    Notifications {
        /// Mark this notification as read
        #[arg(long, conflicts_with = "delete")]
        read: Option<String>,
        /// Delete this notification
        #[arg(long)]
        delete: Option<String>,
    },
    /// Show a community and its posts
    Community {
        id: String,
        /// Join the community
        #[arg(long)]
        join: bool,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Comment on an article
    Comment { article_id: String, text: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Sort {
    Newest,
    MostViewed,
}

impl From<Sort> for SortOrder {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Newest => SortOrder::Newest,
            Sort::MostViewed => SortOrder::MostViewed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let config = load_config(args.config.as_deref(), args.base_url.clone())?;
    let api = BlogApi::connect(&config).context("Failed to build HTTP client")?;
    debug!("Using API at {}", config.base_url);

    if let Some(session) = load_session(&args.session_file)? {
        api.store().session().login(session);
        if api.store().session().status() == SessionStatus::Expired {
            warn!("Saved session has expired; run `quire login`");
        }
    }

    match run(&api, &args).await {
        Err(e) if e.downcast_ref::<ClientError>().is_some_and(ClientError::is_unauthorized) => {
            bail!("{e}\nNot signed in or the session expired; run `quire login`")
        }
        other => other,
    }
}

async fn run(api: &BlogApi, args: &Args) -> Result<()> {
    match &args.command {
        Command::Login { email, password } => {
            let session = api.login(&Credentials::new(email, password)).await?;
            save_session(&args.session_file, &session)?;
            println!("Logged in until {}", session.expires_at);
        }
        Command::SignUp {
            first_name,
            last_name,
            email,
            password,
        } => {
            let form = SignUp::new(first_name, last_name, email.as_str(), password.as_str());
            match api.sign_up(&form).await? {
                Some(session) => {
                    save_session(&args.session_file, &session)?;
                    println!("Signed up; logged in until {}", session.expires_at);
                }
                None => println!("Signed up; run `quire login`"),
            }
        }
        Command::Logout => {
            api.logout();
            if clear_session(&args.session_file)? {
                println!("Logged out");
            } else {
                println!("No saved session");
            }
        }
        Command::Articles {
            search,
            category,
            sort,
        } => {
            api.articles().await?;
            let mut results = api
                .store()
                .search()
                .filter(&collections::all_articles(), search.as_deref().unwrap_or(""));
            if let Some(category) = category {
                results = results.in_category(category.as_str());
            }
            let entries = match sort {
                Some(sort) => results.sorted((*sort).into()),
                None => results.iter().cloned().collect(),
            };
            for entry in &entries {
                println!("{}", article_line(entry));
            }
            let total = api
                .store()
                .cache()
                .collection_entries(&collections::all_articles())
                .len();
            info!("{} of {} articles", entries.len(), total);
        }
        Command::Article { id } => {
            let article = api.article(id).await?;
            println!("{}", serde_json::to_string_pretty(&article)?);
            let categories: Vec<String> = article["categories"]
                .as_array()
                .map(|c| c.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            if !categories.is_empty() {
                println!("\nRelated:");
                for entry in api.related_articles(&categories).await? {
                    if entry.key.id() != id.as_str() {
                        println!("  {}", article_line(&entry));
                    }
                }
            }
        }
        Command::Search => search(api).await?,
        Command::Profile => {
            let profile = api.profile().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Author { user_id } => {
            let author = api.author(user_id).await?;
            println!("{}", serde_json::to_string_pretty(&author)?);
            for entry in api.articles_by_author(user_id).await? {
                println!("  {}", article_line(&entry));
            }
        }
        Command::Publish {
            title,
            description,
            content_file,
            image,
            categories,
            community,
        } => {
            let content = std::fs::read_to_string(content_file)
                .with_context(|| format!("Failed to read {}", content_file.display()))?;
            let mut draft = ArticleDraft::new(title, description, content);
            if let Some(image) = image {
                draft = draft.with_image(image);
            }
            for category in categories {
                draft = draft.with_category(category);
            }
            let created = match community {
                Some(id) => api.post_to_community(id, &draft).await?,
                None => api.create_article(&draft).await?,
            };
            match created {
                Some(entry) => println!("Published {}", article_line(&entry)),
                None => println!("Published"),
            }
        }
        Command::Bookmark { article_id } => {
            settle("bookmark", api.bookmark(article_id).await?).await?;
        }
        Command::Library { article_id } => {
            settle("library", api.add_to_library(article_id).await?).await?;
        }
        Command::Follow { user_id } => {
            settle("follow", api.follow(user_id).await?).await?;
        }
        Command::Unfollow { user_id } => {
            settle("unfollow", api.unfollow(user_id).await?).await?;
        }
        Command::Notifications { read, delete } => {
            if let Some(id) = read {
                api.notifications().await?;
                settle("mark as read", api.mark_notification_read(id)?).await?;
            } else if let Some(id) = delete {
                api.notifications().await?;
                let outcome = api.delete_notification(id).await?;
                println!("{}", outcome_line("delete", &outcome));
            } else {
                for entry in api.notifications().await? {
                    println!("{}", notification_line(&entry));
                }
            }
        }
        Command::Community { id, join, search } => {
            let community = api.community(id).await?;
            println!("{}", community["name"].as_str().unwrap_or(id));
            if *join {
                settle("join", api.join_community(id).await?).await?;
            }
            api.community_posts(id).await?;
            let results = api
                .store()
                .search()
                .filter(&collections::community_posts(id), search.as_deref().unwrap_or(""));
            for entry in results.iter() {
                println!("  {}", article_line(entry));
            }
        }
        Command::Comment { article_id, text } => {
            settle("comment", api.comment(article_id, text).await?).await?;
        }
    }
    Ok(())
}

async fn settle(what: &str, handle: MutationHandle) -> Result<()> {
    debug!("Waiting for {} on {}", what, handle.key());
    let outcome = handle.settled().await?;
    println!("{}", outcome_line(what, &outcome));
    Ok(())
}

/// Reads stdin line by line and prints the matches once typing pauses.
async fn search(api: &BlogApi) -> Result<()> {
    api.articles().await?;
    let _watch = api.store().spawn_session_watch();
    let mut events = api.store().subscribe_events();
    let mut search = api.store().debounced_search(collections::all_articles());
    let mut results = search.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) => search.input(text),
                None => break,
            },
            changed = results.changed() => {
                changed?;
                print_results(results.borrow_and_update().as_ref());
            }
            event = events.recv() => match event {
                Ok(StoreEvent::SessionExpired) => warn!("Session expired"),
                Ok(StoreEvent::FetchFailed(e)) => warn!("Refresh failed: {}", e),
                Ok(_) => {}
                Err(e) => debug!("Event stream: {}", e),
            },
        }
    }

    // Input ended mid-debounce: wait for the last search to land.
    let quiet = api.store().config().debounce() * 2;
    if let Ok(Ok(())) = tokio::time::timeout(quiet, results.changed()).await {
        print_results(results.borrow_and_update().as_ref());
    }
    Ok(())
}

fn print_results(found: Option<&SearchResults>) {
    if let Some(found) = found {
        println!("-- {:?}: {} match(es)", found.query(), found.len());
        for entry in found.iter() {
            println!("  {}", article_line(entry));
        }
    }
}
