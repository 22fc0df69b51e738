//! tweetlikes-dl CLI - download media from a timeline or likes window.

use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tweetlikes_dl::utils::{DateBound, parse_date_bound};
use tweetlikes_dl::{
    Config, Credentials, DownloadConfig, DownloadRequest, Error, Event, FeedKind, Pipeline, PostId,
    Result, TwitterClient, Window, cancel_on_signal,
};

/// Download the media of a user's timeline or likes.
#[derive(Parser)]
#[command(name = "tweetlikes-dl")]
#[command(about = "Download media attached to a user's posts or likes")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Credentials file (default: per-user config directory)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify and store API credentials
    Authorize {
        /// Application (consumer) key
        consumer_key: String,
        /// Application (consumer) secret
        consumer_secret: String,
        /// User access token
        access_token: String,
        /// User access token secret
        access_token_secret: String,
    },

    /// Download media from a timeline or likes
    Download(DownloadArgs),

    /// Show an account's public profile
    Profile {
        /// Handle, with or without the leading @
        handle: String,
    },
}

#[derive(Args)]
struct DownloadArgs {
    /// Account handle (default: the authorized account)
    #[arg(short, long)]
    username: Option<String>,

    /// Maximum number of posts to collect
    #[arg(short, long, default_value = "1000")]
    count: usize,

    /// Earliest creation date to include
    #[arg(long)]
    since_date: Option<String>,

    /// Latest creation date to include (a bare date covers the whole day)
    #[arg(long)]
    max_date: Option<String>,

    /// Oldest post id to include
    #[arg(long)]
    since_id: Option<u64>,

    /// Newest post id to include
    #[arg(long)]
    max_id: Option<u64>,

    /// Include reposts
    #[arg(short, long)]
    retweet: bool,

    /// Only download media from reposts
    #[arg(long, conflicts_with = "like")]
    retweets_only: bool,

    /// Download from likes instead of the timeline
    #[arg(short, long)]
    like: bool,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Destination template ({id}, {username}, {filename}, {extension}, {url})
    #[arg(short, long, default_value = "{username}/{id}-{filename}")]
    format: String,

    /// Skip media whose destination already exists
    #[arg(long)]
    ignore_existing: bool,

    /// Concurrent downloads
    #[arg(short, long, default_value = "4")]
    jobs: usize,

    /// Do not show progress
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "tweetlikes_dl=info,warn",
        _ => "tweetlikes_dl=debug,info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {}", e.user_message());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let credentials_path = match cli.credentials {
        Some(path) => path,
        None => Credentials::default_path()?,
    };

    match cli.command {
        Commands::Authorize {
            consumer_key,
            consumer_secret,
            access_token,
            access_token_secret,
        } => {
            let credentials = Credentials {
                consumer_key,
                consumer_secret,
                access_token,
                access_token_secret,
            };
            run_authorize(credentials, credentials_path).await
        }
        Commands::Download(args) => run_download(args, credentials_path).await,
        Commands::Profile { handle } => run_profile(&handle, credentials_path).await,
    }
}

async fn run_authorize(credentials: Credentials, path: PathBuf) -> Result<()> {
    let config = Config::default();
    let client = TwitterClient::new(credentials.clone(), &config.feed, &config.retry)?;

    let account = match client.verify_credentials().await {
        Ok(account) => account,
        Err(Error::Unauthorized(_)) => {
            return Err(Error::Other(
                "Unauthorized, check your inputs again.".to_string(),
            ));
        }
        Err(e) => return Err(e),
    };

    credentials.save(&path)?;
    println!(
        "Authorized as @{}. Credentials saved to {}",
        account.handle,
        path.display()
    );
    Ok(())
}

async fn run_profile(handle: &str, credentials_path: PathBuf) -> Result<()> {
    let credentials = Credentials::load(&credentials_path)?;
    let config = Config::default();
    let client = TwitterClient::new(credentials, &config.feed, &config.retry)?;

    let profile = client.profile(handle.trim_start_matches('@')).await?;
    println!("id:        {}", profile.id);
    println!("handle:    @{}", profile.handle);
    println!("name:      {}", profile.name);
    println!("posts:     {}", profile.posts);
    println!("likes:     {}", profile.likes);
    if profile.protected {
        println!("protected: yes");
    }
    Ok(())
}

async fn run_download(args: DownloadArgs, credentials_path: PathBuf) -> Result<()> {
    let window = Window {
        since_id: args.since_id.map(PostId),
        max_id: args.max_id.map(PostId),
        since: args
            .since_date
            .as_deref()
            .map(|d| parse_date_bound(d, DateBound::Lower))
            .transpose()?,
        until: args
            .max_date
            .as_deref()
            .map(|d| parse_date_bound(d, DateBound::Upper))
            .transpose()?,
        limit: args.count,
    };
    let request = DownloadRequest {
        subject: args
            .username
            .map(|u| u.trim_start_matches('@').to_string()),
        kind: if args.like {
            FeedKind::Likes
        } else {
            FeedKind::Timeline
        },
        window,
        include_reposts: args.retweet,
        reposts_only: args.retweets_only,
    };
    let config = Config {
        download: DownloadConfig {
            output_dir: args.output_dir,
            filename_template: args.format,
            ignore_existing: args.ignore_existing,
            max_concurrent_downloads: args.jobs,
            ..DownloadConfig::default()
        },
        ..Config::default()
    };

    let credentials = Credentials::load(&credentials_path)?;
    let client = TwitterClient::new(credentials, &config.feed, &config.retry)?;
    let pipeline = Pipeline::new(Arc::new(client), config)?;

    let progress = (!args.quiet).then(|| spawn_progress(pipeline.subscribe()));
    let cancel = CancellationToken::new();
    let signal_task = cancel_on_signal(cancel.clone());

    let result = pipeline.run(&request, &cancel).await;

    signal_task.abort();
    drop(pipeline);
    if let Some(progress) = progress {
        progress.await.ok();
    }

    let summary = result?;
    println!("{summary}");
    if summary.skipped_permanent + summary.failed > 0 {
        eprintln!("Some media could not be downloaded; rerun with -v for details.");
    }
    Ok(())
}

/// Render pipeline events as a spinner followed by a download bar
fn spawn_progress(mut events: broadcast::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Collecting posts");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut bar: Option<ProgressBar> = None;
        loop {
            match events.recv().await {
                Ok(Event::PageFetched { emitted, .. }) => {
                    spinner.set_message(format!("Collecting posts ({emitted} so far)"));
                }
                Ok(Event::ItemsCollected { count }) => {
                    spinner.set_message(format!("Looking up media for {count} posts"));
                }
                Ok(Event::MediaResolved { count }) => {
                    spinner.finish_and_clear();
                    let pb = ProgressBar::new(count as u64);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("█▓░"),
                    );
                    pb.enable_steady_tick(Duration::from_millis(100));
                    bar = Some(pb);
                }
                Ok(Event::MediaFinished { id, .. }) => {
                    if let Some(pb) = &bar {
                        pb.set_message(format!("post {id}"));
                        pb.inc(1);
                    }
                }
                Ok(Event::Finished { .. }) | Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            }
        }

        spinner.finish_and_clear();
        if let Some(pb) = bar {
            pb.finish_and_clear();
        }
    })
}
