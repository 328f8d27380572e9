use clap::{Args, Parser, Subcommand, ValueEnum};
use score_tracker::api::{HttpApi, ScoreApi};
use score_tracker::batch::BatchPage;
use score_tracker::clipboard::SystemClipboard;
use score_tracker::config::{Config, DEFAULT_SERVER_URL};
use score_tracker::errors::ClientError;
use score_tracker::extract::{is_valid_score_code, parse_completion};
use score_tracker::filter::FavoriteFilter;
use score_tracker::models::VideoSource;
use score_tracker::realtime;
use score_tracker::regions::RegionSet;
use score_tracker::render::ScrollPolicy;
use score_tracker::review::{ModalMode, OpenRequest, PreferredMode, Preview, ReviewModal, ReviewOrigin};
use score_tracker::storage::{load_prefs, persist_prefs};
use score_tracker::theme::{detect_system_theme, Theme, ThemeController};
use score_tracker::toast::Toasts;
use score_tracker::tracker::{PlayStatus, TrackerPage};
use score_tracker::ui::{completion_label, star};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "score-tracker", version, about = "Track score completion, favorites, remarks and reviews")]
struct Cli {
    /// Base URL of the score server.
    #[arg(long, global = true, env = "SCORE_TRACKER_URL", default_value = DEFAULT_SERVER_URL)]
    url: String,

    /// Local preferences file (theme, random-pool handoff).
    #[arg(long, global = true, env = "SCORE_TRACKER_PREFS", default_value = "data/prefs.json")]
    prefs: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Follow the clipboard watcher and keep the current code in view.
    Watch,
    Stats,
    /// Recently played scores, newest first.
    History {
        #[arg(long)]
        favorites: bool,
        #[arg(long)]
        codes_only: bool,
        /// Render past the initial cap.
        #[arg(long)]
        all: bool,
    },
    Save {
        code: String,
        completion: String,
    },
    Favorite {
        code: String,
    },
    /// Show a remark, or replace it when TEXT is given.
    Remark {
        code: String,
        text: Option<String>,
    },
    Query(QueryArgs),
    /// Add a remark to every row that has none.
    BatchRemark {
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        remark: String,
    },
    /// Copy a random code from the query results.
    Pick(QueryArgs),
    #[command(subcommand)]
    Review(ReviewCommand),
    Jianshang {
        /// Also exclude the latest harvested codes and re-query.
        #[arg(long)]
        latest: bool,
    },
    /// Store the query filter and its codes for the random pool.
    Pool(QueryArgs),
    Theme {
        #[arg(value_enum)]
        choice: Option<ThemeChoice>,
    },
}

#[derive(Debug, Subcommand)]
enum ReviewCommand {
    Show {
        code: String,
    },
    Add {
        code: String,
        #[arg(long)]
        rating: u8,
        #[arg(long)]
        comment: String,
        #[arg(long, conflicts_with = "video_url", required_unless_present = "video_url")]
        video: Option<PathBuf>,
        /// Link or embed markup.
        #[arg(long)]
        video_url: Option<String>,
    },
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// File of score codes to look up, `-` for stdin.
    #[arg(long)]
    codes: Option<PathBuf>,
    /// File of score codes to leave out.
    #[arg(long)]
    exclude: Option<PathBuf>,
    #[arg(long)]
    include_remark: Option<String>,
    #[arg(long)]
    exclude_remark: Option<String>,
    #[arg(long)]
    min: Option<String>,
    #[arg(long)]
    max: Option<String>,
    #[arg(long, value_enum, default_value_t = FavoriteChoice::All)]
    favorite: FavoriteChoice,
    #[arg(long)]
    incomplete_only: bool,
    #[arg(long)]
    hide_completion: bool,
    #[arg(long)]
    hide_favorite: bool,
    #[arg(long)]
    show_remarks: bool,
    #[arg(long)]
    html: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FavoriteChoice {
    All,
    Only,
    #[value(name = "none")]
    NonFavorites,
}

impl From<FavoriteChoice> for FavoriteFilter {
    fn from(choice: FavoriteChoice) -> Self {
        match choice {
            FavoriteChoice::All => Self::All,
            FavoriteChoice::Only => Self::FavoritesOnly,
            FavoriteChoice::NonFavorites => Self::NonFavoritesOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeChoice {
    Dark,
    Light,
    System,
    Toggle,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli.url, cli.prefs)?;
    let api = HttpApi::new(config.base_url.clone())?;

    match cli.command {
        Command::Watch => watch(api, &config).await?,
        Command::Stats => {
            let stats = api.stats().await?;
            println!(
                "Total records: {}  Songs: {}  Favorites: {}",
                stats.total_records, stats.unique_songs, stats.favorite_songs
            );
        }
        Command::History {
            favorites,
            codes_only,
            all,
        } => {
            let mut page = TrackerPage::new(api, &config.tunables, RegionSet::all());
            page.refresh_history().await?;
            page.set_favorites_only(favorites);
            page.set_codes_only(codes_only);
            if all {
                page.show_all();
            }
            let rendered = page.render_history(ScrollPolicy::Reset).await;
            print!("{}", rendered.to_text(codes_only));
        }
        Command::Save { code, completion } => {
            let code = require_code(&code)?;
            let completion = parse_completion(&completion)
                .ok_or_else(|| ClientError::validation("Completion must be between 0 and 100"))?;
            api.save_completion(code, completion).await?;
            println!("{code}: {completion}%");
        }
        Command::Favorite { code } => {
            let code = require_code(&code)?;
            let is_favorite = api.toggle_favorite(code).await?;
            println!("{code} {}", star(is_favorite));
        }
        Command::Remark { code, text } => {
            let code = require_code(&code)?;
            let remark = match text {
                Some(text) => api.set_remark(code, text.trim()).await?,
                None => api.remark(code).await?,
            };
            println!("{remark}");
        }
        Command::Query(args) => {
            let page = query_page(api, &config, &args).await?;
            print_table(&page, &args);
        }
        Command::BatchRemark { query, remark } => {
            let mut page = query_page(api, &config, &query).await?;
            if page.open_batch_remark() {
                page.remark.text = remark;
                let saved = page.save_remark().await;
                flush(&mut page.remark.toasts);
                if let Err(err) = saved {
                    eprintln!("{}", page.remark.message());
                    return Err(err.into());
                }
            }
            flush(&mut page.toasts);
            print_table(&page, &query);
        }
        Command::Pick(args) => {
            let mut page = query_page(api, &config, &args).await?;
            let picked = page.pick_random(&mut rand::thread_rng(), &mut SystemClipboard);
            flush(&mut page.toasts);
            if let Some(record) = picked {
                println!(
                    "{}  {}  {}  {}",
                    record.score_code,
                    completion_label(record.completion),
                    star(record.is_favorite),
                    record.remark
                );
            }
        }
        Command::Review(command) => review(api, command).await?,
        Command::Jianshang { latest } => {
            let mut page = BatchPage::new(api, &config.tunables, RegionSet::all());
            page.press_jianshang().await?;
            if latest {
                page.press_jianshang().await?;
            }
            flush(&mut page.toasts);
            print!("{}", page.render_text());
        }
        Command::Pool(args) => {
            let page = query_page(api, &config, &args).await?;
            let mut prefs = load_prefs(&config.prefs_path).await;
            let count = page.pool_handoff(&mut prefs);
            persist_prefs(&config.prefs_path, &prefs).await?;
            info!(count, path = %config.prefs_path.display(), "random pool updated");
            println!("Sent {count} codes to the random pool");
        }
        Command::Theme { choice } => {
            let mut prefs = load_prefs(&config.prefs_path).await;
            let mut theme = ThemeController::from_prefs(&prefs, detect_system_theme());
            match choice {
                None => {}
                Some(ThemeChoice::Dark) => theme.set(Some(Theme::Dark)),
                Some(ThemeChoice::Light) => theme.set(Some(Theme::Light)),
                Some(ThemeChoice::System) => theme.set(None),
                Some(ThemeChoice::Toggle) => {
                    theme.toggle();
                }
            }
            if choice.is_some() {
                theme.store_into(&mut prefs);
                persist_prefs(&config.prefs_path, &prefs).await?;
            }
            let source = if theme.follows_system() { " (system)" } else { "" };
            println!("{}{source}", theme.current().as_str());
        }
    }

    Ok(())
}

fn require_code(raw: &str) -> Result<&str, ClientError> {
    let code = raw.trim();
    if !is_valid_score_code(code) {
        return Err(ClientError::validation(format!("{code:?} is not a score code")));
    }
    Ok(code)
}

fn flush(toasts: &mut Toasts) {
    for text in toasts.take_new() {
        eprintln!("{text}");
    }
}

async fn read_codes(path: &Path) -> Result<String, ClientError> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    Ok(fs::read_to_string(path).await?)
}

async fn query_page(
    api: HttpApi,
    config: &Config,
    args: &QueryArgs,
) -> Result<BatchPage<HttpApi>, ClientError> {
    let mut page = BatchPage::new(api, &config.tunables, RegionSet::all());
    if let Some(path) = &args.codes {
        page.inputs.include_codes = read_codes(path).await?;
    }
    if let Some(path) = &args.exclude {
        page.inputs.exclude_codes = read_codes(path).await?;
    }
    page.inputs.include_remark = args.include_remark.clone().unwrap_or_default();
    page.inputs.exclude_remark = args.exclude_remark.clone().unwrap_or_default();
    page.view.incomplete_only = args.incomplete_only;
    page.view.hide_completion = args.hide_completion;
    page.view.hide_favorite = args.hide_favorite;
    page.view.show_all_remarks = args.show_remarks;
    page.set_favorite_filter(args.favorite.into());

    let loaded = page
        .apply_completion_filter(
            args.min.as_deref().unwrap_or_default(),
            args.max.as_deref().unwrap_or_default(),
        )
        .await;
    flush(&mut page.toasts);
    loaded?;
    Ok(page)
}

fn print_table(page: &BatchPage<HttpApi>, args: &QueryArgs) {
    if args.html {
        println!("{}", page.render_html());
    } else {
        print!("{}", page.render_text());
        println!("{} shown, {} matched", page.filtered().len(), page.results().len());
    }
}

async fn review(api: HttpApi, command: ReviewCommand) -> Result<(), ClientError> {
    let mut modal = ReviewModal::new(true);
    match command {
        ReviewCommand::Show { code } => {
            let request = OpenRequest::new(code, PreferredMode::View, ReviewOrigin::Current).without_fallback();
            modal.open(&api, request).await;
            flush(&mut modal.toasts);
            match modal.view() {
                Some(view) => {
                    let stars: String = modal.stars().iter().map(|on| if *on { '★' } else { '☆' }).collect();
                    println!("{stars} ({}/5)", view.rating);
                    println!("{}", view.comment);
                    match &view.preview {
                        Preview::None => {}
                        Preview::Video(url) => println!("Video: {url}"),
                        Preview::Embed(embed) => println!("Embed: {}", embed.src()),
                    }
                }
                None => println!("{}", modal.message()),
            }
        }
        ReviewCommand::Add {
            code,
            rating,
            comment,
            video,
            video_url,
        } => {
            let request = OpenRequest::new(code, PreferredMode::Create, ReviewOrigin::Current);
            if modal.open(&api, request).await != Some(ModalMode::Create) {
                flush(&mut modal.toasts);
                return Err(ClientError::validation("Invalid score code"));
            }
            let upload = match &video {
                Some(path) => {
                    let bytes = fs::read(path).await?;
                    let name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "video.mp4".to_string());
                    Some((name, bytes))
                }
                None => None,
            };
            if let Some(draft) = modal.draft_mut() {
                draft.rating = rating;
                draft.comment = comment;
                draft.source = if upload.is_some() {
                    VideoSource::Upload
                } else {
                    VideoSource::External
                };
                draft.upload = upload;
                draft.external = video_url.unwrap_or_default();
            }
            let submitted = modal.submit(&api).await;
            flush(&mut modal.toasts);
            if let Some(submitted) = submitted? {
                info!(score_code = %submitted.score_code, "review stored");
            }
        }
    }
    Ok(())
}

/// Mirrors the tracker page in the terminal until interrupted.
async fn watch(api: HttpApi, config: &Config) -> Result<(), ClientError> {
    let mut events = realtime::subscribe(&config.base_url)?;
    let mut page = TrackerPage::new(api, &config.tunables, RegionSet::all());
    page.set_autosave(false);
    if let Err(err) = page.load().await {
        warn!("initial load failed: {err}");
    }
    flush(&mut page.toasts);
    let mut current = page.subscribe_current();
    info!(url = %config.base_url, "watching for score codes");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Err(err) = page.handle_event(&event).await {
                    warn!("applying {} failed: {err}", event.score_code());
                }
                flush(&mut page.toasts);
                let switched = current.has_changed().unwrap_or(false);
                let announced = current.borrow_and_update().clone();
                if switched || announced.as_deref() == Some(event.score_code()) {
                    print_current(&page);
                }
            }
        }
    }

    Ok(())
}

fn print_current(page: &TrackerPage<HttpApi>) {
    let Some(current) = page.current() else {
        return;
    };
    let status = match current.status {
        PlayStatus::Playing => "playing",
        PlayStatus::Completed => "completed",
    };
    println!(
        "{}  {}  {}  {status}  {}",
        current.record.score_code,
        completion_label(current.record.completion),
        star(current.record.is_favorite),
        current.message
    );
}
