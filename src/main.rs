//! `mpf`: fill a publishing editor open in Chrome with prepared content.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use multi_platform_filler::browser::{chrome, connect_to_chrome, CdpDom};
use multi_platform_filler::content::{ApiContentSource, ContentSource};
use multi_platform_filler::database::{queries, Database, LocalContentSource};
use multi_platform_filler::platforms::PlatformInfo;
use multi_platform_filler::relay::{spawn_relay, RelayWorker};
use multi_platform_filler::session::{build_registry, FillSession};
use multi_platform_filler::Settings;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mpf")]
#[command(about = "Fill third-party publishing editors with prepared content")]
#[command(version)]
struct Cli {
    /// Settings file (default: <config dir>/multi-platform-filler/settings.json)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported platforms
    Platforms,

    /// Show which platforms handle a URL, best match first
    Match {
        url: String,
    },

    /// Open a platform's editor in its own Chrome profile
    Open {
        platform: String,
    },

    /// Fill the editor open in Chrome
    Fill {
        /// Article id in the content service or local store
        #[arg(long)]
        content_id: String,

        /// Chrome debugging port (default: settings / MPF_CHROME_PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Platform id; detected from the tab URL when omitted
        #[arg(long)]
        platform: Option<String>,

        /// Read content from this SQLite store instead of the API
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Print content formatted for manual pasting
    Copy {
        #[arg(long)]
        content_id: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Load articles, variants and presets from a JSON file into the local store
    Import {
        file: PathBuf,

        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_database(path: &Path) -> Result<Arc<Database>> {
    Ok(Arc::new(Database::new(path)?))
}

fn content_source(settings: &Settings, db: Option<PathBuf>) -> Result<Box<dyn ContentSource>> {
    match db.or_else(|| settings.database.clone()) {
        Some(path) => {
            info!("[content] 使用本地数据库 {}", path.display());
            Ok(Box::new(LocalContentSource::new(open_database(&path)?)))
        }
        None => Ok(Box::new(ApiContentSource::new(
            &settings.api_base,
            settings.api_token.clone(),
        )?)),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenedEditor {
    platform: String,
    port: u16,
    attached: bool,
    profile_dir: PathBuf,
}

async fn open_editor(settings: &Settings, platform: &str) -> Result<OpenedEditor> {
    let registry = build_registry(settings);
    let plugin = registry
        .get(platform)
        .with_context(|| format!("Unknown platform: {}", platform))?;
    let url = &plugin.config().editor_url;
    if url.is_empty() {
        bail!("{} has no editor URL configured", platform);
    }

    let chrome_path = chrome::detect_chrome()?;
    let profile_dir = chrome::profile_dir(platform)?;
    let mut session = chrome::prepare_chrome_session(&chrome_path, &profile_dir, url).await?;
    let port = chrome::wait_for_chrome_ready(&mut session, Duration::from_secs(30)).await?;
    Ok(OpenedEditor {
        platform: platform.to_string(),
        port,
        attached: session.mode == chrome::SessionMode::Attached,
        profile_dir,
    })
}

async fn fill(
    settings: &Settings,
    content_id: &str,
    port: Option<u16>,
    platform: Option<&str>,
    db: Option<PathBuf>,
) -> Result<()> {
    let port = port
        .or(settings.chrome_port)
        .context("No Chrome port given (use --port or MPF_CHROME_PORT)")?;
    let registry = build_registry(settings);
    let source = content_source(settings, db)?;

    let connection = connect_to_chrome(port).await?;
    let page = connection
        .pick_page(|url| match platform {
            Some(id) => registry
                .get(id)
                .map(|p| p.is_platform_match(url))
                .unwrap_or(false),
            None => !registry.plugins_for_url(url).is_empty(),
        })
        .await?;
    let dom = CdpDom::new(page);

    let (relay, relay_handle) =
        spawn_relay(RelayWorker::new(&settings.api_base, settings.api_token.clone())?);
    let session = FillSession::new(&registry, &dom, &relay, settings.timing.clone());
    let result = session
        .fill_from_source(source.as_ref(), content_id, platform)
        .await;
    relay_handle.shutdown().await;

    print_json(&result?)
}

async fn copy(settings: &Settings, content_id: &str, platform: &str, db: Option<PathBuf>) -> Result<()> {
    let registry = build_registry(settings);
    let plugin = registry
        .get(platform)
        .with_context(|| format!("Unknown platform: {}", platform))?;
    let source = content_source(settings, db)?;

    let (relay, relay_handle) =
        spawn_relay(RelayWorker::new(&settings.api_base, settings.api_token.clone())?);
    let result = plugin
        .copy_article_content(source.as_ref(), &relay, content_id)
        .await;
    relay_handle.shutdown().await;
    print_json(&result)
}

fn import(settings: &Settings, file: &Path, db: Option<PathBuf>) -> Result<()> {
    let path = match db.or_else(|| settings.database.clone()) {
        Some(path) => path,
        None => Database::default_path()?,
    };
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let bundle: queries::ImportBundle = serde_json::from_str(&body)
        .with_context(|| format!("Invalid import file {}", file.display()))?;

    let database = open_database(&path)?;
    let mut conn = database
        .conn
        .lock()
        .map_err(|e| anyhow::anyhow!("database lock poisoned: {}", e))?;
    let written = queries::import_bundle(&mut conn, &bundle)?;
    info!("[import] {} 条记录写入 {}", written, path.display());
    print_json(&serde_json::json!({ "written": written, "database": path }))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load(cli.settings.as_deref())?;

    match cli.command {
        Commands::Platforms => {
            let registry = build_registry(&settings);
            let list: Vec<PlatformInfo> = registry
                .plugins()
                .map(|p| PlatformInfo::from(p.config()))
                .collect();
            print_json(&list)
        }
        Commands::Match { url } => {
            let registry = build_registry(&settings);
            let matched: Vec<PlatformInfo> = registry
                .plugins_for_url(&url)
                .into_iter()
                .map(|p| PlatformInfo::from(p.config()))
                .collect();
            if matched.is_empty() {
                bail!("{}", multi_platform_filler::FillError::NoPluginForUrl(url));
            }
            print_json(&matched)
        }
        Commands::Open { platform } => print_json(&open_editor(&settings, &platform).await?),
        Commands::Fill {
            content_id,
            port,
            platform,
            db,
        } => fill(&settings, &content_id, port, platform.as_deref(), db).await,
        Commands::Copy {
            content_id,
            platform,
            db,
        } => copy(&settings, &content_id, &platform, db).await,
        Commands::Import { file, db } => import(&settings, &file, db),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fill_arguments_parse() {
        let cli = Cli::parse_from([
            "mpf", "fill", "--content-id", "42", "--port", "9300", "--platform", "zhihu",
        ]);
        match cli.command {
            Commands::Fill {
                content_id,
                port,
                platform,
                db,
            } => {
                assert_eq!(content_id, "42");
                assert_eq!(port, Some(9300));
                assert_eq!(platform.as_deref(), Some("zhihu"));
                assert!(db.is_none());
            }
            _ => panic!("expected fill"),
        }
        assert!(Cli::try_parse_from(["mpf", "copy", "--content-id", "1"]).is_err());
    }
}
