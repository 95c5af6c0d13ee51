//! Toolrunner: run OpenAPI-described HTTP tools from the command line.
//!
//! Usage:
//!   toolrunner init                 Write a default config with fresh secrets
//!   toolrunner exec ...             Execute one tool from the catalog
//!   toolrunner daemon               Run the OAuth token refresh daemon
//!   toolrunner oauth-callback ...   Complete an OAuth authorization
//!   toolrunner status ...           Show whether a plugin needs authorization
//!   toolrunner agent-status ...     Show authorization of an agent's plugins
//!   toolrunner revoke ...           Forget a stored OAuth credential

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use toolrunner::catalog::{MemoryCatalog, PrefixObjectStorage};
use toolrunner::config::{self, EngineConfig};
use toolrunner::oauth::{
    AuthorizationCodeMeta, OAuthService, TokenCipher, TokenClient, TokenRefresher,
};
use toolrunner::state::{Database, SqliteCredentialStore};
use toolrunner::types::{ExecScene, InvalidRespStrategy, Locale};
use toolrunner::{ExecOutcome, ExecuteRequest, ProjectInfo, ToolEngine};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "toolrunner")]
#[command(version = "0.1.0")]
#[command(about = "Execute OpenAPI-described HTTP tools with plugin auth")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to toolrunner home directory (default ~/.toolrunner).
    #[arg(long)]
    home: Option<String>,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config with fresh secrets.
    Init,

    /// Execute a tool.
    Exec {
        #[arg(long)]
        plugin: i64,
        #[arg(long)]
        tool: i64,
        #[arg(long)]
        user: String,
        /// Arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
        /// tool-debug, online-agent, draft-agent or workflow.
        #[arg(long, default_value = "tool-debug")]
        scene: String,
        /// Run the draft revision of the tool and plugin.
        #[arg(long)]
        draft: bool,
        /// raw, default or error.
        #[arg(long, default_value = "raw")]
        strategy: String,
        #[arg(long)]
        tool_version: Option<String>,
        /// Agent or workflow id.
        #[arg(long)]
        project: Option<i64>,
        #[arg(long)]
        project_version: Option<String>,
        /// Infer a response schema from the raw response.
        #[arg(long)]
        gen_schema: bool,
        #[arg(long, default_value = "en")]
        locale: String,
    },

    /// Run the OAuth token refresh daemon until Ctrl+C.
    Daemon,

    /// Complete an OAuth authorization-code redirect.
    OauthCallback {
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
    },

    /// Show whether a user must authorize a plugin.
    Status {
        #[arg(long)]
        plugin: i64,
        #[arg(long)]
        user: String,
        #[arg(long)]
        draft: bool,
    },

    /// Show which of an agent's OAuth plugins a user must authorize.
    AgentStatus {
        #[arg(long)]
        agent: i64,
        #[arg(long)]
        user: String,
    },

    /// Delete a user's stored credential for a plugin.
    Revoke {
        #[arg(long)]
        plugin: i64,
        #[arg(long)]
        user: String,
        #[arg(long)]
        draft: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve home directory
    let home_dir = cli
        .home
        .as_deref()
        .map(|h| PathBuf::from(shellexpand::tilde(h).into_owned()))
        .unwrap_or_else(config::default_home_dir);

    // Initialize logging: RUST_LOG, then --log-level, then the config file
    let log_level = match cli.log_level.clone() {
        Some(level) => level,
        None => config::load_config(&home_dir.join("toolrunner.toml"))
            .map(|cfg| cfg.log_level)
            .unwrap_or_else(|_| "info".to_string()),
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => cmd_init(&home_dir),
        Commands::Exec {
            plugin,
            tool,
            user,
            args,
            scene,
            draft,
            strategy,
            tool_version,
            project,
            project_version,
            gen_schema,
            locale,
        } => {
            let mut req = ExecuteRequest::new(
                scene.parse::<ExecScene>().map_err(|e| anyhow!(e))?,
                user,
                plugin,
                tool,
                args,
            );
            req.exec_draft_tool = draft;
            req.options.invalid_resp_strategy = strategy
                .parse::<InvalidRespStrategy>()
                .map_err(|e| anyhow!(e))?;
            req.options.tool_version = tool_version;
            req.options.project = project.map(|project_id| ProjectInfo {
                project_id,
                project_version,
                connector_id: 0,
            });
            req.options.auto_gen_resp_schema = gen_schema;
            req.options.locale = locale.parse::<Locale>().unwrap_or_default();
            cmd_exec(&home_dir, req).await
        }
        Commands::Daemon => cmd_daemon(&home_dir).await,
        Commands::OauthCallback { code, state } => cmd_callback(&home_dir, &code, &state).await,
        Commands::Status {
            plugin,
            user,
            draft,
        } => cmd_status(&home_dir, plugin, &user, draft).await,
        Commands::AgentStatus { agent, user } => cmd_agent_status(&home_dir, agent, &user).await,
        Commands::Revoke {
            plugin,
            user,
            draft,
        } => cmd_revoke(&home_dir, plugin, &user, draft).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    let config_path = home_dir.join("toolrunner.toml");
    if config_path.exists() {
        println!(
            "{} Config already exists at {}",
            "!!!".yellow().bold(),
            config_path.display()
        );
        return Ok(());
    }

    let cfg = EngineConfig {
        state_secret: config::generate_secret(),
        token_secret: config::generate_secret(),
        db_path: home_dir.join("state.db").display().to_string(),
        catalog_path: home_dir.join("catalog.yml").display().to_string(),
        ..EngineConfig::default()
    };
    config::save_config(&cfg, &config_path)?;

    println!(
        "{} Wrote {}",
        ">>>".green().bold(),
        config_path.display()
    );
    println!("    Catalog: {}", cfg.catalog_path);
    println!("    Database: {}", cfg.db_path);
    Ok(())
}

async fn cmd_exec(home_dir: &Path, req: ExecuteRequest) -> Result<()> {
    let rt = bootstrap(home_dir)?;
    let engine = ToolEngine::new(
        rt.catalog.clone(),
        rt.catalog.clone(),
        Arc::new(PrefixObjectStorage::new(rt.config.object_base_url.clone())),
        rt.oauth.clone(),
        rt.http.clone(),
    );

    match engine.execute(req).await? {
        ExecOutcome::Completed(resp) => {
            println!();
            println!("{}", "=== Execution ===".bold());
            println!("  {}: {}", "Id".bold(), resp.execution_id);
            println!("  {}: {} ({})", "Tool".bold(), resp.tool.name, resp.tool.id);
            println!();
            println!("{}", "Request".bold());
            println!("  {}", resp.request);
            println!("{}", "Raw response".bold());
            println!("  {}", resp.raw_resp);
            println!("{}", "Trimmed response".bold());
            println!("  {}", resp.trimmed_resp.green());
            if let Some(schema) = resp.resp_schema {
                println!("{}", "Inferred responses".bold());
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            println!();
        }
        ExecOutcome::NeedsAuthorization(prompt) => {
            println!();
            println!(
                "{} {}",
                "Authorization required:".yellow().bold(),
                prompt.message
            );
            println!("  {}", prompt.auth_url);
            println!();
        }
    }
    Ok(())
}

async fn cmd_daemon(home_dir: &Path) -> Result<()> {
    let rt = bootstrap(home_dir)?;

    println!(
        "{} Starting token refresher (every {}s, {} workers)...",
        ">>>".green().bold(),
        rt.config.oauth.interval_secs,
        rt.config.oauth.workers,
    );

    // Create a cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let refresher = Arc::new(TokenRefresher::new(
        rt.store.clone(),
        rt.tokens.clone(),
        rt.config.oauth.clone(),
    ));
    let handle = refresher.spawn(cancel.clone());

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());

    cancel.cancel();

    // Wait for the loop to finish (with a timeout to avoid hanging forever)
    let shutdown_timeout = tokio::time::Duration::from_secs(10);
    if let Some(handle) = handle {
        let joined = tokio::time::timeout(shutdown_timeout, handle).await;
        match joined {
            Ok(Err(e)) => warn!("Refresher task join error: {}", e),
            Err(_) => warn!("Refresher did not stop within {:?}", shutdown_timeout),
            Ok(Ok(())) => {}
        }
    }

    info!("Daemon shutdown complete");
    Ok(())
}

async fn cmd_callback(home_dir: &Path, code: &str, state: &str) -> Result<()> {
    let rt = bootstrap(home_dir)?;
    let meta = rt.oauth.handle_callback(code, state).await?;
    println!(
        "{} Authorized plugin {} for user {}{}",
        ">>>".green().bold(),
        meta.plugin_id,
        meta.user_id,
        if meta.is_draft { " (draft)" } else { "" }
    );
    Ok(())
}

async fn cmd_status(home_dir: &Path, plugin_id: i64, user_id: &str, is_draft: bool) -> Result<()> {
    let rt = bootstrap(home_dir)?;
    let status = rt.oauth.oauth_status(user_id, plugin_id, is_draft).await?;

    println!();
    println!("{}", "=== OAuth Status ===".bold());
    println!();
    println!("  {}:  {}", "Plugin".bold(), plugin_id);
    println!("  {}:    {}", "User".bold(), user_id);
    if !status.is_oauth {
        println!("  {}:    {}", "Auth".bold(), "not oauth".dimmed());
    } else if status.needs_auth {
        println!("  {}:    {}", "Auth".bold(), "needs authorization".yellow());
        if let Some(url) = status.auth_url {
            println!("  {}:     {}", "URL".bold(), url);
        }
    } else {
        println!("  {}:    {}", "Auth".bold(), "authorized".green());
    }
    println!();
    Ok(())
}

async fn cmd_agent_status(home_dir: &Path, agent_id: i64, user_id: &str) -> Result<()> {
    let rt = bootstrap(home_dir)?;
    let statuses = rt.oauth.agent_oauth_status(user_id, agent_id).await?;

    println!();
    println!("{}", "=== Agent OAuth Status ===".bold());
    println!();
    if statuses.is_empty() {
        println!("  {}", "no oauth plugins".dimmed());
    }
    for status in statuses {
        let state = if status.needs_auth {
            "needs authorization".yellow()
        } else {
            "authorized".green()
        };
        println!("  {} ({}): {}", status.plugin_name.bold(), status.plugin_id, state);
    }
    println!();
    Ok(())
}

async fn cmd_revoke(home_dir: &Path, plugin_id: i64, user_id: &str, is_draft: bool) -> Result<()> {
    let rt = bootstrap(home_dir)?;
    rt.oauth
        .revoke(&AuthorizationCodeMeta {
            user_id: user_id.to_string(),
            plugin_id,
            is_draft,
        })
        .await?;
    println!("{} Revoked", "<<<".red().bold());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Runtime {
    config: EngineConfig,
    catalog: Arc<MemoryCatalog>,
    store: Arc<SqliteCredentialStore>,
    tokens: TokenClient,
    oauth: Arc<OAuthService>,
    http: reqwest::Client,
}

/// Bootstrap the runtime: load config, catalog, and credential database.
fn bootstrap(home_dir: &Path) -> Result<Runtime> {
    let config_path = home_dir.join("toolrunner.toml");

    if !config_path.exists() {
        eprintln!(
            "{} No config found at {:?}. Run `toolrunner init` first.",
            "Error:".red().bold(),
            config_path
        );
        std::process::exit(1);
    }

    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if cfg.state_secret.is_empty() || cfg.token_secret.is_empty() {
        bail!("state_secret and token_secret must be set in {}", config_path.display());
    }

    let http = reqwest::Client::builder()
        .timeout(cfg.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let db_path = cfg.resolved_db_path();
    let db = Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    let cipher = TokenCipher::new(&cfg.token_secret).context("Invalid token_secret")?;
    let store = Arc::new(SqliteCredentialStore::new(Arc::new(Mutex::new(db)), cipher));

    let catalog_path = cfg.resolved_catalog_path();
    let catalog = Arc::new(
        MemoryCatalog::load(Path::new(&catalog_path))
            .with_context(|| format!("Failed to load catalog from {}", catalog_path))?,
    );

    let tokens = TokenClient::new(http.clone());
    let oauth = Arc::new(OAuthService::new(
        &cfg,
        catalog.clone(),
        store.clone(),
        tokens.clone(),
    )?);

    Ok(Runtime {
        config: cfg,
        catalog,
        store,
        tokens,
        oauth,
        http,
    })
}
