use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use codex_bridge::codex::{supported_models, Detector, InstallationState, SUPPORTED_CAPABILITIES};
use codex_bridge::config::Config;
use codex_bridge::config_store::ConfigStore;
use codex_bridge::env_vars::{env_vars_by_category, EnvSnapshot};
use codex_bridge::logging;
use codex_bridge::query::{NormalizedMessage, QueryOrchestrator, QueryRequest};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "codex-bridge")]
#[command(about = "Run prompts through the OpenAI Codex CLI")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show Codex CLI installation and authentication status
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// List supported models and capabilities
    Models,

    /// Run a prompt and stream normalized messages as JSON lines
    Query {
        prompt: String,

        #[arg(short, long)]
        model: Option<String>,

        /// Working directory for Codex (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        #[arg(short, long)]
        system: Option<String>,

        /// Inactivity timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Manage MCP server entries in Codex's config.toml
    Mcp {
        #[command(subcommand)]
        action: McpAction,
    },

    /// List environment variables codex-bridge reads
    Env,

    /// Print the effective configuration
    Config {
        /// Write it to the user config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand)]
enum McpAction {
    /// Register the codex-bridge MCP server for a project
    Add {
        /// Path to the MCP server script
        server: PathBuf,

        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// Remove the codex-bridge MCP server entry
    Remove {
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// List configured MCP servers
    List {
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let logging_handle = logging::init_logging(&config, cli.debug)?;
    let env = EnvSnapshot::capture();
    let mut exit_code = ExitCode::SUCCESS;

    match cli.command {
        Commands::Status { json } => cmd_status(env, json).await?,
        Commands::Models => cmd_models(),
        Commands::Query {
            prompt,
            model,
            cwd,
            system,
            timeout_ms,
        } => {
            let mut request = QueryRequest::new(prompt, resolve_project(cwd)?);
            request.model = model;
            request.system_prompt = system;
            request.timeout_ms = timeout_ms;
            if !cmd_query(&config, env, request).await? {
                exit_code = ExitCode::FAILURE;
            }
        }
        Commands::Mcp { action } => cmd_mcp(&env, action)?,
        Commands::Env => cmd_env(),
        Commands::Config { save } => cmd_config(&config, save)?,
    }

    if let Some(log_path) = logging_handle.log_file_path {
        tracing::debug!(path = %log_path.display(), "Session log written");
    }

    // logging_handle must drop before exit so file logs get flushed
    Ok(exit_code)
}

fn resolve_project(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

async fn cmd_status(env: EnvSnapshot, json: bool) -> Result<()> {
    let detector = Detector::new(env);
    let info = detector.installation_info().await;
    let auth = detector.check_auth_with(info.status.installed);

    if json {
        let report = serde_json::json!({ "installation": info, "auth": auth });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match info.state {
        InstallationState::Installed => {
            let path = info
                .status
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            println!("Codex CLI: installed ({path})");
            if let Some(version) = &info.status.version {
                let note = if info.status.version_ok { "" } else { " (outdated)" };
                println!("Version:   {version}{note}");
            }
        }
        InstallationState::ApiKeyOnly => println!("Codex CLI: not installed (API key found)"),
        InstallationState::NotInstalled => println!("Codex CLI: not installed"),
    }
    println!(
        "Auth:      {}",
        if auth.authenticated {
            format!("{:?}", auth.method)
        } else {
            "not authenticated".to_string()
        }
    );
    println!();
    println!("{}", info.recommendation);

    if info.state != InstallationState::Installed {
        println!();
        for (platform, command) in &info.install_commands {
            println!("  {platform:<8} {command}");
        }
    }

    Ok(())
}

fn cmd_models() {
    println!("Models:");
    for model in supported_models() {
        println!("  {model}");
    }
    println!();
    println!("Capabilities: {}", SUPPORTED_CAPABILITIES.join(", "));
}

async fn cmd_query(config: &Config, env: EnvSnapshot, request: QueryRequest) -> Result<bool> {
    let cancel = CancellationToken::new();
    let request = request.with_abort_token(cancel.clone());

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let orchestrator = QueryOrchestrator::from_env(env, config.codex.clone());
    let mut stream = orchestrator.query(request).await;

    let mut stdout = std::io::stdout().lock();
    let mut last: Option<NormalizedMessage> = None;
    while let Some(message) = stream.next().await {
        serde_json::to_writer(&mut stdout, &message)?;
        writeln!(stdout)?;
        stdout.flush()?;
        last = Some(message);
    }

    Ok(last.is_some_and(|m| m.is_success()))
}

fn cmd_mcp(env: &EnvSnapshot, action: McpAction) -> Result<()> {
    let store = ConfigStore::from_env(env);

    match action {
        McpAction::Add { server, project } => {
            let project = resolve_project(project)?;
            let server = std::fs::canonicalize(&server)
                .with_context(|| format!("MCP server not found: {}", server.display()))?;
            let path = store.configure_mcp_server(&project, &server)?;
            println!("Registered MCP server in {}", path.display());
        }
        McpAction::Remove { project } => {
            store.remove_mcp_server(&resolve_project(project)?);
            println!("Removed MCP server entry");
        }
        McpAction::List { project } => {
            let project = resolve_project(project)?;
            let path = store.locate_config_path(Some(&project));
            let servers = store.list_mcp_servers(Some(&project))?;

            if servers.is_empty() {
                println!("No MCP servers in {}", path.display());
                return Ok(());
            }

            println!("MCP servers in {}", path.display());
            println!("{}", "─".repeat(60));
            for (name, entry) in &servers {
                println!("{name}: {} {}", entry.command, entry.args.join(" "));
            }
        }
    }

    Ok(())
}

fn cmd_env() {
    for (category, vars) in env_vars_by_category() {
        println!("{}", category.display_name());
        for var in vars {
            let marker = if std::env::var_os(var.name).is_some() { "*" } else { " " };
            println!("  {marker} {:<40} {}", var.name, var.description);
        }
        println!();
    }
}

fn cmd_config(config: &Config, save: bool) -> Result<()> {
    if save {
        let path = config.save()?;
        println!("Saved configuration to {}", path.display());
        return Ok(());
    }

    print!(
        "{}",
        toml::to_string_pretty(config).context("Failed to serialize config to TOML")?
    );
    Ok(())
}
