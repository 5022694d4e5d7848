mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, CreditsAction};
use sr_av::ToolRegistry;
use sr_core::config::Config;
use sr_core::{Story, UserId};
use sr_db::pool::{get_conn, init_pool};

async fn start_server(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting storyreel server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    sr_server::start(config).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // --log-level, then RUST_LOG, then defaults picked by the verbose flag.
    let env_filter = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| {
            if cli.verbose {
                "storyreel=debug,sr_server=debug,sr_render=debug,sr_av=debug,sr_db=debug,tower_http=debug"
                    .to_string()
            } else {
                "storyreel=info,sr_server=info,sr_render=info,tower_http=info".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Import { file } => import_story(&file, cli.config.as_deref()),
        Commands::Credits { action } => credits(action, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("storyreel {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn import_story(file: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);

    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read story file {}", file.display()))?;
    let story: Story = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid story JSON in {}", file.display()))?;
    let scenes = story.ordered_scenes()?;

    let db = init_pool(&config.server.db_path)?;
    let conn = get_conn(&db)?;
    sr_db::queries::stories::insert_story(&conn, &story)?;

    println!("Imported story {} ({} scenes)", story.id, scenes.len());
    Ok(())
}

fn credits(action: CreditsAction, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let db = init_pool(&config.server.db_path)?;
    let conn = get_conn(&db)?;

    match action {
        CreditsAction::Grant {
            user,
            amount,
            reason,
        } => {
            let user: UserId = user.parse().context("Invalid user id")?;
            let balance = sr_db::queries::credits::grant(&conn, user, amount, &reason)?;
            println!("Granted {amount} credits to {user}; balance is now {balance}");
        }
        CreditsAction::Balance { user, limit } => {
            let user: UserId = user.parse().context("Invalid user id")?;
            let balance = sr_db::queries::credits::balance(&conn, user)?;
            println!("User {user}: {balance} credits");

            let journal = sr_db::queries::credits::list_transactions(&conn, user, limit)?;
            if !journal.is_empty() {
                println!();
            }
            for tx in journal {
                println!(
                    "  {}  {:>+6}  {:<6}  {} (balance {})",
                    tx.created_at, tx.amount, tx.kind, tx.reason, tx.balance_after
                );
            }
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(
        &config.tools,
        Duration::from_secs(config.render.tool_timeout_secs),
    );
    let tools = registry.check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Rendering needs ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config file {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Database: {}", config.server.db_path.display());
    println!(
        "  Renders: {} concurrent, stale after {}s",
        config.render.max_concurrent_jobs, config.render.stale_after_secs
    );
    println!("  Watermark enabled: {}", config.watermark.enabled);
    if config.credits.enabled {
        println!("  Credits: {} per render", config.credits.cost_per_render);
    } else {
        println!("  Credits: disabled");
    }

    for warning in config.validate() {
        println!("  ⚠ {warning}");
    }

    Ok(())
}
