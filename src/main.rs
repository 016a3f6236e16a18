use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use remix_bind::binding::values;
use remix_bind::browser::BrowserSession;
use remix_bind::wait::{PageMarkerHandler, WaitUtil};
use remix_bind::{BoaSession, Manifest, ScriptContext, SessionHandle};

/// remix-bind: declarative script contracts and readiness waits
#[derive(Parser)]
#[command(name = "remix-bind", version, about)]
struct Cli {
    /// Run Chrome with a visible window (default: headless)
    #[arg(long, global = true)]
    headed: bool,

    /// Contract manifest (TOML)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Extra directory searched for `classpath:` scripts
    #[arg(long = "resource-root", global = true)]
    resource_roots: Vec<PathBuf>,

    /// Page to open before running the command
    #[arg(long, global = true)]
    url: Option<String>,

    /// Use the embedded script engine instead of Chrome
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List declared contracts with their dependencies and methods
    Contracts,
    /// Call a contract method; arguments are JSON, bare words are strings
    Call {
        contract: String,
        method: String,
        args: Vec<String>,
    },
    /// Wait for the page-ready variable
    WaitMarker {
        /// Variable to wait for instead of the configured marker
        #[arg(long)]
        marker: Option<String>,
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },
    /// Wait until jQuery reports no active requests
    AjaxIdle {
        #[arg(long, default_value_t = 5_000)]
        timeout_ms: u64,
    },
}

enum Session {
    Browser(BrowserSession),
    Offline(SessionHandle),
}

impl Session {
    async fn open(cli: &Cli) -> Result<Self> {
        if cli.offline {
            if cli.url.is_some() {
                tracing::warn!("--url is ignored with --offline");
            }
            return Ok(Session::Offline(std::sync::Arc::new(BoaSession::start()?)));
        }
        let browser = BrowserSession::launch(!cli.headed).await?;
        if let Some(url) = &cli.url {
            browser.goto(url).await?;
        }
        Ok(Session::Browser(browser))
    }

    fn handle(&self) -> SessionHandle {
        match self {
            Session::Browser(browser) => browser.handle(),
            Session::Offline(handle) => handle.clone(),
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            Session::Browser(browser) => browser.close().await,
            Session::Offline(_) => Ok(()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr only; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    let mut manifest = match &cli.manifest {
        Some(path) => Manifest::from_path(path)?,
        None => Manifest::default(),
    };
    manifest.settings.resource_roots.extend(cli.resource_roots.iter().cloned());
    let context = ScriptContext::new(manifest)?;

    if let Command::Contracts = cli.command {
        list_contracts(&context)?;
        return Ok(());
    }

    let session = Session::open(&cli).await?;
    context.set_session(session.handle());

    let outcome = tokio::select! {
        result = run(&context, &cli.command, session.handle()) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received interrupt signal, shutting down");
            Ok(())
        }
    };

    // Always kill Chrome before exiting
    context.clear_session();
    session.close().await?;
    outcome
}

fn list_contracts(context: &ScriptContext) -> Result<()> {
    for name in context.contract_names() {
        let contract = context.contract(name)?;
        let deps: Vec<&str> = contract
            .source()
            .dependencies()
            .iter()
            .map(|d| d.contract().as_str())
            .collect();
        println!("{}", name);
        if !deps.is_empty() {
            println!("  depends on: {}", deps.join(", "));
        }
        for method in contract.methods() {
            println!("  {}", method);
        }
    }
    Ok(())
}

async fn run(context: &ScriptContext, command: &Command, session: SessionHandle) -> Result<()> {
    match command {
        Command::Contracts => list_contracts(context),
        Command::Call { contract, method, args } => {
            let contract = context.contract(contract)?;
            let args: Vec<Value> = args.iter().map(String::as_str).map(parse_arg).collect();
            let result = contract
                .invoke(method, &values(args))
                .await
                .with_context(|| format!("{}.{} failed", contract.name(), method))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::WaitMarker { marker, timeout_ms } => {
            let ready = PageMarkerHandler::new(context)
                .wait_for_marker(&session, marker.as_deref(), Duration::from_millis(*timeout_ms))
                .await?;
            println!("{}", ready);
            Ok(())
        }
        Command::AjaxIdle { timeout_ms } => {
            WaitUtil::new(context)
                .ajax_idle(&session, Duration::from_millis(*timeout_ms))
                .await?;
            Ok(())
        }
    }
}

fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
