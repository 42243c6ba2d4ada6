mod actor;
mod bridge;
mod config;
mod constants;
mod credentials;
mod dom;
mod extract;
mod ident;
mod oauth2;
mod overlay;
mod replay;
mod summary;

use anyhow::{Context, Result, bail};
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::actor::{HoverLoop, PointerEvent};
use crate::bridge::{HttpBridge, TokenProvider};
use crate::config::Config;
use crate::credentials::TokenStore;
use crate::dom::Page;
use crate::overlay::{LogRenderer, Overlay};
use crate::replay::Step;
use crate::summary::Summarizer;

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hovermail=debug"));

    let log_file = Config::config_dir()
        .ok()
        .and_then(|dir| std::fs::create_dir_all(&dir).ok().map(|_| dir))
        .map(|dir| dir.join("hovermail.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"hovermail - One-line email summaries on hover

Usage: hovermail <command>

Commands:
    summarize <page.html> <url> <selector>
                Hover the first element matching <selector> and print the summary
    replay <page.html> <url>
                Read pointer events from stdin, one per line:
                  enter <selector> | leave <selector> | click <selector>
                  click overlay | wait <ms> | rescan
    auth        Authorize Gmail access in the browser
    logout      Forget the stored Gmail refresh token
    config      Show the effective configuration
    help        Show this help message

Configuration file: ~/.config/hovermail/config.toml
"#
    );
}

fn load_page(path: &str, url: &str) -> Result<Page> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read page snapshot: {}", path))?;
    Ok(Page::parse(&html, url)?)
}

fn build_summarizer(config: &Config) -> Result<Summarizer> {
    let bridge = HttpBridge::from_config(config).context("Failed to set up HTTP clients")?;
    Ok(Summarizer::new(
        Arc::new(bridge),
        Overlay::shared(Box::new(LogRenderer)),
    ))
}

fn print_overlay(summarizer: &Summarizer) {
    let overlay = overlay::lock(summarizer.overlay());
    match overlay.state() {
        Some(state) if overlay.is_visible() => println!("{}", state.text),
        Some(state) => println!("(hidden) {}", state.text),
        None => println!("(no overlay)"),
    }
}

async fn run_summarize(config: &Config, args: &[String]) -> Result<()> {
    let [path, url, selector] = args else {
        bail!("usage: hovermail summarize <page.html> <url> <selector>");
    };
    let page = load_page(path, url)?;
    let target = page.first(selector)?;
    let summarizer = build_summarizer(config)?;

    let stage = summarizer.hover(&page, target).await?;
    tracing::info!("Orchestration ended in {:?}", stage);
    print_overlay(&summarizer);
    Ok(())
}

async fn run_replay(config: &Config, args: &[String]) -> Result<()> {
    let [path, url] = args else {
        bail!("usage: hovermail replay <page.html> <url>");
    };
    let page = load_page(path, url)?;
    let summarizer = build_summarizer(config)?;
    let hover = HoverLoop::new(&page, &summarizer, config.hover.debounce());
    let (tx, rx) = mpsc::channel(64);

    let feed = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let step = match replay::parse_step(&page, &line) {
                Ok(Some(step)) => step,
                Ok(None) => continue,
                Err(e) => {
                    eprintln!("Skipping `{}`: {:#}", line.trim(), e);
                    continue;
                }
            };
            let event = match step {
                Step::Event(event) => event,
                Step::Wait(pause) => {
                    tokio::time::sleep(pause).await;
                    continue;
                }
                Step::ClickOverlay => {
                    let origin = overlay::lock(summarizer.overlay()).origin();
                    let Some(target) = origin else {
                        eprintln!("No overlay to click");
                        continue;
                    };
                    PointerEvent::Click {
                        target,
                        on_overlay: true,
                    }
                }
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
        drop(tx);
        Ok::<_, anyhow::Error>(())
    };

    let (latest, fed) = tokio::join!(hover.run(rx), feed);
    fed?;
    if let Some(handle) = latest {
        let stage = handle.await?;
        tracing::info!("Last orchestration ended in {:?}", stage);
    }
    if let Some(id) = summarizer.current_request() {
        tracing::debug!("Input ended with request #{} still live", id);
    }
    summarizer.cancel();
    print_overlay(&summarizer);
    Ok(())
}

async fn run_auth(config: &Config) -> Result<()> {
    let Some(client_id) = config.client_id() else {
        bail!(
            "No OAuth client id. Set HOVERMAIL_OAUTH_CLIENT_ID or [auth] client_id in {}",
            Config::config_path()?.display()
        );
    };
    let provider = TokenProvider::new(Some(client_id), TokenStore::new(&config.auth.account), true);
    provider
        .access_token()
        .await
        .context("Authorization did not produce a token")?;
    println!("Gmail access authorized for account '{}'.", config.auth.account);
    Ok(())
}

fn run_logout(config: &Config) {
    TokenStore::new(&config.auth.account).clear();
    println!("Removed stored Gmail credentials for account '{}'.", config.auth.account);
}

fn run_config(config: &Config) -> Result<()> {
    println!("# {}", Config::config_path()?.display());
    print!("{}", config.to_toml()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let command = args.get(1).map(|s| s.as_str());
    if matches!(command, None | Some("help") | Some("--help") | Some("-h")) {
        print_usage();
        return Ok(());
    }

    setup_logging();
    let config = Config::load()?;
    let rest = &args[2..];

    match command {
        Some("summarize") => run_summarize(&config, rest).await,
        Some("replay") => run_replay(&config, rest).await,
        Some("auth") => run_auth(&config).await,
        Some("logout") => {
            run_logout(&config);
            Ok(())
        }
        Some("config") => run_config(&config),
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
        None => Ok(()),
    }
}
