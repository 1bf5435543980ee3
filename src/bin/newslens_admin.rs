//! newslens-admin: 用量账本、预算检查与服务冒烟测试的命令行工具
//!
//! Usage:
//!   newslens-admin summarize <file> [--lang en|zh]    Summarize a text file ("-" for stdin)
//!   newslens-admin sentiment <file> [--lang en|zh]    Analyze sentiment of a text file
//!   newslens-admin stats                              Usage statistics of the ledger
//!   newslens-admin budget                             Budget status of the ledger
//!   newslens-admin config                             Print the effective configuration
//!
//! Global options:
//!   --config <path>    YAML configuration file (environment still overrides it)
//!   --ledger <path>    Usage ledger JSON; loaded before and saved after each command

use anyhow::{bail, Context};
use newslens_ai::config::AiConfig;
use newslens_ai::services::{sentiment, summary, AiContext, Language};
use newslens_ai::usage::StatsFilter;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    ledger: Option<PathBuf>,
    language: Option<Language>,
    positional: Vec<String>,
}

impl Options {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => opts.config = Some(PathBuf::from(value(&mut iter, "--config")?)),
                "--ledger" => opts.ledger = Some(PathBuf::from(value(&mut iter, "--ledger")?)),
                "--lang" => {
                    opts.language = Some(match value(&mut iter, "--lang")?.as_str() {
                        "en" => Language::En,
                        "zh" => Language::Zh,
                        other => bail!("unsupported language: {other}"),
                    })
                }
                flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
                _ => opts.positional.push(arg.clone()),
            }
        }
        Ok(opts)
    }
}

fn value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<String> {
    iter.next()
        .cloned()
        .with_context(|| format!("{flag} requires a value"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        std::process::exit(1);
    };
    match command.as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            return Ok(());
        }
        "version" | "--version" | "-V" => {
            println!("newslens-admin {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let opts = Options::parse(&args[1..])?;
    let config = load_config(&opts)?;

    if command == "config" {
        println!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let ctx = AiContext::from_config(&config)?;
    if let Some(path) = &opts.ledger {
        if path.exists() {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading ledger {}", path.display()))?;
            let n = ctx.tracker().import_json(&json)?;
            info!(records = n, path = %path.display(), "ledger loaded");
        }
    }

    match command.as_str() {
        "summarize" => {
            let content = read_input(&opts)?;
            let options = summary::SummaryOptions {
                language: opts.language,
                ..Default::default()
            };
            let resp = summary::summarize(&ctx, &content, options).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        "sentiment" => {
            let content = read_input(&opts)?;
            let options = sentiment::SentimentOptions {
                language: opts.language,
                ..Default::default()
            };
            let resp = sentiment::analyze_sentiment(&ctx, &content, options).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        "stats" => {
            let stats = ctx.tracker().stats(&StatsFilter::new());
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "budget" => {
            let status = ctx.check_budget();
            println!("{}", serde_json::to_string_pretty(&status)?);
            if status.any_exceeded() {
                std::process::exit(2);
            }
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }

    if let Some(path) = &opts.ledger {
        std::fs::write(path, ctx.tracker().export_json()?)
            .with_context(|| format!("writing ledger {}", path.display()))?;
    }
    Ok(())
}

fn load_config(opts: &Options) -> anyhow::Result<AiConfig> {
    let mut config = match &opts.config {
        Some(path) => AiConfig::from_file(path)?,
        None => AiConfig::default(),
    };
    config.apply_env(|k| std::env::var(k).ok())?;
    Ok(config)
}

fn read_input(opts: &Options) -> anyhow::Result<String> {
    let Some(source) = opts.positional.first() else {
        bail!("missing input file (use \"-\" for stdin)");
    };
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(source).with_context(|| format!("reading {source}"))
}

fn print_usage() {
    println!(
        r#"newslens-admin: NewsLens AI 管理工具

USAGE:
    newslens-admin <COMMAND> [OPTIONS]

COMMANDS:
    summarize <file> [--lang en|zh]   Summarize a text file ("-" for stdin)
    sentiment <file> [--lang en|zh]   Analyze sentiment of a text file
    stats                             Usage statistics of the ledger
    budget                            Budget status (exit code 2 when exceeded)
    config                            Print the effective configuration
    version                           Show version information
    help                              Show this help message

OPTIONS:
    --config <path>                   YAML configuration file
    --ledger <path>                   Usage ledger JSON, loaded and saved around the command

ENVIRONMENT:
    DEEPSEEK_API_KEY, DEEPSEEK_BASE_URL, DEEPSEEK_MODEL,
    NEWSLENS_HTTP_TIMEOUT_SECS, NEWSLENS_DAILY_BUDGET, NEWSLENS_MONTHLY_BUDGET
    RUST_LOG                          Log filter (default: info)"#
    );
}
