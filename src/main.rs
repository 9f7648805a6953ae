// src/main.rs
// Healthy - terminal front end for the intake engine

use anyhow::Result;
use clap::{Parser, Subcommand};
use healthy::background::{ReportQueue, ReportWorker, recover_pending};
use healthy::config::{EnvConfig, HealthyConfig};
use healthy::db::{IntakeStore, Report, ReportStatus, SqliteStore};
use healthy::intake::{
    CompletionPhrases, DirectiveParser, Orchestrator, ReportGenerator, RiskLevel, TurnAction,
};
use healthy::llm::{CompletionGateway, build_gateway};
use healthy::IntakeService;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "healthy")]
#[command(about = "Conversational health intake with scored reports")]
#[command(version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive intake in the terminal
    Chat {
        #[arg(short, long, env = "HEALTHY_USER")]
        user: i64,
        /// Continue the latest active session instead of starting a new one
        #[arg(long)]
        resume: bool,
        /// Write the finished report HTML here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show a session's report
    Report {
        session_id: i64,
        /// Generate (or retry) the report if it is not completed
        #[arg(long)]
        generate: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List a user's reports
    Reports {
        #[arg(short, long, env = "HEALTHY_USER")]
        user: i64,
    },

    /// Print a session's message log
    History {
        session_id: i64,
        #[arg(short, long, env = "HEALTHY_USER")]
        user: i64,
    },

    /// Delete a session with its messages and report
    Delete { session_id: i64 },

    /// Generate pending reports until Ctrl-C
    Worker,
}

fn log_level(verbose: bool) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    match std::env::var("HEALTHY_LOG")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Wire store, gateway and engine from configuration
async fn build_service(require_models: bool) -> Result<IntakeService> {
    let env = EnvConfig::load();
    let validation = env.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if require_models && !validation.is_valid() {
        anyhow::bail!(validation.report());
    }

    let file = HealthyConfig::load();
    let store: Arc<dyn IntakeStore> = Arc::new(SqliteStore::open(&env.database_url).await?);
    let gateway: Arc<dyn CompletionGateway> = Arc::new(build_gateway(&env, &file));

    let mut orchestrator = Orchestrator::new(store.clone(), gateway.clone())
        .with_parser(Arc::new(DirectiveParser::new(&file.signal_labels())));
    if let Some(phrases) = file.completion_phrases() {
        orchestrator = orchestrator.with_completion_phrases(CompletionPhrases::new(phrases));
    }
    let generator = Arc::new(ReportGenerator::new(store.clone(), gateway));

    Ok(IntakeService::from_parts(store, orchestrator, generator))
}

fn print_report(report: &Report, out: Option<&Path>) -> Result<()> {
    match report.status() {
        ReportStatus::Completed => {
            let risk = RiskLevel::normalize(&report.risk_level);
            println!("健康评分: {}", report.score);
            println!("风险等级: {} ({})", report.risk_level, risk.label_zh());
            match out {
                Some(path) => {
                    std::fs::write(path, &report.content.html)?;
                    println!("报告已保存: {}", path.display());
                }
                None => println!("\n{}", report.content.html),
            }
        }
        ReportStatus::Generating => println!("报告生成中，请稍后再查看。"),
        ReportStatus::Error => {
            println!(
                "报告生成失败: {}",
                report.content.error.as_deref().unwrap_or("未知错误")
            );
            println!("可运行 `healthy report {} --generate` 重试。", report.session_id);
        }
    }
    Ok(())
}

async fn run_chat(service: &IntakeService, user: i64, resume: bool, out: Option<&Path>) -> Result<()> {
    let resumed = if resume {
        service.active_session(user).await?
    } else {
        None
    };

    let session_id = match resumed {
        Some(history) => {
            for message in &history.messages {
                println!("[{}] {}", message.role, message.content);
            }
            history.session.id
        }
        None => {
            let started = service.start_session(user).await?;
            for greeting in &started.greeting_messages {
                println!("{}", greeting);
            }
            started.session_id
        }
    };
    info!(session_id, "Intake session ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        match service.handle_turn(session_id, text).await {
            Ok(outcome) => {
                for reply in &outcome.replies {
                    println!("{}", reply);
                }
                if outcome.action == TurnAction::Report {
                    let report = service.trigger_report_generation(session_id).await?;
                    print_report(&report, out)?;
                    break;
                }
            }
            Err(e) => {
                warn!(session_id, error = %e, "Turn failed");
                println!("{}", e.user_message());
                if !e.is_retryable() {
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn run_worker(service: &IntakeService) -> Result<()> {
    let (queue, rx) = ReportQueue::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ReportWorker::new(service.generator(), service.locks(), rx, shutdown_rx);
    let handle = tokio::spawn(worker.run());

    recover_pending(service.store().as_ref(), &queue).await?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping worker");
    let _ = shutdown_tx.send(true);
    let processed = handle.await?;
    println!("已处理 {} 份报告", processed);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Global .env first, then the working directory
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".healthy/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(cli.verbose))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Chat { user, resume, out } => {
            let service = build_service(true).await?;
            run_chat(&service, user, resume, out.as_deref()).await?;
        }
        Commands::Report {
            session_id,
            generate,
            out,
        } => {
            let service = build_service(generate).await?;
            let report = if generate {
                service.trigger_report_generation(session_id).await?
            } else {
                service.get_report(session_id).await?
            };
            print_report(&report, out.as_deref())?;
        }
        Commands::Reports { user } => {
            let service = build_service(false).await?;
            let reports = service.list_reports(user).await?;
            if reports.is_empty() {
                println!("暂无报告");
            }
            for r in reports {
                println!(
                    "#{} session {} | {} | {} | {} | {}",
                    r.report_id, r.session_id, r.status, r.score, r.risk_level, r.preview
                );
            }
        }
        Commands::History { session_id, user } => {
            let service = build_service(false).await?;
            let history = service.session_history(session_id, user).await?;
            println!("session {} ({})", history.session.id, history.session.status);
            for message in history.messages {
                println!("[{}] {}", message.role, message.content);
            }
        }
        Commands::Delete { session_id } => {
            let service = build_service(false).await?;
            service.delete_session(session_id).await?;
            println!("已删除会话 {}", session_id);
        }
        Commands::Worker => {
            let service = build_service(true).await?;
            run_worker(&service).await?;
        }
    }

    Ok(())
}
