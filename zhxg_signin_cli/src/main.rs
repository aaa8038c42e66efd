//! 智慧学工自动签到 CLI

mod config;
mod logging;
mod scheduler;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::Overrides;
use scheduler::CronSchedule;
use std::path::PathBuf;
use tracing::{error, info};
use zhxg_signin_core::config::mask;
use zhxg_signin_core::{RunReport, Settings, SigninOutcome, SigninService};

#[derive(Parser)]
#[command(name = "zhxg-signin")]
#[command(about = "智慧学工自动签到工具", long_about = None)]
struct Cli {
    /// 配置目录，读取其中的 config.toml
    #[arg(short, long, default_value = "./configs")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行一次签到
    Run {
        /// 学号
        #[arg(short, long)]
        username: Option<String>,
        /// 密码
        #[arg(short, long, env = "ZHXG_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// 经度
        #[arg(long)]
        lng: Option<f64>,
        /// 纬度
        #[arg(long)]
        lat: Option<f64>,
        /// 验证码识别服务 API Key
        #[arg(long, env = "ZHXG_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
    /// 按 cron 计划定时签到
    Daemon,
    /// 检查并打印当前配置
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load(&cli.config)?;
    if let Commands::Run {
        username,
        password,
        lng,
        lat,
        api_key,
    } = &cli.command
    {
        Overrides {
            username: username.clone(),
            password: password.clone(),
            lng: *lng,
            lat: *lat,
            api_key: api_key.clone(),
        }
        .apply(&mut settings);
    }

    logging::init_logging(&settings.logging)?;

    match cli.command {
        Commands::Run { .. } => {
            do_run(&settings).await?;
        }
        Commands::Daemon => {
            do_daemon(&settings).await?;
        }
        Commands::CheckConfig => {
            do_check_config(&settings)?;
        }
    }

    Ok(())
}

async fn do_run(settings: &Settings) -> anyhow::Result<()> {
    let mut service = SigninService::from_settings(settings)?;
    let report = run_once(&mut service).await?;
    print_report(&report);
    Ok(())
}

async fn run_once<G, S>(service: &mut SigninService<G, S>) -> zhxg_signin_core::Result<RunReport>
where
    G: zhxg_signin_core::Gateway,
    S: zhxg_signin_core::CaptchaSolver,
{
    match service.run().await {
        Ok(report) => Ok(report),
        Err(e) => {
            error!(kind = ?e.kind(), "Sign-in run failed: {}", e);
            Err(e)
        }
    }
}

async fn do_daemon(settings: &Settings) -> anyhow::Result<()> {
    if !settings.scheduler.enabled {
        info!("Scheduler is disabled, nothing to do");
        return Ok(());
    }

    let schedule = CronSchedule::parse(&settings.scheduler.cron, &settings.scheduler.timezone)?;
    let mut service = SigninService::from_settings(settings)?;
    info!(schedule = %schedule, "Scheduler started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let next = schedule.next_after(Utc::now())?;
        info!(next_run = %next, timezone = %schedule.timezone(), "Next sign-in run scheduled");

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping scheduler");
                break;
            }
            _ = tokio::time::sleep(schedule.delay_until(&next, Utc::now())) => {}
        }

        // 失败已在 run_once 中记录，等待下一次触发
        if let Ok(report) = run_once(&mut service).await {
            info!(
                logged_in = report.auth.logged_in,
                attempts = report.auth.attempts,
                "Scheduled sign-in run succeeded"
            );
        }
    }

    Ok(())
}

fn do_check_config(settings: &Settings) -> anyhow::Result<()> {
    settings.validate()?;

    println!("配置检查通过");
    println!("学号: {}", settings.user.username);
    println!("密码: {}", mask(&settings.user.password));
    println!("签到服务: {}", settings.signin.base_url);
    println!(
        "位置: {} ({}, {})",
        settings.location.address, settings.location.longitude, settings.location.latitude
    );
    println!("识别模型: {} @ {}", settings.llm.model, settings.llm.endpoint);
    println!("API Key: {}", mask(&settings.llm.api_key));
    println!(
        "登录重试: {} 次，间隔 {} 秒",
        settings.login_policy().max_attempts,
        settings.signin.retry_interval_secs
    );
    if settings.scheduler.enabled {
        let schedule = CronSchedule::parse(&settings.scheduler.cron, &settings.scheduler.timezone)?;
        println!("定时任务: {}", schedule);
        println!("下次运行: {}", schedule.next_after(Utc::now())?);
    } else {
        println!("定时任务: 未启用");
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    if report.auth.logged_in {
        println!("登录成功，共尝试 {} 次", report.auth.attempts);
    } else {
        println!("会话有效，跳过登录");
    }
    match &report.outcome {
        SigninOutcome::NothingPending => println!("没有待签到记录"),
        SigninOutcome::Completed { record } => {
            println!("签到成功!");
            println!("记录ID: {}", record.id);
            println!("类别: {}", record.category);
            println!("批次: {}", record.batch);
        }
    }
}
