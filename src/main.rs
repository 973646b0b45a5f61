//! Tmux Supervisor CLI
//!
//! 监管运行在 tmux 会话里的自主编码代理：每个 supervised unit 一个
//! 协调循环（`tsup run`），外加一次性投递和诊断子命令。

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use anyhow::Result;
use tmux_supervisor::{
    MessageChannel, SessionDirectory, StatusPublisher, SupervisedUnit, Supervisor,
    SupervisorConfig, TargetAddress, TmuxManager,
};

#[derive(Parser)]
#[command(name = "tsup")]
#[command(about = "Tmux Supervisor - 监管 tmux 中的自主编码代理")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 为一个项目启动协调循环（前台运行，直到被信号终止）
    Run {
        /// Unit 名称（controller 范围内唯一）
        #[arg(long)]
        name: String,
        /// 项目根目录
        #[arg(long)]
        path: String,
        /// 关联的 tmux session
        #[arg(long)]
        session: String,
        /// 主 window（告警投递目标）
        #[arg(long, default_value = "0")]
        window: String,
        /// 循环间隔（秒）
        #[arg(long, default_value = "60")]
        interval: u64,
        /// checkpoint 间隔（秒）
        #[arg(long, default_value = "1800")]
        checkpoint_interval: u64,
        /// bootstrap 标记文件名（项目描述文档）
        #[arg(long, default_value = "PROJECT_SPEC.md")]
        spec_doc: String,
        /// Hub 聚合端点 URL（可选）
        #[arg(long)]
        hub_url: Option<String>,
        /// Hub 侧项目 ID（配合 --hub-url）
        #[arg(long)]
        project_id: Option<String>,
    },
    /// 向一个 tmux window 投递一条已验证的消息
    Send {
        /// 目标地址 "session:window"（window 缺省为 0）
        target: String,
        /// 消息文本
        message: String,
        /// payload 与 submit 之间的沉降延迟（毫秒）
        #[arg(long, default_value = "500")]
        settle_ms: u64,
    },
    /// 列出所有 tmux session 及其 window
    Sessions {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 查看某个 unit 最近发布的状态行
    Status {
        /// Unit 名称
        name: String,
        /// Controller ID（状态行前缀）
        #[arg(long, default_value = "pm")]
        controller_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化 tracing 日志系统
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug tsup run --name myproj ...
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tmux_supervisor=info,tsup=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    // 参数解析失败（缺少 --name/--path/--session 等）和启动校验失败
    // 同属致命错误，统一以 1 退出；--help/--version 正常退出
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let normal_exit = matches!(
                e.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            );
            let _ = e.print();
            std::process::exit(if normal_exit { 0 } else { 1 });
        }
    };

    match cli.command {
        Commands::Run {
            name,
            path,
            session,
            window,
            interval,
            checkpoint_interval,
            spec_doc,
            hub_url,
            project_id,
        } => {
            let unit = SupervisedUnit::new(&name, &path, &session, &window);
            // 启动校验失败是致命的：打印用法并以 1 退出，不进入循环
            if let Err(e) = unit.validate() {
                eprintln!("tsup run: {}", e);
                eprintln!("Usage: tsup run --name <NAME> --path <DIR> --session <SESSION> [--window <WINDOW>]");
                std::process::exit(1);
            }

            let config = SupervisorConfig {
                cycle_interval_secs: interval,
                checkpoint_interval_secs: checkpoint_interval,
                bootstrap_marker: spec_doc,
                hub_url,
                hub_project_id: project_id,
                ..SupervisorConfig::default()
            };

            let mut supervisor = Supervisor::new(unit, config);
            supervisor.run().await;
        }
        Commands::Send {
            target,
            message,
            settle_ms,
        } => {
            let address = TargetAddress::parse(&target);
            let channel =
                MessageChannel::new(std::sync::Arc::new(TmuxManager::new()), settle_ms);

            match channel.send(&address, &message) {
                Ok(ack) => println!("已投递到 {}", ack.target),
                Err(e) => {
                    eprintln!("投递失败: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Sessions { json } => {
            let manager = TmuxManager::new();
            let sessions = manager.list_sessions();

            if json {
                let listing: Vec<serde_json::Value> = sessions
                    .iter()
                    .map(|session| {
                        let windows: Vec<serde_json::Value> = manager
                            .list_windows(session)
                            .into_iter()
                            .map(|(idx, name)| serde_json::json!({"index": idx, "name": name}))
                            .collect();
                        serde_json::json!({"session": session, "windows": windows})
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("发现 {} 个 session:\n", sessions.len());
                for session in &sessions {
                    println!("  {}", session);
                    for (idx, name) in manager.list_windows(session) {
                        println!("    {}: {}", idx, name);
                    }
                }
            }
        }
        Commands::Status {
            name,
            controller_id,
        } => {
            let publisher = StatusPublisher::new(&controller_id, None);
            match publisher.read_status_line(&name) {
                Ok(line) => println!("{}", line),
                Err(_) => {
                    eprintln!("未找到 unit {} 的状态（supervisor 是否在运行？）", name);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
