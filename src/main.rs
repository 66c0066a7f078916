mod config;
mod device;
mod error;
mod explorer;
mod logcat;
mod session;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use config::TesterConfig;
use device::{AdbDevice, Device};
use explorer::engine::CancelFlag;
use logcat::{default_log_dir, LogcatListener};
use session::SessionOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "apptester.toml".to_string());

    let config = TesterConfig::from_file(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path))?;
    let policy = config.session_policy();

    // 日志落盘的 guard 要活到进程结束，否则缓冲内容丢失
    let _log_guard = init_logging(&policy.artifacts_dir)?;

    info!(config = %config_path, apps = config.apps.len(), "启动应用自动测试");

    let serial = match &config.device.serial {
        Some(serial) => serial.clone(),
        None => detect_serial().await?,
    };

    let device = Arc::new(AdbDevice::new(serial.clone()));
    if !device.is_connected().await {
        bail!("设备 {} 不在线", serial);
    }
    info!(serial = %serial, "设备已连接");

    let listener = Arc::new(LogcatListener::new(
        serial.clone(),
        default_log_dir(&policy.artifacts_dir),
    ));

    // Ctrl-C 触发协作式取消：当前应用收尾后跳过剩余应用
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，请求取消会话");
                cancel.cancel();
            }
        });
    }

    let orchestrator = SessionOrchestrator::new(device, listener, policy.clone(), cancel);
    let result = orchestrator.run_session(&config.app_specs()).await;

    tokio::fs::create_dir_all(&policy.artifacts_dir)
        .await
        .context("创建产物目录失败")?;
    let artifact = policy
        .artifacts_dir
        .join(format!("session_{}.json", result.session_id));
    tokio::fs::write(&artifact, serde_json::to_vec_pretty(&result)?)
        .await
        .context("写入会话结果失败")?;

    info!(
        artifact = %artifact.display(),
        total = result.summary.total,
        success = result.summary.success,
        error = result.summary.error,
        crash = result.summary.crash,
        timeout = result.summary.timeout,
        cancelled = result.cancelled,
        "会话结果已保存"
    );

    Ok(())
}

/// 初始化日志：控制台 + 按天滚动的文件输出
fn init_logging(
    artifacts_dir: &Path,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive("apptester_rs=debug".parse()?);

    let file_appender =
        tracing_appender::rolling::daily(artifacts_dir.join("logs"), "apptester.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

/// 未指定序列号时自动探测：要求恰好一台在线设备
async fn detect_serial() -> anyhow::Result<String> {
    let output = tokio::process::Command::new("adb")
        .arg("devices")
        .output()
        .await
        .context("执行 adb devices 失败")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let serials: Vec<&str> = stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial),
                _ => None,
            }
        })
        .collect();

    match serials.as_slice() {
        [serial] => Ok(serial.to_string()),
        [] => bail!("未发现在线设备，请连接设备或在配置中指定序列号"),
        multiple => bail!("发现 {} 台设备，请在配置中指定序列号", multiple.len()),
    }
}
