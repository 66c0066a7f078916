//! 崩溃证据采集模块
//!
//! 在每次应用测试期间后台读取 logcat，识别致命异常与 ANR 标记。
//! 采集任务独占自己的缓冲区，探索结束后通过 [`LogListener::stop_capture`]
//! 一次性交接不可变的证据快照，与探索循环之间没有共享可变状态。

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AppError;

/// 日志中识别到的一个标记（致命异常或 ANR）
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogMarker {
    pub timestamp: DateTime<Utc>,

    /// 命中的日志行内容
    pub message: String,

    /// 附加上下文（致命异常的堆栈文本）
    pub detail: Option<String>,
}

/// 一次采集窗口内汇总的崩溃证据，交接后不再修改
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CrashEvidence {
    /// 致命异常标记
    pub fatal_exceptions: Vec<LogMarker>,

    /// ANR / 冻结标记
    pub anr_events: Vec<LogMarker>,

    /// 采集窗口内错误级别日志行数（仅供报告参考）
    pub error_lines: usize,

    /// 保存的日志文件路径
    pub log_file: Option<PathBuf>,
}

/// 日志采集接口
#[async_trait]
pub trait LogListener: Send + Sync {
    /// 清空旧日志并开始针对指定包名的采集
    async fn start_capture(&self, package: &str) -> Result<(), AppError>;

    /// 停止采集并交出本窗口的证据
    async fn stop_capture(&self) -> Result<CrashEvidence, AppError>;
}

/// `-v time` 格式的 logcat 行
/// 例: "06-01 12:00:00.123 E/AndroidRuntime( 1234): FATAL EXCEPTION: main"
fn line_re() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+([VDIWEF])/([^(]+)\(\s*\d+\):\s?(.*)$",
        )
        .unwrap()
    })
}

/// 解析 logcat 时间戳（无年份，补当前年）
fn parse_logcat_time(ts: &str) -> Option<DateTime<Utc>> {
    let year = Utc::now().year();
    let full = format!("{}-{}", year, ts);
    NaiveDateTime::parse_from_str(&full, "%Y-%m-%d %H:%M:%S%.3f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// 纯状态的证据归集器：逐行喂入 logcat 文本，产出 [`CrashEvidence`]
///
/// 致命异常块从 "FATAL EXCEPTION" 行开始，吸收同 tag 的后续错误行作为
/// 堆栈文本；块内出现目标包名才算该应用的崩溃。
pub struct EvidenceBuilder {
    package: String,
    fatal_exceptions: Vec<LogMarker>,
    anr_events: Vec<LogMarker>,
    error_lines: usize,
    saved_lines: Vec<String>,
    pending_fatal: Option<PendingFatal>,
}

struct PendingFatal {
    timestamp: DateTime<Utc>,
    message: String,
    tag: String,
    lines: Vec<String>,
    package_seen: bool,
}

impl EvidenceBuilder {
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            fatal_exceptions: Vec::new(),
            anr_events: Vec::new(),
            error_lines: 0,
            saved_lines: Vec::new(),
            pending_fatal: None,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        let Some(cap) = line_re().captures(line) else {
            return;
        };
        let timestamp = parse_logcat_time(&cap[1]).unwrap_or_else(Utc::now);
        let level = &cap[2];
        let tag = cap[3].trim().to_string();
        let message = cap[4].to_string();

        if matches!(level, "E" | "F") {
            self.error_lines += 1;
            self.saved_lines.push(line.to_string());
        }

        // 致命异常块的后续行（同 tag 的错误行）
        if let Some(pending) = &mut self.pending_fatal {
            if tag == pending.tag && matches!(level, "E" | "F") && !message.contains("FATAL EXCEPTION") {
                if message.contains(&self.package) {
                    pending.package_seen = true;
                }
                pending.lines.push(message);
                return;
            }
            self.flush_pending();
        }

        if message.contains("FATAL EXCEPTION") {
            self.pending_fatal = Some(PendingFatal {
                timestamp,
                message: message.clone(),
                tag,
                lines: Vec::new(),
                package_seen: message.contains(&self.package),
            });
            return;
        }

        if let Some(rest) = message.strip_prefix("ANR in ") {
            if rest.starts_with(&self.package) {
                self.anr_events.push(LogMarker {
                    timestamp,
                    message,
                    detail: None,
                });
            }
        }
    }

    fn flush_pending(&mut self) {
        if let Some(pending) = self.pending_fatal.take() {
            if pending.package_seen {
                self.fatal_exceptions.push(LogMarker {
                    timestamp: pending.timestamp,
                    message: pending.message,
                    detail: if pending.lines.is_empty() {
                        None
                    } else {
                        Some(pending.lines.join("\n"))
                    },
                });
            }
        }
    }

    pub fn finish(mut self) -> (CrashEvidence, Vec<String>) {
        self.flush_pending();
        (
            CrashEvidence {
                fatal_exceptions: self.fatal_exceptions,
                anr_events: self.anr_events,
                error_lines: self.error_lines,
                log_file: None,
            },
            self.saved_lines,
        )
    }
}

struct CaptureTask {
    child: tokio::process::Child,
    reader: tokio::task::JoinHandle<EvidenceBuilder>,
    package: String,
}

/// 基于 `adb logcat` 的日志采集器
pub struct LogcatListener {
    serial: String,
    log_dir: PathBuf,
    task: Mutex<Option<CaptureTask>>,
}

impl LogcatListener {
    pub fn new(serial: String, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            serial,
            log_dir: log_dir.into(),
            task: Mutex::new(None),
        }
    }

    async fn clear_buffer(&self) -> Result<(), AppError> {
        let status = tokio::process::Command::new("adb")
            .args(["-s", &self.serial, "logcat", "-c"])
            .status()
            .await
            .map_err(|e| AppError::LogcatError(format!("清空日志缓冲区失败: {}", e)))?;
        if !status.success() {
            warn!(serial = %self.serial, "logcat -c 返回非零状态");
        }
        Ok(())
    }

    async fn save_log_file(&self, package: &str, lines: &[String]) -> Option<PathBuf> {
        if lines.is_empty() {
            return None;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            warn!(error = %e, "创建日志目录失败");
            return None;
        }
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let path = self.log_dir.join(format!("logcat_{}_{}.txt", package, timestamp));
        match tokio::fs::write(&path, lines.join("\n")).await {
            Ok(()) => {
                info!(path = %path.display(), "错误日志已保存");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "保存日志文件失败");
                None
            }
        }
    }
}

#[async_trait]
impl LogListener for LogcatListener {
    async fn start_capture(&self, package: &str) -> Result<(), AppError> {
        let mut guard = self.task.lock().await;
        if guard.is_some() {
            warn!("上一次日志采集未停止，忽略本次启动");
            return Ok(());
        }

        self.clear_buffer().await?;

        info!(serial = %self.serial, package, "开始日志采集");
        let mut child = tokio::process::Command::new("adb")
            .args(["-s", &self.serial, "logcat", "-v", "time"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::LogcatError(format!("启动 logcat 失败: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::LogcatError("无法获取 logcat 输出".to_string()))?;

        let mut builder = EvidenceBuilder::new(package);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => builder.push_line(&line),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "读取日志行失败");
                        break;
                    }
                }
            }
            builder
        });

        *guard = Some(CaptureTask {
            child,
            reader,
            package: package.to_string(),
        });
        Ok(())
    }

    async fn stop_capture(&self) -> Result<CrashEvidence, AppError> {
        let Some(mut task) = self.task.lock().await.take() else {
            return Ok(CrashEvidence::default());
        };

        info!(serial = %self.serial, "停止日志采集");
        // 结束 logcat 进程，读任务随 EOF 退出
        if let Err(e) = task.child.start_kill() {
            debug!(error = %e, "终止 logcat 进程失败");
        }
        let _ = task.child.wait().await;

        let builder = task
            .reader
            .await
            .map_err(|e| AppError::LogcatError(format!("日志读取任务异常: {}", e)))?;

        let (mut evidence, saved_lines) = builder.finish();
        evidence.log_file = self.save_log_file(&task.package, &saved_lines).await;

        info!(
            fatal = evidence.fatal_exceptions.len(),
            anr = evidence.anr_events.len(),
            error_lines = evidence.error_lines,
            "日志采集完成"
        );
        Ok(evidence)
    }
}

/// 保存日志文件的默认目录名
pub fn default_log_dir(artifacts_dir: &Path) -> PathBuf {
    artifacts_dir.join("logs")
}
