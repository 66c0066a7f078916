use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::device::traits::Device;
use crate::error::AppError;
use crate::explorer::engine::{CancelFlag, Explorer, ExplorerConfig};
use crate::explorer::outcome::{ActionSet, ExplorationOutcome, TerminalReason};
use crate::logcat::{CrashEvidence, LogListener};

use super::aggregator::{summarize, SessionSummary};
use super::classifier::{classify, FailureRecord, RunStatus};

/// 测试会话的全局策略
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// 单个应用的探索时间预算
    pub app_duration: Duration,

    /// 单个应用的最大重试次数（崩溃 / 冻结 / 传输故障才重试）
    pub max_retries: u32,

    /// 相邻应用之间的间隔
    pub inter_app_delay: Duration,

    /// 启动后等待界面稳定的时间
    pub settle_delay: Duration,

    /// 默认允许的操作集合（单个应用可覆盖）
    pub allowed_actions: ActionSet,

    /// 失败时是否截图留证
    pub screenshot_on_failure: bool,

    /// 产物输出目录（截图、日志、会话结果）
    pub artifacts_dir: PathBuf,

    pub explorer: ExplorerConfig,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            app_duration: Duration::from_secs(60),
            max_retries: 2,
            inter_app_delay: Duration::from_secs(3),
            settle_delay: Duration::from_secs(2),
            allowed_actions: ActionSet::default(),
            screenshot_on_failure: true,
            artifacts_dir: PathBuf::from("apptester_artifacts"),
            explorer: ExplorerConfig::default(),
        }
    }
}

/// 一个待测应用
#[derive(Debug, Clone)]
pub struct AppSpec {
    /// 展示名（报告用）
    pub name: String,

    pub package: String,

    /// 指定启动 Activity；为空时通过 LAUNCHER intent 启动
    pub activity: Option<String>,

    /// 覆盖全局时间预算
    pub duration: Option<Duration>,

    /// 覆盖全局操作集合
    pub actions: Option<ActionSet>,
}

/// 单个应用的最终测试结果（反映最后一次尝试）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRunResult {
    pub app: String,
    pub package: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// 探索结果；传输层故障导致运行未完成时为 None
    pub outcome: Option<ExplorationOutcome>,

    pub failures: Vec<FailureRecord>,

    /// 实际发生的重试次数
    pub retry_count: u32,

    pub screenshots: Vec<PathBuf>,

    /// 本次运行保存的 logcat 文件
    pub log_file: Option<PathBuf>,
}

/// 整个会话的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// 会话被取消时为 true，结果列表可能不完整
    pub cancelled: bool,

    pub results: Vec<AppRunResult>,
    pub summary: SessionSummary,
}

/// 测试会话编排器
///
/// 串行遍历应用列表，每个应用执行"采集 → 启动 → 探索 → 判定"的
/// 状态机，按策略决定重试。同一时刻只有一个应用在测试中。
pub struct SessionOrchestrator {
    device: Arc<dyn Device>,
    listener: Arc<dyn LogListener>,
    policy: SessionPolicy,
    cancel: CancelFlag,
}

impl SessionOrchestrator {
    pub fn new(
        device: Arc<dyn Device>,
        listener: Arc<dyn LogListener>,
        policy: SessionPolicy,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            device,
            listener,
            policy,
            cancel,
        }
    }

    /// 按顺序测试全部应用，返回完整会话结果
    ///
    /// 设备失联时剩余应用直接标记为传输故障，不再尝试；
    /// 收到取消请求时结束当前应用后跳过其余应用。
    pub async fn run_session(&self, apps: &[AppSpec]) -> SessionResult {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%session_id, apps = apps.len(), "开始测试会话");

        let mut results = Vec::with_capacity(apps.len());
        let mut device_lost = false;

        for (index, app) in apps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = apps.len() - index, "会话已取消，跳过剩余应用");
                break;
            }

            if device_lost {
                results.push(Self::unreachable_result(app));
                continue;
            }

            info!(app = %app.name, package = %app.package, "开始测试应用");
            let result = self.run_app(app).await;

            let transport_ended = result
                .failures
                .last()
                .map(|f| f.kind == super::classifier::FailureKind::TransportError)
                .unwrap_or(false);
            results.push(result);

            // 传输故障收尾时确认设备是否还在线，失联则中止整个会话
            if transport_ended && !self.device.is_connected().await {
                error!(serial = %self.device.serial(), "设备失联，中止剩余应用");
                device_lost = true;
                continue;
            }

            if index + 1 < apps.len() && !self.cancel.is_cancelled() {
                tokio::time::sleep(self.policy.inter_app_delay).await;
            }
        }

        let summary = summarize(&results);
        let finished_at = Utc::now();
        info!(
            %session_id,
            total = summary.total,
            success = summary.success,
            crash = summary.crash,
            "测试会话结束"
        );

        SessionResult {
            session_id,
            started_at,
            finished_at,
            cancelled: self.cancel.is_cancelled(),
            results,
            summary,
        }
    }

    /// 测试单个应用，内部按策略重试
    ///
    /// 重试规则：崩溃、冻结、传输故障可重试；界面错误与成功从不重试；
    /// 取消的运行直接收尾。
    async fn run_app(&self, app: &AppSpec) -> AppRunResult {
        let budget = app.duration.unwrap_or(self.policy.app_duration);
        let allowed = app.actions.unwrap_or(self.policy.allowed_actions);
        let explorer = Explorer::new(
            self.device.clone(),
            self.policy.explorer.clone(),
            self.cancel.clone(),
        );

        let started_at = Utc::now();
        let mut retry_count: u32 = 0;

        let (status, outcome, failures, log_file) = loop {
            match self.run_attempt(app, budget, allowed, &explorer).await {
                Ok((status, outcome, failures, log_file)) => {
                    let cancelled = outcome.terminal == TerminalReason::Cancelled;
                    let retriable = matches!(status, RunStatus::Crash | RunStatus::Timeout);

                    if retriable && !cancelled && retry_count < self.policy.max_retries {
                        retry_count += 1;
                        warn!(
                            package = %app.package,
                            ?status,
                            retry = retry_count,
                            "运行失败，重试"
                        );
                        if let Err(e) = self.device.stop_app(&app.package).await {
                            warn!(error = %e, "重试前停止应用失败");
                        }
                        tokio::time::sleep(self.policy.settle_delay).await;
                        continue;
                    }

                    break (status, Some(outcome), failures, log_file);
                }
                Err(e) => {
                    warn!(package = %app.package, error = %e, "传输层故障");

                    if retry_count < self.policy.max_retries && !self.cancel.is_cancelled() {
                        retry_count += 1;
                        tokio::time::sleep(self.policy.settle_delay).await;
                        continue;
                    }

                    break (
                        RunStatus::Error,
                        None,
                        vec![FailureRecord::transport(e.to_string())],
                        None,
                    );
                }
            }
        };

        let screenshots = self.finalize_app(app, status).await;

        AppRunResult {
            app: app.name.clone(),
            package: app.package.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            outcome,
            failures,
            retry_count,
            screenshots,
            log_file,
        }
    }

    /// 一次完整的尝试：采集 → 启动 → 探索 → 判定
    ///
    /// `Err` 表示传输层故障（启动失败、前台校验失败、设备调用超时），
    /// 由 [`Self::run_app`] 决定是否重试。
    async fn run_attempt(
        &self,
        app: &AppSpec,
        budget: Duration,
        allowed: ActionSet,
        explorer: &Explorer,
    ) -> Result<
        (
            RunStatus,
            ExplorationOutcome,
            Vec<FailureRecord>,
            Option<PathBuf>,
        ),
        AppError,
    > {
        // 采集失败不致命，本次运行只是缺少日志证据
        if let Err(e) = self.listener.start_capture(&app.package).await {
            warn!(package = %app.package, error = %e, "启动日志采集失败");
        }

        if let Err(e) = self.prepare_app(app).await {
            let _ = self.listener.stop_capture().await;
            return Err(e);
        }

        let explored = explorer.explore(&app.package, budget, allowed).await;

        let evidence = match self.listener.stop_capture().await {
            Ok(ev) => ev,
            Err(e) => {
                warn!(package = %app.package, error = %e, "停止日志采集失败");
                CrashEvidence::default()
            }
        };

        let outcome = explored?;
        let log_file = evidence.log_file.clone();
        let (status, failures) = classify(&outcome, &evidence);
        Ok((status, outcome, failures, log_file))
    }

    /// 启动应用并确认到达前台
    async fn prepare_app(&self, app: &AppSpec) -> Result<(), AppError> {
        self.device
            .launch_app(&app.package, app.activity.as_deref())
            .await?;

        tokio::time::sleep(self.policy.settle_delay).await;

        let current = self.device.current_app().await?;
        if current != app.package {
            return Err(AppError::AdbError(format!(
                "应用未到达前台: 期望 {} 实际 {}",
                app.package, current
            )));
        }
        Ok(())
    }

    /// 收尾：失败留证截图、强制停止应用（均为尽力而为）
    async fn finalize_app(&self, app: &AppSpec, status: RunStatus) -> Vec<PathBuf> {
        let mut screenshots = Vec::new();

        if status != RunStatus::Success && self.policy.screenshot_on_failure {
            let file = self
                .policy
                .artifacts_dir
                .join("screenshots")
                .join(format!(
                    "fail_{}_{}.png",
                    app.package,
                    Utc::now().format("%Y%m%d_%H%M%S")
                ));
            match self.device.capture_screenshot(&file).await {
                Ok(path) => screenshots.push(path),
                Err(e) => warn!(package = %app.package, error = %e, "失败截图保存失败"),
            }
        }

        if let Err(e) = self.device.stop_app(&app.package).await {
            warn!(package = %app.package, error = %e, "停止应用失败");
        }

        screenshots
    }

    /// 设备失联后为未执行的应用生成占位结果
    fn unreachable_result(app: &AppSpec) -> AppRunResult {
        let now = Utc::now();
        AppRunResult {
            app: app.name.clone(),
            package: app.package.clone(),
            status: RunStatus::Error,
            started_at: now,
            finished_at: now,
            outcome: None,
            failures: vec![FailureRecord::transport(
                "设备失联，本应用未执行".to_string(),
            )],
            retry_count: 0,
            screenshots: Vec::new(),
            log_file: None,
        }
    }
}
