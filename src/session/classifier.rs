use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::explorer::outcome::ExplorationOutcome;
use crate::logcat::CrashEvidence;

/// 单次应用运行的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// 探索正常完成，无故障证据
    Success,
    /// 界面上出现错误（应用自己暴露的问题，不重试）
    Error,
    /// 日志中有致命异常
    Crash,
    /// 日志中有 ANR / 冻结标记
    Timeout,
}

/// 故障类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Crash,
    AnrFreeze,
    UiErrorDialog,
    TransportError,
}

/// 一条故障记录
///
/// 带时间戳，报告可据此与操作序列中的具体位置对应。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub message: String,

    /// 结构化细节：堆栈文本或冻结说明
    pub detail: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn transport(message: String) -> Self {
        Self {
            kind: FailureKind::TransportError,
            message,
            detail: None,
            timestamp: Utc::now(),
        }
    }
}

/// 把探索结果与日志证据归并为唯一的运行状态加故障记录
///
/// 判定优先级（先命中先生效）：
/// 1. 日志中有致命异常 → `Crash`
/// 2. 日志中有 ANR 标记 → `Timeout`
/// 3. 探索期间检测到界面错误 → `Error`
/// 4. 其余情况 → `Success`（覆盖率只作参考，不影响判定）
///
/// 故障记录来自全部信号源；状态只取最强的一类。
pub fn classify(
    outcome: &ExplorationOutcome,
    evidence: &CrashEvidence,
) -> (RunStatus, Vec<FailureRecord>) {
    let mut failures = Vec::new();

    for marker in &evidence.fatal_exceptions {
        failures.push(FailureRecord {
            kind: FailureKind::Crash,
            message: marker.message.clone(),
            detail: marker.detail.clone(),
            timestamp: marker.timestamp,
        });
    }
    for marker in &evidence.anr_events {
        failures.push(FailureRecord {
            kind: FailureKind::AnrFreeze,
            message: marker.message.clone(),
            detail: marker.detail.clone(),
            timestamp: marker.timestamp,
        });
    }
    for signal in &outcome.ui_errors {
        failures.push(FailureRecord {
            kind: FailureKind::UiErrorDialog,
            message: signal.message.clone(),
            detail: None,
            timestamp: signal.timestamp,
        });
    }

    let status = if !evidence.fatal_exceptions.is_empty() {
        RunStatus::Crash
    } else if !evidence.anr_events.is_empty() {
        RunStatus::Timeout
    } else if !outcome.ui_errors.is_empty() {
        RunStatus::Error
    } else {
        RunStatus::Success
    };

    (status, failures)
}
