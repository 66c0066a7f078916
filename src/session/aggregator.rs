use serde::{Deserialize, Serialize};

use super::classifier::RunStatus;
use super::orchestrator::AppRunResult;

/// 会话级统计汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub success: usize,
    pub error: usize,
    pub crash: usize,
    pub timeout: usize,

    /// 所有运行访问过的界面数之和
    pub total_screens: usize,

    /// 所有运行执行的操作数之和
    pub total_actions: usize,

    /// 所有运行累计的重试次数
    pub total_retries: u32,

    /// 实际测试耗时（按各应用起止时间累加，秒）
    pub total_duration_secs: f64,
}

/// 汇总各应用的运行结果
///
/// 纯函数：不修改输入，对同一输入重复调用产出相同结果。
pub fn summarize(results: &[AppRunResult]) -> SessionSummary {
    let mut summary = SessionSummary {
        total: results.len(),
        ..Default::default()
    };

    for result in results {
        match result.status {
            RunStatus::Success => summary.success += 1,
            RunStatus::Error => summary.error += 1,
            RunStatus::Crash => summary.crash += 1,
            RunStatus::Timeout => summary.timeout += 1,
        }

        if let Some(outcome) = &result.outcome {
            summary.total_screens += outcome.screens_visited;
            summary.total_actions += outcome.actions.len();
        }

        summary.total_retries += result.retry_count;
        summary.total_duration_secs += (result.finished_at - result.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
    }

    summary
}
