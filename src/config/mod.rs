//! 配置模块
//!
//! 从 TOML 文件加载测试会话配置：设备、全局策略与待测应用列表。
//! 加载后立即校验，配置非法时在任何设备交互之前报错退出。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::explorer::engine::ExplorerConfig;
use crate::explorer::outcome::{ActionKind, ActionSet};
use crate::session::{AppSpec, SessionPolicy};

/// 完整的测试会话配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TesterConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    /// 待测应用列表，按出现顺序测试
    #[serde(default)]
    pub apps: Vec<AppEntry>,
}

/// 设备配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// adb 设备序列号；为空时使用 `adb devices` 中唯一在线的设备
    pub serial: Option<String>,
}

/// 全局策略配置（单个应用可覆盖部分字段）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// 单个应用的探索时长（秒）
    #[serde(default = "default_app_duration_secs")]
    pub app_duration_secs: u64,

    /// 崩溃 / 冻结 / 传输故障时的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// 相邻应用之间的间隔（秒）
    #[serde(default = "default_inter_app_delay_secs")]
    pub inter_app_delay_secs: u64,

    /// 启动后等待界面稳定的时间（秒）
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    /// 单次设备调用超时（秒）
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    /// 操作之间的间隔（毫秒）
    #[serde(default = "default_action_delay_ms")]
    pub action_delay_ms: u64,

    /// 同一界面上连续滚动的上限
    #[serde(default = "default_scroll_cap")]
    pub scroll_cap: u32,

    /// 填入输入框的文本
    #[serde(default = "default_input_text")]
    pub input_text: String,

    /// 默认允许的操作类型
    #[serde(default = "default_actions")]
    pub actions: Vec<ActionKind>,

    /// 失败时是否截图留证
    #[serde(default = "default_true")]
    pub screenshot_on_failure: bool,

    /// 产物输出目录
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

fn default_app_duration_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_inter_app_delay_secs() -> u64 {
    3
}
fn default_settle_delay_secs() -> u64 {
    2
}
fn default_step_timeout_secs() -> u64 {
    10
}
fn default_action_delay_ms() -> u64 {
    500
}
fn default_scroll_cap() -> u32 {
    5
}
fn default_input_text() -> String {
    "test input".to_string()
}
fn default_actions() -> Vec<ActionKind> {
    vec![ActionKind::Tap, ActionKind::Scroll, ActionKind::Back]
}
fn default_true() -> bool {
    true
}
fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("apptester_artifacts")
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            app_duration_secs: default_app_duration_secs(),
            max_retries: default_max_retries(),
            inter_app_delay_secs: default_inter_app_delay_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            step_timeout_secs: default_step_timeout_secs(),
            action_delay_ms: default_action_delay_ms(),
            scroll_cap: default_scroll_cap(),
            input_text: default_input_text(),
            actions: default_actions(),
            screenshot_on_failure: default_true(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

/// 一个待测应用的配置条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEntry {
    /// 展示名；为空时使用包名
    pub name: Option<String>,

    pub package: String,

    /// 指定启动 Activity；为空时通过 LAUNCHER intent 启动
    pub activity: Option<String>,

    /// 覆盖全局探索时长（秒）
    pub duration_secs: Option<u64>,

    /// 覆盖全局操作类型
    pub actions: Option<Vec<ActionKind>>,
}

impl TesterConfig {
    /// 从 TOML 文件加载配置并校验
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// 从 TOML 文本加载配置并校验
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: TesterConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// 校验配置，非法即整体拒绝
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.apps.is_empty() {
            return Err(ConfigError::ValidationError(
                "应用列表为空，没有可测试的应用".to_string(),
            ));
        }

        for app in &self.apps {
            if app.package.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "应用包名不能为空".to_string(),
                ));
            }
            if let Some(0) = app.duration_secs {
                return Err(ConfigError::ValidationError(format!(
                    "应用 {} 的探索时长必须大于 0",
                    app.package
                )));
            }
            if let Some(actions) = &app.actions {
                if actions.is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "应用 {} 的操作集合不能为空",
                        app.package
                    )));
                }
            }
        }

        if self.policy.app_duration_secs == 0 {
            return Err(ConfigError::ValidationError(
                "探索时长必须大于 0".to_string(),
            ));
        }
        if self.policy.step_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "单步超时必须大于 0".to_string(),
            ));
        }
        if self.policy.actions.is_empty() {
            return Err(ConfigError::ValidationError(
                "操作集合不能为空".to_string(),
            ));
        }

        Ok(())
    }

    /// 转换为会话策略
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            app_duration: Duration::from_secs(self.policy.app_duration_secs),
            max_retries: self.policy.max_retries,
            inter_app_delay: Duration::from_secs(self.policy.inter_app_delay_secs),
            settle_delay: Duration::from_secs(self.policy.settle_delay_secs),
            allowed_actions: ActionSet::from_kinds(&self.policy.actions),
            screenshot_on_failure: self.policy.screenshot_on_failure,
            artifacts_dir: self.policy.artifacts_dir.clone(),
            explorer: ExplorerConfig {
                step_timeout: Duration::from_secs(self.policy.step_timeout_secs),
                action_delay: Duration::from_millis(self.policy.action_delay_ms),
                scroll_cap: self.policy.scroll_cap,
                input_text_value: self.policy.input_text.clone(),
            },
        }
    }

    /// 转换为待测应用列表
    pub fn app_specs(&self) -> Vec<AppSpec> {
        self.apps
            .iter()
            .map(|entry| AppSpec {
                name: entry
                    .name
                    .clone()
                    .unwrap_or_else(|| entry.package.clone()),
                package: entry.package.clone(),
                activity: entry.activity.clone(),
                duration: entry.duration_secs.map(Duration::from_secs),
                actions: entry
                    .actions
                    .as_deref()
                    .map(ActionSet::from_kinds),
            })
            .collect()
    }
}

/// 配置错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO 错误: {0}")]
    IoError(String),

    #[error("解析错误: {0}")]
    ParseError(String),

    #[error("序列化错误: {0}")]
    SerializeError(String),

    #[error("验证错误: {0}")]
    ValidationError(String),
}
