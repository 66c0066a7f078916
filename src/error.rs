use thiserror::Error;

/// 应用程序统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 设备未连接
    #[error("设备未连接: {0}")]
    DeviceNotConnected(String),

    /// ADB 错误
    #[error("ADB 错误: {0}")]
    AdbError(String),

    /// 设备调用超时
    #[error("设备调用超时: {0}")]
    DeviceTimeout(String),

    /// 界面层级解析错误
    #[error("界面层级解析错误: {0}")]
    HierarchyParseError(String),

    /// 日志采集错误
    #[error("日志采集错误: {0}")]
    LogcatError(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    JsonError(#[from] serde_json::Error),

    /// 未知错误
    #[error("未知错误: {0}")]
    Unknown(String),
}

/// AppError 的 Result 类型别名
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// 是否属于传输层错误（设备/通信故障）
    ///
    /// 传输层错误由编排器按重试策略处理，不计入应用本身的失败。
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::DeviceNotConnected(_)
                | AppError::AdbError(_)
                | AppError::DeviceTimeout(_)
                | AppError::IoError(_)
        )
    }
}
