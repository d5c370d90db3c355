use thiserror::Error;

/// 枚举过程中的错误分类
///
/// 除了 `InvalidDomain`、`Config`、`Io` 之外，其余错误都只影响所在阶段，
/// 由阶段自身吸收并降级为部分结果。
#[derive(Error, Debug)]
pub enum EnumError {
    /// 被动数据源不可用（网络错误、超时、非成功状态码、响应无法解析）
    #[error("数据源 {source_name} 不可用: {reason}")]
    SourceUnavailable {
        /// 数据源名称
        source_name: String,
        /// 失败原因
        reason: String,
    },

    /// 数据源返回限流响应
    #[error("数据源 {source_name} 触发限流")]
    RateLimited {
        /// 数据源名称
        source_name: String,
    },

    /// 单个主机名DNS解析失败
    #[error("解析 {hostname} 失败: {reason}")]
    ResolutionFailure {
        /// 主机名
        hostname: String,
        /// 失败原因
        reason: String,
    },

    /// 外部批量解析工具失败
    #[error("外部解析工具失败: {0}")]
    ExternalToolFailure(String),

    /// 缺少必需的凭据
    #[error("数据源 {source_name} 缺少配置项 {key}")]
    ConfigMissing {
        /// 数据源名称
        source_name: String,
        /// 缺失的配置键
        key: String,
    },

    /// 目标域名格式非法
    #[error("非法域名: {0}")]
    InvalidDomain(String),

    /// 配置文件错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件读写错误
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl EnumError {
    /// 构造 `SourceUnavailable`
    pub fn unavailable(source_name: &str, reason: impl ToString) -> Self {
        EnumError::SourceUnavailable {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}
