use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::EnumError;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// 配置文件内容（YAML）
///
/// 所有字段可省略；缺少的凭据会让对应数据源被跳过。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// SecurityTrails API key
    pub securitytrails_api_key: Option<String>,
    /// Censys API ID
    pub censys_api_id: Option<String>,
    /// Censys API secret
    pub censys_api_secret: Option<String>,
    /// Shodan API key
    pub shodan_api_key: Option<String>,
    /// OpenAI 兼容接口的 API key
    pub openai_api_key: Option<String>,
    /// 字典扩展使用的模型
    pub openai_model: String,
    /// 字典扩展接口地址
    pub openai_endpoint: String,
    /// massdns 可执行文件路径
    pub massdns_path: String,
    /// DNS 服务器列表文件
    pub resolvers_file: String,
    /// 单个HTTP请求超时（秒）
    pub http_timeout_secs: u64,
    /// 单个DNS查询超时（秒）
    pub dns_timeout_secs: u64,
    /// 限流后的重试等待（秒）
    pub rate_limit_backoff_secs: u64,
    /// HTTP User-Agent
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            securitytrails_api_key: None,
            censys_api_id: None,
            censys_api_secret: None,
            shodan_api_key: None,
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            openai_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            massdns_path: "massdns".to_string(),
            resolvers_file: "resolvers.txt".to_string(),
            http_timeout_secs: 10,
            dns_timeout_secs: 5,
            rate_limit_backoff_secs: 5,
            user_agent: format!("apexsub/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Settings {
    /// 从YAML文件加载配置，文件不存在时返回默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EnumError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("配置文件 {} 不存在，使用默认配置", path.display());
                return Ok(Settings::default());
            }
            Err(e) => return Err(EnumError::Io(e)),
        };

        let settings = Self::from_yaml(&content)?;
        info!("已加载配置文件: {}", path.display());
        Ok(settings)
    }

    /// 解析YAML文本，空文本视为默认配置
    pub fn from_yaml(content: &str) -> Result<Self, EnumError> {
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| EnumError::Config(format!("YAML解析失败: {}", e)))
    }

    /// HTTP超时
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// DNS超时
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    /// 限流重试等待
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }
}

/// 非空凭据
pub(crate) fn credential(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
