use std::collections::HashSet;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use super::{admit_labels, decode_json, Source, SourceContext};
use crate::config::credential;
use crate::domain::Domain;
use crate::error::EnumError;

const NAME: &str = "securitytrails";

#[derive(Debug, Deserialize)]
struct SubdomainsResponse {
    #[serde(default)]
    subdomains: Vec<String>,
}

/// SecurityTrails，需要 `securitytrails_api_key`
#[derive(Debug, Clone)]
pub struct SecurityTrailsSource {
    api_key: Option<String>,
}

impl SecurityTrailsSource {
    /// 创建数据源
    pub fn new(api_key: Option<String>) -> Self {
        SecurityTrailsSource { api_key }
    }
}

/// 响应里只有标签，需要拼上查询域名
pub fn parse_response(domain: &Domain, body: &str) -> Result<HashSet<String>, EnumError> {
    let response: SubdomainsResponse = decode_json(NAME, body)?;
    Ok(admit_labels(domain, &response.subdomains))
}

#[async_trait]
impl Source for SecurityTrailsSource {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        credential(&self.api_key).is_some()
    }

    async fn enumerate(
        &self,
        domain: &Domain,
        ctx: &SourceContext,
    ) -> Result<HashSet<String>, EnumError> {
        let Some(api_key) = credential(&self.api_key) else {
            debug!("{} 未配置 API key，跳过", NAME);
            return Ok(HashSet::new());
        };

        let url = format!("https://api.securitytrails.com/v1/domain/{}/subdomains", domain);
        let body = ctx
            .get_text(NAME, |client| client.get(&url).header("APIKEY", api_key))
            .await?;
        parse_response(domain, &body)
    }
}
