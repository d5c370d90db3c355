use std::collections::HashSet;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use super::{admit_labels, decode_json, Source, SourceContext};
use crate::config::credential;
use crate::domain::Domain;
use crate::error::EnumError;

const NAME: &str = "shodan";

#[derive(Debug, Deserialize)]
struct DnsDomainResponse {
    #[serde(default)]
    subdomains: Vec<String>,
}

/// Shodan DNS 接口，需要 `shodan_api_key`
#[derive(Debug, Clone)]
pub struct ShodanSource {
    api_key: Option<String>,
}

impl ShodanSource {
    /// 创建数据源
    pub fn new(api_key: Option<String>) -> Self {
        ShodanSource { api_key }
    }
}

/// 解析 `/dns/domain` 响应
pub fn parse_response(domain: &Domain, body: &str) -> Result<HashSet<String>, EnumError> {
    let response: DnsDomainResponse = decode_json(NAME, body)?;
    Ok(admit_labels(domain, &response.subdomains))
}

#[async_trait]
impl Source for ShodanSource {
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

        let url = format!("https://api.shodan.io/dns/domain/{}", domain);
        let body = ctx
            .get_text(NAME, |client| client.get(&url).query(&[("key", api_key)]))
            .await?;
        parse_response(domain, &body)
    }
}
