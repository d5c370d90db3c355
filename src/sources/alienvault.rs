use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use super::{admit_all, decode_json, Source, SourceContext};
use crate::domain::Domain;
use crate::error::EnumError;

const NAME: &str = "alienvault";

#[derive(Debug, Deserialize)]
struct PassiveDnsResponse {
    #[serde(default)]
    passive_dns: Vec<PassiveDnsRecord>,
}

#[derive(Debug, Deserialize)]
struct PassiveDnsRecord {
    #[serde(default)]
    hostname: String,
}

/// AlienVault OTX 被动DNS，无需凭据
#[derive(Debug, Default, Clone)]
pub struct AlienVaultSource;

impl AlienVaultSource {
    /// 创建数据源
    pub fn new() -> Self {
        AlienVaultSource
    }
}

/// 解析 passive_dns 响应
pub fn parse_response(domain: &Domain, body: &str) -> Result<HashSet<String>, EnumError> {
    let response: PassiveDnsResponse = decode_json(NAME, body)?;
    Ok(admit_all(
        domain,
        response.passive_dns.iter().map(|record| record.hostname.as_str()),
    ))
}

#[async_trait]
impl Source for AlienVaultSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn enumerate(
        &self,
        domain: &Domain,
        ctx: &SourceContext,
    ) -> Result<HashSet<String>, EnumError> {
        let url = format!(
            "https://otx.alienvault.com/api/v1/indicators/domain/{}/passive_dns",
            domain
        );
        let body = ctx.get_text(NAME, |client| client.get(&url)).await?;
        parse_response(domain, &body)
    }
}
