use std::collections::HashSet;

use async_trait::async_trait;

use super::{admit_all, Source, SourceContext};
use crate::domain::Domain;
use crate::error::EnumError;

const NAME: &str = "hackertarget";

/// HackerTarget hostsearch，返回 `host,ip` 文本行，无需凭据
#[derive(Debug, Default, Clone)]
pub struct HackerTargetSource;

impl HackerTargetSource {
    /// 创建数据源
    pub fn new() -> Self {
        HackerTargetSource
    }
}

/// 免费额度用尽时返回 `RateLimited`
pub fn check_quota(body: &str) -> Result<(), EnumError> {
    if body.trim_start().starts_with("API count exceeded") {
        return Err(EnumError::RateLimited {
            source_name: NAME.to_string(),
        });
    }
    Ok(())
}

/// 解析文本响应；`error` 开头的响应视为数据源不可用
pub fn parse_response(domain: &Domain, body: &str) -> Result<HashSet<String>, EnumError> {
    let trimmed = body.trim();
    if trimmed.starts_with("error") {
        return Err(EnumError::unavailable(NAME, trimmed));
    }

    Ok(admit_all(
        domain,
        trimmed
            .lines()
            .filter_map(|line| line.split(',').next())
            .filter(|host| !host.trim().is_empty()),
    ))
}

#[async_trait]
impl Source for HackerTargetSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn enumerate(
        &self,
        domain: &Domain,
        ctx: &SourceContext,
    ) -> Result<HashSet<String>, EnumError> {
        let body = ctx
            .get_text_checked(
                NAME,
                |client| {
                    client
                        .get("https://api.hackertarget.com/hostsearch/")
                        .query(&[("q", domain.as_str())])
                },
                check_quota,
            )
            .await?;
        parse_response(domain, &body)
    }
}
