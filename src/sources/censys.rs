use std::collections::HashSet;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use super::{admit_all, decode_json, Source, SourceContext};
use crate::config::credential;
use crate::domain::Domain;
use crate::error::EnumError;

const NAME: &str = "censys";
const SEARCH_URL: &str = "https://search.censys.io/api/v2/hosts/search";

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: SearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Default, Deserialize)]
struct Hit {
    #[serde(default)]
    names: Vec<String>,
}

/// Censys 主机搜索，按证书名字段检索；需要 API ID 和 secret
#[derive(Debug, Clone)]
pub struct CensysSource {
    api_id: Option<String>,
    api_secret: Option<String>,
}

impl CensysSource {
    /// 创建数据源
    pub fn new(api_id: Option<String>, api_secret: Option<String>) -> Self {
        CensysSource { api_id, api_secret }
    }
}

/// 解析搜索结果
pub fn parse_response(domain: &Domain, body: &str) -> Result<HashSet<String>, EnumError> {
    let response: SearchResponse = decode_json(NAME, body)?;
    Ok(admit_all(
        domain,
        response.result.hits.iter().flat_map(|hit| hit.names.iter()),
    ))
}

#[async_trait]
impl Source for CensysSource {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        credential(&self.api_id).is_some() && credential(&self.api_secret).is_some()
    }

    async fn enumerate(
        &self,
        domain: &Domain,
        ctx: &SourceContext,
    ) -> Result<HashSet<String>, EnumError> {
        let (Some(api_id), Some(api_secret)) =
            (credential(&self.api_id), credential(&self.api_secret))
        else {
            debug!("{} 未配置 API ID/secret，跳过", NAME);
            return Ok(HashSet::new());
        };

        let query = format!("services.tls.certificates.leaf_data.names:\"{}\"", domain);
        let body = ctx
            .get_text(NAME, |client| {
                client
                    .get(SEARCH_URL)
                    .query(&[("q", query.as_str())])
                    .basic_auth(api_id, Some(api_secret))
            })
            .await?;
        parse_response(domain, &body)
    }
}
