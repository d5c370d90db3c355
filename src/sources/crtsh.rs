use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;

use super::{admit_all, decode_json, Source, SourceContext};
use crate::domain::Domain;
use crate::error::EnumError;

const NAME: &str = "crtsh";

#[derive(Debug, Deserialize)]
struct CrtEntry {
    #[serde(default)]
    name_value: String,
}

/// crt.sh 证书透明日志，无需凭据
#[derive(Debug, Default, Clone)]
pub struct CrtShSource;

impl CrtShSource {
    /// 创建数据源
    pub fn new() -> Self {
        CrtShSource
    }
}

/// 解析 crt.sh 的JSON响应；一条 `name_value` 可能含多个换行分隔的名字
pub fn parse_response(domain: &Domain, body: &str) -> Result<HashSet<String>, EnumError> {
    // 没有证书时 crt.sh 返回空 body
    if body.trim().is_empty() {
        return Ok(HashSet::new());
    }
    let entries: Vec<CrtEntry> = decode_json(NAME, body)?;
    Ok(admit_all(
        domain,
        entries.iter().flat_map(|entry| entry.name_value.lines()),
    ))
}

#[async_trait]
impl Source for CrtShSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn enumerate(
        &self,
        domain: &Domain,
        ctx: &SourceContext,
    ) -> Result<HashSet<String>, EnumError> {
        let pattern = format!("%.{}", domain);
        let body = ctx
            .get_text(NAME, |client| {
                client
                    .get("https://crt.sh/")
                    .query(&[("q", pattern.as_str()), ("output", "json")])
            })
            .await?;
        parse_response(domain, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_name_entries() {
        let domain = Domain::parse("example.com").unwrap();
        let body = r#"[
            {"issuer_name": "R3", "name_value": "www.example.com\n*.api.example.com"},
            {"name_value": "WWW.EXAMPLE.COM"},
            {"name_value": "evil.com"},
            {"name_value": "notexample.com"}
        ]"#;
        let hosts = parse_response(&domain, body).unwrap();
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("www.example.com"));
        assert!(hosts.contains("api.example.com"));
    }

    #[test]
    fn test_empty_body() {
        let domain = Domain::parse("example.com").unwrap();
        assert!(parse_response(&domain, "").unwrap().is_empty());
        assert!(parse_response(&domain, "[]").unwrap().is_empty());
    }

    #[test]
    fn test_html_error_page_is_unavailable() {
        let domain = Domain::parse("example.com").unwrap();
        let err = parse_response(&domain, "<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, EnumError::SourceUnavailable { .. }));
    }
}
