//! 被动数据源
//!
//! 每个数据源实现 [`Source`]，只负责拼请求和解析响应；
//! 超时、限流重试和并发上限由共享的 [`SourceContext`] 统一处理。

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::Settings;
use crate::domain::Domain;
use crate::error::EnumError;

pub mod alienvault;
pub mod censys;
pub mod crtsh;
pub mod hackertarget;
pub mod securitytrails;
pub mod shodan;

pub use alienvault::AlienVaultSource;
pub use censys::CensysSource;
pub use crtsh::CrtShSource;
pub use hackertarget::HackerTargetSource;
pub use securitytrails::SecurityTrailsSource;
pub use shodan::ShodanSource;

/// 被动数据源
#[async_trait]
pub trait Source: Send + Sync {
    /// 数据源名称
    fn name(&self) -> &str;

    /// 是否具备运行所需的凭据，未配置的数据源不会发出任何请求
    fn is_configured(&self) -> bool {
        true
    }

    /// 查询 `domain` 的子域名，结果均已规范化且属于 `domain`
    async fn enumerate(
        &self,
        domain: &Domain,
        ctx: &SourceContext,
    ) -> Result<HashSet<String>, EnumError>;
}

/// 数据源共享的网络上下文
#[derive(Debug, Clone)]
pub struct SourceContext {
    client: Client,
    timeout: Duration,
    rate_limit_backoff: Duration,
    limiter: Arc<Semaphore>,
}

impl SourceContext {
    /// 按配置构建HTTP客户端，`max_in_flight` 限制同时在途的请求数
    pub fn new(settings: &Settings, max_in_flight: usize) -> Result<Self, EnumError> {
        let client = Client::builder()
            .timeout(settings.http_timeout())
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| EnumError::Config(format!("HTTP客户端初始化失败: {}", e)))?;

        Ok(Self::with_client(
            client,
            settings.http_timeout(),
            settings.rate_limit_backoff(),
            max_in_flight,
        ))
    }

    /// 使用现成的客户端
    pub fn with_client(
        client: Client,
        timeout: Duration,
        rate_limit_backoff: Duration,
        max_in_flight: usize,
    ) -> Self {
        SourceContext {
            client,
            timeout,
            rate_limit_backoff,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// 共享的HTTP客户端
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 发送请求并读取文本响应；限流时等待后重试一次
    pub async fn get_text<F>(&self, source_name: &str, build: F) -> Result<String, EnumError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.get_text_checked(source_name, build, |_| Ok(())).await
    }

    /// 同 [`get_text`](Self::get_text)，响应体先交给 `check` 检查
    ///
    /// `check` 返回的 `RateLimited` 和 HTTP 429 走同一次重试。
    pub async fn get_text_checked<F, C>(
        &self,
        source_name: &str,
        build: F,
        check: C,
    ) -> Result<String, EnumError>
    where
        F: Fn(&Client) -> RequestBuilder,
        C: Fn(&str) -> Result<(), EnumError>,
    {
        let (build, check) = (&build, &check);
        retry_on_rate_limit(source_name, self.rate_limit_backoff, || async move {
            let body = self.fetch_once(source_name, build(&self.client)).await?;
            check(&body)?;
            Ok(body)
        })
        .await
    }

    /// 同 [`get_text`](Self::get_text)，响应按JSON解码
    pub async fn get_json<T, F>(&self, source_name: &str, build: F) -> Result<T, EnumError>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let body = self.get_text(source_name, build).await?;
        decode_json(source_name, &body)
    }

    async fn fetch_once(
        &self,
        source_name: &str,
        request: RequestBuilder,
    ) -> Result<String, EnumError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| EnumError::unavailable(source_name, e))?;

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|e| EnumError::unavailable(source_name, e))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(EnumError::RateLimited {
                    source_name: source_name.to_string(),
                });
            }
            if !status.is_success() {
                return Err(EnumError::unavailable(source_name, format!("HTTP {}", status)));
            }

            response
                .text()
                .await
                .map_err(|e| EnumError::unavailable(source_name, e))
        };

        timeout(self.timeout, exchange)
            .await
            .map_err(|_| EnumError::unavailable(source_name, "请求超时"))?
    }
}

/// 限流重试：第一次返回 `RateLimited` 时等待 `backoff` 后再试一次，
/// 再次限流则降级为 `SourceUnavailable`
pub async fn retry_on_rate_limit<T, F, Fut>(
    source_name: &str,
    backoff: Duration,
    mut attempt: F,
) -> Result<T, EnumError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EnumError>>,
{
    match attempt().await {
        Err(EnumError::RateLimited { .. }) => {
            warn!("数据源 {} 触发限流，{:?} 后重试", source_name, backoff);
            tokio::time::sleep(backoff).await;
            match attempt().await {
                Err(EnumError::RateLimited { .. }) => {
                    Err(EnumError::unavailable(source_name, "重试后仍被限流"))
                }
                other => other,
            }
        }
        other => other,
    }
}

/// 解码JSON响应，失败视为数据源不可用
pub fn decode_json<T: DeserializeOwned>(source_name: &str, body: &str) -> Result<T, EnumError> {
    serde_json::from_str(body)
        .map_err(|e| EnumError::unavailable(source_name, format!("响应解析失败: {}", e)))
}

/// 把完整主机名过滤进 `domain`
pub(crate) fn admit_all<I, S>(domain: &Domain, names: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| domain.admit(name.as_ref()))
        .collect()
}

/// 把标签拼到 `domain` 下再过滤
pub(crate) fn admit_labels<I, S>(domain: &Domain, labels: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|label| label.as_ref().trim().trim_end_matches('.').to_string())
        .filter(|label| !label.is_empty())
        .filter_map(|label| domain.admit(&domain.child(&label)))
        .collect()
}

/// 按配置创建全部内置数据源
pub fn default_sources(settings: &Settings) -> Vec<Arc<dyn Source>> {
    vec![
        Arc::new(CrtShSource::new()),
        Arc::new(SecurityTrailsSource::new(settings.securitytrails_api_key.clone())),
        Arc::new(CensysSource::new(
            settings.censys_api_id.clone(),
            settings.censys_api_secret.clone(),
        )),
        Arc::new(ShodanSource::new(settings.shodan_api_key.clone())),
        Arc::new(HackerTargetSource::new()),
        Arc::new(AlienVaultSource::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TOO_MANY: &str =
        "HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
    const QUOTA: &str =
        "HTTP/1.1 200 OK\r\ncontent-length: 18\r\nconnection: close\r\n\r\nAPI count exceeded";
    const OK: &str = "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";

    /// 本地HTTP服务：按顺序返回预设响应，用完后重复最后一个，并记录连接数
    async fn serve(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let response = responses[n.min(responses.len() - 1)];
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (format!("http://{}/", addr), hits)
    }

    fn local_context(timeout: Duration) -> SourceContext {
        SourceContext::with_client(Client::new(), timeout, Duration::from_millis(1), 4)
    }

    #[tokio::test]
    async fn test_single_rate_limit_is_retried() {
        let calls = AtomicUsize::new(0);
        let result = retry_on_rate_limit("fake", Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(EnumError::RateLimited {
                        source_name: "fake".to_string(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_rate_limit_degrades_to_unavailable() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), EnumError> =
            retry_on_rate_limit("fake", Duration::from_millis(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EnumError::RateLimited {
                        source_name: "fake".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(EnumError::SourceUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), EnumError> =
            retry_on_rate_limit("fake", Duration::from_millis(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EnumError::unavailable("fake", "HTTP 500")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_unavailable() {
        let ctx = SourceContext::with_client(
            Client::new(),
            Duration::from_secs(2),
            Duration::from_millis(1),
            4,
        );
        let result = ctx
            .get_text("local", |client| client.get("http://127.0.0.1:9/"))
            .await;
        assert!(matches!(result, Err(EnumError::SourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_http_429_is_retried_once() {
        let (url, hits) = serve(vec![TOO_MANY]).await;
        let ctx = local_context(Duration::from_secs(2));

        let result = ctx.get_text("local", |client| client.get(url.as_str())).await;
        match result {
            Err(EnumError::SourceUnavailable { reason, .. }) => assert_eq!(reason, "重试后仍被限流"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_http_429_then_success() {
        let (url, hits) = serve(vec![TOO_MANY, OK]).await;
        let ctx = local_context(Duration::from_secs(2));

        let body = ctx.get_text("local", |client| client.get(url.as_str())).await;
        assert_eq!(body.unwrap(), "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_silent_provider_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let ctx = local_context(Duration::from_millis(200));
        let url = format!("http://{}/", addr);

        let result = ctx.get_text("local", |client| client.get(url.as_str())).await;
        match result {
            Err(EnumError::SourceUnavailable { reason, .. }) => assert_eq!(reason, "请求超时"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_body_rate_limit_shares_single_retry() {
        let (url, hits) = serve(vec![TOO_MANY, QUOTA, TOO_MANY, QUOTA]).await;
        let ctx = local_context(Duration::from_secs(2));

        let result = ctx
            .get_text_checked(
                "hackertarget",
                |client| client.get(url.as_str()),
                hackertarget::check_quota,
            )
            .await;
        assert!(matches!(result, Err(EnumError::SourceUnavailable { .. })));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_admit_labels() {
        let domain = Domain::parse("example.com").unwrap();
        let hosts = admit_labels(&domain, vec!["www", "MAIL.", "", "bad label"]);
        assert_eq!(hosts.len(), 2);
        assert!(hosts.contains("www.example.com"));
        assert!(hosts.contains("mail.example.com"));
    }

    #[test]
    fn test_unconfigured_sources_are_reported() {
        let sources = default_sources(&Settings::default());
        let configured: Vec<&str> = sources
            .iter()
            .filter(|s| s.is_configured())
            .map(|s| s.name())
            .collect();
        assert_eq!(configured, vec!["crtsh", "hackertarget", "alienvault"]);
    }
}
