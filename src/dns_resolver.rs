use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use trust_dns_resolver::config::*;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

/// DNS查询失败的分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// 权威的不存在（NXDOMAIN 或无记录）
    NotFound,
    /// 查询超时
    Timeout,
    /// 其他失败（SERVFAIL、网络错误等）
    Failed(String),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::NotFound => write!(f, "记录不存在"),
            LookupError::Timeout => write!(f, "查询超时"),
            LookupError::Failed(reason) => write!(f, "{}", reason),
        }
    }
}

impl From<ResolveError> for LookupError {
    fn from(e: ResolveError) -> Self {
        match e.kind() {
            ResolveErrorKind::NoRecordsFound { .. } => LookupError::NotFound,
            ResolveErrorKind::Timeout => LookupError::Timeout,
            _ => LookupError::Failed(e.to_string()),
        }
    }
}

/// 异步DNS查询
#[async_trait]
pub trait Lookup: Send + Sync {
    /// 查询A/AAAA记录
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, LookupError>;

    /// 查询CNAME记录，结果去掉末尾的点
    async fn lookup_cname(&self, host: &str) -> Result<Vec<String>, LookupError>;
}

/// 基于 trust-dns 的解析器
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsResolver {
    /// 使用系统默认上游
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(ResolverConfig::default(), timeout)
    }

    /// 使用指定的DNS服务器列表，列表为空时退回默认上游
    pub fn with_nameservers(nameservers: &[IpAddr], timeout: Duration) -> Self {
        if nameservers.is_empty() {
            return Self::new(timeout);
        }
        let group = NameServerConfigGroup::from_ips_clear(nameservers, 53, true);
        Self::with_config(ResolverConfig::from_parts(None, vec![], group), timeout)
    }

    fn with_config(config: ResolverConfig, timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 2;
        DnsResolver {
            resolver: TokioAsyncResolver::tokio(config, opts),
            timeout,
        }
    }

    fn deadline(&self) -> Duration {
        // 覆盖两次尝试
        self.timeout * 2 + Duration::from_millis(500)
    }
}

#[async_trait]
impl Lookup for DnsResolver {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let response = timeout(self.deadline(), self.resolver.lookup_ip(host))
            .await
            .map_err(|_| LookupError::Timeout)??;
        let ips: Vec<IpAddr> = response.iter().collect();
        if ips.is_empty() {
            return Err(LookupError::NotFound);
        }
        Ok(ips)
    }

    async fn lookup_cname(&self, host: &str) -> Result<Vec<String>, LookupError> {
        let response = timeout(self.deadline(), self.resolver.lookup(host, RecordType::CNAME))
            .await
            .map_err(|_| LookupError::Timeout)??;

        let mut cnames = Vec::new();
        for record in response.iter() {
            if let RData::CNAME(cname) = record {
                cnames.push(cname.to_string().trim_end_matches('.').to_lowercase());
            }
        }
        if cnames.is_empty() {
            return Err(LookupError::NotFound);
        }
        Ok(cnames)
    }
}

/// 给任意 [`Lookup`] 加上全局并发上限
///
/// 所有经过它的查询共用一个信号量，嵌套的并发调用（递归展开里再做验证）
/// 也不会超过上限。许可只在单次查询期间持有。
pub struct LimitedLookup {
    inner: Arc<dyn Lookup>,
    limiter: Arc<Semaphore>,
}

impl LimitedLookup {
    /// `max_in_flight` 为同时在途的查询上限
    pub fn new(inner: Arc<dyn Lookup>, max_in_flight: usize) -> Self {
        LimitedLookup {
            inner,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }
}

#[async_trait]
impl Lookup for LimitedLookup {
    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| LookupError::Failed(e.to_string()))?;
        self.inner.lookup_ip(host).await
    }

    async fn lookup_cname(&self, host: &str) -> Result<Vec<String>, LookupError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| LookupError::Failed(e.to_string()))?;
        self.inner.lookup_cname(host).await
    }
}

/// 读取DNS服务器列表文件：每行一个IP，`#` 开头为注释
pub fn load_resolver_list<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<IpAddr>> {
    let content = fs::read_to_string(path.as_ref())?;
    let nameservers = parse_resolver_list(&content);
    debug!(
        "从 {} 读取 {} 个DNS服务器",
        path.as_ref().display(),
        nameservers.len()
    );
    Ok(nameservers)
}

/// 解析DNS服务器列表文本
pub fn parse_resolver_list(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match line.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                warn!("忽略无效的DNS服务器: {}", line);
                None
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 内存里的DNS，未登记的名字返回 `fallback`
    pub(crate) struct FakeLookup {
        pub ips: HashMap<String, Vec<IpAddr>>,
        pub cnames: HashMap<String, Vec<String>>,
        pub failures: HashMap<String, LookupError>,
        pub wildcard: HashMap<String, Vec<IpAddr>>,
        pub fallback: LookupError,
        pub queried: Mutex<Vec<String>>,
    }

    impl FakeLookup {
        pub(crate) fn new() -> Self {
            FakeLookup {
                ips: HashMap::new(),
                cnames: HashMap::new(),
                failures: HashMap::new(),
                wildcard: HashMap::new(),
                fallback: LookupError::NotFound,
                queried: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_ip(mut self, host: &str, ip: &str) -> Self {
            self.ips
                .entry(host.to_string())
                .or_default()
                .push(ip.parse().unwrap());
            self
        }

        pub(crate) fn with_cname(mut self, host: &str, target: &str) -> Self {
            self.cnames
                .entry(host.to_string())
                .or_default()
                .push(target.to_string());
            self
        }

        pub(crate) fn with_failure(mut self, host: &str, error: LookupError) -> Self {
            self.failures.insert(host.to_string(), error);
            self
        }

        /// 让 `*.domain` 下所有未登记的名字都解析到 `ip`
        pub(crate) fn with_wildcard(mut self, domain: &str, ip: &str) -> Self {
            self.wildcard
                .entry(domain.to_string())
                .or_default()
                .push(ip.parse().unwrap());
            self
        }
    }

    #[async_trait]
    impl Lookup for FakeLookup {
        async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
            self.queried.lock().unwrap().push(host.to_string());
            if let Some(error) = self.failures.get(host) {
                return Err(error.clone());
            }
            if let Some(ips) = self.ips.get(host) {
                return Ok(ips.clone());
            }
            for (domain, ips) in &self.wildcard {
                if host.ends_with(&format!(".{}", domain)) {
                    return Ok(ips.clone());
                }
            }
            Err(self.fallback.clone())
        }

        async fn lookup_cname(&self, host: &str) -> Result<Vec<String>, LookupError> {
            self.cnames
                .get(host)
                .cloned()
                .ok_or(LookupError::NotFound)
        }
    }

    /// 每次查询都停顿一会儿，并记录同时在途的最大查询数
    #[derive(Default)]
    pub(crate) struct SlowLookup {
        in_flight: AtomicUsize,
        pub peak: AtomicUsize,
    }

    impl SlowLookup {
        async fn pause(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Lookup for SlowLookup {
        async fn lookup_ip(&self, _host: &str) -> Result<Vec<IpAddr>, LookupError> {
            self.pause().await;
            Err(LookupError::NotFound)
        }

        async fn lookup_cname(&self, _host: &str) -> Result<Vec<String>, LookupError> {
            self.pause().await;
            Err(LookupError::NotFound)
        }
    }

    #[tokio::test]
    async fn test_limited_lookup_caps_in_flight_queries() {
        let slow = Arc::new(SlowLookup::default());
        let limited = LimitedLookup::new(slow.clone(), 3);

        let hosts: Vec<String> = (0..12).map(|i| format!("h{}.example.com", i)).collect();
        let results = futures::future::join_all(hosts.iter().map(|h| limited.lookup_ip(h))).await;

        assert_eq!(results.len(), 12);
        assert_eq!(slow.peak.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_parse_resolver_list() {
        let content = "# public resolvers\n8.8.8.8\n\n1.1.1.1 \nnot-an-ip\n2001:4860:4860::8888\n";
        let nameservers = parse_resolver_list(content);
        assert_eq!(nameservers.len(), 3);
        assert_eq!(nameservers[0], "8.8.8.8".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_missing_resolver_file() {
        assert!(load_resolver_list("/nonexistent/resolvers.txt").is_err());
    }

    #[tokio::test]
    async fn test_empty_nameserver_list_falls_back() {
        // 只验证构造不会 panic
        let _resolver = DnsResolver::with_nameservers(&[], Duration::from_secs(1));
    }
}
