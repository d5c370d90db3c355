use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use rand::Rng;
use tokio::sync::OnceCell;

use crate::dns_resolver::{Lookup, LookupError};
use crate::domain::Domain;

/// 域名的泛解析状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardState {
    /// 随机标签可以解析，附带探测到的地址
    Wildcard(BTreeSet<IpAddr>),
    /// 随机标签确定不存在
    NotWildcard,
    /// 探测超时或服务器出错，按非泛解析处理
    Unknown,
}

impl WildcardState {
    /// 是否为泛解析
    pub fn is_wildcard(&self) -> bool {
        matches!(self, WildcardState::Wildcard(_))
    }

    /// 泛解析地址，非泛解析时为空
    pub fn addresses(&self) -> Option<&BTreeSet<IpAddr>> {
        match self {
            WildcardState::Wildcard(ips) => Some(ips),
            _ => None,
        }
    }
}

/// 泛解析检测器，每个域名只探测一次
pub struct WildcardDetector {
    lookup: Arc<dyn Lookup>,
    probes: usize,
    wildcard_cache: Mutex<HashMap<String, Arc<OnceCell<WildcardState>>>>,
}

impl WildcardDetector {
    /// `probes` 为每个域名探测的随机标签数，至少为1
    pub fn new(lookup: Arc<dyn Lookup>, probes: usize) -> Self {
        WildcardDetector {
            lookup,
            probes: probes.max(1),
            wildcard_cache: Mutex::new(HashMap::new()),
        }
    }

    /// 检测域名是否存在泛解析，结果缓存到本次运行结束
    pub async fn detect_wildcard(&self, domain: &Domain) -> WildcardState {
        let cell = {
            let mut cache = self
                .wildcard_cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            cache
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_init(|| self.probe(domain)).await.clone()
    }

    /// 已缓存的检测结果
    pub fn cached(&self, domain: &Domain) -> Option<WildcardState> {
        let cache = self
            .wildcard_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache.get(domain.as_str()).and_then(|cell| cell.get().cloned())
    }

    async fn probe(&self, domain: &Domain) -> WildcardState {
        let test_domains = generate_test_subdomains(domain, self.probes);

        let first = match self.lookup.lookup_ip(&test_domains[0]).await {
            Ok(ips) => ips,
            Err(LookupError::NotFound) => {
                debug!("{} 无泛解析", domain);
                return WildcardState::NotWildcard;
            }
            Err(e) => {
                warn!("{} 泛解析探测失败 ({})，按非泛解析处理", domain, e);
                return WildcardState::Unknown;
            }
        };

        let mut wildcard_ips: BTreeSet<IpAddr> = first.into_iter().collect();
        // 轮询型泛解析每次返回的地址可能不同，多探几次收集地址
        for test_domain in &test_domains[1..] {
            if let Ok(ips) = self.lookup.lookup_ip(test_domain).await {
                wildcard_ips.extend(ips);
            }
        }

        info!(
            "检测到泛解析域名: {} -> {}",
            domain,
            wildcard_ips
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        WildcardState::Wildcard(wildcard_ips)
    }
}

/// 生成测试用的随机子域名，标签为16位随机数字
fn generate_test_subdomains(domain: &Domain, count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let token: u64 = rng.gen_range(1_000_000_000_000_000..10_000_000_000_000_000);
            domain.child(&token.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns_resolver::tests::FakeLookup;

    #[test]
    fn test_probe_labels_are_random_and_scoped() {
        let domain = Domain::parse("example.com").unwrap();
        let names = generate_test_subdomains(&domain, 3);
        assert_eq!(names.len(), 3);
        for name in &names {
            let label = name.strip_suffix(".example.com").unwrap();
            assert_eq!(label.len(), 16);
            assert!(label.chars().all(|c| c.is_ascii_digit()));
        }
        assert_ne!(names[0], names[1]);
    }

    #[tokio::test]
    async fn test_not_found_is_negative() {
        let detector = WildcardDetector::new(Arc::new(FakeLookup::new()), 2);
        let domain = Domain::parse("example.com").unwrap();
        assert_eq!(detector.detect_wildcard(&domain).await, WildcardState::NotWildcard);
    }

    #[tokio::test]
    async fn test_catch_all_is_positive() {
        let lookup = FakeLookup::new().with_wildcard("example.com", "10.0.0.1");
        let detector = WildcardDetector::new(Arc::new(lookup), 2);
        let domain = Domain::parse("example.com").unwrap();

        let state = detector.detect_wildcard(&domain).await;
        assert!(state.is_wildcard());
        let expected: BTreeSet<IpAddr> = ["10.0.0.1".parse().unwrap()].into_iter().collect();
        assert_eq!(state.addresses(), Some(&expected));
    }

    #[tokio::test]
    async fn test_ambiguous_failure_is_unknown() {
        let mut lookup = FakeLookup::new();
        lookup.fallback = LookupError::Timeout;
        let detector = WildcardDetector::new(Arc::new(lookup), 1);
        let domain = Domain::parse("example.com").unwrap();

        let state = detector.detect_wildcard(&domain).await;
        assert_eq!(state, WildcardState::Unknown);
        assert!(!state.is_wildcard());
    }

    #[tokio::test]
    async fn test_detection_runs_once_per_domain() {
        let lookup = Arc::new(FakeLookup::new());
        let detector = WildcardDetector::new(lookup.clone(), 1);
        let domain = Domain::parse("example.com").unwrap();

        assert!(detector.cached(&domain).is_none());
        let (a, b) = tokio::join!(detector.detect_wildcard(&domain), detector.detect_wildcard(&domain));
        assert_eq!(a, b);
        detector.detect_wildcard(&domain).await;
        assert_eq!(lookup.queried.lock().unwrap().len(), 1);
        assert_eq!(detector.cached(&domain), Some(WildcardState::NotWildcard));
    }
}
