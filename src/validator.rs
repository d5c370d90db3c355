use std::net::IpAddr;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info};

use crate::dns_resolver::Lookup;
use crate::domain::{Domain, WorkingSet};
use crate::error::EnumError;
use crate::wildcard::WildcardDetector;

/// 单个主机名的验证结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// 主机名
    pub hostname: String,
    /// 是否确认存在
    pub resolved: bool,
    /// 解析到的地址
    pub addresses: Vec<IpAddr>,
}

/// DNS验证器
///
/// 泛解析区域内，若一个名字解析到的地址全部落在泛解析探测地址里，
/// 视为泛解析产物并丢弃；只要有一个地址不同就保留。
/// 检查的区域为根域名和主机名的直接父域。
pub struct Validator {
    lookup: Arc<dyn Lookup>,
    detector: Arc<WildcardDetector>,
    concurrency: usize,
}

impl Validator {
    /// `concurrency` 为同时在途的DNS查询上限
    pub fn new(lookup: Arc<dyn Lookup>, detector: Arc<WildcardDetector>, concurrency: usize) -> Self {
        Validator {
            lookup,
            detector,
            concurrency: concurrency.max(1),
        }
    }

    /// 验证工作集，返回保留下来的主机名和每个主机名的结果
    pub async fn validate(
        &self,
        set: WorkingSet,
        root: &Domain,
    ) -> (WorkingSet, Vec<ValidationResult>) {
        let total = set.len();
        if self.detector.detect_wildcard(root).await.is_wildcard() {
            info!("{} 存在泛解析，按地址比对过滤验证结果", root);
        }

        let results: Vec<ValidationResult> = stream::iter(set)
            .map(|host| self.check(host, root))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let kept: WorkingSet = results
            .iter()
            .filter(|r| r.resolved)
            .map(|r| r.hostname.clone())
            .collect();

        info!("DNS验证完成: {}/{} 个主机名可解析", kept.len(), total);
        (kept, results)
    }

    async fn check(&self, hostname: String, root: &Domain) -> ValidationResult {
        let addresses = match self.lookup.lookup_ip(&hostname).await {
            Ok(ips) => ips,
            Err(e) => {
                let failure = EnumError::ResolutionFailure {
                    hostname: hostname.clone(),
                    reason: e.to_string(),
                };
                debug!("{}", failure);
                return ValidationResult {
                    hostname,
                    resolved: false,
                    addresses: Vec::new(),
                };
            }
        };

        for zone in wildcard_zones(&hostname, root) {
            let state = self.detector.detect_wildcard(&zone).await;
            if let Some(wildcard_ips) = state.addresses() {
                if addresses.iter().all(|ip| wildcard_ips.contains(ip)) {
                    debug!("{} 只解析到 {} 的泛解析地址，丢弃", hostname, zone);
                    return ValidationResult {
                        hostname,
                        resolved: false,
                        addresses,
                    };
                }
            }
        }

        ValidationResult {
            hostname,
            resolved: true,
            addresses,
        }
    }
}

/// 需要检查泛解析的区域：根域名，以及不同于根域名的直接父域
fn wildcard_zones(hostname: &str, root: &Domain) -> Vec<Domain> {
    let mut zones = Vec::with_capacity(2);
    if hostname == root.as_str() {
        return zones;
    }
    zones.push(root.clone());

    if let Some((_, parent)) = hostname.split_once('.') {
        if parent != root.as_str() && root.covers(parent) {
            if let Ok(parent) = Domain::parse(parent) {
                zones.push(parent);
            }
        }
    }
    zones
}
