use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::domain::Domain;
use crate::sources::{Source, SourceContext};

/// 单个数据源的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// 成功，附带贡献的主机名数量
    Found(usize),
    /// 未配置凭据，未发出请求
    Skipped,
    /// 数据源不可用
    Failed(String),
}

/// 数据源名称与执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// 数据源名称
    pub source: String,
    /// 执行结果
    pub outcome: SourceOutcome,
}

/// 一次聚合的结果
#[derive(Debug, Clone)]
pub struct AggregateReport {
    /// 查询的域名
    pub domain: Domain,
    /// 所有成功数据源的并集
    pub hostnames: HashSet<String>,
    /// 每个数据源的结果，顺序与数据源配置顺序一致
    pub reports: Vec<SourceReport>,
}

impl AggregateReport {
    /// 失败的数据源数量
    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, SourceOutcome::Failed(_)))
            .count()
    }
}

/// 聚合器：并发查询全部数据源，单个失败不影响其他数据源
pub struct Aggregator {
    sources: Vec<Arc<dyn Source>>,
    ctx: SourceContext,
}

impl Aggregator {
    /// 创建聚合器
    pub fn new(sources: Vec<Arc<dyn Source>>, ctx: SourceContext) -> Self {
        Aggregator { sources, ctx }
    }

    /// 已配置的数据源
    pub fn sources(&self) -> &[Arc<dyn Source>] {
        &self.sources
    }

    /// 查询 `domain` 并返回所有成功结果的并集
    pub async fn gather(&self, domain: &Domain) -> AggregateReport {
        let tasks = self.sources.iter().map(|source| async move {
            let name = source.name().to_string();
            if !source.is_configured() {
                debug!("数据源 {} 未配置凭据，已跳过", name);
                return (
                    SourceReport {
                        source: name,
                        outcome: SourceOutcome::Skipped,
                    },
                    HashSet::new(),
                );
            }

            match source.enumerate(domain, &self.ctx).await {
                Ok(found) => {
                    // 数据源实现可能漏掉过滤，这里再收一遍口
                    let found: HashSet<String> =
                        found.iter().filter_map(|host| domain.admit(host)).collect();
                    debug!("数据源 {} 在 {} 下发现 {} 个主机名", name, domain, found.len());
                    (
                        SourceReport {
                            source: name,
                            outcome: SourceOutcome::Found(found.len()),
                        },
                        found,
                    )
                }
                Err(e) => {
                    warn!("{}", e);
                    (
                        SourceReport {
                            source: name,
                            outcome: SourceOutcome::Failed(e.to_string()),
                        },
                        HashSet::new(),
                    )
                }
            }
        });

        let mut hostnames = HashSet::new();
        let mut reports = Vec::with_capacity(self.sources.len());
        for (report, found) in join_all(tasks).await {
            hostnames.extend(found);
            reports.push(report);
        }

        info!(
            "{}: {} 个数据源返回 {} 个去重主机名",
            domain,
            reports.len(),
            hostnames.len()
        );

        AggregateReport {
            domain: domain.clone(),
            hostnames,
            reports,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::EnumError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 按域名返回固定结果的测试数据源，记录被调用的域名
    pub(crate) struct FakeSource {
        pub name: &'static str,
        pub answers: HashMap<String, Vec<&'static str>>,
        pub fail: bool,
        pub configured: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeSource {
        pub(crate) fn new(name: &'static str, answers: Vec<(&str, Vec<&'static str>)>) -> Self {
            FakeSource {
                name,
                answers: answers
                    .into_iter()
                    .map(|(domain, hosts)| (domain.to_string(), hosts))
                    .collect(),
                fail: false,
                configured: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(name: &'static str) -> Self {
            FakeSource {
                fail: true,
                ..FakeSource::new(name, Vec::new())
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Source for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn enumerate(
            &self,
            domain: &Domain,
            _ctx: &SourceContext,
        ) -> Result<HashSet<String>, EnumError> {
            self.calls.lock().unwrap().push(domain.to_string());
            if self.fail {
                return Err(EnumError::unavailable(self.name, "connection reset"));
            }
            Ok(self
                .answers
                .get(domain.as_str())
                .map(|hosts| hosts.iter().map(|h| h.to_string()).collect())
                .unwrap_or_default())
        }
    }

    pub(crate) fn test_context() -> SourceContext {
        SourceContext::with_client(
            reqwest::Client::new(),
            Duration::from_secs(1),
            Duration::from_millis(1),
            8,
        )
    }

    #[tokio::test]
    async fn test_union_is_deduplicated() {
        let a = Arc::new(FakeSource::new("a", vec![("example.com", vec!["www.example.com"])]));
        let b = Arc::new(FakeSource::new(
            "b",
            vec![("example.com", vec!["mail.example.com", "www.example.com"])],
        ));
        let aggregator = Aggregator::new(vec![a as Arc<dyn Source>, b as Arc<dyn Source>], test_context());
        let domain = Domain::parse("example.com").unwrap();

        let report = aggregator.gather(&domain).await;
        assert_eq!(report.hostnames.len(), 2);
        assert_eq!(report.reports[0].outcome, SourceOutcome::Found(1));
        assert_eq!(report.reports[1].outcome, SourceOutcome::Found(2));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let ok = Arc::new(FakeSource::new("ok", vec![("example.com", vec!["api.example.com"])]));
        let broken = Arc::new(FakeSource::failing("broken"));
        let aggregator = Aggregator::new(
            vec![broken.clone() as Arc<dyn Source>, ok.clone() as Arc<dyn Source>],
            test_context(),
        );
        let domain = Domain::parse("example.com").unwrap();

        let report = aggregator.gather(&domain).await;
        let expected: HashSet<String> = ["api.example.com".to_string()].into_iter().collect();
        assert_eq!(report.hostnames, expected);
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.reports[0].outcome, SourceOutcome::Failed(_)));
        assert_eq!(broken.call_count(), 1);
        assert_eq!(ok.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_source_is_skipped_without_call() {
        let mut keyless = FakeSource::new("keyless", vec![("example.com", vec!["x.example.com"])]);
        keyless.configured = false;
        let keyless = Arc::new(keyless);
        let aggregator = Aggregator::new(vec![keyless.clone() as Arc<dyn Source>], test_context());
        let domain = Domain::parse("example.com").unwrap();

        let report = aggregator.gather(&domain).await;
        assert!(report.hostnames.is_empty());
        assert_eq!(report.reports[0].outcome, SourceOutcome::Skipped);
        assert_eq!(report.failed(), 0);
        assert_eq!(keyless.call_count(), 0);
    }

    #[tokio::test]
    async fn test_foreign_names_are_dropped() {
        let noisy = Arc::new(FakeSource::new(
            "noisy",
            vec![("example.com", vec!["WWW.example.com.", "example.org", "fooexample.com"])],
        ));
        let aggregator = Aggregator::new(vec![noisy as Arc<dyn Source>], test_context());
        let domain = Domain::parse("example.com").unwrap();

        let report = aggregator.gather(&domain).await;
        let expected: HashSet<String> = ["www.example.com".to_string()].into_iter().collect();
        assert_eq!(report.hostnames, expected);
    }
}
