use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info};

use crate::dns_resolver::Lookup;

/// 云厂商与CNAME后缀，按顺序匹配
pub const CLOUD_PROVIDERS: [(&str, &str); 6] = [
    ("aws", "amazonaws.com"),
    ("aws", "cloudfront.net"),
    ("azure", "azurewebsites.net"),
    ("azure", "cloudapp.net"),
    ("gcp", "googleapis.com"),
    ("gcp", "appspot.com"),
];

/// 按CNAME识别托管在云厂商上的子域名
pub struct CloudClassifier {
    lookup: Arc<dyn Lookup>,
    concurrency: usize,
}

impl CloudClassifier {
    /// 创建分类器
    pub fn new(lookup: Arc<dyn Lookup>, concurrency: usize) -> Self {
        CloudClassifier {
            lookup,
            concurrency: concurrency.max(1),
        }
    }

    /// 返回 主机名 -> 云厂商，没有匹配的主机名不出现
    pub async fn classify<'a, I>(&self, hosts: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let found: Vec<(String, &'static str)> = stream::iter(hosts)
            .map(|host| async move {
                match self.lookup.lookup_cname(host).await {
                    Ok(targets) => classify_targets(&targets).map(|provider| (host.clone(), provider)),
                    Err(e) => {
                        debug!("{} 无CNAME: {}", host, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|found| async move { found })
            .collect()
            .await;

        info!("云资产识别: {} 个子域名", found.len());
        found
            .into_iter()
            .map(|(host, provider)| (host, provider.to_string()))
            .collect()
    }
}

/// 一组CNAME目标的云厂商，表中靠前的后缀优先
pub fn classify_targets(targets: &[String]) -> Option<&'static str> {
    CLOUD_PROVIDERS.iter().find_map(|(provider, suffix)| {
        targets
            .iter()
            .any(|target| matches_suffix(target, suffix))
            .then_some(*provider)
    })
}

fn matches_suffix(target: &str, suffix: &str) -> bool {
    let target = target.trim_end_matches('.').to_lowercase();
    target == suffix || target.ends_with(&format!(".{}", suffix))
}
