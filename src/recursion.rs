use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::{debug, info};

use crate::aggregator::Aggregator;
use crate::domain::{Domain, WorkingSet};
use crate::validator::Validator;

/// 递归发现的结果
#[derive(Debug, Clone)]
pub struct RecursionReport {
    /// 合并后的工作集
    pub working_set: WorkingSet,
    /// 作为查询根出现过的全部域名，包括初始根域名
    pub visited: BTreeSet<String>,
    /// 实际展开的层数
    pub levels: u32,
}

/// 广度优先的递归发现：把新发现的主机名当作新的根域名再查一遍
pub struct RecursiveExpander {
    aggregator: Arc<Aggregator>,
    validator: Option<Arc<Validator>>,
    concurrency: usize,
}

impl RecursiveExpander {
    /// `concurrency` 为同一层内同时展开的主机名数量
    pub fn new(aggregator: Arc<Aggregator>, concurrency: usize) -> Self {
        RecursiveExpander {
            aggregator,
            validator: None,
            concurrency: concurrency.max(1),
        }
    }

    /// 展开前先验证每一层的新结果，只有可解析的名字进入工作集
    pub fn with_validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// 从 `working_set` 出发展开至多 `depth` 层
    ///
    /// 每层只展开上一层新加入的名字；工作集只增不减。
    pub async fn expand(&self, root: &Domain, working_set: WorkingSet, depth: u32) -> RecursionReport {
        let mut working_set = working_set;
        let mut visited = BTreeSet::new();
        visited.insert(root.to_string());

        let mut frontier: Vec<String> = working_set.iter().cloned().collect();
        let mut remaining = depth;
        let mut levels = 0;

        while remaining > 0 && !frontier.is_empty() {
            let mut targets = Vec::with_capacity(frontier.len());
            for host in frontier.drain(..) {
                if !visited.insert(host.clone()) {
                    continue;
                }
                match Domain::parse(&host) {
                    Ok(domain) => targets.push(domain),
                    Err(e) => debug!("跳过无法作为根域名的主机名: {}", e),
                }
            }
            if targets.is_empty() {
                break;
            }

            levels += 1;
            info!("递归第 {} 层: 展开 {} 个主机名", levels, targets.len());

            let discovered: Vec<WorkingSet> = stream::iter(targets)
                .map(|domain| async move { self.expand_one(&domain).await })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            frontier = working_set.merge(discovered.into_iter().flatten());
            info!("递归第 {} 层新增 {} 个主机名", levels, frontier.len());
            remaining -= 1;
        }

        RecursionReport {
            working_set,
            visited,
            levels,
        }
    }

    async fn expand_one(&self, domain: &Domain) -> WorkingSet {
        let report = self.aggregator.gather(domain).await;
        let found: WorkingSet = report.hostnames.into_iter().collect();
        match &self.validator {
            Some(validator) if !found.is_empty() => validator.validate(found, domain).await.0,
            _ => found,
        }
    }
}
