use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::{debug, info};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// 默认探测端口
pub const DEFAULT_PORTS: [u16; 2] = [80, 443];

/// 单次连接超时
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// TCP connect 端口探测，只读，不影响工作集
#[derive(Debug, Clone)]
pub struct PortProber {
    ports: Vec<u16>,
    timeout: Duration,
    concurrency: usize,
}

impl PortProber {
    /// 探测 `ports`，`concurrency` 为同时在途的连接数
    pub fn new(ports: Vec<u16>, concurrency: usize) -> Self {
        PortProber {
            ports,
            timeout: DEFAULT_PROBE_TIMEOUT,
            concurrency: concurrency.max(1),
        }
    }

    /// 修改单次连接超时
    pub fn with_timeout(mut self, probe_timeout: Duration) -> Self {
        self.timeout = probe_timeout;
        self
    }

    /// 返回每个主机名的开放端口，端口升序；没有开放端口的主机不出现
    pub async fn scan<'a, I>(&self, hosts: I) -> BTreeMap<String, Vec<u16>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let targets: Vec<(String, u16)> = hosts
            .into_iter()
            .flat_map(|host| self.ports.iter().map(move |port| (host.clone(), *port)))
            .collect();
        let total = targets.len();

        let open: Vec<(String, u16)> = stream::iter(targets)
            .map(|(host, port)| async move {
                if self.probe(&host, port).await {
                    Some((host, port))
                } else {
                    None
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|found| async move { found })
            .collect()
            .await;

        let mut results: BTreeMap<String, Vec<u16>> = BTreeMap::new();
        for (host, port) in open {
            results.entry(host).or_default().push(port);
        }
        for ports in results.values_mut() {
            ports.sort_unstable();
        }

        info!("端口探测完成: {} 次连接，{} 个主机有开放端口", total, results.len());
        results
    }

    async fn probe(&self, host: &str, port: u16) -> bool {
        match timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!("{}:{} 连接失败: {}", host, port, e);
                false
            }
            Err(_elapsed) => false,
        }
    }
}
