//! # apexsub
//!
//! 一个基于Rust实现的子域名枚举引擎库。
//!
//! ## 特性
//!
//! - 🔍 **被动收集**: 并发查询 crt.sh、SecurityTrails、Censys、Shodan、HackerTarget、AlienVault
//! - 🔁 **递归发现**: 把新发现的主机名当作根域名再查一遍，按深度广度优先展开
//! - 💥 **主动暴破**: 字典变形后交给 massdns 批量解析，可选用LLM扩展字典
//! - ✅ **泛解析感知的验证**: 比对泛解析探测地址，过滤泛解析产物
//! - ☁️ **附加分析**: 端口探测、云厂商识别
//! - 📊 **多格式输出**: 支持JSON、CSV、TXT三种输出格式
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use apexsub::enumerate_subdomains;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subdomains = enumerate_subdomains("example.com", None).await?;
//!
//!     println!("发现 {} 个子域名", subdomains.len());
//!     for subdomain in subdomains.iter().take(5) {
//!         println!("  {}", subdomain);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 高级配置
//!
//! ```rust,no_run
//! use apexsub::{EnumOptions, Settings, SubdomainEnumEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("config.yaml")?;
//!     let options = EnumOptions {
//!         validate: true,         // 过滤无法解析的名字
//!         recursive_depth: 2,     // 递归两层
//!         scan_ports: true,       // 探测 80/443
//!         ..Default::default()
//!     };
//!
//!     let engine = SubdomainEnumEngine::new(&settings, options)?;
//!     let report = engine.run("example.com").await?;
//!
//!     // 处理结果...
//!     println!("{:?}", report.cloud_assets);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// 终端日志
pub mod logger;
/// 错误类型
pub mod error;
/// 配置文件
pub mod config;
/// 域名与工作集
pub mod domain;
/// 命令行参数
pub mod input;
/// 被动数据源
pub mod sources;
/// 数据源聚合
pub mod aggregator;
/// DNS查询
pub mod dns_resolver;
/// 泛解析检测
pub mod wildcard;
/// DNS验证
pub mod validator;
/// 字典变形
pub mod gen;
/// 字典扩展
pub mod expander;
/// massdns 暴破
pub mod massdns;
/// 递归发现
pub mod recursion;
/// 端口探测
pub mod ports;
/// 云资产识别
pub mod cloud;
/// 枚举引擎
pub mod api;
/// 结果导出
pub mod output;

// 重新导出主要的公共API
pub use api::{enumerate_subdomains, EnumOptions, EnumReport, SubdomainEnumEngine};

// 导出其他有用的类型
pub use aggregator::{AggregateReport, Aggregator, SourceOutcome, SourceReport};
pub use config::Settings;
pub use dns_resolver::{DnsResolver, LimitedLookup, Lookup, LookupError};
pub use domain::{Domain, WorkingSet};
pub use error::EnumError;
pub use expander::{NoopExpander, OpenAiExpander, WordlistExpander};
pub use input::OutputFormat;
pub use massdns::MassResolver;
pub use output::export_results;
pub use sources::{Source, SourceContext};
pub use wildcard::{WildcardDetector, WildcardState};
