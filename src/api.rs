use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::aggregator::{Aggregator, SourceOutcome, SourceReport};
use crate::cloud::CloudClassifier;
use crate::config::{Settings, DEFAULT_CONFIG_PATH};
use crate::dns_resolver::{load_resolver_list, DnsResolver, LimitedLookup, Lookup};
use crate::domain::{Domain, WorkingSet};
use crate::error::EnumError;
use crate::expander::{NoopExpander, OpenAiExpander, WordlistExpander};
use crate::gen::{generate_permutations, load_wordlist};
use crate::massdns::{MassResolver, DEFAULT_CONCURRENCY};
use crate::ports::{PortProber, DEFAULT_PORTS};
use crate::recursion::RecursiveExpander;
use crate::sources::{default_sources, SourceContext};
use crate::validator::Validator;
use crate::wildcard::WildcardDetector;

/// 字典扩展的目标词数
pub const LLM_TARGET_WORDS: usize = 100;

/// 每个区域的泛解析探测次数
const WILDCARD_PROBES: usize = 2;

/// 单次枚举的开关
#[derive(Debug, Clone)]
pub struct EnumOptions {
    /// 是否用 massdns 暴破
    pub brute: bool,
    /// 暴破字典路径
    pub wordlist: Option<String>,
    /// 是否做DNS验证
    pub validate: bool,
    /// 是否用LLM扩展字典
    pub llm: bool,
    /// HTTP、DNS、端口探测的并发上限
    pub concurrency: usize,
    /// 递归深度，0 表示不递归
    pub recursive_depth: u32,
    /// 是否探测端口
    pub scan_ports: bool,
    /// 是否识别云资产
    pub detect_cloud: bool,
    /// 探测的端口
    pub ports: Vec<u16>,
    /// massdns 并发
    pub massdns_concurrency: usize,
}

impl Default for EnumOptions {
    fn default() -> Self {
        EnumOptions {
            brute: false,
            wordlist: None,
            validate: false,
            llm: false,
            concurrency: 10,
            recursive_depth: 1,
            scan_ports: false,
            detect_cloud: true,
            ports: DEFAULT_PORTS.to_vec(),
            massdns_concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// 一次枚举的完整结果
#[derive(Debug, Clone)]
pub struct EnumReport {
    /// 根域名
    pub domain: String,
    /// 排序后的子域名，不含根域名
    pub subdomains: Vec<String>,
    /// 根域名查询时每个数据源的结果
    pub sources: Vec<SourceReport>,
    /// 主机名 -> 开放端口
    pub open_ports: BTreeMap<String, Vec<u16>>,
    /// 主机名 -> 云厂商
    pub cloud_assets: BTreeMap<String, String>,
    /// 暴破阶段的失败原因
    pub brute_force_error: Option<String>,
}

/// 子域名枚举引擎
pub struct SubdomainEnumEngine {
    options: EnumOptions,
    aggregator: Arc<Aggregator>,
    lookup: Arc<dyn Lookup>,
    mass_resolver: Option<MassResolver>,
    expander: Arc<dyn WordlistExpander>,
}

impl SubdomainEnumEngine {
    /// 按配置创建引擎：全部内置数据源、trust-dns 解析器和 massdns
    pub fn new(settings: &Settings, options: EnumOptions) -> Result<Self, EnumError> {
        let ctx = SourceContext::new(settings, options.concurrency)?;

        let nameservers = match load_resolver_list(&settings.resolvers_file) {
            Ok(list) => list,
            Err(e) => {
                debug!("未加载DNS服务器列表 {}: {}，使用系统默认", settings.resolvers_file, e);
                Vec::new()
            }
        };
        let lookup: Arc<dyn Lookup> = Arc::new(DnsResolver::with_nameservers(
            &nameservers,
            settings.dns_timeout(),
        ));

        let expander: Arc<dyn WordlistExpander> = if options.llm {
            match OpenAiExpander::from_settings(settings, ctx.client().clone()) {
                Some(expander) => Arc::new(expander),
                None => {
                    warn!("{}", EnumError::ConfigMissing {
                        source_name: "openai".to_string(),
                        key: "openai_api_key".to_string(),
                    });
                    Arc::new(NoopExpander)
                }
            }
        } else {
            Arc::new(NoopExpander)
        };

        let mass_resolver = MassResolver::new(
            &settings.massdns_path,
            &settings.resolvers_file,
            options.massdns_concurrency,
        );
        let aggregator = Aggregator::new(default_sources(settings), ctx);

        Ok(Self::with_components(options, aggregator, lookup, Some(mass_resolver), expander))
    }

    /// 使用自定义组件创建引擎
    pub fn with_components(
        options: EnumOptions,
        aggregator: Aggregator,
        lookup: Arc<dyn Lookup>,
        mass_resolver: Option<MassResolver>,
        expander: Arc<dyn WordlistExpander>,
    ) -> Self {
        SubdomainEnumEngine {
            options,
            aggregator: Arc::new(aggregator),
            lookup,
            mass_resolver,
            expander,
        }
    }

    /// 本次运行的开关
    pub fn options(&self) -> &EnumOptions {
        &self.options
    }

    /// 执行枚举
    ///
    /// 只有根域名非法时返回错误；各阶段的失败只影响该阶段，结果可能为空。
    pub async fn run(&self, domain: &str) -> Result<EnumReport, EnumError> {
        let root = Domain::parse(domain)?;
        let concurrency = self.options.concurrency.max(1);
        info!("开始枚举: {}", root);

        let aggregate = self.aggregator.gather(&root).await;
        log_source_reports(&aggregate.reports);
        let mut working_set: WorkingSet = aggregate.hostnames.into_iter().collect();

        // 验证、泛解析探测和云识别共用一个DNS并发上限
        let lookup: Arc<dyn Lookup> = Arc::new(LimitedLookup::new(self.lookup.clone(), concurrency));

        let validator = if self.options.validate {
            let detector = Arc::new(WildcardDetector::new(lookup.clone(), WILDCARD_PROBES));
            Some(Arc::new(Validator::new(lookup.clone(), detector, concurrency)))
        } else {
            None
        };

        if self.options.recursive_depth > 0 && !working_set.is_empty() {
            let mut recursion = RecursiveExpander::new(self.aggregator.clone(), concurrency);
            if let Some(validator) = &validator {
                recursion = recursion.with_validator(validator.clone());
            }
            let report = recursion
                .expand(&root, working_set, self.options.recursive_depth)
                .await;
            info!(
                "递归完成: {} 层，{} 个域名作为根查询过，工作集 {} 个",
                report.levels,
                report.visited.len(),
                report.working_set.len()
            );
            working_set = report.working_set;
        }

        let mut brute_force_error = None;
        if self.options.brute {
            match self.brute_force(&root).await {
                Ok(found) => {
                    let added = working_set.merge(found);
                    info!("暴破新增 {} 个子域名", added.len());
                }
                Err(e) => {
                    error!("暴破阶段失败: {}", e);
                    brute_force_error = Some(e.to_string());
                }
            }
        }

        if let Some(validator) = &validator {
            let (kept, _) = validator.validate(working_set, &root).await;
            working_set = kept;
        }

        let subdomains = working_set.into_sorted(&root);

        let open_ports = if self.options.scan_ports && !subdomains.is_empty() {
            PortProber::new(self.options.ports.clone(), concurrency)
                .scan(&subdomains)
                .await
        } else {
            BTreeMap::new()
        };

        let cloud_assets = if self.options.detect_cloud && !subdomains.is_empty() {
            CloudClassifier::new(lookup, concurrency)
                .classify(&subdomains)
                .await
        } else {
            BTreeMap::new()
        };

        info!("{} 枚举完成，共 {} 个子域名", root, subdomains.len());
        Ok(EnumReport {
            domain: root.to_string(),
            subdomains,
            sources: aggregate.reports,
            open_ports,
            cloud_assets,
            brute_force_error,
        })
    }

    async fn brute_force(&self, root: &Domain) -> Result<HashSet<String>, EnumError> {
        let mass_resolver = self
            .mass_resolver
            .as_ref()
            .ok_or_else(|| EnumError::ExternalToolFailure("未配置 massdns".to_string()))?;
        let labels = self.candidate_labels().await?;
        mass_resolver.run(labels, root).await
    }

    /// 暴破候选标签：字典变形，加上可选的字典扩展结果
    async fn candidate_labels(&self) -> Result<Vec<String>, EnumError> {
        let wordlist = self
            .options
            .wordlist
            .as_ref()
            .ok_or_else(|| EnumError::Config("暴破需要字典文件 (--wordlist)".to_string()))?;

        let base_words = load_wordlist(wordlist)?;
        let mut labels: Vec<String> = generate_permutations(&base_words).into_iter().collect();
        info!("字典 {} 个词，变形后 {} 个候选", base_words.len(), labels.len());

        if self.options.llm {
            labels.extend(self.expander.expand(&base_words, LLM_TARGET_WORDS).await);
        }
        labels.sort_unstable();
        labels.dedup();
        Ok(labels)
    }
}

fn log_source_reports(reports: &[SourceReport]) {
    for report in reports {
        match &report.outcome {
            SourceOutcome::Found(count) => info!("[{}] 发现 {} 个子域名", report.source, count),
            SourceOutcome::Skipped => info!("[{}] 未配置凭据，跳过", report.source),
            SourceOutcome::Failed(reason) => warn!("[{}] 不可用: {}", report.source, reason),
        }
    }
}

/// 便捷函数：用默认配置文件枚举子域名
pub async fn enumerate_subdomains(
    domain: &str,
    options: Option<EnumOptions>,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let settings = Settings::load(DEFAULT_CONFIG_PATH)?;
    let engine = SubdomainEnumEngine::new(&settings, options.unwrap_or_default())?;
    let report = engine.run(domain).await?;
    Ok(report.subdomains)
}
