use std::fmt;

use clap::Parser;

/// 输出格式枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// JSON数组
    #[default]
    Json,
    /// 单列CSV
    Csv,
    /// 每行一个
    Txt,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "txt" => Ok(OutputFormat::Txt),
            _ => Err(format!("不支持的输出格式: {}。支持的格式: json, csv, txt", s)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Txt => "txt",
        };
        write!(f, "{}", name)
    }
}

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "apexsub")]
#[command(version)]
#[command(about = "Passive + active subdomain enumeration", long_about = None, arg_required_else_help = true)]
pub struct Opts {
    /// target domain
    #[arg(short, long)]
    pub domain: String,

    /// output file path
    #[arg(short, long, default_value = "subdomains.json")]
    pub output: String,

    /// output format (json, csv, txt)
    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    /// brute-force with massdns, needs --wordlist
    #[arg(long)]
    pub brute: bool,

    /// wordlist path for brute-force
    #[arg(short, long)]
    pub wordlist: Option<String>,

    /// drop names that do not resolve
    #[arg(long)]
    pub validate: bool,

    /// extend the wordlist with an LLM (needs openai_api_key)
    #[arg(long)]
    pub llm: bool,

    /// max concurrent requests
    #[arg(long = "rate-limit", visible_alias = "rl", default_value_t = 10)]
    pub rate_limit: usize,

    /// recursion depth, 0 disables recursion
    #[arg(short, long = "recursive", default_value_t = 1)]
    pub recursive: u32,

    /// probe ports 80/443 on the final hosts
    #[arg(long)]
    pub ports: bool,

    /// skip cloud provider detection
    #[arg(long)]
    pub no_cloud: bool,

    /// config file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// only warnings and results
    #[arg(short, long)]
    pub silent: bool,

    /// debug logging
    #[arg(short, long, conflicts_with = "silent")]
    pub verbose: bool,
}
