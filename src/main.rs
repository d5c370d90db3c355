use std::io::{self, IsTerminal};

use clap::Parser;
use log::{error, info, warn, LevelFilter};

use apexsub::api::{EnumOptions, EnumReport, SubdomainEnumEngine};
use apexsub::config::Settings;
use apexsub::input::Opts;
use apexsub::logger::init_logger;
use apexsub::output::export_results;

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    let level = if opts.silent {
        LevelFilter::Warn
    } else if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = init_logger(level, io::stderr().is_terminal()) {
        eprintln!("日志初始化失败: {}", e);
    }

    if let Err(e) = run_enumeration(opts).await {
        error!("枚举失败: {}", e);
    }
    info!("程序执行完成");
}

/// 执行子域名枚举主逻辑
async fn run_enumeration(opts: Opts) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match Settings::load(&opts.config) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("配置文件 {} 无效，使用默认配置: {}", opts.config, e);
            Settings::default()
        }
    };

    let options = EnumOptions {
        brute: opts.brute,
        wordlist: opts.wordlist.clone(),
        validate: opts.validate,
        llm: opts.llm,
        concurrency: opts.rate_limit,
        recursive_depth: opts.recursive,
        scan_ports: opts.ports,
        detect_cloud: !opts.no_cloud,
        ..EnumOptions::default()
    };

    let engine = SubdomainEnumEngine::new(&settings, options)?;
    let report = engine.run(&opts.domain).await?;
    print_report(&report)?;

    export_results(&report.subdomains, &opts.output, &opts.format)?;
    Ok(())
}

fn print_report(report: &EnumReport) -> Result<(), serde_json::Error> {
    for subdomain in &report.subdomains {
        println!("{}", subdomain);
    }

    if !report.open_ports.is_empty() {
        println!("Open ports: {}", serde_json::to_string_pretty(&report.open_ports)?);
    }
    if !report.cloud_assets.is_empty() {
        println!(
            "Cloud-hosted subdomains: {}",
            serde_json::to_string_pretty(&report.cloud_assets)?
        );
    }
    if let Some(reason) = &report.brute_force_error {
        warn!("暴破结果不完整: {}", reason);
    }

    info!("{}: 共发现 {} 个子域名", report.domain, report.subdomains.len());
    Ok(())
}
