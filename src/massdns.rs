use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use rand::Rng;

use crate::domain::{is_valid_hostname, normalize_hostname, Domain};
use crate::error::EnumError;

/// massdns 默认并发
pub const DEFAULT_CONCURRENCY: usize = 10_000;

/// 外部批量解析器（massdns）的调用封装
///
/// 输入输出文件在一次调用期间独占，调用结束后删除。
#[derive(Debug, Clone)]
pub struct MassResolver {
    binary: PathBuf,
    resolvers_file: PathBuf,
    concurrency: usize,
    work_dir: PathBuf,
}

/// 调用结束时删除临时文件
struct ScratchFiles {
    input: PathBuf,
    output: PathBuf,
}

impl ScratchFiles {
    fn new(work_dir: &Path) -> Self {
        let tag: u64 = rand::thread_rng().gen();
        let stem = format!("apexsub-massdns-{}-{:016x}", std::process::id(), tag);
        ScratchFiles {
            input: work_dir.join(format!("{}-input.txt", stem)),
            output: work_dir.join(format!("{}-output.txt", stem)),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.input);
        let _ = fs::remove_file(&self.output);
    }
}

impl MassResolver {
    /// 创建调用封装，临时文件放在系统临时目录
    pub fn new<B: Into<PathBuf>, R: Into<PathBuf>>(binary: B, resolvers_file: R, concurrency: usize) -> Self {
        MassResolver {
            binary: binary.into(),
            resolvers_file: resolvers_file.into(),
            concurrency: concurrency.max(1),
            work_dir: std::env::temp_dir(),
        }
    }

    /// 指定临时文件目录
    pub fn with_work_dir<P: Into<PathBuf>>(mut self, work_dir: P) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// 在阻塞线程池中执行暴破，不占用异步调度器
    pub async fn run(&self, labels: Vec<String>, domain: &Domain) -> Result<HashSet<String>, EnumError> {
        if labels.is_empty() {
            return Ok(HashSet::new());
        }
        let job = self.clone();
        let domain = domain.clone();
        tokio::task::spawn_blocking(move || job.run_blocking(&labels, &domain))
            .await
            .map_err(|e| EnumError::ExternalToolFailure(format!("暴破任务异常退出: {}", e)))?
    }

    /// 写查询文件、执行 massdns、解析结果
    pub fn run_blocking(&self, labels: &[String], domain: &Domain) -> Result<HashSet<String>, EnumError> {
        let scratch = ScratchFiles::new(&self.work_dir);
        let queries = render_queries(labels, domain);
        let count = queries.lines().count();
        fs::write(&scratch.input, queries)?;
        info!("massdns 查询 {} 个候选子域名: {}", count, domain);

        let output = self
            .command(&scratch.input, &scratch.output)
            .output()
            .map_err(|e| {
                EnumError::ExternalToolFailure(format!("无法启动 {}: {}", self.binary.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnumError::ExternalToolFailure(format!(
                "{} 退出状态 {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        let content = fs::read(&scratch.output).map_err(|e| {
            EnumError::ExternalToolFailure(format!("无法读取结果文件 {}: {}", scratch.output.display(), e))
        })?;
        let content = String::from_utf8(content)
            .map_err(|_| EnumError::ExternalToolFailure("结果文件不是UTF-8文本".to_string()))?;

        let found = parse_results(&content, domain)?;
        info!("massdns 解析出 {} 个子域名", found.len());
        Ok(found)
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-r")
            .arg(&self.resolvers_file)
            .args(["-t", "A", "-o", "S", "-c"])
            .arg(self.concurrency.to_string())
            .arg("-w")
            .arg(output)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!("{:?}", command);
        command
    }
}

/// 查询文件内容：每行 `<label>.<domain> A`，跳过非法标签
pub fn render_queries<S: AsRef<str>>(labels: &[S], domain: &Domain) -> String {
    let mut queries = String::new();
    for label in labels {
        let name = domain.child(&label.as_ref().trim().to_lowercase());
        if !is_valid_hostname(&name) {
            continue;
        }
        queries.push_str(&name);
        queries.push_str(" A\n");
    }
    queries
}

/// 解析 `-o S` 格式的结果：每行空白分隔，第一列为主机名（可能带末尾的点）
///
/// 第一列不是合法主机名时整个结果视为损坏。
pub fn parse_results(content: &str, domain: &Domain) -> Result<HashSet<String>, EnumError> {
    let mut found = HashSet::new();
    for (index, line) in content.lines().enumerate() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        let name = normalize_hostname(first);
        if !is_valid_hostname(&name) {
            return Err(EnumError::ExternalToolFailure(format!(
                "结果第 {} 行格式错误: {}",
                index + 1,
                line
            )));
        }
        if let Some(host) = domain.admit(&name) {
            found.insert(host);
        }
    }
    Ok(found)
}
