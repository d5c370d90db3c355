use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::{credential, Settings};
use crate::domain::is_valid_hostname;

/// 发给生成器的种子词数量上限
pub const SAMPLE_SEEDS: usize = 10;

lazy_static! {
    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("list marker regex");
}

/// 字典扩展能力；失败时返回空列表，不影响主流程
#[async_trait]
pub trait WordlistExpander: Send + Sync {
    /// 根据种子词生成约 `count` 个新词
    async fn expand(&self, seeds: &[String], count: usize) -> Vec<String>;
}

/// 默认实现，不生成任何词
#[derive(Debug, Default, Clone)]
pub struct NoopExpander;

#[async_trait]
impl WordlistExpander for NoopExpander {
    async fn expand(&self, _seeds: &[String], _count: usize) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI 兼容的 chat completions 接口
pub struct OpenAiExpander {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiExpander {
    /// 配置里没有 `openai_api_key` 时返回 `None`
    pub fn from_settings(settings: &Settings, client: Client) -> Option<Self> {
        let api_key = credential(&settings.openai_api_key)?;
        Some(OpenAiExpander {
            client,
            endpoint: settings.openai_endpoint.clone(),
            api_key: api_key.to_string(),
            model: settings.openai_model.clone(),
            // 生成比普通查询慢得多
            timeout: settings.http_timeout() * 6,
        })
    }

    async fn request(&self, prompt: String) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let response = timeout(
            self.timeout,
            self.client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body)
                .send(),
        )
        .await??
        .error_for_status()?;

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| "响应中没有 choices".into())
    }
}

#[async_trait]
impl WordlistExpander for OpenAiExpander {
    async fn expand(&self, seeds: &[String], count: usize) -> Vec<String> {
        if seeds.is_empty() || count == 0 {
            return Vec::new();
        }

        match self.request(build_prompt(seeds, count)).await {
            Ok(content) => {
                let words = parse_words(&content);
                info!("字典扩展生成 {} 个词", words.len());
                words
            }
            Err(e) => {
                warn!("字典扩展失败，忽略: {}", e);
                Vec::new()
            }
        }
    }
}

/// 生成提示词，只取前 [`SAMPLE_SEEDS`] 个种子
pub fn build_prompt(seeds: &[String], count: usize) -> String {
    let sample: Vec<&str> = seeds.iter().take(SAMPLE_SEEDS).map(String::as_str).collect();
    format!(
        "Generate {} novel subdomain prefixes based on patterns in these words: {}. \
         Include co-occurring terms, number iterations, and permutations for cybersecurity reconnaissance. \
         Reply with one prefix per line and nothing else.",
        count,
        sample.join(", ")
    )
}

/// 从生成结果中提取词：去掉列表符号，保留合法标签
pub fn parse_words(content: &str) -> Vec<String> {
    let mut words = Vec::new();
    for line in content.lines() {
        let word = LIST_MARKER.replace(line, "").trim().to_lowercase();
        if is_valid_hostname(&word) && !words.contains(&word) {
            words.push(word);
        }
    }
    words
}
