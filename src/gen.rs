use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use crate::domain::is_valid_hostname;

/// 变形模板，`{}` 处替换为种子词
const MUTATIONS: [&str; 8] = [
    "{}-dev",
    "{}-prod",
    "{}01",
    "dev-{}",
    "prod-{}",
    "{}-staging",
    "api-{}",
    "{}-test",
];

/// 对种子词应用固定的变形模板，结果包含种子词本身并去重
pub fn generate_permutations<S: AsRef<str>>(base_words: &[S]) -> HashSet<String> {
    let mut perms = HashSet::with_capacity(base_words.len() * (MUTATIONS.len() + 1));
    for word in base_words {
        let word = word.as_ref();
        perms.insert(word.to_string());
        for template in MUTATIONS {
            perms.insert(template.replace("{}", word));
        }
    }
    perms
}

/// 从文件加载字典：去空白、转小写、跳过空行和非法标签
pub fn load_wordlist<P: AsRef<Path>>(path: P) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut dictionary = Vec::new();
    let mut seen = HashSet::new();

    for line in reader.lines() {
        let word = line?.trim().to_lowercase();
        if word.is_empty() || !is_valid_hostname(&word) {
            continue;
        }
        if seen.insert(word.clone()) {
            dictionary.push(word);
        }
    }

    Ok(dictionary)
}
