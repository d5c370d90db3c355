use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::EnumError;

lazy_static! {
    static ref HOSTNAME_RE: Regex = Regex::new(
        r"^[a-z0-9_]([a-z0-9_-]{0,61}[a-z0-9_])?(\.[a-z0-9_]([a-z0-9_-]{0,61}[a-z0-9_])?)*$"
    )
    .expect("hostname regex");
}

/// 规范化主机名：去空白、转小写、去掉末尾的点和证书通配前缀 `*.`
pub fn normalize_hostname(raw: &str) -> String {
    let mut name = raw.trim().to_lowercase();
    while name.ends_with('.') {
        name.pop();
    }
    while let Some(stripped) = name.strip_prefix("*.") {
        name = stripped.to_string();
    }
    name
}

/// 主机名语法检查（小写、标签长度、字符集）
pub fn is_valid_hostname(name: &str) -> bool {
    !name.is_empty() && name.len() <= 253 && HOSTNAME_RE.is_match(name)
}

/// 查询范围的根域名，已规范化
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

impl Domain {
    /// 解析并规范化域名
    pub fn parse(raw: &str) -> Result<Self, EnumError> {
        let name = normalize_hostname(raw);
        if !is_valid_hostname(&name) {
            return Err(EnumError::InvalidDomain(raw.to_string()));
        }
        Ok(Domain(name))
    }

    /// 域名字符串
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `name` 是否等于本域名或是其子域名
    pub fn covers(&self, name: &str) -> bool {
        name == self.0
            || (name.len() > self.0.len()
                && name.ends_with(self.0.as_str())
                && name.as_bytes()[name.len() - self.0.len() - 1] == b'.')
    }

    /// 规范化候选主机名，不属于本域名或语法非法时返回 `None`
    pub fn admit(&self, raw: &str) -> Option<String> {
        let name = normalize_hostname(raw);
        if is_valid_hostname(&name) && self.covers(&name) {
            Some(name)
        } else {
            None
        }
    }

    /// 在本域名下拼接一个标签
    pub fn child(&self, label: &str) -> String {
        format!("{}.{}", label, self.0)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 工作集：规范化主机名的集合，重复插入无副作用
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    hosts: HashSet<String>,
}

impl WorkingSet {
    /// 空工作集
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入已规范化的主机名，返回是否为新成员
    pub fn insert(&mut self, host: String) -> bool {
        self.hosts.insert(host)
    }

    /// 合并另一批主机名，返回其中新出现的部分
    pub fn merge<I>(&mut self, hosts: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        hosts
            .into_iter()
            .filter(|host| self.hosts.insert(host.clone()))
            .collect()
    }

    /// 是否包含
    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// 成员数量
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// 遍历成员（无序）
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.hosts.iter()
    }

    /// 最终输出：排序并去掉根域名本身
    pub fn into_sorted(self, root: &Domain) -> Vec<String> {
        self.hosts
            .into_iter()
            .filter(|host| host != root.as_str())
            .sorted()
            .collect()
    }
}

impl FromIterator<String> for WorkingSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        WorkingSet {
            hosts: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for WorkingSet {
    type Item = String;
    type IntoIter = std::collections::hash_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.into_iter()
    }
}
