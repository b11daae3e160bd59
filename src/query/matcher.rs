use unicode_normalization::UnicodeNormalization;

/// Matcher 抽象接口，定义关键字匹配行为
pub trait Matcher: Send + Sync {
    /// 判断单个文本字段是否匹配
    fn matches(&self, text: &str) -> bool;

    /// 任一字段匹配即视为命中
    fn matches_any(&self, fields: &[&str]) -> bool {
        fields.iter().any(|f| self.matches(f))
    }
}

/// 关键字规范化：去首尾空白 + NFC + 小写。空串返回 None。
pub fn normalize_keyword(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(fold(trimmed))
}

fn fold(s: &str) -> String {
    if s.is_ascii() {
        s.to_ascii_lowercase()
    } else {
        s.nfc().collect::<String>().to_lowercase()
    }
}

/// 大小写不敏感的子串匹配 (contains)
pub struct KeywordMatcher {
    needle: String,
}

impl KeywordMatcher {
    /// `keyword` 应已经过 `normalize_keyword`
    pub fn new(keyword: &str) -> Self {
        Self {
            needle: keyword.to_string(),
        }
    }
}

impl Matcher for KeywordMatcher {
    fn matches(&self, text: &str) -> bool {
        if text.len() < self.needle.len() && text.is_ascii() {
            return false;
        }
        fold(text).contains(&self.needle)
    }
}
