use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Deserialize;
use xxhash_rust::xxh3::Xxh3;

use crate::core::{OneOrMany, Record};
use crate::error::ParseError;
use crate::query::matcher::normalize_keyword;

/// 请求形状约束（来自配置）
#[derive(Clone, Copy, Debug)]
pub struct RequestLimits {
    pub max_limit: usize,
    pub max_keyword_len: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_limit: 10_000,
            max_keyword_len: 256,
        }
    }
}

/// 过滤请求
///
/// - facet 内取值为 OR，facet 之间为 AND；空取值集合视为未指定。
/// - `keyword` 已规范化（NFC + 小写），空白关键字视为未指定。
/// - `limit` 不参与指纹：缓存总是按完整结果存放。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterRequest {
    pub facets: BTreeMap<&'static str, BTreeSet<String>>,
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

impl FilterRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加某个 facet 的可接受取值（按 facet 名）
    pub fn facet<I, S>(mut self, name: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self.facets.entry(name).or_default();
        set.extend(values.into_iter().map(Into::into).filter(|v| !is_blank(v)));
        if set.is_empty() {
            self.facets.remove(name);
        }
        self
    }

    pub fn keyword(mut self, keyword: &str) -> Self {
        self.keyword = normalize_keyword(keyword);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 把直接填写的字段收敛成与构建器等价的形式：
    /// 关键字重新规范化，空白取值与空集合移除。
    pub fn normalize(&mut self) {
        self.keyword = self.keyword.as_deref().and_then(normalize_keyword);
        for set in self.facets.values_mut() {
            set.retain(|v| !is_blank(v));
        }
        self.facets.retain(|_, set| !set.is_empty());
    }

    /// 是否没有任何过滤条件
    pub fn is_unfiltered(&self) -> bool {
        self.facets.is_empty() && self.keyword.is_none()
    }

    /// 从原始请求体解析
    ///
    /// JSON 不可读 → `Unparsable`；结构不符 → `Invalid`。
    pub fn parse<R: Record>(body: &[u8], limits: &RequestLimits) -> Result<Self, ParseError> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(ParseError::Unparsable)?;
        if !value.is_object() {
            return Err(ParseError::Invalid("filter must be a JSON object".into()));
        }
        let raw: RawFilter =
            serde_json::from_value(value).map_err(|e| ParseError::Invalid(e.to_string()))?;

        let mut req = FilterRequest::new();
        for (param, values) in raw.facets {
            let Some(desc) = R::facet_by_param(&param) else {
                return Err(ParseError::Invalid(format!(
                    "unknown {} filter field `{}`",
                    R::KIND,
                    param
                )));
            };
            req = req.facet(desc.name, values.into_vec());
        }
        if let Some(k) = raw.keyword.as_deref() {
            req = req.keyword(k);
        }
        if let Some(limit) = raw.limit {
            let limit = usize::try_from(limit)
                .map_err(|_| ParseError::Invalid(format!("limit {} is out of range", limit)))?;
            req = req.limit(limit);
        }

        req.validate::<R>(limits).map_err(ParseError::Invalid)?;
        Ok(req)
    }

    /// 对照记录类型的 schema 校验
    pub fn validate<R: Record>(&self, limits: &RequestLimits) -> Result<(), String> {
        for name in self.facets.keys() {
            if R::facet_by_name(name).is_none() {
                return Err(format!("unknown {} facet `{}`", R::KIND, name));
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > limits.max_limit {
                return Err(format!(
                    "limit must be between 1 and {}, got {}",
                    limits.max_limit, limit
                ));
            }
        }
        if let Some(k) = &self.keyword {
            let len = k.chars().count();
            if len > limits.max_keyword_len {
                return Err(format!(
                    "keyword is {} characters long, at most {} allowed",
                    len, limits.max_keyword_len
                ));
            }
        }
        Ok(())
    }

    /// 对缺失的区分字段套用默认值（必须在计算指纹之前调用）
    pub fn apply_defaults(&mut self, defaults: &[(&'static str, Vec<String>)]) {
        for (name, values) in defaults {
            if self.facets.contains_key(name) {
                continue;
            }
            let set: BTreeSet<String> = values.iter().filter(|v| !is_blank(v)).cloned().collect();
            if !set.is_empty() {
                self.facets.insert(*name, set);
            }
        }
    }

    /// 规范化后的结果缓存 key（忽略 limit）
    ///
    /// facet 名与取值都来自有序容器，与请求里的书写顺序无关；
    /// 每段带长度前缀，避免拼接歧义。
    pub fn fingerprint(&self, kind: &str) -> Fingerprint {
        let mut h = Xxh3::new();
        let mut put = |bytes: &[u8]| {
            h.update(&(bytes.len() as u64).to_le_bytes());
            h.update(bytes);
        };
        put(kind.as_bytes());
        for (name, values) in &self.facets {
            put(name.as_bytes());
            put(&(values.len() as u64).to_le_bytes());
            for v in values {
                put(v.as_bytes());
            }
        }
        match &self.keyword {
            Some(k) => {
                put(b"k");
                put(k.as_bytes());
            }
            None => put(b"-"),
        }
        Fingerprint(h.digest128())
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[derive(Deserialize)]
struct RawFilter {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(flatten)]
    facets: BTreeMap<String, OneOrMany>,
}

/// 规范化过滤条件的 128 位内容哈希
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint(u128);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Asset, Material};

    fn parse(body: &str) -> Result<FilterRequest, ParseError> {
        FilterRequest::parse::<Asset>(body.as_bytes(), &RequestLimits::default())
    }

    #[test]
    fn parses_facets_keyword_and_limit() {
        let req = parse(r#"{"types":["角色"],"tags":"b","keyword":" B ","limit":5}"#).unwrap();
        assert_eq!(req.facets["type"].iter().collect::<Vec<_>>(), vec!["角色"]);
        assert_eq!(req.facets["tags"].iter().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(req.keyword.as_deref(), Some("b"));
        assert_eq!(req.limit, Some(5));
    }

    #[test]
    fn unreadable_body_is_unparsable() {
        assert!(matches!(parse("{\"types\": ["), Err(ParseError::Unparsable(_))));
        assert!(matches!(parse(""), Err(ParseError::Unparsable(_))));
    }

    #[test]
    fn schema_violations_are_invalid() {
        assert!(matches!(parse("[1,2]"), Err(ParseError::Invalid(_))));
        assert!(matches!(parse(r#"{"colors":["red"]}"#), Err(ParseError::Invalid(_))));
        assert!(matches!(parse(r#"{"types":[1]}"#), Err(ParseError::Invalid(_))));
        assert!(matches!(parse(r#"{"limit":0}"#), Err(ParseError::Invalid(_))));
        assert!(matches!(parse(r#"{"limit":-3}"#), Err(ParseError::Invalid(_))));
        // projects 只对 material 合法
        assert!(matches!(parse(r#"{"projects":["p"]}"#), Err(ParseError::Invalid(_))));
        assert!(FilterRequest::parse::<Material>(
            br#"{"projects":["p"]}"#,
            &RequestLimits::default()
        )
        .is_ok());
    }

    #[test]
    fn keyword_length_is_bounded() {
        let limits = RequestLimits {
            max_limit: 10,
            max_keyword_len: 3,
        };
        let r = FilterRequest::parse::<Asset>(br#"{"keyword":"abcd"}"#, &limits);
        assert!(matches!(r, Err(ParseError::Invalid(_))));
    }

    #[test]
    fn empty_constraints_are_dropped() {
        let req = parse(r#"{"types":[],"tags":[""],"keyword":"  "}"#).unwrap();
        assert!(req.is_unfiltered());
        assert_eq!(req, FilterRequest::new());
    }

    #[test]
    fn fingerprint_ignores_order_and_limit() {
        let a = parse(r#"{"tags":["x","y"],"types":["t"],"limit":3}"#).unwrap();
        let b = parse(r#"{"types":["t"],"tags":["y","x","x"]}"#).unwrap();
        assert_eq!(a.fingerprint("asset"), b.fingerprint("asset"));

        let c = parse(r#"{"types":["t"],"tags":["y","x"],"keyword":"Q"}"#).unwrap();
        let d = parse(r#"{"types":["t"],"tags":["y","x"],"keyword":"q"}"#).unwrap();
        assert_ne!(a.fingerprint("asset"), c.fingerprint("asset"));
        assert_eq!(c.fingerprint("asset"), d.fingerprint("asset"));
        assert_ne!(a.fingerprint("asset"), a.fingerprint("material"));
    }

    #[test]
    fn defaults_collapse_with_explicit_values() {
        let defaults = vec![("project", vec!["default".to_string()])];
        let mut omitted = FilterRequest::new().facet("type", ["贴图"]);
        omitted.apply_defaults(&defaults);
        let mut explicit = FilterRequest::new()
            .facet("type", ["贴图"])
            .facet("project", ["default"]);
        explicit.apply_defaults(&defaults);
        assert_eq!(omitted.fingerprint("material"), explicit.fingerprint("material"));

        let mut other = FilterRequest::new().facet("project", ["p2"]);
        other.apply_defaults(&defaults);
        assert_eq!(other.facets["project"].iter().collect::<Vec<_>>(), vec!["p2"]);
    }

    #[test]
    fn normalize_matches_builder_output() {
        let mut direct = FilterRequest {
            keyword: Some(" HERO ".into()),
            ..Default::default()
        };
        direct.facets.insert("type", ["角色".to_string(), " ".to_string()].into_iter().collect());
        direct.facets.insert("tags", BTreeSet::new());
        direct.normalize();

        let built = FilterRequest::new().facet("type", ["角色"]).keyword("hero");
        assert_eq!(direct, built);
        assert_eq!(direct.fingerprint("asset"), built.fingerprint("asset"));
    }

    #[test]
    fn blank_defaults_are_skipped() {
        let mut req = FilterRequest::new();
        req.apply_defaults(&[("project", vec!["".to_string(), "  ".to_string()])]);
        assert!(req.is_unfiltered());
    }
}
