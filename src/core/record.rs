use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 一次 load 得到的完整记录集合（只读快照，引擎从不修改）
pub type Collection<R> = Arc<[Arc<R>]>;

/// 把 store 返回的 Vec 包装成共享快照
pub fn collection_from<R>(records: Vec<R>) -> Collection<R> {
    records.into_iter().map(Arc::new).collect()
}

/// Facet 描述：索引名 + 请求参数名 + 取值函数（0/1/多值）
pub struct FacetDescriptor<R> {
    /// 索引与 summary 中使用的 facet 名
    pub name: &'static str,
    /// 请求 JSON 中对应的 key（通常是复数形式）
    pub param: &'static str,
    pub extract: fn(&R) -> Vec<&str>,
}

/// 可被 facet 引擎查询的记录类型
///
/// ## 契约
/// - `id()` 在同一 Collection 内唯一，且跨 load 稳定（用于快照身份）。
/// - `facets()` 的顺序即求值顺序：第一个出现在请求里的 facet 决定结果顺序。
/// - `keyword_fields()` 覆盖 name 与所有文本型 facet 字段。
pub trait Record: Send + Sync + Sized + 'static {
    /// 记录类别短名（日志 / 路由）
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn facets() -> &'static [FacetDescriptor<Self>];

    fn keyword_fields(&self) -> Vec<&str>;

    /// 按请求参数名查找 facet
    fn facet_by_param(param: &str) -> Option<&'static FacetDescriptor<Self>> {
        Self::facets().iter().find(|f| f.param == param)
    }

    /// 按 facet 名查找
    fn facet_by_name(name: &str) -> Option<&'static FacetDescriptor<Self>> {
        Self::facets().iter().find(|f| f.name == name)
    }
}

/// 单值或多值字段：`"a"` 与 `["a", "b"]` 都能接受
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OneOrMany(pub Vec<String>);

impl OneOrMany {
    pub fn as_strs(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrManyRepr {
    One(String),
    Many(Vec<String>),
    Null(()),
}

impl<'de> Deserialize<'de> for OneOrMany {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        Ok(match OneOrManyRepr::deserialize(de)? {
            OneOrManyRepr::One(s) => OneOrMany(vec![s]),
            OneOrManyRepr::Many(v) => OneOrMany(v),
            OneOrManyRepr::Null(()) => OneOrMany(Vec::new()),
        })
    }
}

impl Serialize for OneOrMany {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        // 单值保持原样写回，避免 save 时把 "style": "x" 改写成数组
        match self.0.as_slice() {
            [one] => ser.serialize_str(one),
            many => many.serialize(ser),
        }
    }
}

/// Option<String> 取值辅助
pub(crate) fn opt_str(v: &Option<String>) -> Vec<&str> {
    v.as_deref().into_iter().collect()
}
