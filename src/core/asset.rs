use serde::{Deserialize, Serialize};

use crate::core::record::{opt_str, FacetDescriptor, OneOrMany, Record};

/// 素材资产（角色 / 场景 / 道具 ...）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub style: OneOrMany,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// 引擎不关心的其它字段（缩略图、创建时间 ...），save 时原样写回
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn asset_type(a: &Asset) -> Vec<&str> {
    if a.kind.is_empty() {
        Vec::new()
    } else {
        vec![a.kind.as_str()]
    }
}

fn asset_tags(a: &Asset) -> Vec<&str> {
    a.tags.iter().map(String::as_str).collect()
}

fn asset_style(a: &Asset) -> Vec<&str> {
    a.style.as_strs()
}

fn asset_source(a: &Asset) -> Vec<&str> {
    opt_str(&a.source)
}

fn asset_engine_version(a: &Asset) -> Vec<&str> {
    opt_str(&a.engine_version)
}

static ASSET_FACETS: [FacetDescriptor<Asset>; 5] = [
    FacetDescriptor { name: "type", param: "types", extract: asset_type },
    FacetDescriptor { name: "tags", param: "tags", extract: asset_tags },
    FacetDescriptor { name: "style", param: "styles", extract: asset_style },
    FacetDescriptor { name: "source", param: "sources", extract: asset_source },
    FacetDescriptor {
        name: "engineVersion",
        param: "engineVersions",
        extract: asset_engine_version,
    },
];

impl Record for Asset {
    const KIND: &'static str = "asset";

    fn id(&self) -> &str {
        &self.id
    }

    fn facets() -> &'static [FacetDescriptor<Self>] {
        &ASSET_FACETS
    }

    fn keyword_fields(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(4 + self.tags.len());
        out.push(self.name.as_str());
        out.extend(asset_tags(self));
        out.push(self.kind.as_str());
        out.extend(asset_style(self));
        out.extend(asset_source(self));
        out.extend(asset_engine_version(self));
        out
    }
}

impl Asset {
    pub fn new(id: &str, name: &str, kind: &str, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: kind.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }
}
