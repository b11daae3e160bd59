use serde::{Deserialize, Serialize};

use crate::core::record::{opt_str, FacetDescriptor, OneOrMany, Record};

/// 项目内物料（贴图 / 模型 / 音效 ...），按 project 划分作用域
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// 缺省时该物料不属于任何项目，默认项目过滤不会命中它
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
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
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn material_project(m: &Material) -> Vec<&str> {
    opt_str(&m.project)
}

fn material_type(m: &Material) -> Vec<&str> {
    if m.kind.is_empty() {
        Vec::new()
    } else {
        vec![m.kind.as_str()]
    }
}

fn material_tags(m: &Material) -> Vec<&str> {
    m.tags.iter().map(String::as_str).collect()
}

fn material_style(m: &Material) -> Vec<&str> {
    m.style.as_strs()
}

fn material_source(m: &Material) -> Vec<&str> {
    opt_str(&m.source)
}

fn material_engine_version(m: &Material) -> Vec<&str> {
    opt_str(&m.engine_version)
}

// project 排第一：默认项目过滤后 project 总在请求中，结果顺序与集合顺序一致
static MATERIAL_FACETS: [FacetDescriptor<Material>; 6] = [
    FacetDescriptor { name: "project", param: "projects", extract: material_project },
    FacetDescriptor { name: "type", param: "types", extract: material_type },
    FacetDescriptor { name: "tags", param: "tags", extract: material_tags },
    FacetDescriptor { name: "style", param: "styles", extract: material_style },
    FacetDescriptor { name: "source", param: "sources", extract: material_source },
    FacetDescriptor {
        name: "engineVersion",
        param: "engineVersions",
        extract: material_engine_version,
    },
];

impl Record for Material {
    const KIND: &'static str = "material";

    fn id(&self) -> &str {
        &self.id
    }

    fn facets() -> &'static [FacetDescriptor<Self>] {
        &MATERIAL_FACETS
    }

    fn keyword_fields(&self) -> Vec<&str> {
        let mut out = Vec::with_capacity(4 + self.tags.len());
        out.push(self.name.as_str());
        out.extend(material_tags(self));
        out.push(self.kind.as_str());
        out.extend(material_style(self));
        out.extend(material_source(self));
        out.extend(material_engine_version(self));
        out
    }
}

impl Material {
    pub fn new(id: &str, name: &str, project: &str, kind: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            project: Some(project.to_string()),
            kind: kind.to_string(),
            ..Default::default()
        }
    }
}
