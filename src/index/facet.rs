use std::collections::HashMap;

use rayon::prelude::*;

use crate::core::{Collection, Record};

/// 集合内文档位置（posting 元素），与集合下标同宽
pub type DocId = usize;

/// 单个 facet 的倒排表：value -> DocId 列表（升序 = 集合顺序）
pub type Postings = HashMap<String, Vec<DocId>>;

/// facet 倒排索引
///
/// 由一个 Collection 派生，可随时重建；持有源集合的 Arc，
/// 以便“无 facet 条件”时直接把原集合交回去而不复制。
pub struct FacetIndex<R: Record> {
    collection: Collection<R>,
    facets: Vec<(&'static str, Postings)>,
}

impl<R: Record> FacetIndex<R> {
    /// 按 `R::facets()` 构建；各 facet 之间并行，facet 内按集合顺序顺序扫描。
    ///
    /// 不做去重或校验：空值 / 缺失值不产生任何条目。
    pub fn build(collection: Collection<R>) -> Self {
        let facets = R::facets()
            .par_iter()
            .map(|desc| {
                let mut postings: Postings = HashMap::new();
                for (doc, record) in collection.iter().enumerate() {
                    for value in (desc.extract)(record) {
                        postings.entry(value.to_string()).or_default().push(doc);
                    }
                }
                (desc.name, postings)
            })
            .collect();

        Self { collection, facets }
    }

    pub fn collection(&self) -> &Collection<R> {
        &self.collection
    }

    pub fn doc_count(&self) -> usize {
        self.collection.len()
    }

    pub fn record(&self, doc: DocId) -> Option<&std::sync::Arc<R>> {
        self.collection.get(doc)
    }

    pub fn postings(&self, facet: &str) -> Option<&Postings> {
        self.facets
            .iter()
            .find(|(name, _)| *name == facet)
            .map(|(_, p)| p)
    }

    /// facet 某个取值对应的文档；未知 facet 或无匹配时为空
    pub fn lookup(&self, facet: &str, value: &str) -> &[DocId] {
        self.postings(facet)
            .and_then(|p| p.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn facet_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.facets.iter().map(|(name, _)| *name)
    }
}
