use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::core::{Collection, Record};
use crate::index::{DocId, FacetIndex};
use crate::query::matcher::{KeywordMatcher, Matcher};
use crate::query::request::FilterRequest;

/// 求值结果：有序、无重复的记录序列
pub type Matches<R> = Collection<R>;

/// facet -> value -> 命中数
pub type FacetSummary = BTreeMap<String, BTreeMap<String, usize>>;

/// 对 FacetIndex 求值一个过滤请求
///
/// 1) 每个指定的 facet：拼接各取值的 posting（OR，可能有重复）
/// 2) 没有 facet 条件：直接使用原集合（Arc 克隆，不复制记录）
/// 3) 多个 facet：以第一个 facet 的候选顺序为准，保留在其它所有候选中都出现的记录
/// 4) 按 id 去重
/// 5) 关键字：对 name / tags / type / style / source / engineVersion 做子串过滤（AND）
///
/// limit 不在这里处理。
pub fn evaluate<R: Record>(index: &FacetIndex<R>, req: &FilterRequest) -> Matches<R> {
    // facet 顺序跟随 R::facets() 的声明顺序
    let candidates: Vec<Vec<DocId>> = R::facets()
        .iter()
        .filter_map(|desc| {
            let accepted = req.facets.get(desc.name).filter(|a| !a.is_empty())?;
            Some(
                accepted
                    .iter()
                    .flat_map(|value| index.lookup(desc.name, value).iter().copied())
                    .collect(),
            )
        })
        .collect();

    if candidates.is_empty() {
        let all = index.collection();
        return match &req.keyword {
            None => all.clone(),
            Some(k) => keep_keyword(all.iter(), k),
        };
    }

    let picked = intersect(index, &candidates);
    match &req.keyword {
        None => picked.into_iter().cloned().collect(),
        Some(k) => keep_keyword(picked.into_iter(), k),
    }
}

/// 多集合按 id 求交，结果顺序跟随第一个候选列表，并去重
fn intersect<'a, R: Record>(
    index: &'a FacetIndex<R>,
    candidates: &[Vec<DocId>],
) -> Vec<&'a Arc<R>> {
    let Some((first, rest)) = candidates.split_first() else {
        return Vec::new();
    };

    let others: Vec<HashSet<&str>> = rest
        .iter()
        .map(|list| {
            list.iter()
                .filter_map(|d| index.record(*d))
                .map(|r| r.id())
                .collect()
        })
        .collect();

    let mut seen: HashSet<&str> = HashSet::with_capacity(first.len());
    first
        .iter()
        .filter_map(|d| index.record(*d))
        .filter(|r| others.iter().all(|set| set.contains(r.id())))
        .filter(|r| seen.insert(r.id()))
        .collect()
}

fn keep_keyword<'a, R, I>(records: I, keyword: &str) -> Matches<R>
where
    R: Record,
    I: Iterator<Item = &'a Arc<R>>,
{
    let matcher = KeywordMatcher::new(keyword);
    records
        .filter(|r| matcher.matches_any(&r.keyword_fields()))
        .cloned()
        .collect()
}

/// 在未截断的结果上统计各 facet 取值的命中数（供 UI 展示分面计数）
pub fn summarize<R: Record>(records: &[Arc<R>]) -> FacetSummary {
    let mut summary = FacetSummary::new();
    for desc in R::facets() {
        let counts = summary.entry(desc.name.to_string()).or_default();
        for r in records {
            for value in (desc.extract)(r) {
                *counts.entry(value.to_string()).or_insert(0) += 1;
            }
        }
    }
    summary
}
