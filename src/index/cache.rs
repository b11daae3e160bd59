use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Collection, Record};
use crate::index::facet::FacetIndex;
use crate::index::lru::LruCache;

pub const DEFAULT_INDEX_CAPACITY: usize = 8;

/// 快照身份：有序 id 序列编码成的 key
///
/// 两个集合“同一快照” ⇔ id 序列（含顺序）完全一致。
/// 每个 id 编码为 `{字节长度}:{id}`，任意 id 内容都不会与相邻 id 混淆。
/// 每次计算都是 O(集合大小)，与命中与否无关。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotId {
    key: String,
    count: usize,
}

impl SnapshotId {
    pub fn of<R: Record>(collection: &Collection<R>) -> Self {
        let cap = collection.iter().map(|r| r.id().len() + 8).sum();
        let mut key = String::with_capacity(cap);
        for r in collection.iter() {
            let id = r.id();
            key.push_str(&id.len().to_string());
            key.push(':');
            key.push_str(id);
        }
        Self {
            key,
            count: collection.len(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.count
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = xxhash_rust::xxh3::xxh3_64(self.key.as_bytes());
        write!(f, "snapshot:{:016x}({} ids)", h, self.record_count())
    }
}

/// 索引缓存：SnapshotId -> 已构建的 FacetIndex
///
/// 构建在锁外进行；并发 miss 可能重复构建，后写者覆盖（结果等价）。
pub struct IndexCache<R: Record> {
    inner: Mutex<LruCache<SnapshotId, Arc<FacetIndex<R>>>>,
}

/// `ensure` 的结果来源
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexSource {
    Cached,
    Built,
}

impl<R: Record> IndexCache<R> {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::with_capacity(cap)),
        }
    }

    /// 命中直接返回缓存的索引（不触碰传入集合），否则构建并写入
    pub fn ensure(&self, collection: Collection<R>) -> (Arc<FacetIndex<R>>, IndexSource) {
        let key = SnapshotId::of(&collection);
        if let Some(idx) = self.inner.lock().get(&key) {
            tracing::debug!("{} index cache hit: {}", R::KIND, key);
            return (idx.clone(), IndexSource::Cached);
        }

        let started = std::time::Instant::now();
        let idx = Arc::new(FacetIndex::build(collection));
        tracing::debug!(
            "{} facet index built: {} docs in {:?} ({})",
            R::KIND,
            idx.doc_count(),
            started.elapsed(),
            key
        );

        if let Some((old, _)) = self.inner.lock().set(key, idx.clone()) {
            tracing::debug!("{} index cache evicted {}", R::KIND, old);
        }
        (idx, IndexSource::Built)
    }

    pub fn invalidate(&self, snapshot: &SnapshotId) -> bool {
        self.inner.lock().remove(snapshot).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
