use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::core::Record;
use crate::index::LruCache;
use crate::query::evaluator::Matches;
use crate::query::request::Fingerprint;

pub const DEFAULT_RESULT_CAPACITY: usize = 50;
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(30);

/// 结果缓存条目：只整体替换，从不局部修改
pub struct CachedResult<R: Record> {
    pub fingerprint: Fingerprint,
    pub computed_at: Instant,
    pub records: Matches<R>,
    pub total: usize,
}

impl<R: Record> CachedResult<R> {
    pub fn new(fingerprint: Fingerprint, computed_at: Instant, records: Matches<R>) -> Self {
        let total = records.len();
        Self {
            fingerprint,
            computed_at,
            records,
            total,
        }
    }

    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.computed_at) < ttl
    }
}

/// 查找结果
pub enum Lookup<R: Record> {
    Fresh(Arc<CachedResult<R>>),
    /// 存在但已过期：不删除，等待下一次 store 覆盖
    Expired,
    Absent,
}

/// 查询结果缓存：LRU 容量 + 外部判定的 TTL
pub struct ResultCache<R: Record> {
    inner: Mutex<LruCache<Fingerprint, Arc<CachedResult<R>>>>,
    ttl: Duration,
}

impl<R: Record> ResultCache<R> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::with_capacity(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn lookup(&self, fp: &Fingerprint, now: Instant) -> Lookup<R> {
        match self.inner.lock().get(fp) {
            Some(entry) if entry.is_fresh(now, self.ttl) => Lookup::Fresh(entry.clone()),
            Some(_) => Lookup::Expired,
            None => Lookup::Absent,
        }
    }

    /// 写入（同一指纹后写者覆盖）；返回是否淘汰了别的条目
    pub fn store(&self, entry: CachedResult<R>) -> bool {
        let fp = entry.fingerprint;
        self.inner.lock().set(fp, Arc::new(entry)).is_some()
    }

    pub fn invalidate(&self, fp: &Fingerprint) -> bool {
        self.inner.lock().remove(fp).is_some()
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
