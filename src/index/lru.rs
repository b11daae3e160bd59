use std::hash::Hash;
use std::num::NonZeroUsize;

/// 定容 LRU 缓存（`lru` crate 的薄封装）
///
/// ## 契约
/// - `len() <= capacity()` 恒成立；一次 `set` 最多淘汰一个条目。
/// - `get` 与 `set` 都算一次“触碰”；`peek` 不改变新旧顺序。
/// - 不带过期语义，TTL 由上层（ResultCache）自己判断。
pub struct LruCache<K: Hash + Eq, V> {
    inner: lru::LruCache<K, V>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// capacity 为 0 时按 1 处理
    pub fn with_capacity(cap: usize) -> Self {
        let cap = NonZeroUsize::new(cap).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: lru::LruCache::new(cap),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// 命中时移到最新位置
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// 只读，不刷新新旧顺序
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    /// 插入或整体替换；返回被淘汰的 (key, value)
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        // 覆盖已有 key 时 push 会交回旧值，那不算淘汰
        if self.inner.contains(&key) {
            self.inner.put(key, value);
            return None;
        }
        self.inner.push(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// 从最旧到最新的 key 序列（诊断 / 测试用）
    pub fn keys_lru(&self) -> Vec<K> {
        self.inner.iter().rev().map(|(k, _)| k.clone()).collect()
    }
}
