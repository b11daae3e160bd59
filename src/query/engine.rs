use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::core::{collection_from, Record};
use crate::error::{ParseError, QueryError};
use crate::index::{IndexCache, IndexSource, SnapshotId, DEFAULT_INDEX_CAPACITY};
use crate::query::evaluator::{evaluate, summarize, FacetSummary, Matches};
use crate::query::request::{Fingerprint, FilterRequest, RequestLimits};
use crate::query::result_cache::{
    CachedResult, Lookup, ResultCache, DEFAULT_RESULT_CAPACITY, DEFAULT_RESULT_TTL,
};
use crate::stats::{Counter, EngineStats, StatsReport};
use crate::storage::RecordStore;

/// 引擎参数（每个记录类型一份）
#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub index_capacity: usize,
    pub result_capacity: usize,
    pub result_ttl: Duration,
    /// 同指纹并发 miss 是否合并为一次计算（默认关闭：允许重复计算）
    pub coalesce_misses: bool,
    pub limits: RequestLimits,
    /// 请求缺省时补上的 facet 取值，例如 material 的 project
    pub defaults: Vec<(&'static str, Vec<String>)>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            index_capacity: DEFAULT_INDEX_CAPACITY,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            result_ttl: DEFAULT_RESULT_TTL,
            coalesce_misses: false,
            limits: RequestLimits::default(),
            defaults: Vec::new(),
        }
    }
}

impl EngineSettings {
    pub fn with_default(mut self, facet: &'static str, value: impl Into<String>) -> Self {
        self.defaults.push((facet, vec![value.into()]));
        self
    }
}

/// 响应来自哪条路径
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStatus {
    Hit,
    Miss,
    /// 请求体不可解析，回空结果
    Aborted,
    /// 上游网络类失败，回空结果
    ErrorDegraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse<R> {
    pub records: Vec<Arc<R>>,
    pub total_matching: usize,
    pub summary: FacetSummary,
    pub cache_status: CacheStatus,
}

impl<R> QueryResponse<R> {
    pub fn empty(cache_status: CacheStatus) -> Self {
        Self {
            records: Vec::new(),
            total_matching: 0,
            summary: FacetSummary::new(),
            cache_status,
        }
    }
}

/// 查询编排器
///
/// 结果缓存 →（miss）加载集合 → 索引缓存 → 求值 → 写回结果缓存。
/// 两级缓存都由引擎持有，没有进程级全局状态；多个引擎实例之间互不可见。
///
/// ## 失败语义（刻意的不对称）
/// - 校验失败：返回 `QueryError::Validation`，不触碰任何缓存。
/// - 请求体不可解析：吸收为空结果，状态 `aborted`。
/// - 上游网络类失败：吸收为空结果，状态 `error-degraded`，不写缓存。
/// - 上游其它失败：返回 `QueryError::Upstream`。
pub struct QueryEngine<R: Record, S: RecordStore<R>> {
    store: S,
    index_cache: IndexCache<R>,
    result_cache: ResultCache<R>,
    in_flight: DashMap<Fingerprint, Gate>,
    settings: EngineSettings,
    stats: EngineStats,
}

impl<R: Record, S: RecordStore<R>> QueryEngine<R, S> {
    pub fn new(store: S, mut settings: EngineSettings) -> Self {
        settings.defaults.retain(|(facet, _)| {
            let known = R::facet_by_name(facet).is_some();
            if !known {
                tracing::warn!("Ignoring default for unknown {} facet `{}`", R::KIND, facet);
            }
            known
        });

        Self {
            store,
            index_cache: IndexCache::with_capacity(settings.index_capacity),
            result_cache: ResultCache::new(settings.result_capacity, settings.result_ttl),
            in_flight: DashMap::new(),
            settings,
            stats: EngineStats::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// 从原始请求体查询
    pub async fn query_raw(&self, body: &[u8]) -> Result<QueryResponse<R>, QueryError> {
        match FilterRequest::parse::<R>(body, &self.settings.limits) {
            Ok(req) => self.run(req).await,
            Err(ParseError::Invalid(msg)) => Err(QueryError::Validation(msg)),
            Err(ParseError::Unparsable(e)) => {
                tracing::warn!("Aborted unreadable {} query: {}", R::KIND, e);
                self.stats.bump(Counter::Aborted);
                Ok(QueryResponse::empty(CacheStatus::Aborted))
            }
        }
    }

    /// 以结构化请求查询（字段可能是调用方直接填的，先规范化）
    pub async fn query(&self, mut req: FilterRequest) -> Result<QueryResponse<R>, QueryError> {
        req.normalize();
        req.validate::<R>(&self.settings.limits)
            .map_err(QueryError::Validation)?;
        self.run(req).await
    }

    async fn run(&self, mut req: FilterRequest) -> Result<QueryResponse<R>, QueryError> {
        req.apply_defaults(&self.settings.defaults);
        let fp = req.fingerprint(R::KIND);

        match self.result_cache.lookup(&fp, Instant::now()) {
            Lookup::Fresh(hit) => {
                self.stats.bump(Counter::ResultHit);
                tracing::debug!("{} result cache hit {} ({} records)", R::KIND, fp, hit.total);
                return Ok(respond(&hit.records, hit.total, req.limit, CacheStatus::Hit));
            }
            Lookup::Expired => {
                self.stats.bump(Counter::ResultExpired);
                tracing::debug!("{} result cache entry {} expired", R::KIND, fp);
            }
            Lookup::Absent => {}
        }
        self.stats.bump(Counter::ResultMiss);

        if !self.settings.coalesce_misses {
            return self.compute(&req, fp).await;
        }

        let slot = InFlight::join(&self.in_flight, fp);
        let guard = slot.gate.lock().await;

        // 排队期间前一个计算者可能已经写好结果
        if let Lookup::Fresh(hit) = self.result_cache.lookup(&fp, Instant::now()) {
            self.stats.bump(Counter::CoalescedWait);
            return Ok(respond(&hit.records, hit.total, req.limit, CacheStatus::Hit));
        }

        let out = self.compute(&req, fp).await;
        drop(guard);
        out
    }

    async fn compute(
        &self,
        req: &FilterRequest,
        fp: Fingerprint,
    ) -> Result<QueryResponse<R>, QueryError> {
        let records = match self.store.load_all().await {
            Ok(r) => r,
            Err(e) if e.is_transient_network() => {
                tracing::warn!(
                    "{} records unavailable ({}), answering with an empty result",
                    R::KIND,
                    e
                );
                self.stats.bump(Counter::Degraded);
                return Ok(QueryResponse::empty(CacheStatus::ErrorDegraded));
            }
            Err(e) => {
                tracing::error!("{} records failed to load: {}", R::KIND, e);
                return Err(QueryError::Upstream(e));
            }
        };

        let (index, source) = self.index_cache.ensure(collection_from(records));
        self.stats.bump(match source {
            IndexSource::Cached => Counter::IndexHit,
            IndexSource::Built => Counter::IndexBuild,
        });

        let matches = evaluate(&index, req);
        let total = matches.len();
        tracing::debug!(
            "{} result cache miss {}: {} of {} records match",
            R::KIND,
            fp,
            total,
            index.doc_count()
        );

        if self
            .result_cache
            .store(CachedResult::new(fp, Instant::now(), matches.clone()))
        {
            self.stats.bump(Counter::Eviction);
        }
        Ok(respond(&matches, total, req.limit, CacheStatus::Miss))
    }

    /// 显式作废某个快照的索引（调用方知道数据已变更时使用）
    pub fn invalidate_snapshot(&self, snapshot: &SnapshotId) -> bool {
        self.index_cache.invalidate(snapshot)
    }

    /// 显式作废某个请求的结果缓存（与查询时相同的默认值规则）
    pub fn invalidate_request(&self, req: &FilterRequest) -> bool {
        let mut req = req.clone();
        req.normalize();
        req.apply_defaults(&self.settings.defaults);
        self.result_cache.invalidate(&req.fingerprint(R::KIND))
    }

    pub fn clear_caches(&self) {
        self.index_cache.clear();
        self.result_cache.clear();
        tracing::info!("{} caches cleared", R::KIND);
    }

    pub fn stats(&self) -> StatsReport {
        self.stats
            .report(R::KIND, self.index_cache.len(), self.result_cache.len())
    }

    /// 停止前调用：输出统计并释放缓存
    pub fn shutdown(&self) {
        tracing::info!("{} engine shutting down\n{}", R::KIND, self.stats());
        self.clear_caches();
    }
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// 某个指纹上的一次参与（计算者或排队者）
///
/// 最后一个参与者离开时移除 gate；future 被中途丢弃同样会走到这里。
/// 只移除自己加入的那一个 gate，不会误删后来者新建的。
struct InFlight<'a> {
    map: &'a DashMap<Fingerprint, Gate>,
    fp: Fingerprint,
    gate: Gate,
}

impl<'a> InFlight<'a> {
    fn join(map: &'a DashMap<Fingerprint, Gate>, fp: Fingerprint) -> Self {
        let gate = map
            .entry(fp)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .value()
            .clone();
        Self { map, fp, gate }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // strong_count == 2：map 里的一份 + 自己这一份
        self.map.remove_if(&self.fp, |_, g| {
            Arc::ptr_eq(g, &self.gate) && Arc::strong_count(g) == 2
        });
    }
}

fn respond<R: Record>(
    records: &Matches<R>,
    total: usize,
    limit: Option<usize>,
    cache_status: CacheStatus,
) -> QueryResponse<R> {
    let take = limit.unwrap_or(total);
    QueryResponse {
        records: records.iter().take(take).cloned().collect(),
        total_matching: total,
        summary: summarize(records),
        cache_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Asset, Material};
    use crate::storage::MemoryStore;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scenario_assets() -> Vec<Asset> {
        vec![
            Asset::new("A", "first", "角色", &["a", "b"]),
            Asset::new("B", "second", "场景", &["a"]),
            Asset::new("C", "third", "角色", &["c"]),
        ]
    }

    fn engine() -> QueryEngine<Asset, MemoryStore<Asset>> {
        QueryEngine::new(MemoryStore::new(scenario_assets()), EngineSettings::default())
    }

    fn ids(resp: &QueryResponse<Asset>) -> Vec<&str> {
        resp.records.iter().map(|r| r.id.as_str()).collect()
    }

    /// 每次 load 计数，并在加载中途让出（模拟 I/O 挂起点）
    struct SlowStore {
        inner: MemoryStore<Asset>,
        loads: AtomicUsize,
    }

    impl RecordStore<Asset> for SlowStore {
        async fn load_all(&self) -> Result<Vec<Asset>, crate::error::StoreError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.load_all().await
        }

        async fn save(&self, records: &[Asset]) -> Result<(), crate::error::StoreError> {
            self.inner.save(records).await
        }
    }

    #[tokio::test]
    async fn scenario_a_through_engine() {
        let e = engine();
        let r = e.query_raw(r#"{"types":["角色"]}"#.as_bytes()).await.unwrap();
        assert_eq!(ids(&r), vec!["A", "C"]);
        assert_eq!(r.cache_status, CacheStatus::Miss);

        let r = e.query_raw(r#"{"types":["角色"],"tags":["b"]}"#.as_bytes()).await.unwrap();
        assert_eq!(ids(&r), vec!["A"]);

        let r = e.query_raw(br#"{"keyword":"b"}"#).await.unwrap();
        assert_eq!(ids(&r), vec!["A"]);

        // 三个不同请求共享同一快照索引
        let s = e.stats();
        assert_eq!(s.index_builds, 1);
        assert_eq!(s.index_hits, 2);
    }

    #[tokio::test]
    async fn limit_is_applied_after_cache() {
        let e = engine();
        let r = e.query_raw(br#"{"tags":["a","c"],"limit":1}"#).await.unwrap();
        assert_eq!(ids(&r), vec!["A"]);
        assert_eq!(r.total_matching, 3);
        assert_eq!(r.cache_status, CacheStatus::Miss);
        assert_eq!(r.summary["tags"]["a"], 2);

        let r = e.query_raw(br#"{"tags":["c","a"]}"#).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Hit);
        assert_eq!(ids(&r), vec!["A", "B", "C"]);
        assert_eq!(r.total_matching, 3);
    }

    #[tokio::test]
    async fn validation_error_touches_no_cache() {
        let e = engine();
        e.store().fail_next_load(io::ErrorKind::PermissionDenied);
        let err = e.query_raw(br#"{"colors":["red"]}"#).await.unwrap_err();
        assert!(err.is_validation());

        let err = e
            .query(FilterRequest::new().facet("project", ["p"]))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let s = e.stats();
        assert_eq!(s.result_misses + s.result_hits, 0);
        assert_eq!(s.result_entries, 0);
        assert_eq!(s.index_entries, 0);
    }

    #[tokio::test]
    async fn unreadable_body_is_aborted_not_an_error() {
        let e = engine();
        let r = e.query_raw(b"{types:").await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Aborted);
        assert!(r.records.is_empty());
        assert_eq!(r.total_matching, 0);
        assert_eq!(e.stats().aborted, 1);
    }

    #[tokio::test]
    async fn network_failure_degrades_and_is_not_cached() {
        let e = engine();
        e.store().fail_next_load(io::ErrorKind::ConnectionRefused);
        let r = e.query(FilterRequest::new()).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::ErrorDegraded);
        assert!(r.records.is_empty());

        let r = e.query(FilterRequest::new()).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Miss);
        assert_eq!(r.total_matching, 3);
        assert_eq!(e.stats().degraded, 1);
    }

    #[tokio::test]
    async fn other_upstream_failures_propagate() {
        let e = engine();
        e.store().fail_next_load(io::ErrorKind::PermissionDenied);
        let err = e.query(FilterRequest::new()).await.unwrap_err();
        assert!(matches!(err, QueryError::Upstream(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_c_ttl_window_tolerates_staleness() {
        let e = engine();
        let req = || FilterRequest::new().facet("type", ["角色"]);

        // t=0：miss，写入 R
        let r0 = e.query(req()).await.unwrap();
        assert_eq!(r0.cache_status, CacheStatus::Miss);
        assert_eq!(ids(&r0), vec!["A", "C"]);

        // t=5：上游集合变更
        tokio::time::advance(Duration::from_secs(5)).await;
        let mut changed = scenario_assets();
        changed.push(Asset::new("D", "fourth", "角色", &[]));
        e.store().save(&changed).await.unwrap();

        // t=10：命中，仍返回 R
        tokio::time::advance(Duration::from_secs(5)).await;
        let r1 = e.query(req()).await.unwrap();
        assert_eq!(r1.cache_status, CacheStatus::Hit);
        assert_eq!(ids(&r1), ids(&r0));
        assert_eq!(r1.total_matching, r0.total_matching);

        // t=31：过期，重新计算并反映 t=5 的变更
        tokio::time::advance(Duration::from_secs(21)).await;
        let r2 = e.query(req()).await.unwrap();
        assert_eq!(r2.cache_status, CacheStatus::Miss);
        assert_eq!(ids(&r2), vec!["A", "C", "D"]);
        assert_eq!(e.stats().result_expired, 1);
    }

    #[tokio::test]
    async fn material_default_project_collapses_cache_entries() {
        let store = MemoryStore::new(vec![
            Material::new("M1", "stone", "default", "贴图"),
            Material::new("M2", "stone", "other", "贴图"),
        ]);
        let e = QueryEngine::new(store, EngineSettings::default().with_default("project", "default"));

        let r = e.query_raw(r#"{"types":["贴图"]}"#.as_bytes()).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Miss);
        assert_eq!(r.records.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["M1"]);

        let r = e
            .query_raw(r#"{"types":["贴图"],"projects":["default"]}"#.as_bytes())
            .await
            .unwrap();
        assert_eq!(r.cache_status, CacheStatus::Hit);

        let r = e.query_raw(br#"{"projects":["other"]}"#).await.unwrap();
        assert_eq!(r.records.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["M2"]);
    }

    #[tokio::test]
    async fn unknown_default_facets_are_dropped() {
        let e = QueryEngine::new(
            MemoryStore::new(scenario_assets()),
            EngineSettings::default().with_default("project", "default"),
        );
        assert!(e.settings().defaults.is_empty());
        let r = e.query(FilterRequest::new()).await.unwrap();
        assert_eq!(r.total_matching, 3);
    }

    #[tokio::test]
    async fn invalidation_hooks_force_recompute() {
        let e = engine();
        let req = FilterRequest::new().facet("tags", ["a"]);
        e.query(req.clone()).await.unwrap();
        assert!(e.invalidate_request(&req));
        let r = e.query(req.clone()).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Miss);

        let snapshot = crate::core::collection_from(scenario_assets());
        assert!(e.invalidate_snapshot(&SnapshotId::of(&snapshot)));

        e.clear_caches();
        let s = e.stats();
        assert_eq!(s.result_entries, 0);
        assert_eq!(s.index_entries, 0);
        let r = e.query(req).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Miss);
        assert_eq!(e.stats().index_builds, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_stampede_by_default() {
        let e = QueryEngine::new(
            SlowStore {
                inner: MemoryStore::new(scenario_assets()),
                loads: AtomicUsize::new(0),
            },
            EngineSettings::default(),
        );
        let (a, b) = tokio::join!(e.query(FilterRequest::new()), e.query(FilterRequest::new()));
        assert_eq!(a.unwrap().total_matching, 3);
        assert_eq!(b.unwrap().total_matching, 3);
        assert_eq!(e.store().loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn coalesced_misses_load_once() {
        let settings = EngineSettings {
            coalesce_misses: true,
            ..Default::default()
        };
        let e = QueryEngine::new(
            SlowStore {
                inner: MemoryStore::new(scenario_assets()),
                loads: AtomicUsize::new(0),
            },
            settings,
        );
        let (a, b) = tokio::join!(e.query(FilterRequest::new()), e.query(FilterRequest::new()));
        let statuses = [a.unwrap().cache_status, b.unwrap().cache_status];
        assert!(statuses.contains(&CacheStatus::Miss));
        assert!(statuses.contains(&CacheStatus::Hit));
        assert_eq!(e.store().loads.load(Ordering::SeqCst), 1);
        assert_eq!(e.stats().coalesced_waits, 1);
        assert!(e.in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_queries_release_in_flight_gates() {
        let settings = EngineSettings {
            coalesce_misses: true,
            ..Default::default()
        };
        let e = QueryEngine::new(
            SlowStore {
                inner: MemoryStore::new(scenario_assets()),
                loads: AtomicUsize::new(0),
            },
            settings,
        );
        // load 需要 50ms，10ms 超时会在计算者和排队者都挂起时丢弃它们的 future
        let short = || tokio::time::timeout(Duration::from_millis(10), e.query(FilterRequest::new()));
        let (a, b, c) = tokio::join!(short(), short(), short());
        assert!(a.is_err() && b.is_err() && c.is_err());
        assert!(e.in_flight.is_empty());

        let r = e.query(FilterRequest::new()).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Miss);
        assert_eq!(r.total_matching, 3);
        assert!(e.in_flight.is_empty());
    }

    #[tokio::test]
    async fn structured_requests_are_normalized() {
        let e = engine();
        let mut req = FilterRequest::new();
        req.keyword = Some("  FIRST ".into());
        let r = e.query(req).await.unwrap();
        assert_eq!(ids(&r), vec!["A"]);

        // 空取值集合与未指定同一个缓存条目
        let mut req = FilterRequest::new().facet("type", ["角色"]);
        req.facets.insert("tags", ["".to_string()].into_iter().collect());
        let r = e.query(req).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Miss);
        assert_eq!(ids(&r), vec!["A", "C"]);
        let r = e.query(FilterRequest::new().facet("type", ["角色"])).await.unwrap();
        assert_eq!(r.cache_status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn blank_default_project_is_not_a_constraint() {
        let store = MemoryStore::new(vec![
            Material::new("M1", "stone", "default", "贴图"),
            Material::new("M2", "stone", "other", "贴图"),
        ]);
        let e = QueryEngine::new(store, EngineSettings::default().with_default("project", ""));
        let r = e.query(FilterRequest::new()).await.unwrap();
        assert_eq!(r.total_matching, 2);
    }
}
