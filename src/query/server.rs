use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::core::{Asset, Material, Record};
use crate::error::QueryError;
use crate::query::engine::QueryEngine;
use crate::stats::StatsReport;
use crate::storage::RecordStore;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// 某一记录类型的路由：/search /status /cache/clear
pub fn record_routes<R, S>(engine: Arc<QueryEngine<R, S>>) -> Router
where
    R: Record + Serialize,
    S: RecordStore<R>,
{
    Router::new()
        .route("/search", post(search_handler::<R, S>))
        .route("/status", get(status_handler::<R, S>))
        .route("/cache/clear", post(clear_handler::<R, S>))
        .with_state(engine)
}

/// HTTP 查询服务：assets 与 materials 各挂一套路由
pub struct QueryServer<SA, SM>
where
    SA: RecordStore<Asset>,
    SM: RecordStore<Material>,
{
    pub assets: Arc<QueryEngine<Asset, SA>>,
    pub materials: Arc<QueryEngine<Material, SM>>,
}

impl<SA, SM> QueryServer<SA, SM>
where
    SA: RecordStore<Asset>,
    SM: RecordStore<Material>,
{
    pub fn new(assets: Arc<QueryEngine<Asset, SA>>, materials: Arc<QueryEngine<Material, SM>>) -> Self {
        Self { assets, materials }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .nest("/assets", record_routes(self.assets.clone()))
            .nest("/materials", record_routes(self.materials.clone()))
    }

    pub async fn run(self, bind: &str, port: u16) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
        tracing::info!("HTTP Query Server listening on {}:{}", bind, port);
        self.serve(listener).await
    }

    /// 在已绑定的 listener 上服务（测试可用 0 端口）
    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn search_handler<R, S>(
    State(engine): State<Arc<QueryEngine<R, S>>>,
    body: Bytes,
) -> Response
where
    R: Record + Serialize,
    S: RecordStore<R>,
{
    match engine.query_raw(&body).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => {
            tracing::debug!("{} search rejected: {}", R::KIND, e);
            e.into_response()
        }
    }
}

async fn status_handler<R, S>(State(engine): State<Arc<QueryEngine<R, S>>>) -> Json<StatsReport>
where
    R: Record,
    S: RecordStore<R>,
{
    Json(engine.stats())
}

async fn clear_handler<R, S>(State(engine): State<Arc<QueryEngine<R, S>>>) -> Json<ClearResponse>
where
    R: Record,
    S: RecordStore<R>,
{
    engine.clear_caches();
    Json(ClearResponse { cleared: true })
}
