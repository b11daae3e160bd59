use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use facet_query::config::Config;
use facet_query::core::{Asset, Material};
use facet_query::query::{QueryEngine, QueryServer};
use facet_query::storage::JsonFileStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "facet-query", version, about = "Faceted asset/material query service")]
struct Cli {
    /// 配置文件路径（toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖 server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// 覆盖 server.bind
    #[arg(long)]
    bind: Option<String>,

    /// 覆盖 data.assets
    #[arg(long)]
    assets: Option<PathBuf>,

    /// 覆盖 data.materials
    #[arg(long)]
    materials: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    if let Some(bind) = cli.bind {
        cfg.server.bind = bind;
    }
    if let Some(p) = cli.assets {
        cfg.data.assets = p;
    }
    if let Some(p) = cli.materials {
        cfg.data.materials = p;
    }

    info!("Starting facet-query: faceted query engine");
    info!(
        "Assets: {:?}, materials: {:?}, result ttl {}s",
        cfg.data.assets, cfg.data.materials, cfg.cache.result_ttl_secs
    );

    let assets = Arc::new(QueryEngine::new(
        JsonFileStore::<Asset>::new(cfg.data.assets.clone()),
        cfg.asset_settings(),
    ));
    let materials = Arc::new(QueryEngine::new(
        JsonFileStore::<Material>::new(cfg.data.materials.clone()),
        cfg.material_settings(),
    ));

    let server = QueryServer::new(assets.clone(), materials.clone());
    let bind = cfg.server.bind.clone();
    let port = cfg.server.port;
    let handle = tokio::spawn(async move { server.run(&bind, port).await });

    info!(
        "facet-query ready. Query via: curl -d '{{\"types\":[\"角色\"]}}' http://{}:{}/assets/search",
        cfg.server.bind, cfg.server.port
    );

    // 优雅退出处理
    tokio::select! {
        res = handle => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    assets.shutdown();
    materials.shutdown();
    Ok(())
}
