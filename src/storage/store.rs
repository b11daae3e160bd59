use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StoreError;

/// 外部记录存储：整体读、整体写，无分页 / 增量
pub trait RecordStore<R>: Send + Sync + 'static {
    fn load_all(&self) -> impl Future<Output = Result<Vec<R>, StoreError>> + Send;

    fn save(&self, records: &[R]) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// JSON 数组文档存储（单文件 blob）
///
/// 落盘流程：
/// 1) 写 `<file>.tmp`
/// 2) fsync(tmpfile)
/// 3) rename(tmp, target) — 原子替换
///
/// 文件不存在时视为空集合。
pub struct JsonFileStore<R> {
    path: PathBuf,
    _marker: PhantomData<fn() -> R>,
}

impl<R> JsonFileStore<R> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<R> RecordStore<R> for JsonFileStore<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn load_all(&self) -> Result<Vec<R>, StoreError> {
        let data = match fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("Record document {:?} missing, treating as empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::from_io("reading record document", e)),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&data)?)
    }

    async fn save(&self, records: &[R]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::from_io("creating data dir", e))?;
            }
        }

        let tmp = self.tmp_path();
        let mut f = fs::File::create(&tmp)
            .await
            .map_err(|e| StoreError::from_io("creating temp document", e))?;
        f.write_all(&data)
            .await
            .map_err(|e| StoreError::from_io("writing temp document", e))?;
        f.sync_all()
            .await
            .map_err(|e| StoreError::from_io("syncing temp document", e))?;
        drop(f);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::from_io("replacing record document", e))?;
        tracing::info!("Saved {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// 进程内存储（嵌入使用 / 测试）
///
/// 可注入一次性失败，用来模拟上游故障。
pub struct MemoryStore<R> {
    records: RwLock<Vec<R>>,
    fail_next: Mutex<Option<io::ErrorKind>>,
}

impl<R: Clone> MemoryStore<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records: RwLock::new(records),
            fail_next: Mutex::new(None),
        }
    }

    /// 下一次 load_all 以给定 io 错误失败
    pub fn fail_next_load(&self, kind: io::ErrorKind) {
        *self.fail_next.lock() = Some(kind);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> RecordStore<R> for MemoryStore<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn load_all(&self) -> Result<Vec<R>, StoreError> {
        if let Some(kind) = self.fail_next.lock().take() {
            return Err(StoreError::from_io(
                "loading in-memory records",
                io::Error::new(kind, "injected failure"),
            ));
        }
        Ok(self.records.read().clone())
    }

    async fn save(&self, records: &[R]) -> Result<(), StoreError> {
        *self.records.write() = records.to_vec();
        Ok(())
    }
}
