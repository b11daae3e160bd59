use std::io;

use thiserror::Error;

/// 记录存储错误
///
/// 网络类 io 错误单独归为 `Network`：上层把它降级为空结果，其它错误照常上抛。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient network failure while {op}: {source}")]
    Network {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("io failure while {op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("record document is malformed: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// 按 io::ErrorKind 分类
    pub fn from_io(op: &'static str, source: io::Error) -> Self {
        if is_network_kind(source.kind()) {
            StoreError::Network { op, source }
        } else {
            StoreError::Io { op, source }
        }
    }

    pub fn is_transient_network(&self) -> bool {
        matches!(self, StoreError::Network { .. })
    }
}

fn is_network_kind(kind: io::ErrorKind) -> bool {
    use io::ErrorKind::*;
    matches!(
        kind,
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | NotConnected
            | TimedOut
            | BrokenPipe
            | AddrNotAvailable
    )
}

/// 请求解析失败的两种形态
#[derive(Debug, Error)]
pub enum ParseError {
    /// 连 JSON 都读不出来：按“中止”处理，回空结果
    #[error("request body is not readable JSON: {0}")]
    Unparsable(#[source] serde_json::Error),
    /// 结构可读但不符合 schema：作为 ValidationError 上抛
    #[error("{0}")]
    Invalid(String),
}

/// 对调用方可见的查询错误
///
/// 只有校验失败与非网络类上游失败会走到这里；
/// 不可解析请求与网络类加载失败在引擎内部被吸收为空结果。
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid filter request: {0}")]
    Validation(String),
    #[error("failed to load records: {0}")]
    Upstream(#[source] StoreError),
}

impl QueryError {
    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_kinds_are_transient() {
        let e = StoreError::from_io("loading", io::Error::new(io::ErrorKind::ConnectionReset, "rst"));
        assert!(e.is_transient_network());

        let e = StoreError::from_io("loading", io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(!e.is_transient_network());
        assert!(e.to_string().contains("loading"));
    }
}
