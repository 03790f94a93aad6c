use thiserror::Error;

/// Every failure mode a Manager RPC handler can surface, per the wire
/// convention of `errno=false` plus a human-readable `errmes`. Transport or
/// decode failures are not represented here -- those stay `tonic::Status`
/// errors at the RPC boundary; this enum is strictly the application layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("连接失败, 目前暂无键值服务器")]
    NoNodesAvailable,

    #[error("不存在此存储服务器")]
    UnknownEndpoint,

    #[error("未知的存储服务器")]
    UnknownNode,

    #[error("token校验失败, 无权操作!")]
    Unauthorized,

    #[error("该端点已被注册")]
    DuplicateEndpoint,

    #[error("节点未注册, 无权操作!")]
    UnregisteredNode,

    #[error("暂时缺少键值{0}")]
    KeyAbsent(String),

    #[error("其他服务器对键值{0} 无法达成一致")]
    NoConsensus(String),

    #[error("提交失败")]
    PrepareRefused,

    #[error("删除失败")]
    DeleteRefused,

    #[error("分配id失败, 请稍后重试")]
    IdExhausted,
}

impl ManagerError {
    /// Split into the `(errno, errmes)` pair every Manager response carries.
    pub fn into_parts(self) -> (bool, String) {
        (false, self.to_string())
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
