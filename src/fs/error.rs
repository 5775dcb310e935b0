use thiserror::Error;

/// 文件系统错误类型
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("Disk I/O error: {0}")]
    Io(#[from] std::io::Error), // 底层 I/O 错误，不可恢复
    #[error("Metadata encoding error: {0}")]
    Encoding(#[from] bincode::Error), // 元数据编解码失败
    #[error("Block {0} is outside the device")]
    OutOfRange(u64), // 块号越界
    #[error("Disk space is full")]
    NoSpace, // 数据块位图耗尽
    #[error("No free inode available")]
    NoInodes, // inode 表耗尽
    #[error("Not found: {0}")]
    NotFound(String), // 文件名或 inode 不存在
    #[error("File already exists: {0}")]
    AlreadyExists(String),
    #[error("Bad file descriptor: {0}")]
    BadDescriptor(u32),
    #[error("Invalid offset: {0}")]
    InvalidOffset(i64), // seek 结果为负
    #[error("File too large: {requested} bytes exceeds the {limit}-byte limit")]
    FileTooLarge { requested: u64, limit: u64 },
    #[error("Block {0} is already free")]
    DoubleFree(u64), // 内部一致性检查，正常使用下不应出现
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("Directory is full")]
    DirectoryFull,
    #[error("No file system found on the device")]
    NotFormatted,
    #[error("File system corrupted: {0}")]
    Corrupted(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// 文件系统统一结果类型
pub type Result<T> = std::result::Result<T, FileSystemError>;
