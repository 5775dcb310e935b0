/// 每个逻辑块（Block）的大小：4KB
/// 文件系统以“块”为最小读写单位。
pub const BLOCK_SIZE: usize = 4096;

/// 新建磁盘默认包含的块总数：1024 块
/// 即 4KB * 1024 = 4MB 的卷。
pub const DEFAULT_TOTAL_BLOCKS: u64 = 1024;

/// 定义一个逻辑块类型（每块 4KB 的字节数组）
/// 所有磁盘读写都以 Block 为单位进行。
pub type Block = [u8; BLOCK_SIZE];

/// 全零块，格式化和分配新数据块时使用
pub const ZERO_BLOCK: Block = [0; BLOCK_SIZE];
