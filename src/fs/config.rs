use crate::disk::BLOCK_SIZE;

/// 魔数，用于识别文件系统（"FLATFS01" 的小端表示）
pub const FS_MAGIC: u64 = u64::from_le_bytes(*b"FLATFS01");

pub const SUPER_BLOCK_BLOCK_ID: u64 = 0;
pub const BITMAP_START_BLOCK_ID: u64 = 1;

/// 每个 inode 记录固定占 128 字节，一个 4KB 块可以存 32 个
pub const INODE_SIZE: usize = 128;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// 直接块指针个数，文件最大为 DIRECT_BLOCKS * BLOCK_SIZE
pub const DIRECT_BLOCKS: usize = 10;
pub const MAX_FILE_SIZE: u64 = (DIRECT_BLOCKS * BLOCK_SIZE) as u64;

pub const DEFAULT_MAX_INODES: u32 = 64;
pub const MAX_INODES: u32 = 4096;

/// 文件名最大字节数
pub const NAME_LENGTH_LIMIT: usize = 60;

// 目录区按 inode 数量预留空间：平均每个 inode 可以有 4 个名字
pub const DIR_ENTRIES_PER_INODE: u64 = 4;
// 一个目录项编码后的最大字节数：名字长度前缀 8 + 名字 + inode 号 4
pub const DIRENT_MAX_SIZE: u64 = 8 + NAME_LENGTH_LIMIT as u64 + 4;
// 目录区头部：长度前缀 8 + map 元素个数 8
pub const DIRECTORY_HEADER_SIZE: u64 = 16;
