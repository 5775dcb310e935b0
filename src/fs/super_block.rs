use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, BLOCK_SIZE, ZERO_BLOCK},
    fs::{
        config::{
            BITMAP_START_BLOCK_ID, DIRECTORY_HEADER_SIZE, DIRENT_MAX_SIZE, DIR_ENTRIES_PER_INODE,
            FS_MAGIC, INODES_PER_BLOCK, MAX_INODES, SUPER_BLOCK_BLOCK_ID,
        },
        error::{FileSystemError, Result},
    },
};

/// 超级块，位于 0 号块，格式化时写入，挂载时读出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuperBlock {
    pub magic: u64,        // 魔数，用于识别文件系统
    pub block_size: u64,   // 每块大小（字节）
    pub total_blocks: u64, // 文件系统总块数
    pub max_inodes: u64,   // inode 表容量
    /** 各区域起始块号 */
    pub bitmap_start: u64,
    pub inode_table_start: u64,
    pub directory_start: u64,
    pub data_start: u64,
}

impl SuperBlock {
    /// 根据总块数和 inode 数量计算整个卷的布局
    pub fn new(total_blocks: u64, max_inodes: u32) -> Result<Self> {
        if max_inodes == 0 || max_inodes > MAX_INODES {
            return Err(FileSystemError::InvalidArgument(format!(
                "max_inodes must be between 1 and {}, got {}",
                MAX_INODES, max_inodes
            )));
        }

        let block_size = BLOCK_SIZE as u64;
        let max_inodes = max_inodes as u64;

        // 位图按全部块数计算，略有富余但与数据区大小无关
        let bitmap_blocks = total_blocks.div_ceil(8 * block_size);
        let inode_table_blocks = max_inodes.div_ceil(INODES_PER_BLOCK as u64);
        let directory_bytes =
            DIRECTORY_HEADER_SIZE + max_inodes * DIR_ENTRIES_PER_INODE * DIRENT_MAX_SIZE;
        let directory_blocks = directory_bytes.div_ceil(block_size);

        let bitmap_start = BITMAP_START_BLOCK_ID;
        let inode_table_start = bitmap_start + bitmap_blocks;
        let directory_start = inode_table_start + inode_table_blocks;
        let data_start = directory_start + directory_blocks;

        if data_start >= total_blocks {
            return Err(FileSystemError::InvalidArgument(format!(
                "{} blocks cannot hold metadata for {} inodes and any data",
                total_blocks, max_inodes
            )));
        }

        Ok(Self {
            magic: FS_MAGIC,
            block_size,
            total_blocks,
            max_inodes,
            bitmap_start,
            inode_table_start,
            directory_start,
            data_start,
        })
    }

    /// 数据区块数
    pub fn data_blocks(&self) -> u64 {
        self.total_blocks - self.data_start
    }

    pub fn bitmap_blocks(&self) -> u64 {
        self.inode_table_start - self.bitmap_start
    }

    pub fn directory_blocks(&self) -> u64 {
        self.data_start - self.directory_start
    }

    // 从磁盘加载超级块并校验布局
    pub fn load(disk: &dyn BlockDevice) -> Result<Self> {
        let mut block_buf = ZERO_BLOCK;
        disk.read_block(SUPER_BLOCK_BLOCK_ID, &mut block_buf)?;

        let sb: SuperBlock = bincode::deserialize(&block_buf)?;
        if sb.magic != FS_MAGIC {
            return Err(FileSystemError::NotFormatted);
        }
        if sb.block_size != BLOCK_SIZE as u64 {
            return Err(FileSystemError::Corrupted(format!(
                "block size {} is not supported",
                sb.block_size
            )));
        }
        if sb.total_blocks > disk.total_blocks() {
            return Err(FileSystemError::Corrupted(format!(
                "volume claims {} blocks but the device has {}",
                sb.total_blocks,
                disk.total_blocks()
            )));
        }

        // 布局完全由 total_blocks 与 max_inodes 决定，重新推导一遍即可发现篡改
        let expected = Self::new(sb.total_blocks, sb.max_inodes as u32)
            .map_err(|e| FileSystemError::Corrupted(e.to_string()))?;
        if expected != sb {
            return Err(FileSystemError::Corrupted(
                "superblock layout does not match its parameters".to_string(),
            ));
        }

        debug!("loaded superblock: {:?}", sb);
        Ok(sb)
    }

    // 将超级块写回磁盘
    pub fn sync(&self, disk: &mut dyn BlockDevice) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        let mut block_buf = ZERO_BLOCK;
        block_buf[..bytes.len()].copy_from_slice(&bytes);
        disk.write_block(SUPER_BLOCK_BLOCK_ID, &block_buf)
    }
}
