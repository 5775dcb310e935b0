use std::collections::HashSet;

use log::{info, warn};

use crate::{
    disk::{BlockDevice, ZERO_BLOCK},
    fs::{
        config::{DIRECT_BLOCKS, MAX_FILE_SIZE},
        data_area::{blocks_for, read_span, spans, write_span, zero_tail},
        data_block_bitmap::DataBlockBitmap,
        directory::Directory,
        error::{FileSystemError, Result},
        inode_table::{Inode, InodeTable},
        super_block::SuperBlock,
    },
};

pub mod config;
pub mod data_area;
pub mod data_block_bitmap;
pub mod directory;
pub mod error;
pub mod inode_table;
pub mod open_file;
pub mod super_block;
pub mod vfs;

/// 卷的使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub data_blocks: u64,
    pub free_blocks: u64,
    pub max_inodes: u32,
    pub free_inodes: u32,
}

/// 块与 inode 层：独占磁盘、数据块位图和 inode 表，
/// 其余组件只能通过这里的方法访问它们
pub struct FileSystem {
    disk: Box<dyn BlockDevice>,       // 底层磁盘抽象层
    super_block: SuperBlock,          // 文件系统总体信息
    data_bitmap: DataBlockBitmap,     // 数据块分配信息
    inode_table: InodeTable,          // 所有 inode 管理
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("super_block", &self.super_block)
            .field("free_blocks", &self.data_bitmap.free_blocks())
            .field("free_inodes", &self.inode_table.free_count())
            .finish()
    }
}

impl FileSystem {
    /// 格式化：清空整个磁盘，按 max_inodes 计算布局并写入超级块
    pub fn format(mut disk: Box<dyn BlockDevice>, max_inodes: u32) -> Result<Self> {
        let super_block = SuperBlock::new(disk.total_blocks(), max_inodes)?;

        for block_id in 0..super_block.total_blocks {
            disk.write_block(block_id, &ZERO_BLOCK)?;
        }

        let data_bitmap = DataBlockBitmap::new(&super_block);
        let inode_table = InodeTable::new(&super_block);
        data_bitmap.sync(disk.as_mut())?;
        inode_table.sync(disk.as_mut())?;
        super_block.sync(disk.as_mut())?;

        info!(
            "formatted volume: {} blocks, {} inodes, data starts at block {}",
            super_block.total_blocks, super_block.max_inodes, super_block.data_start
        );

        Ok(Self {
            disk,
            super_block,
            data_bitmap,
            inode_table,
        })
    }

    /// 挂载已有的卷。上一次运行中已经没有名字、只因打开而保留的 inode 会在这里回收
    pub fn mount(disk: Box<dyn BlockDevice>) -> Result<Self> {
        let super_block = SuperBlock::load(disk.as_ref())?;
        let data_bitmap = DataBlockBitmap::load(disk.as_ref(), &super_block)?;
        let inode_table = InodeTable::load(disk.as_ref(), &super_block)?;

        let mut fs = Self {
            disk,
            super_block,
            data_bitmap,
            inode_table,
        };

        // 回收孤儿之前先确认位图与 inode 表一致，否则拒绝挂载
        fs.check()?;

        let orphans: Vec<u32> = fs
            .inode_table
            .iter_used()
            .filter(|(_, inode)| inode.link_count == 0)
            .map(|(id, _)| id)
            .collect();
        for id in orphans {
            warn!("reclaiming orphaned inode {}", id);
            fs.free_inode(id)?;
        }

        info!(
            "mounted volume: {} blocks, {}/{} data blocks free, {}/{} inodes free",
            fs.super_block.total_blocks,
            fs.data_bitmap.free_blocks(),
            fs.data_bitmap.total_blocks(),
            fs.inode_table.free_count(),
            fs.inode_table.capacity()
        );
        Ok(fs)
    }

    /// 交还磁盘，用于在同一块磁盘上重新格式化
    pub fn into_disk(self) -> Box<dyn BlockDevice> {
        self.disk
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// 底层设备的块数，重新格式化时按它计算布局
    pub fn device_blocks(&self) -> u64 {
        self.disk.total_blocks()
    }

    pub fn usage(&self) -> FsUsage {
        FsUsage {
            data_blocks: self.data_bitmap.total_blocks(),
            free_blocks: self.data_bitmap.free_blocks(),
            max_inodes: self.inode_table.capacity(),
            free_inodes: self.inode_table.free_count(),
        }
    }

    pub fn sync(&mut self) -> Result<()> {
        self.disk.sync()
    }

    pub fn load_directory(&self) -> Result<Directory> {
        Directory::load(self.disk.as_ref(), &self.super_block)
    }

    pub fn sync_directory(&mut self, directory: &Directory) -> Result<()> {
        directory.sync(self.disk.as_mut(), &self.super_block)
    }

    pub fn inode(&self, id: u32) -> Result<&Inode> {
        self.inode_table.get(id)
    }

    /// 所有被占用的 inode
    pub fn inodes(&self) -> impl Iterator<Item = (u32, &Inode)> {
        self.inode_table.iter_used()
    }

    pub fn alloc_inode(&mut self) -> Result<u32> {
        self.inode_table.alloc(self.disk.as_mut())
    }

    pub fn free_inode(&mut self, id: u32) -> Result<()> {
        self.inode_table
            .free(self.disk.as_mut(), &mut self.data_bitmap, id)
    }

    /// 链接数加一并写回，返回新的链接数
    pub fn inc_link(&mut self, id: u32) -> Result<u32> {
        let inode = self.inode_table.get_mut(id)?;
        inode.inc_link();
        let links = inode.link_count;
        self.inode_table.sync_inode(self.disk.as_mut(), id)?;
        Ok(links)
    }

    /// 链接数减一并写回，返回新的链接数；是否释放由调用方决定
    pub fn dec_link(&mut self, id: u32) -> Result<u32> {
        let inode = self.inode_table.get_mut(id)?;
        inode.dec_link();
        let links = inode.link_count;
        self.inode_table.sync_inode(self.disk.as_mut(), id)?;
        Ok(links)
    }

    /// 从 offset 开始读取最多 len 字节，不会读过文件末尾
    pub fn read(&self, id: u32, offset: u64, len: usize) -> Result<Vec<u8>> {
        let inode = self.inode_table.get(id)?;
        if offset >= inode.size {
            return Ok(Vec::new());
        }

        let len = u64::min(len as u64, inode.size - offset) as usize;
        let mut out = vec![0u8; len];
        for span in spans(offset, len) {
            let block_id = inode.direct_blocks[span.logical];
            let dst = &mut out[span.buf_offset..span.buf_offset + span.len()];
            read_span(self.disk.as_ref(), block_id, &span, dst)?;
        }
        Ok(out)
    }

    /// 在 offset 处写入 data，必要时分配并清零中间缺失的块。
    /// 超过直接块容量或空间不足时整个调用失败，不保留任何新分配的块
    pub fn write(&mut self, id: u32, offset: u64, data: &[u8]) -> Result<usize> {
        let size = self.inode_table.get(id)?.size;
        if data.is_empty() {
            return Ok(0);
        }

        let end = Self::check_size(offset.saturating_add(data.len() as u64))?;
        self.grow_blocks(id, blocks_for(end))?;

        let blocks = self.inode_table.get(id)?.direct_blocks;
        for span in spans(offset, data.len()) {
            let src = &data[span.buf_offset..span.buf_offset + span.len()];
            write_span(self.disk.as_mut(), blocks[span.logical], &span, src)?;
        }

        let inode = self.inode_table.get_mut(id)?;
        inode.size = u64::max(size, end);
        inode.touch();
        self.inode_table.sync_inode(self.disk.as_mut(), id)?;
        Ok(data.len())
    }

    /// 改变文件大小。变大时按需分配清零的块，变小时释放多余的块
    pub fn truncate(&mut self, id: u32, new_size: u64) -> Result<()> {
        let old_size = self.inode_table.get(id)?.size;
        let new_size = Self::check_size(new_size)?;
        let needed = blocks_for(new_size);

        if new_size >= old_size {
            self.grow_blocks(id, needed)?;
        } else {
            while self.inode_table.get(id)?.blocks_used as usize > needed {
                if let Some(block_id) = self.inode_table.get_mut(id)?.pop_block() {
                    self.data_bitmap.free(self.disk.as_mut(), block_id)?;
                }
            }

            // 保持“文件末尾之后的字节都是 0”，以后再变大时不会露出旧数据
            let tail = (new_size % self.super_block.block_size) as usize;
            if tail != 0 {
                let last = self.inode_table.get(id)?.direct_blocks[needed - 1];
                zero_tail(self.disk.as_mut(), last, tail)?;
            }
        }

        let inode = self.inode_table.get_mut(id)?;
        inode.size = new_size;
        inode.touch();
        self.inode_table.sync_inode(self.disk.as_mut(), id)
    }

    fn check_size(requested: u64) -> Result<u64> {
        if requested > MAX_FILE_SIZE {
            warn!(
                "rejected request for {} bytes, files are limited to {} direct blocks",
                requested, DIRECT_BLOCKS
            );
            return Err(FileSystemError::FileTooLarge {
                requested,
                limit: MAX_FILE_SIZE,
            });
        }
        Ok(requested)
    }

    // 确保 inode 至少拥有 needed 个块；先检查空闲块是否足够，再逐个分配
    fn grow_blocks(&mut self, id: u32, needed: usize) -> Result<()> {
        let have = self.inode_table.get(id)?.blocks_used as usize;
        if needed <= have {
            return Ok(());
        }

        let missing = (needed - have) as u64;
        if missing > self.data_bitmap.free_blocks() {
            warn!(
                "inode {} needs {} more blocks but only {} are free",
                id,
                missing,
                self.data_bitmap.free_blocks()
            );
            return Err(FileSystemError::NoSpace);
        }

        for _ in have..needed {
            let block_id = self.data_bitmap.alloc(self.disk.as_mut())?;
            // 新块一律清零，文件中不存在空洞
            self.disk.write_block(block_id, &ZERO_BLOCK)?;
            self.inode_table.get_mut(id)?.push_block(block_id)?;
        }
        Ok(())
    }

    /// 校验位图与 inode 表是否一致
    pub fn check(&self) -> Result<()> {
        let mut owned = HashSet::new();
        let mut total = 0u64;

        for (id, inode) in self.inode_table.iter_used() {
            if inode.size > MAX_FILE_SIZE || inode.blocks_used as usize > DIRECT_BLOCKS {
                return Err(FileSystemError::Corrupted(format!(
                    "inode {} exceeds the direct block capacity",
                    id
                )));
            }
            if inode.blocks_used as usize != blocks_for(inode.size) {
                return Err(FileSystemError::Corrupted(format!(
                    "inode {} has {} bytes but owns {} blocks",
                    id, inode.size, inode.blocks_used
                )));
            }
            for &block_id in inode.blocks() {
                if !self.data_bitmap.is_used(block_id) {
                    return Err(FileSystemError::Corrupted(format!(
                        "block {} of inode {} is marked free",
                        block_id, id
                    )));
                }
                if !owned.insert(block_id) {
                    return Err(FileSystemError::Corrupted(format!(
                        "block {} is owned twice",
                        block_id
                    )));
                }
            }
            total += inode.blocks_used as u64;
        }

        if total != self.data_bitmap.used_blocks() {
            return Err(FileSystemError::Corrupted(format!(
                "bitmap marks {} blocks used but inodes own {}",
                self.data_bitmap.used_blocks(),
                total
            )));
        }
        Ok(())
    }
}
