use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, BLOCK_SIZE, ZERO_BLOCK},
    fs::{
        config::{DIRECT_BLOCKS, INODES_PER_BLOCK, INODE_SIZE, MAX_FILE_SIZE},
        data_area::blocks_for,
        data_block_bitmap::DataBlockBitmap,
        error::{FileSystemError, Result},
        super_block::SuperBlock,
    },
    utils::current_timestamp,
};

/// inode 类型。只有一个根目录，所以这里只有普通文件
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum InodeKind {
    #[default]
    File,
}

/// 磁盘上的 inode 记录，编码后固定放在 128 字节的槽位里。
/// 全零的槽位解码出来就是一个空闲 inode。
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Inode {
    pub kind: InodeKind,
    pub in_use: bool,     // 槽位是否被占用
    pub size: u64,        // 文件大小（字节）
    pub link_count: u32,  // 硬链接数（有多少目录项指向该 inode）
    pub blocks_used: u32, // direct_blocks 中有效指针个数
    pub direct_blocks: [u64; DIRECT_BLOCKS], // 直接块指针，按逻辑块号排列
    pub created: i64,     // 创建时间（unix 秒）
    pub modified: i64,    // 最后修改时间（unix 秒）
}

impl Inode {
    fn allocated() -> Self {
        let now = current_timestamp();
        Self {
            in_use: true,
            created: now,
            modified: now,
            ..Self::default()
        }
    }

    /// 当前拥有的数据块，按逻辑顺序
    pub fn blocks(&self) -> &[u64] {
        &self.direct_blocks[..self.blocks_used as usize]
    }

    // 更新时间戳
    pub fn touch(&mut self) {
        self.modified = current_timestamp();
    }

    // 增加/减少硬链接计数
    pub fn inc_link(&mut self) {
        self.link_count += 1;
    }

    pub fn dec_link(&mut self) {
        if self.link_count > 0 {
            self.link_count -= 1;
        }
    }

    // 块管理
    pub fn push_block(&mut self, block_id: u64) -> Result<()> {
        let slot = self.blocks_used as usize;
        if slot >= DIRECT_BLOCKS {
            return Err(FileSystemError::FileTooLarge {
                requested: (slot as u64 + 1) * BLOCK_SIZE as u64,
                limit: (DIRECT_BLOCKS * BLOCK_SIZE) as u64,
            });
        }
        self.direct_blocks[slot] = block_id;
        self.blocks_used += 1;
        Ok(())
    }

    pub fn pop_block(&mut self) -> Option<u64> {
        if self.blocks_used == 0 {
            return None;
        }
        self.blocks_used -= 1;
        let slot = self.blocks_used as usize;
        Some(std::mem::take(&mut self.direct_blocks[slot]))
    }
}

/// inode 表：固定容量，常驻内存，单个 inode 修改后写回它所在的块
#[derive(Debug)]
pub struct InodeTable {
    inodes: Vec<Inode>,
    start_block: u64,
}

impl InodeTable {
    pub fn new(sb: &SuperBlock) -> Self {
        Self {
            inodes: vec![Inode::default(); sb.max_inodes as usize],
            start_block: sb.inode_table_start,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.inodes.len() as u32
    }

    pub fn free_count(&self) -> u32 {
        self.inodes.iter().filter(|inode| !inode.in_use).count() as u32
    }

    /// 按编号升序找到第一个空闲槽位，初始化并写回磁盘
    pub fn alloc(&mut self, disk: &mut dyn BlockDevice) -> Result<u32> {
        let id = self
            .inodes
            .iter()
            .position(|inode| !inode.in_use)
            .ok_or(FileSystemError::NoInodes)? as u32;

        self.inodes[id as usize] = Inode::allocated();
        self.sync_inode(disk, id)?;
        debug!("allocated inode {}", id);
        Ok(id)
    }

    /// 归还 inode 占用的全部数据块并清空槽位。
    /// 任何一个块不能释放时不做任何修改
    pub fn free(
        &mut self,
        disk: &mut dyn BlockDevice,
        bitmap: &mut DataBlockBitmap,
        id: u32,
    ) -> Result<()> {
        let blocks = self.get(id)?.blocks().to_vec();
        for &block_id in &blocks {
            bitmap.check_used(block_id)?;
        }

        for block_id in blocks {
            bitmap.free(disk, block_id)?;
        }
        self.inodes[id as usize] = Inode::default();
        self.sync_inode(disk, id)?;
        debug!("freed inode {}", id);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Result<&Inode> {
        self.inodes
            .get(id as usize)
            .filter(|inode| inode.in_use)
            .ok_or_else(|| FileSystemError::NotFound(format!("inode {}", id)))
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut Inode> {
        self.inodes
            .get_mut(id as usize)
            .filter(|inode| inode.in_use)
            .ok_or_else(|| FileSystemError::NotFound(format!("inode {}", id)))
    }

    /// 所有被占用的 inode 及其编号
    pub fn iter_used(&self) -> impl Iterator<Item = (u32, &Inode)> {
        self.inodes
            .iter()
            .enumerate()
            .filter(|(_, inode)| inode.in_use)
            .map(|(id, inode)| (id as u32, inode))
    }

    // inode 编号 -> (所在块号, 块内偏移)
    fn position(&self, id: u32) -> (u64, usize) {
        let id = id as usize;
        (
            self.start_block + (id / INODES_PER_BLOCK) as u64,
            (id % INODES_PER_BLOCK) * INODE_SIZE,
        )
    }

    /// 把一个 inode 写回磁盘：读出所在块，替换对应槽位，再整块写回
    pub fn sync_inode(&self, disk: &mut dyn BlockDevice, id: u32) -> Result<()> {
        let inode = self
            .inodes
            .get(id as usize)
            .ok_or_else(|| FileSystemError::NotFound(format!("inode {}", id)))?;
        let bytes = bincode::serialize(inode)?;
        debug_assert!(bytes.len() <= INODE_SIZE);

        let (block_id, offset) = self.position(id);
        let mut block_buf = ZERO_BLOCK;
        disk.read_block(block_id, &mut block_buf)?;
        block_buf[offset..offset + INODE_SIZE].fill(0);
        block_buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
        disk.write_block(block_id, &block_buf)
    }

    // 整张表写回磁盘，格式化时使用
    pub fn sync(&self, disk: &mut dyn BlockDevice) -> Result<()> {
        for (chunk_index, chunk) in self.inodes.chunks(INODES_PER_BLOCK).enumerate() {
            let mut block_buf = ZERO_BLOCK;
            for (i, inode) in chunk.iter().enumerate() {
                let bytes = bincode::serialize(inode)?;
                let offset = i * INODE_SIZE;
                block_buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
            }
            disk.write_block(self.start_block + chunk_index as u64, &block_buf)?;
        }
        Ok(())
    }

    pub fn load(disk: &dyn BlockDevice, sb: &SuperBlock) -> Result<Self> {
        let mut table = Self::new(sb);
        let mut block_buf = ZERO_BLOCK;

        for (chunk_index, chunk) in table.inodes.chunks_mut(INODES_PER_BLOCK).enumerate() {
            disk.read_block(sb.inode_table_start + chunk_index as u64, &mut block_buf)?;
            for (i, inode) in chunk.iter_mut().enumerate() {
                let offset = i * INODE_SIZE;
                *inode = bincode::deserialize(&block_buf[offset..offset + INODE_SIZE])?;
            }
        }

        for (id, inode) in table.iter_used() {
            validate(id, inode, sb)?;
        }
        Ok(table)
    }
}

// 磁盘上读出的记录必须自洽，块指针只能落在数据区
fn validate(id: u32, inode: &Inode, sb: &SuperBlock) -> Result<()> {
    let blocks_used = inode.blocks_used as usize;
    if inode.size > MAX_FILE_SIZE || blocks_used > DIRECT_BLOCKS {
        return Err(FileSystemError::Corrupted(format!(
            "inode {} exceeds the direct block capacity",
            id
        )));
    }
    if blocks_used != blocks_for(inode.size) {
        return Err(FileSystemError::Corrupted(format!(
            "inode {} has {} bytes but owns {} blocks",
            id, inode.size, blocks_used
        )));
    }
    if let Some(block_id) = inode
        .blocks()
        .iter()
        .find(|&&b| b < sb.data_start || b >= sb.total_blocks)
    {
        return Err(FileSystemError::Corrupted(format!(
            "inode {} points at block {} outside the data region",
            id, block_id
        )));
    }
    Ok(())
}
