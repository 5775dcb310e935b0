use log::debug;

use crate::{
    disk::{Block, BlockDevice, BLOCK_SIZE, ZERO_BLOCK},
    fs::{
        error::{FileSystemError, Result},
        super_block::SuperBlock,
    },
};

/// 数据块位图：每个 bit 对应数据区中的一个块，1 表示已被某个 inode 占用。
///
/// 位图常驻内存，但每次修改后立即把所在的位图块写回磁盘。
/// 对外暴露的块号都是设备上的绝对块号。
#[derive(Debug)]
pub struct DataBlockBitmap {
    bits: Vec<u8>,     // 位图数据，低位在前
    total_blocks: u64, // 数据块总数
    free_blocks: u64,  // 当前空闲块数
    start_block: u64,  // 位图在磁盘中的起始块号
    data_start: u64,   // 第 0 位对应的设备块号
}

impl DataBlockBitmap {
    // 全部空闲的位图，格式化时使用
    pub fn new(sb: &SuperBlock) -> Self {
        let total_blocks = sb.data_blocks();
        let byte_len = ((total_blocks + 7) / 8) as usize;

        Self {
            bits: vec![0; byte_len],
            total_blocks,
            free_blocks: total_blocks,
            start_block: sb.bitmap_start,
            data_start: sb.data_start,
        }
    }

    pub fn free_blocks(&self) -> u64 {
        self.free_blocks
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn used_blocks(&self) -> u64 {
        self.total_blocks - self.free_blocks
    }

    /// 按块号升序找到第一个空闲块，置位并写回磁盘
    pub fn alloc(&mut self, disk: &mut dyn BlockDevice) -> Result<u64> {
        let byte_index = self
            .bits
            .iter()
            .position(|&byte| byte != 0xFF)
            .ok_or(FileSystemError::NoSpace)?;
        let bit = self.bits[byte_index].trailing_ones() as u64;
        let index = byte_index as u64 * 8 + bit;

        // 最后一个字节里可能有不对应任何块的填充位
        if index >= self.total_blocks {
            return Err(FileSystemError::NoSpace);
        }

        self.bits[byte_index] |= 1 << bit;
        if let Err(e) = self.sync_byte(disk, byte_index) {
            self.bits[byte_index] &= !(1 << bit);
            return Err(e);
        }
        self.free_blocks -= 1;

        let block_id = self.data_start + index;
        debug!("allocated data block {}", block_id);
        Ok(block_id)
    }

    /// 释放一个数据块；重复释放视为内部错误
    pub fn free(&mut self, disk: &mut dyn BlockDevice, block_id: u64) -> Result<()> {
        self.check_used(block_id)?;
        let index = block_id - self.data_start;
        let byte_index = (index / 8) as usize;
        let mask = 1u8 << (index % 8);

        self.bits[byte_index] &= !mask;
        if let Err(e) = self.sync_byte(disk, byte_index) {
            self.bits[byte_index] |= mask;
            return Err(e);
        }
        self.free_blocks += 1;
        debug!("freed data block {}", block_id);
        Ok(())
    }

    /// 确认块号落在数据区并且处于占用状态
    pub fn check_used(&self, block_id: u64) -> Result<()> {
        self.index_of(block_id)?;
        if !self.is_used(block_id) {
            return Err(FileSystemError::DoubleFree(block_id));
        }
        Ok(())
    }

    pub fn is_used(&self, block_id: u64) -> bool {
        match self.index_of(block_id) {
            Ok(index) => self.bits[(index / 8) as usize] & (1 << (index % 8)) != 0,
            Err(_) => false,
        }
    }

    // 设备块号 -> 位图中的位号
    fn index_of(&self, block_id: u64) -> Result<u64> {
        if block_id < self.data_start || block_id >= self.data_start + self.total_blocks {
            return Err(FileSystemError::OutOfRange(block_id));
        }
        Ok(block_id - self.data_start)
    }

    // 从磁盘加载数据块位图
    pub fn load(disk: &dyn BlockDevice, sb: &SuperBlock) -> Result<Self> {
        let total_blocks = sb.data_blocks();
        let mut bits = Vec::with_capacity(sb.bitmap_blocks() as usize * BLOCK_SIZE);
        let mut block_buf: Block = ZERO_BLOCK;

        for i in 0..sb.bitmap_blocks() {
            disk.read_block(sb.bitmap_start + i, &mut block_buf)?;
            bits.extend_from_slice(&block_buf);
        }

        // 截掉多余字节，只保留有效位
        let byte_len = ((total_blocks + 7) / 8) as usize;
        bits.truncate(byte_len);

        // 最后一个字节的填充位必须为 0
        let tail_bits = total_blocks % 8;
        if tail_bits != 0 {
            if let Some(last) = bits.last() {
                if last >> tail_bits != 0 {
                    return Err(FileSystemError::Corrupted(
                        "bitmap marks blocks beyond the end of the volume".to_string(),
                    ));
                }
            }
        }

        let used = bits.iter().map(|b| b.count_ones() as u64).sum::<u64>();

        Ok(Self {
            bits,
            total_blocks,
            free_blocks: total_blocks - used,
            start_block: sb.bitmap_start,
            data_start: sb.data_start,
        })
    }

    // 将整个数据块位图写回磁盘
    pub fn sync(&self, disk: &mut dyn BlockDevice) -> Result<()> {
        let blocks_in_bitmap = (self.bits.len() + BLOCK_SIZE - 1) / BLOCK_SIZE;
        for i in 0..blocks_in_bitmap {
            self.sync_block(disk, i)?;
        }
        Ok(())
    }

    // 只写回包含某个字节的那一个位图块
    fn sync_byte(&self, disk: &mut dyn BlockDevice, byte_index: usize) -> Result<()> {
        self.sync_block(disk, byte_index / BLOCK_SIZE)
    }

    fn sync_block(&self, disk: &mut dyn BlockDevice, block_index: usize) -> Result<()> {
        let start = block_index * BLOCK_SIZE;
        let end = usize::min(start + BLOCK_SIZE, self.bits.len());

        // 每块 4KB，不够用 0 填充
        let mut block_buf: Block = ZERO_BLOCK;
        block_buf[..end - start].copy_from_slice(&self.bits[start..end]);
        disk.write_block(self.start_block + block_index as u64, &block_buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDisk;

    // 读正常、写一律失败的设备
    struct FailingWrites(MemoryDisk);

    impl BlockDevice for FailingWrites {
        fn total_blocks(&self) -> u64 {
            self.0.total_blocks()
        }

        fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
            self.0.read_block(block_id, buf)
        }

        fn write_block(&mut self, _block_id: u64, _buf: &Block) -> Result<()> {
            Err(FileSystemError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "write rejected",
            )))
        }
    }

    fn setup(total_blocks: u64) -> (MemoryDisk, SuperBlock, DataBlockBitmap) {
        let disk = MemoryDisk::new(total_blocks);
        let sb = SuperBlock::new(total_blocks, 4).unwrap();
        let bitmap = DataBlockBitmap::new(&sb);
        (disk, sb, bitmap)
    }

    #[test]
    fn allocates_in_ascending_order() {
        let (mut disk, sb, mut bitmap) = setup(64);
        let first = bitmap.alloc(&mut disk).unwrap();
        let second = bitmap.alloc(&mut disk).unwrap();
        assert_eq!(first, sb.data_start);
        assert_eq!(second, sb.data_start + 1);

        bitmap.free(&mut disk, first).unwrap();
        // 释放后最小的空闲块会被优先复用
        assert_eq!(bitmap.alloc(&mut disk).unwrap(), first);
    }

    #[test]
    fn exhaustion_reports_no_space() {
        let (mut disk, sb, mut bitmap) = setup(16);
        for _ in 0..sb.data_blocks() {
            bitmap.alloc(&mut disk).unwrap();
        }
        assert_eq!(bitmap.free_blocks(), 0);
        assert!(matches!(
            bitmap.alloc(&mut disk),
            Err(FileSystemError::NoSpace)
        ));
    }

    #[test]
    fn double_free_is_detected() {
        let (mut disk, _, mut bitmap) = setup(32);
        let block = bitmap.alloc(&mut disk).unwrap();
        bitmap.free(&mut disk, block).unwrap();
        assert!(matches!(
            bitmap.free(&mut disk, block),
            Err(FileSystemError::DoubleFree(b)) if b == block
        ));
    }

    #[test]
    fn metadata_blocks_cannot_be_freed() {
        let (mut disk, _, mut bitmap) = setup(32);
        assert!(matches!(
            bitmap.free(&mut disk, 0),
            Err(FileSystemError::OutOfRange(0))
        ));
    }

    #[test]
    fn every_mutation_is_written_through() {
        let (mut disk, sb, mut bitmap) = setup(64);
        let a = bitmap.alloc(&mut disk).unwrap();
        let b = bitmap.alloc(&mut disk).unwrap();
        bitmap.free(&mut disk, a).unwrap();

        let reloaded = DataBlockBitmap::load(&disk, &sb).unwrap();
        assert!(!reloaded.is_used(a));
        assert!(reloaded.is_used(b));
        assert_eq!(reloaded.free_blocks(), sb.data_blocks() - 1);
    }

    #[test]
    fn failed_write_back_keeps_memory_in_step_with_disk() {
        let (mut disk, sb, mut bitmap) = setup(64);
        let kept = bitmap.alloc(&mut disk).unwrap();
        let mut failing = FailingWrites(disk);

        assert!(matches!(
            bitmap.alloc(&mut failing),
            Err(FileSystemError::Io(_))
        ));
        assert_eq!(bitmap.free_blocks(), sb.data_blocks() - 1);
        assert!(!bitmap.is_used(kept + 1));

        assert!(matches!(
            bitmap.free(&mut failing, kept),
            Err(FileSystemError::Io(_))
        ));
        assert!(bitmap.is_used(kept));
        assert_eq!(bitmap.used_blocks(), 1);
    }
}
