use crate::{
    disk::{
        block_device::BlockDevice,
        types::{Block, ZERO_BLOCK},
    },
    fs::error::Result,
};

/// 完全驻留在内存里的磁盘，进程退出即消失
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    blocks: Vec<Block>,
}

impl MemoryDisk {
    pub fn new(total_blocks: u64) -> Self {
        Self {
            blocks: vec![ZERO_BLOCK; total_blocks as usize],
        }
    }
}

impl BlockDevice for MemoryDisk {
    fn total_blocks(&self) -> u64 {
        self.blocks.len() as u64
    }

    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        self.check_range(block_id)?;
        buf.copy_from_slice(&self.blocks[block_id as usize]);
        Ok(())
    }

    fn write_block(&mut self, block_id: u64, buf: &Block) -> Result<()> {
        self.check_range(block_id)?;
        self.blocks[block_id as usize].copy_from_slice(buf);
        Ok(())
    }
}
