use crate::{
    disk::types::Block,
    fs::error::{FileSystemError, Result},
};

/// 块设备：只能以整块为单位随机读写。
///
/// 实现者不得缓存，每次 `write_block` 返回前数据必须已经交给底层存储。
pub trait BlockDevice: Send {
    /// 设备上的块总数，合法块号为 `[0, total_blocks)`
    fn total_blocks(&self) -> u64;

    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()>;

    fn write_block(&mut self, block_id: u64, buf: &Block) -> Result<()>;

    /// 把底层存储刷到持久介质，默认什么也不做
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    // 越界检查，所有实现在真正读写前调用
    fn check_range(&self, block_id: u64) -> Result<()> {
        if block_id >= self.total_blocks() {
            return Err(FileSystemError::OutOfRange(block_id));
        }
        Ok(())
    }
}
