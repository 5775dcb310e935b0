use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::debug;

use crate::{
    disk::{
        block_device::BlockDevice,
        types::{Block, BLOCK_SIZE},
    },
    fs::error::{FileSystemError, Result},
};

/// 用宿主机上的一个普通文件模拟磁盘
#[derive(Debug)]
pub struct FileDisk {
    file: File,
    total_blocks: u64,
}

impl FileDisk {
    /// 新建（或覆盖）磁盘文件，并以全零填满 `total_blocks` 个块
    pub fn create(path: impl AsRef<Path>, total_blocks: u64) -> Result<Self> {
        if total_blocks == 0 {
            return Err(FileSystemError::InvalidArgument(
                "a disk needs at least one block".to_string(),
            ));
        }

        let len = total_blocks.checked_mul(BLOCK_SIZE as u64).ok_or_else(|| {
            FileSystemError::InvalidArgument(format!("{} blocks is too large a disk", total_blocks))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        // 先截断为 0 再扩展，扩展出来的部分由操作系统保证为 0
        file.set_len(len)?;
        debug!(
            "created disk image {} with {} blocks",
            path.as_ref().display(),
            total_blocks
        );

        Ok(Self { file, total_blocks })
    }

    /// 打开已经存在的磁盘文件，块数由文件长度决定
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        let len = file.metadata()?.len();
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(FileSystemError::Corrupted(format!(
                "disk image size {} is not a whole number of {}-byte blocks",
                len, BLOCK_SIZE
            )));
        }

        Ok(Self {
            file,
            total_blocks: len / BLOCK_SIZE as u64,
        })
    }
}

impl BlockDevice for FileDisk {
    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn read_block(&self, block_id: u64, buf: &mut Block) -> Result<()> {
        self.check_range(block_id)?;
        // &File 同样实现了 Read/Seek，读操作不需要可变借用
        let mut file = &self.file;
        file.seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, block_id: u64, buf: &Block) -> Result<()> {
        self.check_range(block_id)?;
        self.file
            .seek(SeekFrom::Start(block_id * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
