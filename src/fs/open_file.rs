use std::collections::BTreeMap;

use log::debug;

use crate::fs::error::{FileSystemError, Result};

pub type Fd = u32;

/// seek 的基准位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// 一个打开的文件：只记录 inode 编号，不持有 inode 本身
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode_id: u32,
    pub cursor: u64, // 当前读写位置，可以超过文件末尾
}

/// 文件描述符表，fd 关闭后可以被复用
#[derive(Debug, Default)]
pub struct OpenFileTable {
    files: BTreeMap<Fd, OpenFile>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配最小的未使用 fd，游标从 0 开始
    pub fn open(&mut self, inode_id: u32) -> Fd {
        // BTreeMap 的键有序，第一个与下标不相等的位置就是空洞
        let fd = self
            .files
            .keys()
            .zip(0..)
            .find(|&(&used, expected)| used != expected)
            .map(|(_, expected)| expected)
            .unwrap_or(self.files.len() as Fd);

        self.files.insert(fd, OpenFile { inode_id, cursor: 0 });
        debug!("opened fd {} on inode {}", fd, inode_id);
        fd
    }

    pub fn close(&mut self, fd: Fd) -> Result<OpenFile> {
        let file = self
            .files
            .remove(&fd)
            .ok_or(FileSystemError::BadDescriptor(fd))?;
        debug!("closed fd {} on inode {}", fd, file.inode_id);
        Ok(file)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        self.files.get(&fd).ok_or(FileSystemError::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        self.files
            .get_mut(&fd)
            .ok_or(FileSystemError::BadDescriptor(fd))
    }

    /// 是否还有描述符指向该 inode
    pub fn is_open(&self, inode_id: u32) -> bool {
        self.files.values().any(|file| file.inode_id == inode_id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Fd, &OpenFile)> {
        self.files.iter().map(|(&fd, file)| (fd, file))
    }

    /// 计算新的游标位置；file_size 只在 Whence::End 时使用
    pub fn seek(&mut self, fd: Fd, position: i64, whence: Whence, file_size: u64) -> Result<u64> {
        let file = self.get_mut(fd)?;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => file.cursor as i128,
            Whence::End => file_size as i128,
        };
        let target = base + position as i128;
        if target < 0 {
            return Err(FileSystemError::InvalidOffset(
                target.try_into().unwrap_or(i64::MIN),
            ));
        }
        // 游标是 u64，超出表示范围的位置无法记录
        file.cursor = u64::try_from(target).map_err(|_| {
            FileSystemError::InvalidArgument(format!("offset {} does not fit in a cursor", target))
        })?;
        Ok(file.cursor)
    }
}
