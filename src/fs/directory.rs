use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    disk::{BlockDevice, BLOCK_SIZE, ZERO_BLOCK},
    fs::{
        config::NAME_LENGTH_LIMIT,
        error::{FileSystemError, Result},
        super_block::SuperBlock,
    },
};

// 区域开头的长度前缀
const LEN_PREFIX: usize = 8;

/// 唯一的根目录：名字 -> inode 编号。
/// 多个名字可以指向同一个 inode（硬链接）。
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Directory {
    entries: HashMap<String, u32>,
    #[serde(skip)]
    capacity: usize, // 目录区可容纳的编码字节数（不含长度前缀）
}

impl Directory {
    pub fn new(sb: &SuperBlock) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: sb.directory_blocks() as usize * BLOCK_SIZE - LEN_PREFIX,
        }
    }

    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty()
            || name.len() > NAME_LENGTH_LIMIT
            || name.contains('/')
            || name.contains('\0')
        {
            return Err(FileSystemError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// 检查能否再加入一个名字，但不修改目录
    pub fn check_insert(&self, name: &str) -> Result<()> {
        Self::validate_name(name)?;
        if self.contains(name) {
            return Err(FileSystemError::AlreadyExists(name.to_string()));
        }
        let current = bincode::serialized_size(&self.entries)?;
        let entry = bincode::serialized_size(&(name, 0u32))?;
        if (current + entry) as usize > self.capacity {
            return Err(FileSystemError::DirectoryFull);
        }
        Ok(())
    }

    // 添加目录项
    pub fn add(&mut self, name: &str, inode_id: u32) -> Result<()> {
        self.check_insert(name)?;
        self.entries.insert(name.to_string(), inode_id);
        Ok(())
    }

    // 删除目录项，返回 inode 编号
    pub fn remove(&mut self, name: &str) -> Result<u32> {
        self.entries
            .remove(name)
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))
    }

    // 查找目录项，返回 inode 编号
    pub fn find(&self, name: &str) -> Result<u32> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| FileSystemError::NotFound(name.to_string()))
    }

    /// 指向某个 inode 的目录项个数
    pub fn references(&self, inode_id: u32) -> u32 {
        self.entries.values().filter(|&&id| id == inode_id).count() as u32
    }

    /// 名字按字典序返回，目录本身不保留插入顺序
    pub fn list_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(name, &id)| (name.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sync(&self, disk: &mut dyn BlockDevice, sb: &SuperBlock) -> Result<()> {
        // 1. 序列化
        let bytes = bincode::serialize(&self.entries)?;
        if bytes.len() > self.capacity {
            return Err(FileSystemError::DirectoryFull);
        }

        // 2. 长度写在第一个块的前 8 字节，后面紧跟数据
        let mut region = Vec::with_capacity(LEN_PREFIX + bytes.len());
        region.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
        region.extend_from_slice(&bytes);

        for (i, chunk) in region.chunks(BLOCK_SIZE).enumerate() {
            let mut block_buf = ZERO_BLOCK;
            block_buf[..chunk.len()].copy_from_slice(chunk);
            disk.write_block(sb.directory_start + i as u64, &block_buf)?;
        }
        Ok(())
    }

    pub fn load(disk: &dyn BlockDevice, sb: &SuperBlock) -> Result<Self> {
        let mut dir = Self::new(sb);

        // 先读第一个块，取得序列化长度
        let mut block_buf = ZERO_BLOCK;
        disk.read_block(sb.directory_start, &mut block_buf)?;
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&block_buf[..LEN_PREFIX]);
        let serialized_len = u64::from_le_bytes(len_bytes) as usize;

        if serialized_len == 0 {
            return Ok(dir);
        }
        if serialized_len > dir.capacity {
            return Err(FileSystemError::Corrupted(format!(
                "directory claims {} bytes but its region holds {}",
                serialized_len, dir.capacity
            )));
        }

        let total = LEN_PREFIX + serialized_len;
        let mut region = Vec::with_capacity(total);
        region.extend_from_slice(&block_buf);
        let mut block_id = sb.directory_start + 1;
        while region.len() < total {
            disk.read_block(block_id, &mut block_buf)?;
            region.extend_from_slice(&block_buf);
            block_id += 1;
        }

        dir.entries = bincode::deserialize(&region[LEN_PREFIX..total])?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemoryDisk;

    fn setup(max_inodes: u32) -> (MemoryDisk, SuperBlock, Directory) {
        let disk = MemoryDisk::new(512);
        let sb = SuperBlock::new(512, max_inodes).unwrap();
        let dir = Directory::new(&sb);
        (disk, sb, dir)
    }

    #[test]
    fn add_find_remove() {
        let (_, _, mut dir) = setup(8);
        dir.add("a.txt", 0).unwrap();
        dir.add("b.txt", 0).unwrap();
        assert_eq!(dir.find("b.txt").unwrap(), 0);
        assert_eq!(dir.references(0), 2);

        assert!(matches!(
            dir.add("a.txt", 1),
            Err(FileSystemError::AlreadyExists(_))
        ));
        assert_eq!(dir.remove("a.txt").unwrap(), 0);
        assert!(matches!(dir.find("a.txt"), Err(FileSystemError::NotFound(_))));
        assert!(matches!(dir.remove("a.txt"), Err(FileSystemError::NotFound(_))));
    }

    #[test]
    fn names_are_validated() {
        let (_, _, mut dir) = setup(8);
        let long = "x".repeat(NAME_LENGTH_LIMIT + 1);
        for bad in ["", "a/b", "nul\0", long.as_str()] {
            assert!(matches!(
                dir.add(bad, 0),
                Err(FileSystemError::InvalidName(_))
            ));
        }
        dir.add(&"y".repeat(NAME_LENGTH_LIMIT), 0).unwrap();
    }

    #[test]
    fn list_is_sorted() {
        let (_, _, mut dir) = setup(8);
        dir.add("zeta", 2).unwrap();
        dir.add("alpha", 0).unwrap();
        dir.add("mid", 1).unwrap();
        assert_eq!(dir.list_sorted(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn empty_region_loads_empty_directory() {
        let (disk, sb, _) = setup(8);
        let dir = Directory::load(&disk, &sb).unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn sync_then_load_spanning_blocks() {
        let (mut disk, sb, mut dir) = setup(200);
        assert!(sb.directory_blocks() > 1);
        for i in 0..300u32 {
            dir.add(&format!("file-with-a-fairly-long-name-{:04}", i), i % 200)
                .unwrap();
        }
        dir.sync(&mut disk, &sb).unwrap();

        let loaded = Directory::load(&disk, &sb).unwrap();
        assert_eq!(loaded.len(), 300);
        assert_eq!(loaded.find("file-with-a-fairly-long-name-0250").unwrap(), 50);
        assert_eq!(loaded.list_sorted(), dir.list_sorted());
    }

    #[test]
    fn full_region_rejects_new_names() {
        let (_, _, mut dir) = setup(1);
        let mut added = 0;
        let err = loop {
            match dir.add(&format!("{:0>60}", added), 0) {
                Ok(()) => added += 1,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, FileSystemError::DirectoryFull));
        // 预留空间至少保证每个 inode 4 个最长的名字
        assert!(added >= 4);
    }
}
