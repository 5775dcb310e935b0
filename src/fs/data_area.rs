//! 数据区：把文件内的字节区间翻译成逐块的读写。
//!
//! 例如 offset = 4000, len = 200 会被拆成两段：
//! 逻辑块 0 的 [4000, 4096) 和逻辑块 1 的 [0, 104)。

use crate::disk::{Block, BlockDevice, BLOCK_SIZE, ZERO_BLOCK};
use crate::fs::error::Result;

/// 一次读写落在某个逻辑块上的那一段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub logical: usize, // 逻辑块号，即 direct_blocks 的下标
    pub start: usize,   // 块内起始偏移
    pub end: usize,     // 块内结束偏移（不含）
    pub buf_offset: usize, // 对应调用方缓冲区中的偏移
}

impl BlockSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_full_block(&self) -> bool {
        self.start == 0 && self.end == BLOCK_SIZE
    }
}

/// 把 [offset, offset + len) 拆成逐块的区间
pub fn spans(offset: u64, len: usize) -> impl Iterator<Item = BlockSpan> {
    let mut pos = offset;
    let end = offset + len as u64;
    std::iter::from_fn(move || {
        if pos >= end {
            return None;
        }
        let logical = (pos / BLOCK_SIZE as u64) as usize;
        let start = (pos % BLOCK_SIZE as u64) as usize;
        let chunk = usize::min(BLOCK_SIZE - start, (end - pos) as usize);
        let span = BlockSpan {
            logical,
            start,
            end: start + chunk,
            buf_offset: (pos - offset) as usize,
        };
        pos += chunk as u64;
        Some(span)
    })
}

/// 覆盖 size 字节需要的块数
pub fn blocks_for(size: u64) -> usize {
    ((size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as usize
}

pub fn read_span(
    disk: &dyn BlockDevice,
    block_id: u64,
    span: &BlockSpan,
    out: &mut [u8],
) -> Result<()> {
    let mut block_buf: Block = ZERO_BLOCK;
    disk.read_block(block_id, &mut block_buf)?;
    out.copy_from_slice(&block_buf[span.start..span.end]);
    Ok(())
}

/// 写入一段数据；不是整块时先读出原块再合并
pub fn write_span(
    disk: &mut dyn BlockDevice,
    block_id: u64,
    span: &BlockSpan,
    data: &[u8],
) -> Result<()> {
    let mut block_buf: Block = ZERO_BLOCK;
    if !span.is_full_block() {
        disk.read_block(block_id, &mut block_buf)?;
    }
    block_buf[span.start..span.end].copy_from_slice(data);
    disk.write_block(block_id, &block_buf)
}

/// 把块内 from 之后的字节清零
pub fn zero_tail(disk: &mut dyn BlockDevice, block_id: u64, from: usize) -> Result<()> {
    let mut block_buf: Block = ZERO_BLOCK;
    disk.read_block(block_id, &mut block_buf)?;
    block_buf[from..].fill(0);
    disk.write_block(block_id, &block_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_within_one_block() {
        let all: Vec<_> = spans(10, 13).collect();
        assert_eq!(
            all,
            vec![BlockSpan {
                logical: 0,
                start: 10,
                end: 23,
                buf_offset: 0
            }]
        );
    }

    #[test]
    fn span_crossing_blocks() {
        let all: Vec<_> = spans(4000, 200).collect();
        assert_eq!(all.len(), 2);
        assert_eq!((all[0].logical, all[0].start, all[0].end), (0, 4000, 4096));
        assert_eq!((all[1].logical, all[1].start, all[1].end), (1, 0, 104));
        assert_eq!(all[1].buf_offset, 96);
        assert_eq!(all.iter().map(BlockSpan::len).sum::<usize>(), 200);
    }

    #[test]
    fn aligned_span_covers_whole_blocks() {
        let all: Vec<_> = spans(BLOCK_SIZE as u64, 2 * BLOCK_SIZE).collect();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(BlockSpan::is_full_block));
        assert_eq!(all[0].logical, 1);
    }

    #[test]
    fn empty_range_has_no_spans() {
        assert_eq!(spans(123, 0).count(), 0);
    }

    #[test]
    fn block_counts() {
        assert_eq!(blocks_for(0), 0);
        assert_eq!(blocks_for(1), 1);
        assert_eq!(blocks_for(BLOCK_SIZE as u64), 1);
        assert_eq!(blocks_for(BLOCK_SIZE as u64 + 1), 2);
    }
}
