use alloc::vec;
use alloc::vec::Vec;

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};

/// 内存中的位图，记录其指示区域内各单元（inode 或块）的分配情况
///
/// 位序约定：单元 `n` 对应第 `n / 64` 个字的第 `n % 64` 位（最低位为0），
/// 字以小端序连续存放于位图区域。
/// 最后一个字里超出单元数的位恒为1，永远不会被分配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    /// 单元总数
    units: u32,
    /// 空闲单元数，即单元范围内0位的个数
    free: u32,
}

/// 单元编号
struct UnitId(u32);

impl Bitmap {
    /// 全空的位图
    pub fn new(units: u32) -> Self {
        let mut bitmap = Self {
            words: vec![0; units.div_ceil(u64::BITS) as usize],
            units,
            free: units,
        };
        bitmap.seal_tail();
        bitmap
    }

    /// 前 `reserved` 个单元已被占用的位图
    pub fn with_reserved(units: u32, reserved: u32) -> Self {
        assert!(reserved <= units);
        let mut bitmap = Self::new(units);
        for unit in 0..reserved {
            let (group_index, ingroup_index) = UnitId(unit).decode();
            bitmap.words[group_index] |= 1 << ingroup_index;
        }
        bitmap.free -= reserved;
        bitmap
    }

    #[inline]
    pub fn free(&self) -> u32 {
        self.free
    }

    pub fn is_allocated(&self, unit: u32) -> bool {
        unit < self.units && {
            let (group_index, ingroup_index) = UnitId(unit).decode();
            self.words[group_index] & (1 << ingroup_index) != 0
        }
    }

    /// 分配编号最小的空闲单元。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&mut self) -> Option<u32> {
        // 寻找还有剩余空间的字(即还有0)
        let (group_index, ingroup_index) =
            self.words
                .iter()
                .enumerate()
                .find_map(|(group_index, &bits)| {
                    (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                })?;

        // 追加新位
        self.words[group_index] |= 1 << ingroup_index;
        self.free -= 1;
        Some(UnitId::encode(group_index, ingroup_index as usize))
    }

    /// 释放单元；释放未分配的单元会被拒绝，计数不变
    pub fn dealloc(&mut self, unit: u32) -> Result<()> {
        if unit >= self.units {
            return Err(Error::OutOfRange(unit));
        }

        let (group_index, ingroup_index) = UnitId(unit).decode();
        let mask = 1 << ingroup_index;
        if self.words[group_index] & mask == 0 {
            return Err(Error::AlreadyFree(unit));
        }

        self.words[group_index] &= !mask;
        self.free += 1;
        Ok(())
    }

    /// 从位图区域的字节中还原，空闲数按0位重新统计
    pub fn load(bytes: &[u8], units: u32) -> Self {
        let mut reader = Reader::new(bytes);
        let words = (0..units.div_ceil(u64::BITS)).map(|_| reader.u64()).collect();
        let mut bitmap = Self {
            words,
            units,
            free: 0,
        };
        bitmap.seal_tail();
        bitmap.free = bitmap.words.iter().map(|bits| bits.count_zeros()).sum();
        bitmap
    }

    /// 写入位图区域；区域内多出的字节全部置1
    pub fn store(&self, bytes: &mut [u8]) {
        let used = self.words.len() * 8;
        let mut writer = Writer::new(&mut bytes[..used]);
        for &bits in &self.words {
            writer.u64(bits);
        }
        bytes[used..].fill(0xff);
    }

    /// 将最后一个字中超出单元数的位置1
    fn seal_tail(&mut self) {
        let tail = self.units % u64::BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last |= u64::MAX << tail;
            }
        }
    }
}

impl UnitId {
    /// 线性映射编码得到单元编号
    #[inline]
    fn encode(group_index: usize, ingroup_index: usize) -> u32 {
        (group_index * u64::BITS as usize + ingroup_index) as u32
    }

    #[inline]
    fn decode(self) -> (usize, usize) {
        let unit = self.0 as usize;
        (unit / u64::BITS as usize, unit % u64::BITS as usize)
    }
}
