use crate::layout::DiskInode;
use crate::SynchDisk;

/// 空闲扇区位图，一位对应一个扇区，置位表示已分配。
///
/// 第 `i` 位是第 `i / 64` 组小端 `u64` 的第 `i % 64` 位；
/// 位图本身作为位图文件的内容存放在磁盘上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    groups: Vec<u64>,
    /// 位图所指示区域的总扇区数
    num_bits: usize,
}

/// 扇区号在位图中的位置
struct BitPos {
    group: usize,
    ingroup: usize,
}

impl Bitmap {
    pub fn new(num_bits: usize) -> Self {
        Self {
            groups: vec![0; num_bits.div_ceil(64)],
            num_bits,
        }
    }

    /// 存放 `num_bits` 位的位图文件需要的字节数
    #[inline]
    pub fn file_size(num_bits: usize) -> usize {
        num_bits.div_ceil(64) * 8
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_bits
    }

    pub fn count_clear(&self) -> usize {
        let set: usize = self.groups.iter().map(|g| g.count_ones() as usize).sum();
        self.num_bits - set
    }

    /// 找到一个空闲扇区并标记为已分配，返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn find(&mut self) -> Option<usize> {
        // 寻找还有剩余空间的位组(即还有0)
        let (group, ingroup) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(group, &bits)| {
                (bits != u64::MAX).then_some((group, bits.trailing_ones() as usize))
            })?;

        let sector = BitPos { group, ingroup }.encode();
        if sector >= self.num_bits {
            return None;
        }
        self.groups[group] |= 1 << ingroup;
        Some(sector)
    }

    pub fn test(&self, sector: usize) -> bool {
        let pos = self.pos(sector);
        self.groups[pos.group] & (1 << pos.ingroup) != 0
    }

    pub fn mark(&mut self, sector: usize) {
        let pos = self.pos(sector);
        self.groups[pos.group] |= 1 << pos.ingroup;
    }

    /// 释放扇区，释放一个未分配的扇区是致命错误
    pub fn clear(&mut self, sector: usize) {
        // 编号一定得有对应的位
        assert!(self.test(sector), "sector {sector} is not allocated");
        let pos = self.pos(sector);
        self.groups[pos.group] &= !(1 << pos.ingroup);
    }

    /// 从位图文件读入
    pub fn fetch_from(&mut self, file: &DiskInode, disk: &SynchDisk) {
        let mut bytes = vec![0; self.groups.len() * 8];
        assert_eq!(file.read_at(0, &mut bytes, disk), bytes.len());
        for (group, chunk) in self.groups.iter_mut().zip(bytes.chunks_exact(8)) {
            *group = u64::from_le_bytes(chunk.try_into().unwrap_or_default());
        }
    }

    /// 写回位图文件
    pub fn write_back(&self, file: &DiskInode, disk: &SynchDisk) {
        let bytes: Vec<u8> = self.groups.iter().flat_map(|g| g.to_le_bytes()).collect();
        assert_eq!(file.write_at(0, &bytes, disk), bytes.len());
    }
}

impl Bitmap {
    fn pos(&self, sector: usize) -> BitPos {
        assert!(sector < self.num_bits, "sector {sector} out of range");
        BitPos::decode(sector)
    }
}

impl BitPos {
    /// 线性映射编码得到扇区号
    #[inline]
    fn encode(self) -> usize {
        self.group * 64 + self.ingroup
    }

    #[inline]
    fn decode(sector: usize) -> Self {
        Self {
            group: sector / 64,
            ingroup: sector % 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_takes_lowest_free() {
        let mut bitmap = Bitmap::new(130);
        bitmap.mark(0);
        bitmap.mark(2);
        assert_eq!(bitmap.find(), Some(1));
        assert_eq!(bitmap.find(), Some(3));
        assert_eq!(bitmap.count_clear(), 126);
    }

    #[test]
    fn never_hands_out_bits_past_capacity() {
        let mut bitmap = Bitmap::new(65);
        let found: Vec<usize> = std::iter::from_fn(|| bitmap.find()).collect();
        assert_eq!(found, (0..65).collect::<Vec<_>>());
        assert_eq!(bitmap.count_clear(), 0);
    }

    #[test]
    fn clear_returns_sector() {
        let mut bitmap = Bitmap::new(64);
        bitmap.mark(63);
        assert!(bitmap.test(63));
        bitmap.clear(63);
        assert!(!bitmap.test(63));
    }

    #[test]
    #[should_panic(expected = "not allocated")]
    fn double_clear_is_fatal() {
        let mut bitmap = Bitmap::new(64);
        bitmap.mark(5);
        bitmap.clear(5);
        bitmap.clear(5);
    }
}
