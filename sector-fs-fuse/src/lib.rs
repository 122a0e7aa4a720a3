
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use block_dev::{BlockDevice, IrqHandler, IrqLine, SECTOR_SIZE};

/// 以宿主机上的文件作为磁盘镜像的块设备
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
    irq: IrqLine,
}

impl BlockFile {
    /// 扇区数由文件长度决定，不足一个扇区的尾部被忽略
    pub fn new(file: File) -> io::Result<Self> {
        let blocks = file.metadata()?.len() as usize / SECTOR_SIZE;
        Ok(Self {
            file: Mutex::new(file),
            blocks,
            irq: IrqLine::new(Duration::ZERO),
        })
    }

    /// 新建或截断为 `blocks` 个全零扇区的镜像
    pub fn create(path: &Path, blocks: usize) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len((blocks * SECTOR_SIZE) as u64)?;
        Self::new(fd)
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(fd)
    }
}

impl BlockDevice for BlockFile {
    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert!(block_id < self.blocks, "sector {block_id} out of range");
        self.irq.start();
        {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
                .expect("seeking error");
            file.read_exact(buf).expect("not a complete sector!");
        }
        self.irq.raise();
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert!(block_id < self.blocks, "sector {block_id} out of range");
        self.irq.start();
        {
            let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
            file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
                .expect("seeking error");
            file.write_all(buf).expect("not a complete sector!");
        }
        self.irq.raise();
    }

    fn set_irq_handler(&self, handler: IrqHandler) {
        self.irq.set_handler(handler);
    }
}
