//! 以内存模拟的块设备，记录读写次数，仅用于测试。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use super::BlockDevice;
use crate::consts::fs::BSIZE;
use crate::fs::Buf;

/// 从未写过的块读出来的内容是 `pattern(dev, blockno)` 重复填充。
pub struct RamDisk {
    blocks: Mutex<HashMap<(u32, u32), [u8; BSIZE]>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn pattern(dev: u32, blockno: u32) -> u8 {
        (dev as u8).wrapping_mul(31).wrapping_add(blockno as u8)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// 直接查看磁盘上的内容，绕过缓存
    pub fn peek(&self, dev: u32, blockno: u32) -> [u8; BSIZE] {
        match self.blocks.lock().unwrap().get(&(dev, blockno)) {
            Some(block) => *block,
            None => [Self::pattern(dev, blockno); BSIZE],
        }
    }
}

impl BlockDevice for RamDisk {
    fn rw(&self, buf: &mut Buf<'_>, writing: bool) {
        let key = (buf.dev(), buf.read_blockno());
        // 模拟一次耗时的传输，让其他线程有机会运行
        thread::yield_now();
        if writing {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.blocks.lock().unwrap().insert(key, *buf.data());
        } else {
            self.reads.fetch_add(1, Ordering::SeqCst);
            *buf.data_mut() = self.peek(key.0, key.1);
        }
    }
}
