//! 设备驱动接口

use crate::fs::Buf;

#[cfg(test)]
pub mod ramdisk;

/// 块设备驱动。
///
/// 缓存层在持有缓冲块睡眠锁、且不持有任何自旋锁时调用 `rw`。
/// 驱动按 `buf` 的 `(dev, blockno)` 完成一次整块传输并阻塞直到结束；
/// 设备错误由驱动自行处理（重试或停机），不会返回给缓存层。
pub trait BlockDevice: Sync {
    /// `writing` 为 `true` 时把 `buf` 的数据写入磁盘，否则从磁盘读入 `buf`。
    fn rw(&self, buf: &mut Buf<'_>, writing: bool);
}
