//! 缓存层
//!
//! 固定数量的缓冲块按块号散列进 `NBUCKET` 个哈希桶，每个桶有独立的自旋锁，
//! 不相关块的查找可以并行进行。另有一把池锁，专门保护“从整个缓冲池中挑选空闲块
//! 并挂入某个桶”这一跨桶操作。
//!
//! 加锁顺序固定为：先桶锁，后池锁；两者都必须在获取缓冲块的睡眠锁之前释放。

use array_macro::array;

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::consts::fs::{BSIZE, NBUCKET, NBUF};
use crate::driver::BlockDevice;
use crate::sleeplock::{SleepLock, SleepLockGuard};
use crate::spinlock::{SpinLock, SpinLockGuard};

/// 块号到哈希桶的映射。
///
/// 右移两位使相邻的四个块落在同一个桶中。
#[inline]
fn hash(blockno: u32) -> usize {
    (blockno >> 2) as usize % NBUCKET
}

/// 缓冲区缓存（Buffer Cache），位于文件系统与块设备驱动之间。
///
/// `Bcache` 在内核启动时构造一次，此后在整个运行期间常驻，缓冲块只会被原地复用，
/// 从不销毁。调用者通过共享引用使用它。
///
/// # 对外接口
/// - [`bread`](Self::bread)：返回持有睡眠锁、数据有效的缓冲块；
/// - [`bwrite`](Self::bwrite)：把缓冲块写回磁盘；
/// - [`brelse`](Self::brelse)：释放缓冲块（丢弃 [`Buf`] 的效果相同）；
/// - [`bpin`](Self::bpin) / [`bunpin`](Self::bunpin)：增减引用计数，使缓冲块跨越多次加锁/解锁而常驻。
///
/// # 回收策略
/// 未命中时按数组顺序选择第一个引用计数为零的缓冲块，并非真正的 LRU。
/// 唯一的例外是：若某个空闲缓冲块仍保存着所请求的块且数据有效，则直接复用它，
/// 省去一次磁盘读。
pub struct Bcache<'d> {
    /// 块设备驱动
    disk: &'d dyn BlockDevice,

    /// 哈希桶，每个桶记录当前挂在其中的缓冲块下标。
    buckets: [SpinLock<Bucket>; NBUCKET],

    /// 池锁。
    ///
    /// 引用计数在 0 与非 0 之间的每一次变化都发生在持有池锁期间，
    /// 因此持有池锁时看到引用计数为零的缓冲块不会被其他 CPU 同时取用。
    pool: SpinLock<()>,

    /// 缓冲块数组，长度为固定值 `NBUF`。
    bufs: [BufInner; NBUF],
}

impl<'d> Bcache<'d> {
    /// 构造缓冲区缓存：所有桶为空，所有缓冲块的睡眠锁处于未锁定状态。
    pub fn new(disk: &'d dyn BlockDevice) -> Self {
        let bcache = Self {
            disk,
            buckets: array![_ => SpinLock::new(Bucket::new(), "bcache.bucket"); NBUCKET],
            pool: SpinLock::new((), "bcache.pool"),
            bufs: array![_ => BufInner::new(); NBUF],
        };
        log::info!(
            "bcache: {} buffers of {} bytes, {} buckets",
            NBUF,
            BSIZE,
            NBUCKET
        );
        bcache
    }

    /// 获取指定设备与块号对应的缓冲块，返回时已持有其睡眠锁。
    ///
    /// # 流程解释
    /// - 锁住目标桶，在桶内查找 `(dev, blockno)`；
    ///   - 命中：引用计数加一，放开桶锁后再去获取睡眠锁；
    /// - 未命中：在仍持有桶锁的情况下获取池锁，扫描整个缓冲池：
    ///   - 若有空闲缓冲块仍缓存着该块，直接复用，保留其有效数据；
    ///   - 否则取第一个空闲缓冲块，改写其身份并标记为无效；
    ///   - 将其挂到桶的头部，依次放开池锁与桶锁，再获取睡眠锁。
    ///
    /// # 可能的错误
    /// 所有缓冲块都被引用时触发 panic（`"bget: no buffers"`）。
    fn bget(&self, dev: u32, blockno: u32) -> Buf<'_> {
        let mut bucket = self.buckets[hash(blockno)].lock();

        if let Some(index) = bucket.find(&self.bufs, dev, blockno) {
            self.bufs[index].ctrl.refcnt.fetch_add(1, Ordering::Relaxed);
            drop(bucket);
            log::trace!("bget: hit dev {} blockno {} in buffer {}", dev, blockno, index);
            return self.locked(index, dev, blockno);
        }

        let pool = self.lock_pool(&bucket);
        let (index, revive) = match self.find_unused(dev, blockno) {
            Some(found) => found,
            None => panic!("bget: no buffers"),
        };

        let b = &self.bufs[index];
        if revive {
            log::trace!("bget: revive dev {} blockno {} in buffer {}", dev, blockno, index);
        } else {
            log::trace!("bget: recycle buffer {} for dev {} blockno {}", index, dev, blockno);
            b.ctrl.dev.store(dev, Ordering::Relaxed);
            b.ctrl.blockno.store(blockno, Ordering::Relaxed);
            b.valid.store(false, Ordering::Relaxed);
        }
        b.ctrl.refcnt.store(1, Ordering::Relaxed);
        bucket.push_front(index);

        drop(pool);
        drop(bucket);
        self.locked(index, dev, blockno)
    }

    /// 在持有池锁时扫描缓冲池。
    ///
    /// 优先返回仍缓存着 `(dev, blockno)` 有效数据的空闲缓冲块（第二项为 `true`），
    /// 否则返回第一个空闲缓冲块。
    fn find_unused(&self, dev: u32, blockno: u32) -> Option<(usize, bool)> {
        let mut first = None;
        for (index, b) in self.bufs.iter().enumerate() {
            if b.ctrl.refcnt.load(Ordering::Relaxed) != 0 {
                continue;
            }
            if b.ctrl.holds(dev, blockno) && b.valid.load(Ordering::Relaxed) {
                return Some((index, true));
            }
            first.get_or_insert((index, false));
        }
        first
    }

    /// 获取池锁。
    ///
    /// 必须出示一个已持有的桶锁守卫，由此保证“先桶锁、后池锁”的顺序。
    fn lock_pool(&self, _bucket: &SpinLockGuard<'_, Bucket>) -> SpinLockGuard<'_, ()> {
        self.pool.lock()
    }

    fn locked(&self, index: usize, dev: u32, blockno: u32) -> Buf<'_> {
        Buf {
            cache: self,
            index,
            dev,
            blockno,
            data: Some(self.bufs[index].data.lock()),
        }
    }

    /// 从缓冲区缓存中读取指定设备与块号对应的数据。
    ///
    /// 返回的 `Buf` 持有睡眠锁，且数据保证有效：若缓冲块尚未从磁盘加载，
    /// 会在持有睡眠锁后调用驱动读取一次。
    pub fn bread<'a>(&'a self, dev: u32, blockno: u32) -> Buf<'a> {
        let mut b = self.bget(dev, blockno);
        let inner = &self.bufs[b.index];
        if !inner.valid.load(Ordering::Relaxed) {
            self.disk.rw(&mut b, false);
            inner.valid.store(true, Ordering::Relaxed);
        }
        b
    }

    /// 把缓冲块的数据写回磁盘。
    ///
    /// 调用者必须持有该缓冲块（`Buf` 即睡眠锁的所有权），不修改任何缓存元数据。
    pub fn bwrite(&self, buf: &mut Buf<'_>) {
        if !self.owns(buf) {
            panic!("bwrite");
        }
        self.disk.rw(buf, true);
    }

    /// 释放缓冲块。等价于丢弃 `buf`。
    pub fn brelse(&self, buf: Buf<'_>) {
        if !self.owns(&buf) {
            panic!("brelse");
        }
        drop(buf);
    }

    /// 在睡眠锁已经放开之后归还一次引用。
    ///
    /// 引用计数归零时把缓冲块从桶中摘下，使其可以被重新分配，
    /// 但其身份与数据保持不变。
    fn release(&self, index: usize, blockno: u32) {
        let mut bucket = self.buckets[hash(blockno)].lock();
        let pool = self.lock_pool(&bucket);

        let refcnt = &self.bufs[index].ctrl.refcnt;
        let rc = match refcnt.load(Ordering::Relaxed).checked_sub(1) {
            Some(rc) => rc,
            None => panic!("brelse: buffer {} not referenced", index),
        };
        refcnt.store(rc, Ordering::Relaxed);
        if rc == 0 {
            bucket.remove(index);
        }

        drop(pool);
        drop(bucket);
    }

    /// 将缓冲块的引用计数加一，使其在 `buf` 释放后仍然常驻。
    ///
    /// 只需要桶锁：钉住期间引用计数从未经过零。
    pub fn bpin(&self, buf: &Buf<'_>) {
        if !self.owns(buf) {
            panic!("bpin");
        }
        let _bucket = self.buckets[hash(buf.blockno)].lock();
        self.bufs[buf.index].ctrl.refcnt.fetch_add(1, Ordering::Relaxed);
    }

    /// 撤销一次 [`bpin`](Self::bpin)。
    ///
    /// # 可能的错误
    /// `buf` 自身占有一次引用，若减一后会把这次引用也拿走，说明 `bpin`/`bunpin`
    /// 不配对，触发 panic。
    pub fn bunpin(&self, buf: &Buf<'_>) {
        if !self.owns(buf) {
            panic!("bunpin");
        }
        let _bucket = self.buckets[hash(buf.blockno)].lock();
        let refcnt = &self.bufs[buf.index].ctrl.refcnt;
        let rc = refcnt.load(Ordering::Relaxed);
        if rc <= 1 {
            panic!("bunpin: buffer {} refcnt {} not pinned", buf.index, rc);
        }
        refcnt.store(rc - 1, Ordering::Relaxed);
    }

    fn owns(&self, buf: &Buf<'_>) -> bool {
        ptr::eq(
            self as *const Self as *const (),
            buf.cache as *const Bcache<'_> as *const (),
        )
    }
}

/// 已加锁的缓冲块，代表一个特定 `(dev, blockno)` 的缓存实体。
///
/// 持有对其数据的独占访问权限（由 `SleepLockGuard` 保护），
/// 生命周期结束时先放开睡眠锁，再归还引用计数，即 `brelse`。
pub struct Buf<'a> {
    cache: &'a Bcache<'a>,

    /// 缓冲块在缓冲数组中的下标
    index: usize,

    dev: u32,
    blockno: u32,

    /// 在 `Buf` 生命周期内始终为 `Some`，`Drop` 时先取出以便先放开睡眠锁。
    data: Option<SleepLockGuard<'a, BufData>>,
}

impl<'a> Buf<'a> {
    pub fn dev(&self) -> u32 {
        self.dev
    }

    pub fn read_blockno(&self) -> u32 {
        self.blockno
    }

    pub fn data(&self) -> &[u8; BSIZE] {
        match self.data {
            Some(ref guard) => &guard.0,
            None => panic!("buf: not locked"),
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8; BSIZE] {
        match self.data {
            Some(ref mut guard) => &mut guard.0,
            None => panic!("buf: not locked"),
        }
    }

    pub fn bwrite(&mut self) {
        let cache = self.cache;
        cache.bwrite(self);
    }

    pub fn pin(&self) {
        self.cache.bpin(self);
    }

    pub fn unpin(&self) {
        self.cache.bunpin(self);
    }
}

impl<'a> Drop for Buf<'a> {
    fn drop(&mut self) {
        if let Some(guard) = self.data.take() {
            drop(guard);
            self.cache.release(self.index, self.blockno);
        }
    }
}

/// 一个哈希桶中的缓冲块下标，最近挂入的在前。
struct Bucket {
    len: usize,
    slots: [usize; NBUF],
}

impl Bucket {
    const fn new() -> Self {
        Self {
            len: 0,
            slots: [0; NBUF],
        }
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots[..self.len].iter().copied()
    }

    fn find(&self, bufs: &[BufInner], dev: u32, blockno: u32) -> Option<usize> {
        self.iter().find(|&index| bufs[index].ctrl.holds(dev, blockno))
    }

    fn push_front(&mut self, index: usize) {
        if self.len == NBUF {
            panic!("bucket: overflow");
        }
        self.slots.copy_within(0..self.len, 1);
        self.slots[0] = index;
        self.len += 1;
    }

    fn remove(&mut self, index: usize) {
        let pos = self.iter().position(|i| i == index);
        match pos {
            Some(pos) => {
                self.slots.copy_within(pos + 1..self.len, pos);
                self.len -= 1;
            }
            None => panic!("bucket: buffer {} not linked", index),
        }
    }
}

/// 缓冲块的元信息。
///
/// 字段使用原子类型只是为了获得内部可变性，访问一律使用 `Relaxed`：
/// - 已挂入桶的缓冲块，其元信息在该桶的桶锁下读写；
/// - 引用计数为零的缓冲块，只在池锁下读写。
struct BufCtrl {
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicUsize,
}

impl BufCtrl {
    const fn new() -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            refcnt: AtomicUsize::new(0),
        }
    }

    fn holds(&self, dev: u32, blockno: u32) -> bool {
        self.dev.load(Ordering::Relaxed) == dev && self.blockno.load(Ordering::Relaxed) == blockno
    }
}

struct BufInner {
    ctrl: BufCtrl,

    /// 数据是否反映磁盘内容。
    /// 在挑选缓冲块时（池锁下）清除，在 `bread` 中持有睡眠锁时读取与设置。
    valid: AtomicBool,

    data: SleepLock<BufData>,
}

impl BufInner {
    const fn new() -> Self {
        Self {
            ctrl: BufCtrl::new(),
            valid: AtomicBool::new(false),
            data: SleepLock::new(BufData::new(), "bcache.buffer"),
        }
    }
}

/// BufData 的对齐方式应足以满足可能由此结构体转换而来的其他结构体的需求。
#[repr(C, align(8))]
pub struct BufData([u8; BSIZE]);

impl BufData {
    const fn new() -> Self {
        Self([0; BSIZE])
    }
}

#[cfg(test)]
impl<'d> Bcache<'d> {
    /// 在没有并发操作时检查缓存的结构性质：
    /// 每个缓冲块至多挂在一个桶里，且挂在块号散列到的那个桶；
    /// 挂在桶里当且仅当引用计数非零；挂着的缓冲块身份互不相同。
    fn check(&self) {
        let mut owner = [None; NBUF];
        for (bi, bucket) in self.buckets.iter().enumerate() {
            let bucket = bucket.lock();
            for index in bucket.iter() {
                assert!(owner[index].is_none(), "buffer {} linked twice", index);
                owner[index] = Some(bi);
                assert_eq!(hash(self.bufs[index].ctrl.blockno.load(Ordering::Relaxed)), bi);
            }
        }
        for (index, b) in self.bufs.iter().enumerate() {
            let rc = b.ctrl.refcnt.load(Ordering::Relaxed);
            assert_eq!(owner[index].is_some(), rc > 0, "buffer {} refcnt {}", index, rc);
        }
        for i in 0..NBUF {
            for j in (i + 1)..NBUF {
                if owner[i].is_some() && owner[j].is_some() {
                    let (a, b) = (&self.bufs[i].ctrl, &self.bufs[j].ctrl);
                    assert!(
                        !a.holds(b.dev.load(Ordering::Relaxed), b.blockno.load(Ordering::Relaxed)),
                        "buffers {} and {} cache the same block",
                        i,
                        j
                    );
                }
            }
        }
    }

    fn refcnt(&self, buf: &Buf<'_>) -> usize {
        self.bufs[buf.index].ctrl.refcnt.load(Ordering::Relaxed)
    }
}
