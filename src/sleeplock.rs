//! 睡眠锁模块
//! 提供基于进程休眠/唤醒机制的同步原语，适用于可能长时间持有的锁，例如跨越磁盘 I/O。
//!
//! 当锁被占用时，尝试获取锁的执行上下文会进入休眠状态，避免忙等待。

use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut, Drop};

use crate::process;
use crate::spinlock::SpinLock;

/// 睡眠锁结构，提供阻塞式同步机制
///
/// # 字段说明
/// - `lock`: 内部自旋锁，保护`locked`状态的访问
/// - `locked`: 表示锁是否已被占用
/// - `name`: 锁的标识名称，用于调试
/// - `data`: 被保护的数据，通过`UnsafeCell`实现内部可变性
pub struct SleepLock<T: ?Sized> {
    lock: SpinLock<()>,
    locked: Cell<bool>,
    name: &'static str,
    data: UnsafeCell<T>,
}

// `locked` 只在持有内部自旋锁时访问
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            lock: SpinLock::new((), "sleeplock"),
            locked: Cell::new(false),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// 获取睡眠锁（可能阻塞）
    ///
    /// # 流程解释
    /// 1. 获取内部自旋锁保护临界区
    /// 2. 检查`locked`状态：
    ///   - 如果已锁定：睡眠在`locked`的地址上，醒来后重新获取内部锁并再次检查
    ///   - 如果未锁定：设置`locked=true`
    /// 3. 释放内部自旋锁并返回守卫
    ///
    /// 调用者不得持有任何自旋锁。
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        let mut guard = self.lock.lock();

        while self.locked.get() {
            log::trace!("sleeplock {}: contended, sleeping", self.name());
            process::sleep(self.chan(), guard);
            guard = self.lock.lock();
        }

        self.locked.set(true);
        drop(guard);

        SleepLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn unlock(&self) {
        let guard = self.lock.lock();
        self.locked.set(false);
        process::wakeup(self.chan());
        drop(guard);
    }

    #[inline]
    fn chan(&self) -> usize {
        self.locked.as_ptr() as usize
    }
}

/// 睡眠锁守卫，提供对受保护数据的访问
///
/// 守卫离开作用域时释放锁并唤醒等待者。
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
    data: &'a mut T,
}

impl<'a, T: ?Sized> Deref for SleepLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &*self.data
    }
}

impl<'a, T: ?Sized> DerefMut for SleepLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut *self.data
    }
}

impl<'a, T: ?Sized> Drop for SleepLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}
