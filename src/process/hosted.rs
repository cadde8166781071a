//! 宿主机上的 `Hart` 与 `Sched` 实现，以 std 线程模拟硬件线程，仅用于测试。

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use super::{Hart, Sched};
use crate::spinlock::SpinLockGuard;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static ID: Cell<Option<usize>> = const { Cell::new(None) };
    static NOFF: Cell<usize> = const { Cell::new(0) };
}

/// 每个线程拥有唯一的编号，首次查询时分配。
pub struct HostHart;

impl Hart for HostHart {
    fn id(&self) -> usize {
        ID.with(|id| match id.get() {
            Some(id) => id,
            None => {
                let new = NEXT_ID.fetch_add(1, Ordering::Relaxed);
                id.set(Some(new));
                new
            }
        })
    }

    fn push_off(&self) {
        NOFF.with(|noff| noff.set(noff.get() + 1));
    }

    fn pop_off(&self) {
        NOFF.with(|noff| match noff.get().checked_sub(1) {
            Some(n) => noff.set(n),
            None => panic!("pop_off(): count not match"),
        });
    }
}

/// 所有等待通道共用一个条件变量，被唤醒的一方自行重新检查条件。
pub struct HostSched {
    generation: Mutex<u64>,
    cond: Condvar,
}

impl Sched for HostSched {
    fn sleep(&self, _chan: usize, guard: SpinLockGuard<'_, ()>) {
        // 先拿到互斥量再放开自旋锁，唤醒方必须先拿到自旋锁，因此不会丢失唤醒
        let generation = self.generation.lock().unwrap();
        drop(guard);
        drop(self.cond.wait(generation).unwrap());
    }

    fn wakeup(&self, _chan: usize) {
        *self.generation.lock().unwrap() += 1;
        self.cond.notify_all();
    }
}

static HOST_HART: HostHart = HostHart;
static HOST_SCHED: HostSched = HostSched {
    generation: Mutex::new(0),
    cond: Condvar::new(),
};

/// 安装宿主机原语，可重复调用。
pub fn setup() {
    super::init(&HOST_HART, &HOST_SCHED);
}

/// 把当前线程伪装成指定编号的 CPU。
pub fn set_cpu(id: usize) {
    ID.with(|cell| cell.set(Some(id)));
}

/// 当前线程的中断关闭嵌套深度
pub fn noff() -> usize {
    NOFF.with(|noff| noff.get())
}
