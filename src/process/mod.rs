//! 处理器与调度器接口
//!
//! 锁原语依赖内核提供的两类服务：硬件线程标识与中断开关（[`Hart`]），
//! 以及进程的睡眠与唤醒（[`Sched`]）。内核在启动早期通过 [`init`] 安装二者，
//! 此后所有自旋锁与睡眠锁才可使用。

use spin::Once;

use crate::spinlock::SpinLockGuard;

pub use cpu::{cpu_id, lk_cpu_id, pop_off, push_off};

mod cpu;

#[cfg(test)]
pub mod hosted;

/// 硬件线程（hart）提供的底层原语。
pub trait Hart: Sync {
    /// 当前硬件线程的编号。
    ///
    /// 只有在中断关闭时读取才是稳定的，否则调用者可能随时被迁移到其他 CPU。
    fn id(&self) -> usize;

    /// 关闭中断，支持嵌套。
    fn push_off(&self);

    /// 撤销一次 `push_off`，嵌套计数归零时恢复原先的中断状态。
    fn pop_off(&self);
}

/// 调度器提供的睡眠与唤醒。
pub trait Sched: Sync {
    /// 原子地释放 `guard` 并让当前执行上下文在 `chan` 上睡眠。
    ///
    /// 返回时不再持有该锁，调用者需要重新获取并检查等待条件；
    /// 允许虚假唤醒。
    fn sleep(&self, chan: usize, guard: SpinLockGuard<'_, ()>);

    /// 唤醒所有在 `chan` 上睡眠的执行上下文。
    fn wakeup(&self, chan: usize);
}

static HART: Once<&'static dyn Hart> = Once::new();
static SCHED: Once<&'static dyn Sched> = Once::new();

/// 安装硬件线程与调度器原语。
///
/// 只有第一次调用生效，必须先于任何锁的使用。
pub fn init(hart: &'static dyn Hart, sched: &'static dyn Sched) {
    HART.call_once(|| hart);
    SCHED.call_once(|| sched);
}

fn hart() -> &'static dyn Hart {
    match HART.get() {
        Some(hart) => *hart,
        None => panic!("process: hart not installed"),
    }
}

fn sched() -> &'static dyn Sched {
    match SCHED.get() {
        Some(sched) => *sched,
        None => panic!("process: scheduler not installed"),
    }
}

/// 在 `chan` 上睡眠，期间释放 `guard`
pub fn sleep(chan: usize, guard: SpinLockGuard<'_, ()>) {
    sched().sleep(chan, guard);
}

/// 唤醒在 `chan` 上睡眠的执行上下文
pub fn wakeup(chan: usize) {
    sched().wakeup(chan);
}
