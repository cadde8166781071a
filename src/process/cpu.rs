//! 当前 CPU 的标识与中断开关

use super::hart;

/// 必须在禁用中断的情况下调用，
/// 以防止与进程被迁移到另一个 CPU 时出现竞争条件。
#[inline]
pub unsafe fn cpu_id() -> usize {
    hart().id()
}

/// 在关中断的保护下读取当前 CPU 编号。
///
/// 返回后调用者可能已被迁移，因此结果只能作为提示使用，
/// 不能依赖它的稳定性来保证正确性。
pub fn lk_cpu_id() -> usize {
    push_off();
    let id = unsafe { cpu_id() };
    pop_off();
    id
}

/// 关闭当前 CPU 的中断，并记录嵌套次数。
///
/// 多次调用 `push_off()` 需要相应次数的 `pop_off()` 才能恢复中断状态。
#[inline]
pub fn push_off() {
    hart().push_off();
}

/// 撤销一次 `push_off()`。
///
/// 与 `push_off()` 次数不匹配是致命错误，由具体的 [`Hart`](super::Hart) 实现负责报告。
#[inline]
pub fn pop_off() {
    hart().pop_off();
}
