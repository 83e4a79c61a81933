use std::sync::atomic::{AtomicBool, Ordering};

static ORDER_PINNED: AtomicBool = AtomicBool::new(false);

/// Forces every subsequent all-reduce to combine contributions in rank
/// order, making the reduction bit-identical on every rank and across runs.
///
/// This is a process-wide, one-way switch: once pinned, the faster
/// arrival-order reduction path stays disabled for the remainder of the
/// process. There is no unset operation.
pub fn pin_reduction_order() {
    ORDER_PINNED.store(true, Ordering::Release);
}

pub fn reduction_order_pinned() -> bool {
    ORDER_PINNED.load(Ordering::Acquire)
}
