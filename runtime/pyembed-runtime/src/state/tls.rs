use std::cell::Cell;

thread_local! {
    /// Nesting depth of `GilGuard`s alive on this thread.
    pub(crate) static GIL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub(crate) fn gil_depth_enter() -> usize {
    GIL_DEPTH
        .try_with(|depth| {
            let next = depth.get() + 1;
            depth.set(next);
            next
        })
        .unwrap_or(0)
}

pub(crate) fn gil_depth_exit() -> usize {
    GIL_DEPTH
        .try_with(|depth| {
            let current = depth.get();
            debug_assert!(current > 0, "GILState release without matching ensure");
            let next = current.saturating_sub(1);
            depth.set(next);
            next
        })
        .unwrap_or(0)
}

/// Number of `GilGuard`s currently held by the calling thread.
pub fn gil_depth() -> usize {
    GIL_DEPTH.try_with(|depth| depth.get()).unwrap_or(0)
}
