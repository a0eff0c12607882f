//! Task Registry
//!
//! A task name maps to a plain function reference plus the backing store and
//! scope it requires. Registration is explicit and happens at startup; there
//! is no runtime introspection.

use crate::provider::{BackingKind, BufferHandle, ReadError};
use crate::scope::ScopeKind;
use crate::{Mode, TaskDef};

/// Bounds-checked read of the value at offset 0.
fn read_checked(handle: &BufferHandle) -> Result<i32, ReadError> {
    handle.get_int(0)
}

/// Raw-address read of the value at offset 0, skipping the bounds check.
fn read_raw(handle: &BufferHandle) -> Result<i32, ReadError> {
    match handle {
        BufferHandle::UnsafeBuffer(view) => {
            // SAFETY: offset 0 lies inside the 4-byte region the view's
            // backing buffer owns for the view's whole lifetime.
            Ok(unsafe { view.get_int_unchecked(0) })
        }
        other => other.get_int(0),
    }
}

/// The built-in buffer comparison suite, one task per backing store.
///
/// All tasks use worker scope: one handle per worker thread, created before
/// its first warmup call.
pub fn builtin_tasks() -> Vec<TaskDef> {
    let task = |id, name, backing, read_fn| TaskDef {
        id,
        name,
        backing,
        scope: ScopeKind::Worker,
        mode: Mode::AverageTime,
        unit: "ns/op",
        read_fn,
    };

    vec![
        task(
            "heap_array_get",
            "int array element read",
            BackingKind::HeapArray,
            read_checked as fn(&BufferHandle) -> Result<i32, ReadError>,
        ),
        task(
            "heap_buffer_get_int",
            "heap buffer checked read",
            BackingKind::HeapBuffer,
            read_checked,
        ),
        task(
            "direct_buffer_get_int",
            "direct buffer checked read",
            BackingKind::DirectBuffer,
            read_checked,
        ),
        task(
            "mapped_buffer_get_int",
            "memory-mapped buffer checked read",
            BackingKind::MappedBuffer,
            read_checked,
        ),
        task(
            "unsafe_direct_get_int",
            "raw-address read over a direct buffer",
            BackingKind::UnsafeDirect,
            read_raw,
        ),
        task(
            "unsafe_heap_get_int",
            "raw-address read over a heap buffer",
            BackingKind::UnsafeHeap,
            read_raw,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SEED_VALUE;
    use std::collections::BTreeSet;

    #[test]
    fn registry_has_one_task_per_backing() {
        let tasks = builtin_tasks();
        assert_eq!(tasks.len(), 6);
        let ids: BTreeSet<_> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 6, "task ids must be unique");
    }

    #[test]
    fn every_registered_read_fn_yields_one() {
        for task in builtin_tasks() {
            let handle = task.backing.create(None).expect("setup");
            assert_eq!((task.read_fn)(&handle).unwrap(), SEED_VALUE, "{}", task.id);
        }
    }

    #[test]
    fn raw_read_falls_back_to_checked_for_plain_handles() {
        let handle = BackingKind::HeapBuffer.create(None).unwrap();
        assert_eq!(read_raw(&handle).unwrap(), SEED_VALUE);
    }
}
