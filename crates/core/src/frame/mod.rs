//! Per-frame dispatch
//!
//! The host's render hook calls [`on_frame`] once per presented frame. Each
//! frame first drains the cross-thread task queue, then fires the registered
//! callbacks in registration order.
//!
//! Callbacks run against a snapshot taken before the first one fires, so a
//! callback may register, unregister or clear callbacks. Changes apply from
//! the next frame.

mod tasks;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

use parking_lot::RwLock;
use slotmap::{new_key_type, SlotMap};

pub use tasks::{queue_task, queued_task_count, QueueError, Task};

new_key_type! {
    /// Key for registered frame callbacks
    pub struct FrameKey;
}

/// Callback type for frame listeners; receives the frame number
pub type FrameCallback = Arc<dyn Fn(u64) + Send + Sync>;

static CALLBACKS: LazyLock<RwLock<SlotMap<FrameKey, FrameCallback>>> =
    LazyLock::new(|| RwLock::new(SlotMap::with_key()));

/// Frame counter (increments every on_frame call)
static FRAME_COUNT: AtomicU64 = AtomicU64::new(0);

/// Last frame's processing time in nanoseconds
static LAST_FRAME_TIME_NS: AtomicU64 = AtomicU64::new(0);

/// Frames slower than this are logged
const SLOW_FRAME_NS: u64 = 2_000_000;

/// Register a callback to be called every frame
///
/// # Returns
/// A key that can be used to unregister the callback
pub fn register_frame_callback<F>(callback: F) -> FrameKey
where
    F: Fn(u64) + Send + Sync + 'static,
{
    CALLBACKS.write().insert(Arc::new(callback))
}

/// Unregister a frame callback
///
/// # Returns
/// `true` if the callback was found and removed
pub fn unregister_frame_callback(key: FrameKey) -> bool {
    CALLBACKS.write().remove(key).is_some()
}

/// Get the current frame count
pub fn frame_count() -> u64 {
    FRAME_COUNT.load(Ordering::Relaxed)
}

/// Get the last frame processing time in nanoseconds
pub fn last_frame_time_ns() -> u64 {
    LAST_FRAME_TIME_NS.load(Ordering::Relaxed)
}

/// Run one frame: queued tasks, then callbacks
pub fn on_frame() {
    let start = Instant::now();
    let frame = FRAME_COUNT.fetch_add(1, Ordering::Relaxed) + 1;

    let tasks_processed = tasks::process_queued_tasks();
    if tasks_processed > 0 {
        tracing::trace!("Processed {} queued tasks", tasks_processed);
    }

    let callbacks: Vec<FrameCallback> = CALLBACKS.read().values().cloned().collect();
    for callback in &callbacks {
        callback(frame);
    }

    let elapsed = start.elapsed().as_nanos() as u64;
    LAST_FRAME_TIME_NS.store(elapsed, Ordering::Relaxed);

    if elapsed > SLOW_FRAME_NS {
        tracing::warn!("Frame {} took {}ms", frame, elapsed / 1_000_000);
    }
}

/// Drop every registered callback
pub(crate) fn clear_callbacks() {
    CALLBACKS.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    // Frame state is process-wide; everything runs in one test
    #[test]
    fn test_frame_dispatch() {
        let seen = Arc::new(AtomicU64::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let key = {
            let seen = Arc::clone(&seen);
            let calls = Arc::clone(&calls);
            register_frame_callback(move |frame| {
                seen.store(frame, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        let ran = Arc::new(AtomicUsize::new(0));
        {
            let ran = Arc::clone(&ran);
            std::thread::spawn(move || {
                queue_task(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            })
            .join()
            .unwrap();
        }
        assert_eq!(queued_task_count(), 1);

        let before = frame_count();
        on_frame();
        assert_eq!(frame_count(), before + 1);
        assert_eq!(seen.load(Ordering::SeqCst), before + 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queued_task_count(), 0);

        // A panicking task is skipped; a task queued while draining waits
        queue_task(|| panic!("task failure")).unwrap();
        {
            let ran = Arc::clone(&ran);
            queue_task(move || {
                let ran = Arc::clone(&ran);
                queue_task(move || {
                    ran.fetch_add(10, Ordering::SeqCst);
                })
                .unwrap();
            })
            .unwrap();
        }
        on_frame();
        assert_eq!(queued_task_count(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        on_frame();
        assert_eq!(queued_task_count(), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 11);

        assert!(unregister_frame_callback(key));
        assert!(!unregister_frame_callback(key));
        on_frame();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // A one-shot callback that removes itself and schedules a follow-up
        let own_key = Arc::new(Mutex::new(None::<FrameKey>));
        let follow_ups = Arc::new(AtomicUsize::new(0));
        let one_shot = {
            let own_key = Arc::clone(&own_key);
            let follow_ups = Arc::clone(&follow_ups);
            register_frame_callback(move |_| {
                if let Some(key) = own_key.lock().take() {
                    unregister_frame_callback(key);
                    let follow_ups = Arc::clone(&follow_ups);
                    register_frame_callback(move |_| {
                        follow_ups.fetch_add(1, Ordering::SeqCst);
                    });
                }
            })
        };
        *own_key.lock() = Some(one_shot);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            on_frame();
            done_tx.send(()).unwrap();
        });
        done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("frame with a re-entrant callback did not complete");
        assert!(!unregister_frame_callback(one_shot));
        assert_eq!(follow_ups.load(Ordering::SeqCst), 0);

        on_frame();
        assert_eq!(follow_ups.load(Ordering::SeqCst), 1);

        register_frame_callback(|_| clear_callbacks());
        on_frame();
        assert_eq!(CALLBACKS.read().len(), 0);
    }
}
