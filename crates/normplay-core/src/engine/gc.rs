//! RT-safe deferred deallocation for track views
//!
//! Track views are wrapped in `basedrop::Shared`. The real-time callback may
//! hold the last reference to a view (after a track switch, a mixing-target
//! change or a track removal); dropping it there only enqueues the pointer,
//! and the memory is returned on the collector thread instead of inside the
//! audio callback.

use basedrop::{Collector, Handle};
use std::io;
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating `Shared<T>` allocations
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector thread reclaims deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    match spawn_collector() {
        Ok(handle) => handle,
        Err(e) => {
            // Drops still never free on the audio thread; they are just never reclaimed
            log::error!("Buffer collector thread unavailable: {}", e);
            Box::leak(Box::new(Collector::new())).handle()
        }
    }
}

/// Spawn the collector thread and return a handle to it
fn spawn_collector() -> io::Result<Handle> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("normplay-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread only
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Buffer collector thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })?;

    rx.recv().map_err(io::Error::other)
}

/// Handle for wrapping a value in `Shared<T>`
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
