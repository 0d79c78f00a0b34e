//! Bounded worker pool for independent, order-insensitive I/O.
//!
//! Workers pull from a bounded crossbeam queue and write into per-item result
//! slots, so the output order always matches the input order no matter which
//! worker finished first. The destructive delete loop never goes through here.

use crossbeam_channel as channel;
use parking_lot::Mutex;

/// Apply `f` to every item using at most `concurrency` threads.
///
/// Results are returned in input order. A `concurrency` of 0 is treated as 1.
pub fn map_bounded<T, R, F>(items: Vec<T>, concurrency: usize, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = concurrency.max(1).min(total);
    if workers == 1 {
        return items.into_iter().map(f).collect();
    }

    let slots: Vec<Mutex<Option<R>>> = (0..total).map(|_| Mutex::new(None)).collect();
    let (work_tx, work_rx) = channel::bounded::<(usize, T)>(workers * 2);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = work_rx.clone();
            let slots = &slots;
            let f = &f;
            scope.spawn(move || {
                for (index, item) in rx {
                    *slots[index].lock() = Some(f(item));
                }
            });
        }
        drop(work_rx);

        for pair in items.into_iter().enumerate() {
            if work_tx.send(pair).is_err() {
                break;
            }
        }
        drop(work_tx);
    });

    slots.into_iter().filter_map(Mutex::into_inner).collect()
}
