use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use ringdma::{DataplaneStats, DataplaneTask};

/// Prints operation and stream rates every `interval`, forever.
///
/// `atomic_ops` is drained on every tick and counts completed operations.
pub async fn stats_loop<R, W>(task: DataplaneTask<R, W>, interval: Duration, atomic_ops: &'static AtomicUsize) {
    let mut tot_ops = 0;
    let mut tot_sent = 0;
    let mut tot_received = 0;

    tokio::time::sleep(interval).await;
    let mut loop_interval = tokio::time::interval(interval);
    loop {
        loop_interval.tick().await;

        macro_rules! xps {
            ($x:expr) => {
                $x as f32 / interval.as_secs_f32()
            };
        }

        let ops = atomic_ops.swap(0, Ordering::Relaxed);
        tot_ops += ops;

        let DataplaneStats {
            bytes_sent,
            bytes_received,
            ..
        } = task.get_stats();
        let gbps_tx = (8 * (bytes_sent - tot_sent)) as f64 / 1_000_000_000.0;
        let gbps_rx = (8 * (bytes_received - tot_received)) as f64 / 1_000_000_000.0;

        println!(
            "[{:12}]  {:7} op/s  tx {:.3} Gb/s  rx {:.3} Gb/s",
            tot_ops,
            xps!(ops),
            xps!(gbps_tx),
            xps!(gbps_rx)
        );

        tot_sent = bytes_sent;
        tot_received = bytes_received;
    }
}
