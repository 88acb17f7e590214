use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use clap::Parser;
use ringdma::Error;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() {
    let Args {
        size,
        addr,
        capacity,
        interval,
    } = Args::parse();

    // Connect to TCP socket
    let stream = TcpStream::connect(addr).await.unwrap();
    let (stream_reader, stream_writer) = stream.into_split();

    // Create the connection and spawn its dataplane task
    let (mut conn, task) = ringdma::connection(stream_reader, stream_writer)
        .capacity(capacity)
        .mr_len(size.max(1))
        .build()
        .unwrap();

    static OPS: AtomicUsize = AtomicUsize::new(0);
    tokio::spawn(ringdma_bench::stats_loop(task, Duration::from_secs_f32(interval), &OPS));

    // Keep the ring full of WRITEs, draining completions whenever it is
    loop {
        match conn.post_write(size, 0, 0).await {
            Ok(_) => {}
            Err(Error::QueueFull) => {
                let done = conn.poll(capacity as usize, Duration::from_secs(1)).await.unwrap();
                OPS.fetch_add(done.len(), Ordering::Relaxed);
            }
            Err(e) => panic!("{e}"),
        }
    }
}

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long)]
    size: u32,
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    addr: String,
    #[arg(short, long, default_value = "64")]
    capacity: u32,
    #[arg(short, long, default_value = "1.0")]
    interval: f32,
}
