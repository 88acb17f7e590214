use std::time::Duration;

use clap::Parser;
use quanta::Instant;
use ringdma::OpKind;
use tokio::net::TcpStream;

#[tokio::main]
async fn main() {
    let Args {
        size,
        num,
        warmup,
        addr,
        capacity,
        read,
        test,
    } = Args::parse();

    // Connect to TCP socket
    let stream = TcpStream::connect(addr).await.unwrap();
    stream.set_nodelay(true).unwrap();
    let (stream_reader, stream_writer) = stream.into_split();

    // Create the connection and spawn its dataplane task
    let (mut conn, _task) = ringdma::connection(stream_reader, stream_writer)
        .capacity(capacity)
        .mr_len(size.max(1))
        .build()
        .unwrap();
    conn.mr().write_at(0, &vec![0x42u8; size as usize]).unwrap();

    let kind = if read { OpKind::Read } else { OpKind::Write };
    macro_rules! round_trip {
        () => {{
            match kind {
                OpKind::Read => conn.post_read(size, 0, 0).await.unwrap(),
                OpKind::Write => conn.post_write(size, 0, 0).await.unwrap(),
            };
            while conn.poll_event(Duration::from_secs(1)).await.unwrap().is_none() {}
        }};
    }

    // Warmup phase: run round trips to stabilize the system (e.g. cache warming)
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs_f64(warmup) {
        round_trip!();
    }

    // Measurement phase: time each operation from post to completion
    let mut samples: Vec<Duration> = Vec::with_capacity(num);
    for _ in 0..num {
        let now = Instant::now();
        round_trip!();
        samples.push(now.elapsed());
    }

    let mut min = Duration::MAX;
    let mut max = Duration::ZERO;
    let mut sum = Duration::ZERO;
    for (seq, rtt) in samples.iter().enumerate() {
        min = min.min(*rtt);
        max = max.max(*rtt);
        sum += *rtt;

        if test {
            println!("{},{},{}", size, seq, rtt.as_nanos());
        } else {
            println!("{} bytes {:?}: seq={} rtt={:#.2?}", size, kind, seq, rtt);
        }
    }

    let avg = sum / samples.len().max(1) as u32;
    if !test {
        println!("rtt min/avg/max = {:#.2?}/{:#.2?}/{:#.2?}", min, avg, max);
    }
}

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long)]
    size: u32,
    #[arg(short, long, default_value = "100")]
    num: usize,
    #[arg(short, long, default_value = "1.0")]
    warmup: f64,
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    addr: String,
    #[arg(short, long, default_value = "16")]
    capacity: u32,
    /// Measure READs instead of WRITEs
    #[arg(short, long)]
    read: bool,
    #[arg(short, long)]
    test: bool,
}
