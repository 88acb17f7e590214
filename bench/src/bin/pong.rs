use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Bind TCP listener
    let listener = TcpListener::bind(args.addr).await.unwrap();
    // Accept connection
    let (stream, _addr) = listener.accept().await.unwrap();
    stream.set_nodelay(true).unwrap();
    let (stream_reader, stream_writer) = stream.into_split();

    // The passive side never posts: its dataplane task serves the peer's requests
    let (_conn, task) = ringdma::connection(stream_reader, stream_writer)
        .capacity(args.capacity)
        .mr_len(args.mr_len)
        .build()
        .unwrap();

    while !task.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[derive(Debug, Parser)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    addr: String,
    #[arg(short, long, default_value = "16")]
    capacity: u32,
    #[arg(short, long, default_value = "1048576")]
    mr_len: u32,
}
