use std::{net::SocketAddr, time::Duration};

use rand::Rng;
use ringdma::{Connection, Error, OpKind, Pipe, Wqe, WqeStatus};
use tokio::{
    io::{duplex, split},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};

const N: usize = 100;
const TIMEOUT: Duration = Duration::from_secs(5);

/// Polls until `n` completions have been collected.
async fn complete(conn: &mut Connection<Pipe>, n: usize) -> Vec<Wqe> {
    let mut out = vec![];
    timeout(TIMEOUT, async {
        while out.len() < n {
            out.extend(conn.poll(n - out.len(), Duration::from_millis(100)).await.unwrap());
        }
    })
    .await
    .unwrap();
    out
}

async fn passive(tx: oneshot::Sender<SocketAddr>) {
    // Bind TCP listener
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    tx.send(listener.local_addr().unwrap()).unwrap();

    // Accept connection
    let (stream, _addr) = listener.accept().await.unwrap();
    let (reader, writer) = stream.into_split();

    // The peer only serves requests against its region, it never posts
    let (_conn, task) = ringdma::connection(reader, writer).build().unwrap();
    while !task.is_finished() {
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn base() {
    let (tx, rx) = oneshot::channel();
    tokio::task::spawn(passive(tx));
    let addr = rx.await.unwrap();

    // Connect to TCP socket
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, writer) = stream.into_split();
    let (mut conn, _task) = ringdma::connection(reader, writer).build().unwrap();

    let mut rng = rand::rng();
    for size in [8u32, 1_000, 32_000] {
        for _ in 0..N {
            let payload: Vec<u8> = (0..size).map(|_| rng.random()).collect();
            conn.mr().write_at(0, &payload).unwrap();

            // Put the payload in the peer's region, then get it back elsewhere
            let w = conn.post_write(size, 0, 0).await.unwrap();
            let r = conn.post_read(size, 32_768, 0).await.unwrap();
            let done = complete(&mut conn, 2).await;
            assert_eq!(
                (done[0].id, done[0].kind, done[0].status),
                (w, OpKind::Write, WqeStatus::Success)
            );
            assert_eq!(
                (done[1].id, done[1].kind, done[1].status),
                (r, OpKind::Read, WqeStatus::Success)
            );

            let mut back = vec![0u8; size as usize];
            conn.mr().read_at(32_768, &mut back).unwrap();
            assert_eq!(back, payload);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplex_both_sides_post() {
    // Small buffers force frames to be split across many stream reads
    let (a, b) = duplex(512);
    let (ar, aw) = split(a);
    let (br, bw) = split(b);
    let (mut a, _ta) = ringdma::connection(ar, aw)
        .capacity(8)
        .mr_len(4096)
        .tx_buffer(256)
        .rx_buffer(256)
        .build()
        .unwrap();
    let (mut b, _tb) = ringdma::connection(br, bw)
        .capacity(8)
        .mr_len(4096)
        .tx_buffer(256)
        .rx_buffer(256)
        .build()
        .unwrap();

    a.mr().write_at(0, &[0xAA; 1024]).unwrap();
    b.mr().write_at(0, &[0xBB; 1024]).unwrap();

    for _ in 0..N {
        // Each side writes its pattern at 1024 of the other and reads the other's pattern into 2048
        a.post_write(1024, 0, 1024).await.unwrap();
        a.post_read(1024, 2048, 0).await.unwrap();
        b.post_write(1024, 0, 1024).await.unwrap();
        b.post_read(1024, 2048, 0).await.unwrap();

        let (da, db) = tokio::join!(complete(&mut a, 2), complete(&mut b, 2));
        assert!(da.iter().chain(db.iter()).all(|w| w.status == WqeStatus::Success));
    }

    let mut buf = [0u8; 1024];
    a.mr().read_at(1024, &mut buf).unwrap();
    assert_eq!(buf, [0xBB; 1024]);
    a.mr().read_at(2048, &mut buf).unwrap();
    assert_eq!(buf, [0xBB; 1024]);
    b.mr().read_at(1024, &mut buf).unwrap();
    assert_eq!(buf, [0xAA; 1024]);
    b.mr().read_at(2048, &mut buf).unwrap();
    assert_eq!(buf, [0xAA; 1024]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn remote_out_of_bounds() {
    let (a, b) = duplex(4096);
    let (ar, aw) = split(a);
    let (br, bw) = split(b);
    let (mut a, _ta) = ringdma::connection(ar, aw).build().unwrap();
    let (_b, _tb) = ringdma::connection(br, bw).mr_len(1024).build().unwrap();

    // Valid locally, outside the peer's 1 KiB region
    let w = a.post_write(64, 0, 1000).await.unwrap();
    let r = a.post_read(64, 0, 2048).await.unwrap();
    let ok = a.post_write(64, 0, 0).await.unwrap();
    let done = complete(&mut a, 3).await;
    assert_eq!(
        done.iter().map(|w| (w.id, w.status)).collect::<Vec<_>>(),
        vec![
            (w, WqeStatus::OutOfBounds),
            (r, WqeStatus::OutOfBounds),
            (ok, WqeStatus::Success)
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eof_fails_connection() {
    let (a, b) = duplex(4096);
    let (ar, aw) = split(a);
    let (mut a, task) = ringdma::connection(ar, aw).build().unwrap();

    // Nobody serves the request on the other end
    let id = a.post_read(8, 0, 0).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    drop(b);

    timeout(TIMEOUT, async {
        while !task.is_finished() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    // Outstanding work is flushed, then the failure is reported
    let done = a.poll(8, Duration::from_millis(100)).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!((done[0].id, done[0].status), (id, WqeStatus::ConnFailure));
    assert_eq!(
        a.poll(8, Duration::from_millis(100)).await,
        Err(Error::TransportFailure)
    );
    assert_eq!(a.post_write(8, 0, 0).await, Err(Error::TransportFailure));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bulk_writes_both_ways() {
    // Each payload is far larger than what the stream buffers in flight
    let (a, b) = duplex(1024);
    let (ar, aw) = split(a);
    let (br, bw) = split(b);
    let (mut a, ta) = ringdma::connection(ar, aw).build().unwrap();
    let (mut b, tb) = ringdma::connection(br, bw).build().unwrap();
    ta.set_write_timeout(Duration::from_secs(2));
    tb.set_write_timeout(Duration::from_secs(2));

    a.mr().write_at(0, &[0xA5; 32_768]).unwrap();
    b.mr().write_at(0, &[0x5A; 32_768]).unwrap();

    for _ in 0..4 {
        let wa = a.post_write(32_768, 0, 32_768).await.unwrap();
        let wb = b.post_write(32_768, 0, 32_768).await.unwrap();

        let (da, db) = tokio::join!(complete(&mut a, 1), complete(&mut b, 1));
        assert_eq!((da[0].id, da[0].status), (wa, WqeStatus::Success));
        assert_eq!((db[0].id, db[0].status), (wb, WqeStatus::Success));
    }
    assert!(!ta.is_finished());
    assert!(!tb.is_finished());

    let mut buf = vec![0u8; 32_768];
    a.mr().read_at(32_768, &mut buf).unwrap();
    assert!(buf.iter().all(|&x| x == 0x5A));
    b.mr().read_at(32_768, &mut buf).unwrap();
    assert!(buf.iter().all(|&x| x == 0xA5));
}
