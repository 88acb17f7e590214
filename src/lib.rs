//! Ringdma: one-sided READ/WRITE operations over a reliable byte stream.
//!
//! Ringdma gives RDMA-like put/get semantics without RDMA hardware. Each side
//! of a connection exposes one [`MemoryRegion`]. The application posts READ
//! and WRITE operations naming a local and a remote offset, and later polls
//! for their completions. A dataplane turns posted operations into frames on
//! the byte stream, serves the peer's requests against the local region, and
//! matches responses back to the operations that caused them.
//!
//! # Overview
//!
//! Posted operations and their completions share a single ring of fixed-size
//! entries. Four boundaries split it into four regions; the application moves
//! `wq_head` and `cq_tail`, the dataplane moves `wq_tail` and `cq_head`:
//!
//! ```text
//!               cq_tail        cq_head        wq_tail        wq_head
//!                  │              │              │              │
//!  ┌───────────────┼──────────────┼──────────────┼──────────────┼──────────┐
//!  │     free      │  completed   │  in flight   │    posted    │   free   │
//!  └───────────────┴──────────────┴──────────────┴──────────────┴──────────┘
//!                    poll() drains  awaiting the   not sent yet   post()
//!                    from here      peer response                 appends here
//! ```
//!
//! Every post publishes the new `wq_head` together with the current `cq_tail`
//! to the dataplane in a single *bump*. The dataplane validates the pair
//! against its own boundaries before installing it, so a corrupted or
//! out-of-order bump is reported as a [`Violation`] instead of breaking the
//! ring.
//!
//! On the wire, every frame starts with a 20-byte header and is either a
//! request or a response, for a READ or a WRITE. WRITE requests and READ
//! responses carry a payload. Responses come back in posting order, which is
//! how the dataplane matches them to their entries by id alone.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ringdma::WqeStatus;
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stream = TcpStream::connect("127.0.0.1:8080").await?;
//!     let (reader, writer) = stream.into_split();
//!     let (mut conn, task) = ringdma::connection(reader, writer).build()?;
//!
//!     // Put 5 bytes at offset 128 of the peer's region
//!     conn.mr().write_at(0, b"hello")?;
//!     conn.post_write(5, 0, 128).await?;
//!
//!     // Get them back at local offset 64
//!     conn.post_read(5, 64, 128).await?;
//!
//!     let mut done = vec![];
//!     while done.len() < 2 {
//!         done.extend(conn.poll(2 - done.len(), Duration::from_secs(1)).await?);
//!     }
//!     assert!(done.iter().all(|c| c.status == WqeStatus::Success));
//!
//!     let mut buf = [0u8; 5];
//!     conn.mr().read_at(64, &mut buf)?;
//!     assert_eq!(&buf, b"hello");
//!
//!     task.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! Out-of-range offsets and a full ring are reported synchronously by the post
//! calls and are recoverable. A [`ProtocolViolation`](Error::ProtocolViolation)
//! or a [`TransportFailure`](Error::TransportFailure) fails the connection: the
//! operations still outstanding complete with
//! [`ConnFailure`](WqeStatus::ConnFailure) and every later call reports the
//! failure.
//!
//! # Custom transports
//!
//! [`connection()`] drives the connection from a tokio task over any
//! `AsyncRead`/`AsyncWrite` pair. [`Connection::new`] accepts any
//! [`Transport`] instead, for callers that move the bytes themselves.
mod api;
mod buffers;
mod codec;
mod pipeline;
mod protocol;
mod sync;
mod transport;

pub use api::*;
pub use buffers::MemoryRegion;
pub use pipeline::{
    error::{Error, Violation},
    ring::Boundaries,
};
pub use protocol::{Completion, OpKind, WQE_SIZE, Wqe, WqeStatus};
pub use transport::{Pipe, Transport};
