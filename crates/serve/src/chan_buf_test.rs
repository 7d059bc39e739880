//! Tests for the chunk buffer contract

use super::*;
use tokio::sync::mpsc::error::TryRecvError;

fn buffer() -> (ChunkBuf<()>, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ChunkBuf::new(tx, ()), rx)
}

#[tokio::test]
async fn test_drain_returns_all_bytes_since_last_drain() {
    let (buf, _rx) = buffer();

    buf.write(b"hello ").unwrap();
    buf.write(b"world").unwrap();
    assert_eq!(buf.drain(), b"hello world");

    // consecutive drains with no writes are empty
    assert_eq!(buf.drain(), b"");
    assert_eq!(buf.drain(), b"");

    buf.write(b"again").unwrap();
    assert_eq!(buf.drain(), b"again");
}

#[tokio::test]
async fn test_one_ready_signal_per_drain_cycle() {
    let (buf, mut rx) = buffer();

    // many writes coalesce into exactly one signal
    buf.write(b"a").unwrap();
    buf.write(b"b").unwrap();
    buf.write(b"c").unwrap();
    rx.try_recv().unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    // draining re-arms the signal
    assert_eq!(buf.drain(), b"abc");
    buf.write(b"d").unwrap();
    rx.try_recv().unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_empty_write_does_not_signal() {
    let (buf, mut rx) = buffer();
    buf.write(b"").unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(buf.drain(), b"");
}

#[tokio::test]
async fn test_write_after_close_fails() {
    let (buf, _rx) = buffer();
    buf.close().unwrap();
    let err = buf.write(b"x").unwrap_err();
    assert!(matches!(err, SourceError::BufferClosed));
    assert!(buf.is_closed());

    // close is idempotent
    buf.close().unwrap();
}

#[tokio::test]
async fn test_tokens_identify_buffers() {
    let (tx, mut rx) = mpsc::channel::<usize>(2);
    let first = ChunkBuf::new(tx.clone(), 0usize);
    let second = ChunkBuf::new(tx, 1usize);

    second.write(b"b").unwrap();
    first.write(b"a").unwrap();

    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, Some(0));
}
