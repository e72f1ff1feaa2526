//! Request head reading for freshly accepted connections.
//!
//! The relay must see the client's handshake bytes exactly as sent, so the
//! head is read off the socket by hand instead of through hyper. Whatever
//! arrives past the `\r\n\r\n` terminator stays in the buffer for the caller.

use std::time::Duration;

use axum::http::StatusCode;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::relay::RequestHead;

/// Why a request head could not be read.
#[derive(Debug, thiserror::Error)]
pub enum HeadError {
    #[error("timed out waiting for request head")]
    Timeout,
    #[error("peer closed before sending a complete head")]
    Closed,
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl HeadError {
    /// Response to send before closing, if the peer is still worth answering.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HeadError::TooLarge(_) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            HeadError::Malformed(httparse::Error::TooManyHeaders) => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            HeadError::Malformed(_) => Some(StatusCode::BAD_REQUEST),
            HeadError::Timeout | HeadError::Closed | HeadError::Io(_) => None,
        }
    }
}

/// A parsed head plus every byte read so far.
#[derive(Debug)]
pub struct ReadHead {
    pub head: RequestHead,
    /// Head bytes followed by any early payload.
    pub buffer: BytesMut,
    /// Length of the head inside `buffer`.
    pub head_len: usize,
}

/// Read until a full request head is buffered.
pub async fn read_head<S>(stream: &mut S, max_bytes: usize, timeout: Duration) -> Result<ReadHead, HeadError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(max_bytes.min(4096));

    let (head, head_len) = tokio::time::timeout(timeout, fill(stream, &mut buffer, max_bytes))
        .await
        .map_err(|_| HeadError::Timeout)??;

    if head_len > max_bytes {
        return Err(HeadError::TooLarge(max_bytes));
    }

    Ok(ReadHead {
        head,
        buffer,
        head_len,
    })
}

async fn fill<S>(stream: &mut S, buffer: &mut BytesMut, max_bytes: usize) -> Result<(RequestHead, usize), HeadError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(parsed) = RequestHead::parse(buffer)? {
            return Ok(parsed);
        }
        if buffer.len() >= max_bytes {
            return Err(HeadError::TooLarge(max_bytes));
        }
        buffer.reserve(1024);
        if stream.read_buf(buffer).await? == 0 {
            return Err(HeadError::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const SECS: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn head_split_across_reads_keeps_payload() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let writer = tokio::spawn(async move {
            client.write_all(b"GET /speed HTTP/1.1\r\nHo").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(b"st: a\r\n\r\npayload").await.unwrap();
            client
        });

        let read = read_head(&mut server, 4096, SECS).await.unwrap();
        let _client = writer.await.unwrap();

        assert_eq!(read.head.target, "/speed");
        assert_eq!(&read.buffer[read.head_len..], b"payload");
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        let mut junk = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        junk.extend(std::iter::repeat(b'a').take(3000));
        client.write_all(&junk).await.unwrap();

        let err = read_head(&mut server, 1024, SECS).await.unwrap_err();
        assert!(matches!(err, HeadError::TooLarge(1024)));
        assert_eq!(err.status(), Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
    }

    #[tokio::test]
    async fn early_close_and_timeout() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(matches!(read_head(&mut server, 1024, SECS).await, Err(HeadError::Closed)));

        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_head(&mut server, 1024, Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, HeadError::Timeout));
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"\x16\x03\x01\x00\x05hello").await.unwrap();
        let err = read_head(&mut server, 1024, SECS).await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    }
}
