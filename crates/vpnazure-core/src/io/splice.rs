//! One-directional stream splicing.
//!
//! Each side of a matched relay session runs in its own task and copies a
//! single direction, so the copy here is deliberately one-way: the client
//! worker pumps server bytes into the client connection while the data
//! session worker pumps client bytes into the server connection.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Copy bytes from `reader` into `writer` until EOF or error.
///
/// Returns the number of bytes copied together with the terminating result,
/// so callers can log partial transfer counts when a session dies mid-copy.
/// On clean EOF the writer is flushed and shut down.
pub async fn splice<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize) -> (u64, io::Result<()>)
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return (total, Err(e)),
        };
        if let Err(e) = writer.write_all(&buf[..n]).await {
            return (total, Err(e));
        }
        if let Err(e) = writer.flush().await {
            return (total, Err(e));
        }
        total += n as u64;
    }

    let _ = writer.shutdown().await;
    (total, Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, duplex};

    #[tokio::test]
    async fn copies_until_eof() {
        let (mut src_tx, mut src_rx) = duplex(64);
        let (mut dst_tx, mut dst_rx) = duplex(64);

        let task = tokio::spawn(async move { splice(&mut src_rx, &mut dst_tx, 16).await });

        src_tx.write_all(b"hello relay world").await.unwrap();
        drop(src_tx);

        let (n, result) = task.await.unwrap();
        assert_eq!(n, 17);
        result.unwrap();

        let mut out = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut dst_rx, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"hello relay world");
    }

    #[tokio::test]
    async fn reports_partial_count_on_write_error() {
        let (mut src_tx, mut src_rx) = duplex(64);
        let (mut dst_tx, dst_rx) = duplex(8);

        src_tx.write_all(b"0123456789abcdef").await.unwrap();
        drop(src_tx);
        // Closing the read side makes further writes fail.
        drop(dst_rx);

        let (_, result) = splice(&mut src_rx, &mut dst_tx, 4).await;
        assert!(result.is_err());
    }
}
