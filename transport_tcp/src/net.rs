use crossfire::MAsyncRx;
use starpc_core::FRAME_PREFIX_LEN;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one length-prefixed frame and return its body. Returns `None` on a
/// clean end of stream (the peer closed between frames).
pub async fn read_frame<T: AsyncRead + Unpin>(
    rd: &mut T, max_frame_len: u32,
) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; FRAME_PREFIX_LEN];
    match rd.read_exact(&mut len_buf).await {
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
        Ok(_) => {}
    }
    let len = u32::from_le_bytes(len_buf);
    if len > max_frame_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit {}", len, max_frame_len),
        ));
    }
    let mut body = vec![0u8; len as usize];
    rd.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Drain ready-made frames (length prefix included, produced by
/// `Codec::encode_framed`) onto the socket; exits when the last sender is
/// dropped or the peer stops reading.
pub(crate) async fn write_loop<T: AsyncWrite + Unpin>(mut wr: T, rx: MAsyncRx<Vec<u8>>) {
    while let Ok(frame) = rx.recv().await {
        if let Err(e) = wr.write_all(&frame).await {
            warn!("tcp write err: {}", e);
            return;
        }
        if let Err(e) = wr.flush().await {
            warn!("tcp flush err: {}", e);
            return;
        }
    }
    let _ = wr.shutdown().await;
}
