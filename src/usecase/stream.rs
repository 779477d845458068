use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Reads `first` to exhaustion, then `second`. Used to re-assemble a
/// stream after its leading bytes were peeled off for content-type
/// sniffing, so the sniffed prefix is still part of the content that
/// gets hashed and stored.
pub struct Chain<A, B> {
    first: Option<A>,
    second: B,
}

impl<A, B> Chain<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first: Some(first), second }
    }
}

impl<A: AsyncRead + Unpin, B: AsyncRead + Unpin> AsyncRead for Chain<A, B> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        if let Some(first) = this.first.as_mut() {
            let before = buf.filled().len();
            match Pin::new(first).poll_read(cx, buf) {
                Poll::Ready(Ok(())) if buf.filled().len() > before => return Poll::Ready(Ok(())),
                Poll::Ready(Ok(())) => {
                    this.first = None;
                }
                other => return other,
            }
        }

        Pin::new(&mut this.second).poll_read(cx, buf)
    }
}

/// Reads up to `buf.len()` bytes, stopping early on EOF. Returns the
/// number of bytes actually read.
pub async fn read_up_to<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    use tokio::io::AsyncReadExt;

    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
