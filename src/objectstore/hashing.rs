use sha2::{Digest, Sha256};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Wraps an [`AsyncRead`] so the bytes flowing through `store`'s single
/// pass over the upload are hashed as a side effect: the hash is
/// produced as the upload streams through, with no second pass over
/// the bytes. The running hasher lives behind a shared handle rather
/// than inside the reader itself, since the reader is consumed by the
/// streaming HTTP body before the digest can be read back out.
pub struct HashingReader<R> {
    inner: R,
    hasher: Arc<Mutex<Sha256>>,
}

/// A handle to a [`HashingReader`]'s running digest, retained by the
/// caller while the reader itself is handed off to a streaming body.
#[derive(Clone)]
pub struct HashHandle(Arc<Mutex<Sha256>>);

impl HashHandle {
    /// Reads the digest accumulated so far. Only meaningful once the
    /// wrapped reader has been fully drained.
    pub fn finalize_hex(&self) -> String {
        let hasher = self.0.lock().expect("hash mutex poisoned").clone();
        hex::encode(hasher.finalize())
    }
}

impl<R: AsyncRead + Unpin> HashingReader<R> {
    pub fn new(inner: R) -> (Self, HashHandle) {
        let hasher = Arc::new(Mutex::new(Sha256::new()));
        let handle = HashHandle(hasher.clone());
        (Self { inner, hasher }, handle)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.hasher.lock().expect("hash mutex poisoned").update(&buf.filled()[before..]);
        }
        poll
    }
}
