use super::stream::{read_up_to, Chain};
use crate::error::{AppError, Result};
use crate::mime;
use mime_guess::Mime;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

/// Buffered in memory when the policy's `max_size` fits under the
/// in-memory threshold, otherwise spooled to a temp file — the decision
/// is made from the declared `max_size` up front, the same way the
/// original source calls `file.AsBytes()` or `file.AsFile()` based on
/// `policy.MaxSize` rather than on how much content actually arrives.
pub enum MaterializedContent {
    Memory(Vec<u8>),
    Spooled { path: PathBuf, size: u64 },
}

impl MaterializedContent {
    pub fn size(&self) -> u64 {
        match self {
            MaterializedContent::Memory(buf) => buf.len() as u64,
            MaterializedContent::Spooled { size, .. } => *size,
        }
    }

    pub async fn sha256_hex(&self) -> Result<String> {
        match self {
            MaterializedContent::Memory(buf) => {
                let mut hasher = Sha256::new();
                hasher.update(buf);
                Ok(hex::encode(hasher.finalize()))
            }
            MaterializedContent::Spooled { path, .. } => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| AppError::server("reopen-spooled-upload", e))?;
                let mut hasher = Sha256::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = file.read(&mut buf).await.map_err(|e| AppError::server("hash-spooled-upload", e))?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hex::encode(hasher.finalize()))
            }
        }
    }

    pub async fn into_reader(self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match self {
            MaterializedContent::Memory(buf) => Ok(Box::new(std::io::Cursor::new(buf))),
            MaterializedContent::Spooled { path, .. } => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| AppError::server("reopen-spooled-upload", e))?;
                Ok(Box::new(file))
            }
        }
    }

    pub async fn cleanup(&self) {
        if let MaterializedContent::Spooled { path, .. } = self {
            if let Err(err) = tokio::fs::remove_file(path).await {
                tracing::warn!(?path, %err, "failed to remove spooled upload, leaking a temp file");
            }
        }
    }
}

/// Sniffs the content type from the leading bytes of `reader` and, if
/// it is allowed, materializes the remainder (the sniffed prefix
/// included) bounded by `max_size`. Mirrors §4.3 steps 3–4: sniffing
/// never consumes more of the stream than the declared policy allows,
/// and exceeding `max_size` is a `request-too-large` failure rather
/// than a silent truncation.
pub async fn sniff_and_ingest<R: AsyncRead + Unpin>(
    mut reader: R,
    allowed: &[Mime],
    max_size: u64,
    spool_threshold: u64,
) -> Result<(Mime, MaterializedContent)> {
    let window = mime::sniff_window(allowed);
    let mut head = vec![0u8; window];
    let filled = read_up_to(&mut reader, &mut head)
        .await
        .map_err(|e| AppError::server("read-upload-sniff-window", e))?;
    head.truncate(filled);

    let sniffed = mime::sniff_content_type(&head, window);
    if !mime::is_mime_allowed(&sniffed, &allowed.to_vec()) {
        return Err(AppError::FileMismatchedType(format!(
            "uploaded content type {sniffed} is not in the allowed set"
        )));
    }

    let chained = Chain::new(std::io::Cursor::new(head), reader);
    let content = ingest(chained, max_size, spool_threshold).await?;
    Ok((sniffed, content))
}

/// Reads `reader` to completion, bounded by `max_size`, choosing memory
/// vs. temp-file materialization from `max_size` vs. `spool_threshold`.
pub async fn ingest<R: AsyncRead + Unpin>(mut reader: R, max_size: u64, spool_threshold: u64) -> Result<MaterializedContent> {
    let mut total = 0u64;
    let mut buf = vec![0u8; 64 * 1024];

    if max_size > spool_threshold {
        let path = std::env::temp_dir().join(format!("file-service-upload-{}", uuid_like_suffix()));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| AppError::server("create-spool-file", e))?;

        loop {
            let n = reader.read(&mut buf).await.map_err(|e| AppError::server("read-upload-stream", e))?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > max_size {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(AppError::RequestTooLarge(format!("file too large (limit {max_size})")));
            }
            file.write_all(&buf[..n]).await.map_err(|e| AppError::server("spool-upload-chunk", e))?;
        }
        file.flush().await.map_err(|e| AppError::server("flush-spool-file", e))?;

        Ok(MaterializedContent::Spooled { path, size: total })
    } else {
        let mut content = Vec::new();
        loop {
            let n = reader.read(&mut buf).await.map_err(|e| AppError::server("read-upload-stream", e))?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > max_size {
                return Err(AppError::RequestTooLarge(format!("file too large (limit {max_size})")));
            }
            content.extend_from_slice(&buf[..n]);
        }
        Ok(MaterializedContent::Memory(content))
    }
}

fn uuid_like_suffix() -> String {
    use rand::distr::{Alphanumeric, SampleString};
    Alphanumeric.sample_string(&mut rand::rng(), 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mime_guess::mime;

    #[tokio::test]
    async fn accepts_content_within_the_size_bound() {
        let data = b"hello world".to_vec();
        let content = ingest(std::io::Cursor::new(data.clone()), 1024, 4096).await.unwrap();
        assert_eq!(content.size(), data.len() as u64);
        assert!(matches!(content, MaterializedContent::Memory(_)));
    }

    #[tokio::test]
    async fn rejects_content_past_the_size_bound() {
        let data = vec![0u8; 100];
        let err = ingest(std::io::Cursor::new(data), 10, 4096).await.unwrap_err();
        assert!(matches!(err, AppError::RequestTooLarge(_)));
    }

    #[tokio::test]
    async fn spools_to_disk_when_policy_exceeds_the_in_memory_threshold() {
        let data = b"spooled content".to_vec();
        let content = ingest(std::io::Cursor::new(data.clone()), 1024, 4).await.unwrap();
        assert!(matches!(content, MaterializedContent::Spooled { .. }));
        assert_eq!(content.sha256_hex().await.unwrap().len(), 64);
        content.cleanup().await;
    }

    #[tokio::test]
    async fn sniffs_and_preserves_the_full_content() {
        let png_header: Vec<u8> = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3, 4, 5, 6];
        let (sniffed, content) = sniff_and_ingest(std::io::Cursor::new(png_header.clone()), &[mime::IMAGE_PNG], 1024, 4096)
            .await
            .unwrap();
        assert_eq!(sniffed, mime::IMAGE_PNG);
        assert_eq!(content.size(), png_header.len() as u64);
    }

    #[tokio::test]
    async fn rejects_a_sniffed_type_outside_the_allowed_set() {
        let text = b"plain text content, definitely not an image".to_vec();
        let err = sniff_and_ingest(std::io::Cursor::new(text), &[mime::IMAGE_PNG], 1024, 4096)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FileMismatchedType(_)));
    }
}
