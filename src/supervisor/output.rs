//! Child output duplication.

use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

const CHUNK_SIZE: usize = 8 * 1024;

/// Copy `source` to stdout and the shared log file until EOF.
///
/// Write failures on either sink are logged once and that sink is dropped;
/// the other keeps receiving output.
pub async fn tee<R>(mut source: R, log_file: Arc<Mutex<File>>)
where
    R: AsyncRead + Unpin,
{
    let mut console = Some(tokio::io::stdout());
    let mut log = Some(log_file);
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "Child output stream closed");
                break;
            }
        };
        let chunk = &buf[..n];

        if let Some(out) = console.as_mut() {
            if let Err(e) = out.write_all(chunk).await {
                tracing::warn!(error = %e, "Console sink failed, dropping it");
                console = None;
            }
        }
        if let Some(file) = log.as_ref() {
            let mut file = file.lock().await;
            if let Err(e) = file.write_all(chunk).await {
                tracing::warn!(error = %e, "Log file sink failed, dropping it");
                drop(file);
                log = None;
            }
        }
    }

    if let Some(out) = console.as_mut() {
        let _ = out.flush().await;
    }
    if let Some(file) = log {
        let _ = file.lock().await.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tee_appends_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("child.log");
        std::fs::write(&path, "earlier\n").unwrap();

        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap();
        let file = Arc::new(Mutex::new(file));

        tee(&b"first line\nsecond line\n"[..], file.clone()).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "earlier\nfirst line\nsecond line\n");
    }
}
