//! HTTP Transfer Integration Tests
//!
//! Verifies the presigned-URL `PUT` and its byte-level progress reporting.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use reklam_uploadr::upload::{
        HttpTransfer, ProgressObserver, TransferExecutor, UploadError, UploadFile, UploadTarget,
    };
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingObserver {
        reports: Mutex<Vec<(u64, u64)>>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&self, bytes_sent: u64, total_bytes: u64) {
            self.reports.lock().unwrap().push((bytes_sent, total_bytes));
        }
    }

    fn target(mock_server: &MockServer, key: &str) -> UploadTarget {
        UploadTarget {
            upload_url: format!("{}/bucket/{}?X-Amz-Signature=abc", mock_server.uri(), key),
            object_key: key.to_string(),
            folder_path: "job/1".into(),
        }
    }

    fn transfer(chunk_size: usize) -> HttpTransfer {
        HttpTransfer::new(Duration::from_secs(5), None, chunk_size).unwrap()
    }

    /// Object store that accepts one `PUT` and drains its body `read_size`
    /// bytes at a time, pausing between reads, before answering 200.
    async fn start_slow_store(read_size: usize, pause: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = vec![0u8; read_size];

            let header_end = loop {
                let n = socket.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                received.extend_from_slice(&buf[..n]);
                if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let headers = String::from_utf8_lossy(&received[..header_end]).to_lowercase();
            let content_length: usize = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .map(|value| value.trim().parse().unwrap())
                .unwrap();

            let mut body_read = received.len() - header_end;
            while body_read < content_length {
                tokio::time::sleep(pause).await;
                // The client may give up and hang up mid-body
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => body_read += n,
                }
            }

            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        format!("http://{}/bucket/slow.bin", addr)
    }

    fn slow_target(upload_url: String) -> UploadTarget {
        UploadTarget {
            upload_url,
            object_key: "slow.bin".into(),
            folder_path: "job/1".into(),
        }
    }

    #[tokio::test]
    async fn test_put_streams_exact_bytes_with_content_type() {
        let mock_server = MockServer::start().await;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        Mock::given(method("PUT"))
            .and(path("/bucket/banner.png"))
            .and(header("content-type", "image/png"))
            .and(body_bytes(data.clone()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let file = UploadFile::new("banner.png", "image/png", Bytes::from(data));
        let observer = RecordingObserver::default();

        transfer(1024)
            .transfer(&target(&mock_server, "banner.png"), &file, &observer)
            .await
            .unwrap();

        let reports = observer.reports.lock().unwrap().clone();
        assert_eq!(reports.first(), Some(&(0, 10_000)));
        assert_eq!(reports.last(), Some(&(10_000, 10_000)));
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        // One report per 1KB chunk plus the initial zero
        assert_eq!(reports.len(), 11);
    }

    #[tokio::test]
    async fn test_storage_rejection_is_transfer_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/bucket/expired.png"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Request has expired"))
            .mount(&mock_server)
            .await;

        let file = UploadFile::new("expired.png", "image/png", Bytes::from_static(b"png"));
        let err = transfer(1024)
            .transfer(
                &target(&mock_server, "expired.png"),
                &file,
                &RecordingObserver::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            UploadError::Transfer("storage rejected upload (HTTP 403): Request has expired".into())
        );
    }

    #[tokio::test]
    async fn test_slow_store_is_not_cut_off_by_connect_timeout() {
        // 16 reads 50ms apart: the upload outlasts the connect timeout
        let upload_url = start_slow_store(4096, Duration::from_millis(50)).await;
        let file = UploadFile::new(
            "slow.bin",
            "application/octet-stream",
            Bytes::from(vec![7u8; 64 * 1024]),
        );
        let observer = RecordingObserver::default();
        let transfer = HttpTransfer::new(Duration::from_millis(200), None, 1024).unwrap();

        let started = Instant::now();
        transfer
            .transfer(&slow_target(upload_url), &file, &observer)
            .await
            .unwrap();

        assert!(started.elapsed() > Duration::from_millis(200));
        assert_eq!(
            observer.reports.lock().unwrap().last(),
            Some(&(64 * 1024, 64 * 1024))
        );
    }

    #[tokio::test]
    async fn test_transfer_timeout_is_reported_as_timeout() {
        let upload_url = start_slow_store(4096, Duration::from_millis(50)).await;
        let file = UploadFile::new(
            "slow.bin",
            "application/octet-stream",
            Bytes::from(vec![7u8; 64 * 1024]),
        );
        let transfer = HttpTransfer::new(
            Duration::from_secs(5),
            Some(Duration::from_millis(300)),
            1024,
        )
        .unwrap();

        let err = transfer
            .transfer(
                &slow_target(upload_url),
                &file,
                &RecordingObserver::default(),
            )
            .await
            .unwrap_err();

        match err {
            UploadError::Transfer(message) => {
                assert!(message.contains("timed out"), "message: {}", message)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_file_is_transferred() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/bucket/empty.txt"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let file = UploadFile::new("empty.txt", "text/plain", Bytes::new());
        let observer = RecordingObserver::default();
        transfer(1024)
            .transfer(&target(&mock_server, "empty.txt"), &file, &observer)
            .await
            .unwrap();

        assert_eq!(observer.reports.lock().unwrap().clone(), vec![(0, 0)]);
    }
}
