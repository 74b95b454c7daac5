use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{timeout, timeout_at, Instant};

/// First read; control requests fit comfortably.
pub const INITIAL_CHUNK: usize = 4096;
/// Follow-up reads while a POST body is still arriving.
pub const BODY_CHUNK: usize = 1024;
/// Bodies are cut here whatever `Content-Length` claims.
pub const MAX_BODY: usize = 4096;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Reads one request and splits it into `(headers, body)`.
///
/// A timeout or I/O failure on the first read yields two empty strings. POST
/// bodies announced by `Content-Length` are read until complete, until the
/// peer stops sending or until `read_timeout` has passed since the headers
/// arrived; a short body is returned as-is. Bodies never exceed [`MAX_BODY`].
pub async fn read_request<R>(conn: &mut R, read_timeout: Duration) -> (String, String)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; INITIAL_CHUNK];
    let n = match timeout(read_timeout, conn.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(err)) => {
            warn!("Request read error: {err}");
            return (String::new(), String::new());
        }
        Err(_) => {
            warn!("Request read timed out after {:?}", read_timeout);
            return (String::new(), String::new());
        }
    };
    buf.truncate(n);
    debug!("Raw request received: {} bytes", n);

    let (head, mut body) = match find_header_end(&buf) {
        Some(pos) => (buf[..pos].to_vec(), buf[pos + HEADER_END.len()..].to_vec()),
        None => (buf, Vec::new()),
    };
    let headers = String::from_utf8_lossy(&head).into_owned();

    if is_post(&headers) {
        if let Some(declared) = content_length(&headers) {
            let content_length = declared.min(MAX_BODY);
            if declared > MAX_BODY {
                warn!("Content-Length {declared} exceeds {MAX_BODY}, body will be truncated");
            }
            let deadline = Instant::now() + read_timeout;
            while body.len() < content_length {
                let remaining = content_length - body.len();
                let mut chunk = vec![0u8; remaining.min(BODY_CHUNK)];
                match timeout_at(deadline, conn.read(&mut chunk)).await {
                    Ok(Ok(0)) => break,
                    Ok(Ok(n)) => {
                        body.extend_from_slice(&chunk[..n]);
                        debug!("Read additional {n} bytes, total body: {}", body.len());
                    }
                    Ok(Err(err)) => {
                        warn!("Error reading POST body: {err}");
                        break;
                    }
                    Err(_) => {
                        warn!("POST body read timed out at {}/{content_length} bytes", body.len());
                        break;
                    }
                }
            }
        }
    }

    body.truncate(MAX_BODY);
    (headers, String::from_utf8_lossy(&body).into_owned())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
}

fn is_post(headers: &str) -> bool {
    RequestLine::parse(headers).is_some_and(|line| line.method == "POST")
}

/// Case-insensitive `Content-Length`, if present and numeric.
pub fn content_length(headers: &str) -> Option<usize> {
    headers.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    /// Path without the query string.
    pub path: String,
}

impl RequestLine {
    pub fn parse(headers: &str) -> Option<Self> {
        let first = headers.lines().next()?;
        let mut parts = first.split_whitespace();
        let method = parts.next()?;
        let target = parts.next()?;
        let path = target.split('?').next().unwrap_or(target);
        Some(Self {
            method: method.to_string(),
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn splits_headers_and_body() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client
            .write_all(b"POST /start_logging HTTP/1.1\r\nHost: pico\r\nContent-Length: 11\r\n\r\nduration=30")
            .await
            .unwrap();

        let (headers, body) = read_request(&mut server, TIMEOUT).await;
        assert!(headers.starts_with("POST /start_logging HTTP/1.1"));
        assert!(headers.ends_with("Content-Length: 11"));
        assert_eq!(body, "duration=30");
    }

    #[tokio::test]
    async fn request_without_blank_line_is_all_headers() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client.write_all(b"GET /status HTTP/1.1").await.unwrap();

        let (headers, body) = read_request(&mut server, TIMEOUT).await;
        assert_eq!(headers, "GET /status HTTP/1.1");
        assert!(body.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_reading_until_content_length() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client
            .write_all(b"POST /start_batch HTTP/1.1\r\ncontent-length: 24\r\n\r\nduration=10&")
            .await
            .unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.write_all(b"label=").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.write_all(b"field").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.write_all(b"!").await.unwrap();
            // keep the stream open; the reader must stop on length alone
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let (_, body) = read_request(&mut server, TIMEOUT).await;
        assert_eq!(body, "duration=10&label=field!");
    }

    #[tokio::test]
    async fn partial_body_is_accepted_when_peer_closes() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client
            .write_all(b"POST /start_logging HTTP/1.1\r\nContent-Length: 100\r\n\r\nlabel=short")
            .await
            .unwrap();
        drop(client);

        let (_, body) = read_request(&mut server, TIMEOUT).await;
        assert_eq!(body, "label=short");
    }

    #[tokio::test]
    async fn get_ignores_content_length() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client
            .write_all(b"GET / HTTP/1.1\r\nContent-Length: 50\r\n\r\n")
            .await
            .unwrap();

        // would hang for the timeout if the body were awaited
        let (headers, body) = tokio::time::timeout(Duration::from_secs(1), read_request(&mut server, TIMEOUT))
            .await
            .unwrap();
        assert!(headers.starts_with("GET / "));
        assert!(body.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn trickling_body_is_cut_off_at_the_deadline() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client
            .write_all(b"POST /start_logging HTTP/1.1\r\nContent-Length: 100\r\n\r\n")
            .await
            .unwrap();
        tokio::spawn(async move {
            for _ in 0..50 {
                tokio::time::sleep(Duration::from_secs(4)).await;
                if client.write_all(b"a").await.is_err() {
                    break;
                }
            }
        });

        let started = tokio::time::Instant::now();
        let (_, body) = read_request(&mut server, TIMEOUT).await;
        assert!(started.elapsed() <= TIMEOUT + Duration::from_millis(10));
        assert_eq!(body, "a");
    }

    #[tokio::test]
    async fn oversized_content_length_is_capped() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        client
            .write_all(b"POST /start_logging HTTP/1.1\r\nContent-Length: 1000000\r\n\r\n")
            .await
            .unwrap();
        client.write_all(&vec![b'x'; 10_000]).await.unwrap();

        let (_, body) = read_request(&mut server, TIMEOUT).await;
        assert_eq!(body.len(), MAX_BODY);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out_with_empty_request() {
        let (_client, mut server) = tokio::io::duplex(8192);

        let started = tokio::time::Instant::now();
        let (headers, body) = read_request(&mut server, TIMEOUT).await;
        assert!(headers.is_empty());
        assert!(body.is_empty());
        assert_eq!(started.elapsed(), TIMEOUT);
    }

    #[test]
    fn request_line_strips_query() {
        let line = RequestLine::parse("GET /status?verbose=1 HTTP/1.1\r\nHost: x").unwrap();
        assert_eq!(line.method, "GET");
        assert_eq!(line.path, "/status");
        assert!(RequestLine::parse("").is_none());
        assert!(RequestLine::parse("GARBAGE").is_none());
    }

    #[test]
    fn content_length_is_case_insensitive() {
        assert_eq!(content_length("POST / HTTP/1.1\r\nCONTENT-LENGTH: 7"), Some(7));
        assert_eq!(content_length("POST / HTTP/1.1\r\nContent-Length: abc"), None);
        assert_eq!(content_length("POST / HTTP/1.1\r\nHost: x"), None);
    }
}
