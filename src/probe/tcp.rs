//! TCP connect, banner grab and HTTP title extraction

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Bytes read from an unprompted banner
const BANNER_LIMIT: usize = 1024;

/// Longest title kept from an HTML page
const TITLE_LIMIT: usize = 200;

/// Bytes of an HTTP body searched for a title
const BODY_LIMIT: usize = 64 * 1024;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid"));

/// Connect with a deadline, returning the stream and the connect time
pub async fn connect(addr: SocketAddr, wait: Duration) -> Option<(TcpStream, Duration)> {
    let start = Instant::now();
    match timeout(wait, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Some((stream, start.elapsed())),
        Ok(Err(e)) => {
            debug!("{} closed: {}", addr, e);
            None
        }
        Err(_) => {
            debug!("{} timed out", addr);
            None
        }
    }
}

/// Read whatever the service volunteers within `wait`
pub async fn read_banner(stream: &mut TcpStream, wait: Duration) -> Option<String> {
    let mut buf = vec![0u8; BANNER_LIMIT];
    match timeout(wait, stream.read(&mut buf)).await {
        Ok(Ok(size)) if size > 0 => clean_banner(&buf[..size]),
        _ => None,
    }
}

/// Printable, trimmed banner text; `None` when nothing useful remains
pub fn clean_banner(raw: &[u8]) -> Option<String> {
    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .map(|c| if c.is_control() && c != '\n' { ' ' } else { c })
        .collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Text of the first `<title>` element, whitespace collapsed
pub fn extract_title(html: &str) -> Option<String> {
    let captures = TITLE_RE.captures(html)?;
    let title = captures
        .get(1)?
        .as_str()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        None
    } else {
        Some(title.chars().take(TITLE_LIMIT).collect())
    }
}

fn has_title_end(body: &[u8]) -> bool {
    body.windows(8).any(|w| w.eq_ignore_ascii_case(b"</title>"))
}

/// GET `/` and pull the page title from at most [`BODY_LIMIT`] bytes of body
pub async fn fetch_http_title(
    client: &reqwest::Client,
    host: &str,
    port: u16,
    tls: bool,
) -> Option<String> {
    let scheme = if tls { "https" } else { "http" };
    let url = format!("{}://{}:{}/", scheme, host, port);

    let mut response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("GET {} failed: {}", url, e);
            return None;
        }
    };

    let mut body: Vec<u8> = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let room = BODY_LIMIT - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if body.len() >= BODY_LIMIT || has_title_end(&body) {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("reading {} failed: {}", url, e);
                break;
            }
        }
    }

    extract_title(&String::from_utf8_lossy(&body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_extract_title() {
        let html = "<html><head>\n<TITLE class=\"x\">\n  Router   Login </TITLE></head></html>";
        assert_eq!(extract_title(html), Some("Router Login".to_string()));
        assert_eq!(extract_title("<html><title></title></html>"), None);
        assert_eq!(extract_title("no markup here"), None);
    }

    #[test]
    fn test_clean_banner() {
        assert_eq!(
            clean_banner(b"SSH-2.0-OpenSSH_9.6\r\n"),
            Some("SSH-2.0-OpenSSH_9.6".to_string())
        );
        assert_eq!(clean_banner(b"\r\n\0\0"), None);
    }

    #[tokio::test]
    async fn test_connect_and_banner_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 test ftp ready\r\n").await.unwrap();
        });

        let (mut stream, elapsed) = connect(addr, Duration::from_secs(2)).await.unwrap();
        assert!(elapsed < Duration::from_secs(2));

        let banner = read_banner(&mut stream, Duration::from_secs(2)).await;
        assert_eq!(banner, Some("220 test ftp ready".to_string()));
    }

    /// Serve one HTTP response whose body is `prefix` followed by `padding`
    /// bytes, then the rest of the page
    async fn serve_page(prefix: &'static str, padding: usize, suffix: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;

            let length = prefix.len() + padding + suffix.len();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n",
                length
            );
            // the client hangs up once it has enough, so write errors are expected
            if socket.write_all(head.as_bytes()).await.is_err()
                || socket.write_all(prefix.as_bytes()).await.is_err()
            {
                return;
            }
            let block = vec![b'x'; 16 * 1024];
            let mut left = padding;
            while left > 0 {
                let n = left.min(block.len());
                if socket.write_all(&block[..n]).await.is_err() {
                    return;
                }
                left -= n;
            }
            let _ = socket.write_all(suffix.as_bytes()).await;
        });

        addr
    }

    #[tokio::test]
    async fn test_title_read_stops_early_on_huge_body() {
        let head = "<html><head><title>Switch Admin</title></head><body>";
        let addr = serve_page(head, 64 * 1024 * 1024, "</body></html>").await;
        let client = reqwest::Client::new();

        let title = tokio::time::timeout(
            Duration::from_secs(5),
            fetch_http_title(&client, "127.0.0.1", addr.port(), false),
        )
        .await
        .unwrap();
        assert_eq!(title, Some("Switch Admin".to_string()));
    }

    #[tokio::test]
    async fn test_title_past_body_limit_is_ignored() {
        let addr = serve_page("<html><body>", 8 * 1024 * 1024, "<title>Too Late</title></body></html>").await;
        let client = reqwest::Client::new();

        let title = tokio::time::timeout(
            Duration::from_secs(5),
            fetch_http_title(&client, "127.0.0.1", addr.port(), false),
        )
        .await
        .unwrap();
        assert_eq!(title, None);
    }

    #[test]
    fn test_title_end_detection() {
        assert!(has_title_end(b"<TITLE>x</Title>"));
        assert!(!has_title_end(b"<title>x</titl"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(connect(addr, Duration::from_millis(500)).await.is_none());
    }
}
