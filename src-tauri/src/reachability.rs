use crate::constants::REACHABILITY_TIMEOUT;
use log::{debug, warn};
use reqwest::Client;
use std::time::Duration;

/// Whether `url` answers at all within the default timeout.
pub async fn is_reachable(url: &str) -> bool {
    is_reachable_within(url, REACHABILITY_TIMEOUT).await
}

/// Any HTTP response counts, whatever its status. Connect failures and
/// timeouts do not.
pub async fn is_reachable_within(url: &str, timeout: Duration) -> bool {
    let client = match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("[Network] Failed to create HTTP client: {}", e);
            return false;
        }
    };

    match client
        .head(url)
        .header("User-Agent", "mk48desktop/0.1")
        .send()
        .await
    {
        Ok(response) => {
            debug!("[Network] {} answered HTTP {}", url, response.status().as_u16());
            true
        }
        Err(e) => {
            if e.is_timeout() {
                warn!("[Network] {} timed out after {:?}", url, timeout);
            } else if e.is_connect() {
                warn!("[Network] Failed to connect to {}", url);
            } else {
                warn!("[Network] {} is unreachable: {}", url, e);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_any_status_is_reachable() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        assert!(is_reachable_within(&url, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let url = format!("http://{}/", addr);
        assert!(!is_reachable_within(&url, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_invalid_url_is_unreachable() {
        assert!(!is_reachable_within("not a url", Duration::from_secs(1)).await);
    }
}
