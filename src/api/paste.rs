use super::{send_with_retry, ApiError};

const SERVICE: &str = "paste service";

/// Uploads plain text to a paste service that answers with the paste URL.
#[derive(Clone)]
pub struct PasteClient {
    http: reqwest::Client,
    url: String,
    attempts: u32,
}

impl PasteClient {
    pub fn new(http: reqwest::Client, url: &str, attempts: u32) -> Self {
        Self {
            http,
            url: url.to_string(),
            attempts,
        }
    }

    pub async fn upload(&self, text: &str) -> Result<String, ApiError> {
        let response = send_with_retry(SERVICE, self.attempts, || {
            self.http.post(&self.url).body(text.to_string())
        })
        .await?;
        let body = response.text().await?;
        parse_paste_url(&body)
    }
}

fn parse_paste_url(body: &str) -> Result<String, ApiError> {
    let url = body.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(ApiError::Parse {
            service: SERVICE,
            reason: format!("expected a URL, got {:?}", url.chars().take(80).collect::<String>()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paste_url() {
        assert_eq!(
            parse_paste_url("https://paste.rs/abc\n").unwrap(),
            "https://paste.rs/abc"
        );
        assert!(parse_paste_url("<html>error</html>").is_err());
    }
}
