use crate::error::{OjsError, OjsResult};
use crate::types::{
    ArticlePatch, Page, RemoteComment, RemoteIssue, RemoteJournal, RemoteReview, RemoteSubmission,
    RemoteUser,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Remote operations the sync engine performs against one OJS instance.
#[async_trait]
pub trait OjsApi: Send + Sync {
    async fn list_journals(&self) -> OjsResult<Page<RemoteJournal>>;

    /// Lightweight authenticated request used by the health monitor.
    async fn probe(&self) -> OjsResult<()>;

    async fn list_submissions(
        &self,
        journal_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteSubmission>>;

    async fn get_article(&self, article_id: i64) -> OjsResult<RemoteSubmission>;

    async fn create_article(
        &self,
        journal_id: i64,
        patch: &ArticlePatch,
    ) -> OjsResult<RemoteSubmission>;

    async fn update_article(
        &self,
        article_id: i64,
        patch: &ArticlePatch,
    ) -> OjsResult<RemoteSubmission>;

    async fn delete_article(&self, article_id: i64) -> OjsResult<()>;

    async fn list_users(
        &self,
        journal_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteUser>>;

    async fn list_issues(
        &self,
        journal_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteIssue>>;

    async fn list_reviews(
        &self,
        submission_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteReview>>;

    async fn list_comments(
        &self,
        submission_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteComment>>;

    /// Fetches a galley file by its absolute URL.
    async fn download_file(&self, url: &str) -> OjsResult<Vec<u8>>;
}

/// Client for one OJS instance, authenticated with that instance's key.
pub struct OjsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OjsClient {
    /// `base_url` is the instance root (e.g. `https://journals.example.edu`);
    /// the `/api/v1` prefix is appended per request. Every call carries
    /// `timeout` end to end.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> OjsResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> OjsResult<T> {
        let url = self.api_url(path);
        debug!(url = %url, "Making OJS API request");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        self.parse_json(path, response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> OjsResult<T> {
        let url = self.api_url(path);
        debug!(url = %url, "Making OJS API request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        self.parse_json(path, response).await
    }

    async fn put_json<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> OjsResult<T> {
        let url = self.api_url(path);
        debug!(url = %url, "Making OJS API request");

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        self.parse_json(path, response).await
    }

    async fn delete(&self, path: &str) -> OjsResult<()> {
        let url = self.api_url(path);
        debug!(url = %url, "Making OJS API request");

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            _ => Err(self.error_for(path, response).await),
        }
    }

    async fn parse_json<T: DeserializeOwned>(
        &self,
        path: &str,
        response: Response,
    ) -> OjsResult<T> {
        // Writes answer 200 or 201 depending on the OJS version; any
        // 2xx carries the payload.
        match response.status() {
            status if status.is_success() => {
                let body = response.text().await?;
                serde_json::from_str(&body).map_err(|e| OjsError::Decode(e.to_string()))
            }
            _ => Err(self.error_for(path, response).await),
        }
    }

    async fn error_for(&self, path: &str, response: Response) -> OjsError {
        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => OjsError::Authentication(format!(
                "the remote instance rejected the API key for {}",
                path
            )),
            StatusCode::FORBIDDEN => {
                OjsError::Authorization(format!("the API key lacks permission for {}", path))
            }
            StatusCode::NOT_FOUND => OjsError::NotFound(path.to_string()),
            StatusCode::NOT_ACCEPTABLE => {
                let body = response.text().await.unwrap_or_default();
                if looks_like_html(&body) {
                    OjsError::NotAcceptable(
                        "received an HTML page instead of an API response, likely a \
                         firewall or proxy answering in between"
                            .to_string(),
                    )
                } else {
                    OjsError::NotAcceptable(
                        "the remote API rejected the requested representation".to_string(),
                    )
                }
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                OjsError::Api {
                    status: status.as_u16(),
                    body,
                }
            }
        }
    }
}

#[async_trait]
impl OjsApi for OjsClient {
    async fn list_journals(&self) -> OjsResult<Page<RemoteJournal>> {
        self.get_json("/journals").await
    }

    async fn probe(&self) -> OjsResult<()> {
        self.list_journals().await.map(|_| ())
    }

    async fn list_submissions(
        &self,
        journal_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteSubmission>> {
        self.get_json(&format!(
            "/submissions?journalId={}&offset={}&count={}",
            journal_id, offset, count
        ))
        .await
    }

    async fn get_article(&self, article_id: i64) -> OjsResult<RemoteSubmission> {
        self.get_json(&format!("/articles/{}", article_id)).await
    }

    async fn create_article(
        &self,
        journal_id: i64,
        patch: &ArticlePatch,
    ) -> OjsResult<RemoteSubmission> {
        self.post_json(&format!("/articles?journalId={}", journal_id), patch)
            .await
    }

    async fn update_article(
        &self,
        article_id: i64,
        patch: &ArticlePatch,
    ) -> OjsResult<RemoteSubmission> {
        self.put_json(&format!("/articles/{}", article_id), patch)
            .await
    }

    async fn delete_article(&self, article_id: i64) -> OjsResult<()> {
        self.delete(&format!("/articles/{}", article_id)).await
    }

    async fn list_users(
        &self,
        journal_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteUser>> {
        self.get_json(&format!(
            "/users?journalId={}&offset={}&count={}",
            journal_id, offset, count
        ))
        .await
    }

    async fn list_issues(
        &self,
        journal_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteIssue>> {
        self.get_json(&format!(
            "/issues?journalId={}&offset={}&count={}",
            journal_id, offset, count
        ))
        .await
    }

    async fn list_reviews(
        &self,
        submission_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteReview>> {
        self.get_json(&format!(
            "/reviews?submissionId={}&offset={}&count={}",
            submission_id, offset, count
        ))
        .await
    }

    async fn list_comments(
        &self,
        submission_id: i64,
        offset: i64,
        count: i64,
    ) -> OjsResult<Page<RemoteComment>> {
        self.get_json(&format!(
            "/comments?submissionId={}&offset={}&count={}",
            submission_id, offset, count
        ))
        .await
    }

    async fn download_file(&self, url: &str) -> OjsResult<Vec<u8>> {
        debug!(url = %url, "Downloading remote file");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            _ => Err(self.error_for(url, response).await),
        }
    }
}

/// Heuristic for 406 bodies: an HTML document means something answered
/// before the request reached the OJS API.
fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html") || head.contains("<html")
}

pub fn create_client(
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> OjsResult<Arc<dyn OjsApi>> {
    Ok(Arc::new(OjsClient::new(base_url, api_key, timeout)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OjsClient::new(
            "https://journals.example.edu/",
            "key",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.api_url("/submissions"),
            "https://journals.example.edu/api/v1/submissions"
        );
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html><body>Blocked</body></html>"));
        assert!(looks_like_html("  <html lang=\"en\">"));
        assert!(!looks_like_html("{\"error\": \"not acceptable\"}"));
        assert!(!looks_like_html("plain text"));
    }
}
