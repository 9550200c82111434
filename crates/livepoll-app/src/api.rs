// Poll backend HTTP client.
//
// Fetches poll snapshots for validation and posts answer values. The backend
// accepts one value per request, so a schema is submitted value by value in
// order and the last stored `Answer` is returned.

use async_trait::async_trait;
use livepoll_core::{Answer, AnswerSchema, Poll, PollId, Value};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const POLL_PATH: &str = "polls/get";
const ADD_VALUE_PATH: &str = "answers/add/value";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("answer has no values to submit")]
    EmptySubmission,
}

/// Backend operations the session depends on.
#[async_trait]
pub trait PollApi: Send + Sync {
    async fn fetch_poll(&self, poll_id: PollId) -> Result<Poll, ApiError>;

    async fn submit(&self, poll_id: PollId, schema: &AnswerSchema) -> Result<Answer, ApiError>;
}

/// `{base}/{path}?poll_id=<id>`, treating `base` as a directory even when it
/// has no trailing slash.
pub(crate) fn endpoint(base: &Url, path: &str, poll_id: PollId) -> Result<Url, String> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    let mut url = base.join(path).map_err(|e| e.to_string())?;
    url.query_pairs_mut()
        .append_pair("poll_id", &poll_id.to_string());
    Ok(url)
}

// ---------------------------------------------------------------------------
// HttpPollApi
// ---------------------------------------------------------------------------

pub struct HttpPollApi {
    http: reqwest::Client,
    base: Url,
}

impl HttpPollApi {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    pub fn poll_url(&self, poll_id: PollId) -> Result<Url, ApiError> {
        endpoint(&self.base, POLL_PATH, poll_id).map_err(ApiError::InvalidUrl)
    }

    pub fn add_value_url(&self, poll_id: PollId) -> Result<Url, ApiError> {
        endpoint(&self.base, ADD_VALUE_PATH, poll_id).map_err(ApiError::InvalidUrl)
    }

    async fn add_value(&self, poll_id: PollId, value: &Value) -> Result<Answer, ApiError> {
        let url = self.add_value_url(poll_id)?;
        debug!(question_id = %value.question_id(), "posting answer value");
        let response = self.http.post(url).json(value).send().await?;
        decode(response).await
    }
}

/// Turn a backend response into `T`, mapping any non-200 status to
/// `ApiError::Status` with the response body as the message.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    if status != StatusCode::OK {
        return Err(ApiError::Status {
            status,
            message: body,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

#[async_trait]
impl PollApi for HttpPollApi {
    async fn fetch_poll(&self, poll_id: PollId) -> Result<Poll, ApiError> {
        let url = self.poll_url(poll_id)?;
        let response = self.http.get(url).send().await?;
        let poll: Poll = decode(response).await?;
        info!("Fetched poll {} ({} questions)", poll.id, poll.poll.questions().count());
        Ok(poll)
    }

    async fn submit(&self, poll_id: PollId, schema: &AnswerSchema) -> Result<Answer, ApiError> {
        let mut stored = None;
        for value in schema.values() {
            stored = Some(self.add_value(poll_id, value).await?);
        }
        stored.ok_or(ApiError::EmptySubmission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpPollApi {
        HttpPollApi::new(Url::parse(base).unwrap())
    }

    #[test]
    fn endpoints_keep_base_path() {
        let api = api("http://localhost:8000/api/v1");
        assert_eq!(
            api.add_value_url(PollId(7)).unwrap().as_str(),
            "http://localhost:8000/api/v1/answers/add/value?poll_id=7"
        );
        assert_eq!(
            api.poll_url(PollId(7)).unwrap().as_str(),
            "http://localhost:8000/api/v1/polls/get?poll_id=7"
        );
    }

    #[test]
    fn endpoints_on_bare_host() {
        let api = api("https://polls.example.com");
        assert_eq!(
            api.add_value_url(PollId(-3)).unwrap().as_str(),
            "https://polls.example.com/answers/add/value?poll_id=-3"
        );
    }

    #[test]
    fn trailing_slash_is_not_doubled() {
        let api = api("http://localhost:8000/api/");
        assert_eq!(
            api.poll_url(PollId(1)).unwrap().as_str(),
            "http://localhost:8000/api/polls/get?poll_id=1"
        );
    }

    #[tokio::test]
    async fn empty_schema_is_rejected_without_a_request() {
        // Port 9 (discard) is never contacted: the loop body does not run.
        let api = api("http://127.0.0.1:9");
        let schema = AnswerSchema::new(Vec::new()).unwrap();
        let err = api.submit(PollId(1), &schema).await.unwrap_err();
        assert!(matches!(err, ApiError::EmptySubmission));
    }
}
