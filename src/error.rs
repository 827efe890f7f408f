//! Crate-wide error type.
//!
//! Every variant carries enough context to diagnose the failure without the
//! originating error. None of them is fatal to the process: callers map an
//! error to a fallback value for the panel that issued the request.

use thiserror::Error;

/// Errors produced by the remote clients, the scraper and the local store.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// A TCP-level connection could not be established or the request died.
    #[error("connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },

    /// Response body could not be decoded as the expected JSON shape.
    #[error("JSON decode error from {url}: {detail}")]
    Json { url: String, detail: String },

    /// Every configured proxy failed to return the page.
    #[error("problem page retrieval failed for {url}")]
    RetrievalFailed { url: String },

    /// The page was fetched but carries no task-statement container.
    #[error("problem content extraction failed for {url}")]
    ExtractionFailed { url: String },

    /// The contest task list had no problem rows.
    #[error("no problems found for contest {contest}")]
    NoProblems { contest: String },

    /// `/api/atcoder` was called without a contest id.
    #[error("contest id is missing")]
    MissingContest,

    /// A pasted URL is not a YouTube `/live/` URL.
    #[error("not a YouTube live URL: {url}")]
    InvalidLiveUrl { url: String },

    #[error("local store error: {detail}")]
    Store { detail: String },

    #[error("configuration error: {detail}")]
    Config { detail: String },
}

impl LiveError {
    /// Text shown to the user in place of the failed panel.
    pub fn user_message(&self) -> String {
        match self {
            LiveError::RetrievalFailed { .. } => "問題ページの取得に失敗しました".to_string(),
            LiveError::ExtractionFailed { .. } => "問題内容の抽出に失敗しました".to_string(),
            LiveError::NoProblems { .. } => {
                "問題が見つかりませんでした。コンテストIDが正しいか確認してください。".to_string()
            }
            LiveError::MissingContest => "コンテストIDが指定されていません".to_string(),
            LiveError::InvalidLiveUrl { .. } => "ライブ動画のURLのみ対応しています。".to_string(),
            other => format!("エラーが発生しました。詳細: {other}"),
        }
    }

    /// HTTP status the local API answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            LiveError::MissingContest | LiveError::InvalidLiveUrl { .. } => 400,
            LiveError::NoProblems { .. } => 404,
            LiveError::RetrievalFailed { .. } | LiveError::ExtractionFailed { .. } => 502,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, LiveError>;
