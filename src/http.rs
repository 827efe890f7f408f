//! Thin request helpers shared by every remote client.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{LiveError, Result};

fn connect_error(url: &str, e: reqwest::Error) -> LiveError {
    LiveError::Connect {
        url: url.to_string(),
        detail: e.to_string(),
    }
}

fn ensure_success(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        return Err(LiveError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(resp)
}

fn decode<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| LiveError::Json {
        url: url.to_string(),
        detail: e.to_string(),
    })
}

/// GET `url` and decode the body as JSON.
///
/// # Returns
/// - `Err(LiveError::Connect)`: transport failure.
/// - `Err(LiveError::Http)`: non-2xx status.
/// - `Err(LiveError::Json)`: undecodable body.
pub async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    debug!(%url, "GET json");
    let resp = client.get(url).send().await.map_err(|e| connect_error(url, e))?;
    let resp = ensure_success(resp, url)?;
    let bytes = resp.bytes().await.map_err(|e| connect_error(url, e))?;
    decode(url, &bytes)
}

/// GET `url` with optional query pairs and return the body as text.
pub async fn get_text(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
) -> Result<String> {
    debug!(%url, "GET text");
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| connect_error(url, e))?;
    let resp = ensure_success(resp, url)?;
    resp.text().await.map_err(|e| connect_error(url, e))
}

/// POST `body` as JSON to `url` and decode the JSON reply.
pub async fn post_json<B, T>(client: &reqwest::Client, url: &str, body: &B) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    debug!(%url, "POST json");
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| connect_error(url, e))?;
    let resp = ensure_success(resp, url)?;
    let bytes = resp.bytes().await.map_err(|e| connect_error(url, e))?;
    decode(url, &bytes)
}

/// POST `body` as JSON and only check the status.
pub async fn post_unit<B>(client: &reqwest::Client, url: &str, body: &B) -> Result<()>
where
    B: Serialize + ?Sized,
{
    debug!(%url, "POST");
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| connect_error(url, e))?;
    ensure_success(resp, url).map(|_| ())
}
