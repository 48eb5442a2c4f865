//! Decoding of the API server's newline-delimited JSON watch stream.

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

use crate::cache::WatchEvent;
use crate::error::{Error, Result};

/// Longest watch line accepted. A longer line fails the watch.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    object: serde_json::Value,
}

/// `metav1.Status`, sent as the object of an `ERROR` event.
#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

/// Decode one line. Bookmarks carry no object change and yield `None`.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<Option<WatchEvent<T>>> {
    let raw: RawEvent = serde_json::from_str(line)?;
    let event = match raw.kind.as_str() {
        "ADDED" => WatchEvent::Added(serde_json::from_value(raw.object)?),
        "MODIFIED" => WatchEvent::Modified(serde_json::from_value(raw.object)?),
        "DELETED" => WatchEvent::Deleted(serde_json::from_value(raw.object)?),
        "BOOKMARK" => return Ok(None),
        "ERROR" => {
            let status: Status = serde_json::from_value(raw.object).unwrap_or_default();
            return Err(Error::Watch(format!(
                "{} {}: {}",
                status.code, status.reason, status.message
            )));
        }
        other => return Err(Error::Watch(format!("unknown event type {other:?}"))),
    };
    Ok(Some(event))
}

/// Turn a streaming watch response into typed events.
pub fn event_stream<T>(response: reqwest::Response) -> BoxStream<'static, Result<WatchEvent<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    event_stream_with_limit(response, MAX_LINE_BYTES)
}

/// Like [`event_stream`], with a custom cap on the length of one line.
pub fn event_stream_with_limit<T>(
    response: reqwest::Response,
    max_line_bytes: usize,
) -> BoxStream<'static, Result<WatchEvent<T>>>
where
    T: DeserializeOwned + Send + 'static,
{
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let codec = LinesCodec::new_with_max_length(max_line_bytes);
    FramedRead::new(StreamReader::new(body), codec)
        .filter_map(|line| async move {
            match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => decode_line(&line).transpose(),
                Err(e) => Some(Err(Error::Watch(e.to_string()))),
            }
        })
        .boxed()
}
