use std::time::Duration;

use axum::body::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};

use crate::config::Config;
use crate::error::{RelayError, RelayResult};
use crate::transfer::TransferKey;

/// forward-only sequence of relayed chunks, ends after the first error
pub type ChunkStream = BoxStream<'static, Result<Bytes, RelayError>>;

/// upstream response metadata needed downstream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayHead {
    pub content_type: Option<String>,
    /// declared content length, `None` when the header is absent or garbage
    pub content_length: Option<u64>,
}

impl RelayHead {
    fn from_headers(headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        // read the header directly, reqwest reports 0 for bodiless responses
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        Self { content_type, content_length }
    }
}

/// an open upstream fetch; dropping it closes the upstream connection
pub struct Relay {
    pub head: RelayHead,
    pub chunks: ChunkStream,
}

/// opens streamed upstream fetches and re-emits them as fixed size chunks
#[derive(Clone)]
pub struct RelayEngine {
    client: reqwest::Client,
    chunk_size: usize,
    read_timeout: Duration,
}

impl RelayEngine {
    pub fn new(config: &Config) -> RelayResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(RelayError::Client)?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
            read_timeout: config.read_timeout,
        })
    }

    /// start a streamed GET for `key`; the body is not read until the chunks are polled
    pub async fn open(&self, key: &TransferKey) -> RelayResult<Relay> {
        tracing::debug!("Opening upstream stream: {}", key);

        let response = self
            .client
            .get(key.as_str())
            .send()
            .await
            .map_err(RelayError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Upstream {} answered {}", key, status);
            return Err(RelayError::Status(status));
        }

        let head = RelayHead::from_headers(response.headers());
        tracing::debug!(
            "Upstream {} ready (type: {:?}, length: {:?})",
            key,
            head.content_type,
            head.content_length
        );

        let chunks = rechunk(response.bytes_stream().boxed(), self.chunk_size, self.read_timeout);
        Ok(Relay { head, chunks })
    }

    /// fetch only the headers of `key` with a HEAD request
    pub async fn probe(&self, key: &TransferKey) -> RelayResult<RelayHead> {
        tracing::debug!("Probing upstream: {}", key);

        let response = self
            .client
            .head(key.as_str())
            .timeout(self.read_timeout)
            .send()
            .await
            .map_err(RelayError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status));
        }

        Ok(RelayHead::from_headers(response.headers()))
    }
}

/// regroup upstream frames into `chunk_size` chunks, the last one may be short
///
/// at most one chunk plus one upstream frame is buffered, so a slow consumer
/// throttles the upstream read instead of growing memory.
pub fn rechunk<S>(upstream: S, chunk_size: usize, read_timeout: Duration) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + Unpin + 'static,
{
    let chunk_size = chunk_size.max(1);
    let state = Some((upstream, Vec::with_capacity(chunk_size)));

    stream::unfold(state, move |state| async move {
        let (mut upstream, mut buf) = state?;
        loop {
            if buf.len() >= chunk_size {
                let mut rest = Vec::with_capacity(chunk_size);
                rest.extend_from_slice(&buf[chunk_size..]);
                buf.truncate(chunk_size);
                return Some((Ok(Bytes::from(buf)), Some((upstream, rest))));
            }

            match tokio::time::timeout(read_timeout, upstream.next()).await {
                Ok(Some(Ok(frame))) => buf.extend_from_slice(&frame),
                Ok(Some(Err(e))) => return Some((Err(RelayError::Interrupted(e)), None)),
                Ok(None) if buf.is_empty() => return None,
                Ok(None) => return Some((Ok(Bytes::from(buf)), None)),
                Err(_) => return Some((Err(RelayError::Timeout(read_timeout)), None)),
            }
        }
    })
    .boxed()
}
