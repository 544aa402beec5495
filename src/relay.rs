//! Pass-through of the backend's byte stream as text chunks.
//!
//! Each backend chunk is decoded and forwarded as soon as it arrives. The
//! stream ends when the backend's stream ends; a backend read error is
//! forwarded as the final item so the outgoing response aborts instead of
//! closing cleanly.

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::{backend::ByteStream, decode::Utf8Decoder, error::ServiceError};

pub fn relay_text(
    mut upstream: ByteStream,
) -> impl Stream<Item = Result<String, ServiceError>> + Send + 'static {
    async_stream::stream! {
        let mut decoder = Utf8Decoder::new();
        let mut forwarded = 0usize;

        while let Some(chunk) = upstream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%err, forwarded, "backend stream failed mid-generation");
                    yield Err(err);
                    return;
                }
            };

            let text = decoder.decode(&bytes);
            if text.is_empty() {
                continue;
            }
            forwarded += 1;
            yield Ok(text);
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            yield Ok(tail);
        }
        debug!(forwarded, "backend stream closed");
    }
}
