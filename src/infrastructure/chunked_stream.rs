// Chunked JSON streaming utilities
use crate::infrastructure::http_response::brotli_compress;
use axum::body::Body;
use axum::http::{Response, StatusCode, header};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::WatchStream;

/// Create a chunked streaming response. Each message becomes one
/// length-prefixed chunk.
pub fn chunked_json_stream<S, T>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let byte_stream = stream.then(move |msg| {
        let json = serde_json::to_vec(&msg).map_err(std::io::Error::other);
        async move { encode_chunk(json?, compress).await }
    });

    // Chunks are compressed individually, so the response itself carries no
    // Content-Encoding.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-chunked-json")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Frame one serialized message: 4-byte big-endian length, then the
/// (optionally Brotli-compressed) JSON payload
async fn encode_chunk(buffer: Vec<u8>, compress: bool) -> Result<Bytes, std::io::Error> {
    let payload = if compress {
        brotli_compress(buffer).await?
    } else {
        buffer
    };

    let length = u32::try_from(payload.len()).map_err(std::io::Error::other)?;
    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(length);
    chunk.put_slice(&payload);

    Ok(chunk.freeze())
}

/// Stream every message sent on `rx` until all senders are gone
pub fn stream_from_receiver<T>(mut rx: mpsc::Receiver<T>, compress: bool) -> impl IntoResponse
where
    T: Serialize + Send + 'static,
{
    let stream = async_stream::stream! {
        while let Some(msg) = rx.recv().await {
            yield msg;
        }
    };

    match chunked_json_stream(stream, compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Stream the current value of `rx` and every later change
pub fn stream_from_watch<T>(rx: watch::Receiver<T>, compress: bool) -> impl IntoResponse
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    match chunked_json_stream(WatchStream::new(rx), compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunk_is_length_prefixed() {
        let json = serde_json::to_vec(&serde_json::json!({"v": 1})).unwrap();
        let chunk = encode_chunk(json, false).await.unwrap();
        let payload = br#"{"v":1}"#;

        assert_eq!(&chunk[..4], &(payload.len() as u32).to_be_bytes());
        assert_eq!(&chunk[4..], payload);
    }

    #[tokio::test]
    async fn test_compressed_chunk_length_matches_payload() {
        let chunk = encode_chunk(vec![b'x'; 4096], true).await.unwrap();
        let length = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize;
        assert_eq!(length, chunk.len() - 4);
    }
}
