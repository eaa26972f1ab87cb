//! Clip recording building blocks: the chunk buffer, the finished
//! [`ClipPayload`], and the encoding preference chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// MIME type assumed when a recorder does not report one.
pub const DEFAULT_CLIP_MIME: &str = "video/webm";

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// ClipPayload
// ---------------------------------------------------------------------------

/// One finished clip: the encoded bytes plus everything the rest of the
/// system needs to send, replay or download it.
#[derive(Debug, Clone)]
pub struct ClipPayload {
    /// Standard base64 of `blob`, ready for an inline media payload.
    pub base64: String,
    /// Container / codec of `blob`.
    pub mime_type: String,
    /// The encoded clip.
    pub blob: Arc<[u8]>,
    /// Process-unique locator for this clip (`blob:visionally/<n>`).
    pub url: String,
}

impl ClipPayload {
    /// Encode `blob` and assign it a fresh locator.
    pub fn new(blob: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let base64 = BASE64.encode(&blob);
        let id = NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            base64,
            mime_type: mime_type.into(),
            blob: Arc::from(blob),
            url: format!("blob:visionally/{id}"),
        }
    }

    /// Size of the encoded clip in bytes.
    pub fn len(&self) -> usize {
        self.blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RecordingBuffer
// ---------------------------------------------------------------------------

/// Ordered chunks accumulated during one recording cycle.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    chunks: Vec<Vec<u8>>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks carry no data and are dropped.
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Number of buffered chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total buffered bytes.
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate every chunk into one clip and empty the buffer.
    pub fn flush(&mut self, mime_type: &str) -> ClipPayload {
        let mut blob = Vec::with_capacity(self.byte_len());
        for chunk in self.chunks.drain(..) {
            blob.extend_from_slice(&chunk);
        }
        let mime = if mime_type.trim().is_empty() {
            DEFAULT_CLIP_MIME
        } else {
            mime_type
        };
        ClipPayload::new(blob, mime)
    }
}

// ---------------------------------------------------------------------------
// Encoding selection
// ---------------------------------------------------------------------------

/// Pick the first entry of `preferences` that `is_supported` accepts.
///
/// `None` means "let the recorder use its baseline default".
///
/// ```
/// use visionally::device::select_encoding;
///
/// let prefs = vec!["video/webm; codecs=vp9".to_string(), "video/mp4".to_string()];
/// assert_eq!(select_encoding(&prefs, |m| m == "video/mp4"), Some("video/mp4"));
/// assert_eq!(select_encoding(&prefs, |_| false), None);
/// ```
pub fn select_encoding<'a>(
    preferences: &'a [String],
    is_supported: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    preferences
        .iter()
        .map(String::as_str)
        .find(|mime| is_supported(mime))
}

/// File extension for a clip of the given MIME type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "video/ogg" => "ogg",
        _ => "bin",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_concatenates_in_order_and_clears() {
        let mut buf = RecordingBuffer::new();
        buf.push(b"ab".to_vec());
        buf.push(Vec::new());
        buf.push(b"cd".to_vec());
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.byte_len(), 4);

        let clip = buf.flush("video/mp4");
        assert_eq!(&*clip.blob, b"abcd");
        assert_eq!(clip.mime_type, "video/mp4");
        assert_eq!(clip.base64, "YWJjZA==");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_mime_falls_back_to_webm() {
        let mut buf = RecordingBuffer::new();
        buf.push(vec![1, 2, 3]);
        assert_eq!(buf.flush("").mime_type, DEFAULT_CLIP_MIME);
    }

    #[test]
    fn every_clip_gets_a_distinct_url() {
        let a = ClipPayload::new(vec![1], "video/webm");
        let b = ClipPayload::new(vec![1], "video/webm");
        assert_ne!(a.url, b.url);
        assert!(a.url.starts_with("blob:visionally/"));
    }

    #[test]
    fn selection_respects_preference_order() {
        let prefs: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(select_encoding(&prefs, |m| m != "a"), Some("b"));
        assert_eq!(select_encoding(&prefs, |_| true), Some("a"));
        assert_eq!(select_encoding(&[], |_| true), None);
    }

    #[test]
    fn extensions_follow_mime_essence() {
        assert_eq!(extension_for_mime("video/webm; codecs=vp9"), "webm");
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("audio/wav"), "wav");
        assert_eq!(extension_for_mime("application/x-unknown"), "bin");
    }
}
