use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Classification of segment writer failures surfaced through
/// [`TsMuxerDelegate::writer_error`].
///
/// Writer failures never interrupt the muxer; the stream keeps flowing and
/// the next segment boundary is tagged discontinuous where appropriate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterErrorKind {
    /// The output directory could not be created; only in-memory byte
    /// callbacks will fire
    TempDirectory,
    /// A pruned segment file could not be removed from disk
    RemoveItem,
    /// Appending media bytes to the current segment file failed
    Write,
    /// Creating a segment file or writing the playlist failed
    WriteToUrl,
    /// Syncing and closing a finished segment file failed
    SyncAndClose,
}

/// Observer interface for muxer output and segment lifecycle events.
///
/// All methods default to no-ops so implementers subscribe only to what
/// they need. The muxer holds the delegate behind shared ownership and
/// never receives a reference back, so there is no ownership cycle.
#[async_trait]
pub trait TsMuxerDelegate: Send + Sync {
    /// Raw transport stream bytes, fired for every write irrespective of
    /// segmentation.
    async fn did_output(&self, _bytes: &[u8]) {}

    /// A segment boundary completed at the given media timestamp.
    async fn did_rotate(&self, _timestamp: Duration) {}

    /// A segment file was finished and is safe to serve.
    async fn did_generate_ts(&self, _path: &Path) {}

    /// The playlist was rewritten.
    async fn did_generate_m3u8(&self, _path: &Path) {}

    /// A recoverable writer failure occurred.
    async fn writer_error(&self, _kind: WriterErrorKind, _message: &str) {}
}
