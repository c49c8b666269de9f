//! HLS segment rotation and playlist management.
//!
//! The [`SegmentWriter`] owns the current segment file, the rolling list of
//! finished segments and the playlist on disk. Rotation is guarded by an
//! atomic latch and split into two halves joined with `tokio::join!`: one
//! finishes the bookkeeping (entry append, pruning, playlist rewrite), the
//! other rolls the file handle.

use super::delegate::{TsMuxerDelegate, WriterErrorKind};
use crate::error::Result;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// One finished segment listed in the playlist.
#[derive(Debug, Clone)]
pub struct MediaSegment {
    /// Segment file name relative to the output directory
    pub filename: String,
    /// Media time covered by the segment
    pub duration: Duration,
    /// The segment follows a timeline break and is tagged
    /// `#EXT-X-DISCONTINUITY`
    pub discontinuous: bool,
    /// The segment file saw a write failure and may be truncated
    pub skipped: bool,
}

struct CurrentSegment {
    file: File,
    path: PathBuf,
    broken: bool,
}

/// Writes transport stream bytes into rotating segment files and maintains
/// the sliding-window playlist next to them.
pub struct SegmentWriter {
    base_dir: PathBuf,
    playlist_name: String,
    segment_duration: Duration,
    max_segments: usize,
    sequence: u64,
    files: Vec<MediaSegment>,
    current: Option<CurrentSegment>,
    rotated_timestamp: Duration,
    pending_discontinuity: bool,
    rotating: AtomicBool,
    delegate: Option<Arc<dyn TsMuxerDelegate>>,
}

impl SegmentWriter {
    /// Creates a writer rooted at `base_dir`. No file is opened until the
    /// first rotation.
    ///
    /// # Arguments
    ///
    /// * `base_dir` - Directory where segments and the playlist are written
    /// * `playlist_name` - File name of the playlist inside `base_dir`
    /// * `segment_duration` - Target duration for each segment
    /// * `max_segments` - Sliding window size before old segments are deleted
    /// * `delegate` - Optional observer for lifecycle and error events
    pub fn new(
        base_dir: PathBuf,
        playlist_name: String,
        segment_duration: Duration,
        max_segments: usize,
        delegate: Option<Arc<dyn TsMuxerDelegate>>,
    ) -> Self {
        Self {
            base_dir,
            playlist_name,
            segment_duration,
            max_segments,
            sequence: 0,
            files: Vec::new(),
            current: None,
            rotated_timestamp: Duration::ZERO,
            pending_discontinuity: false,
            rotating: AtomicBool::new(false),
            delegate,
        }
    }

    /// Creates the output directory.
    pub async fn ensure_base_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    /// True once a segment file is open.
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Finished segments currently listed.
    pub fn files(&self) -> &[MediaSegment] {
        &self.files
    }

    /// Sequence number of the next segment file to create.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Requests a discontinuity tag on the next finished segment.
    pub fn mark_discontinuity(&mut self) {
        self.pending_discontinuity = true;
    }

    /// True when `timestamp` has moved past the current segment's budget.
    pub fn needs_rotation(&self, timestamp: Duration) -> bool {
        self.current.is_some()
            && timestamp
                .checked_sub(self.rotated_timestamp)
                .map_or(false, |elapsed| elapsed > self.segment_duration)
    }

    /// Appends transport stream bytes to the current segment file.
    ///
    /// Failures are reported through the delegate and mark the segment
    /// broken; the stream itself keeps flowing.
    pub async fn write(&mut self, bytes: &[u8]) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if let Err(err) = current.file.write_all(bytes).await {
            current.broken = true;
            self.pending_discontinuity = true;
            warn!("segment write failed: {}", err);
            if let Some(delegate) = &self.delegate {
                delegate
                    .writer_error(WriterErrorKind::Write, &err.to_string())
                    .await;
            }
        }
    }

    /// Performs a segment boundary at `timestamp`.
    ///
    /// Returns false when a rotation is already in flight; the duration
    /// check naturally re-fires on a later sample. On the first call no
    /// segment has finished yet, so only the new file is opened.
    ///
    /// # Arguments
    ///
    /// * `timestamp` - Media timestamp the boundary is placed at
    pub async fn rotate(&mut self, timestamp: Duration) -> bool {
        if self
            .rotating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("rotation already in flight, skipping trigger");
            return false;
        }

        let sequence = self.sequence;
        let finished = self.current.take();
        let duration = timestamp
            .checked_sub(self.rotated_timestamp)
            .unwrap_or_default();
        let finished_entry = finished.as_ref().map(|current| MediaSegment {
            filename: file_name_of(&current.path),
            duration,
            discontinuous: false,
            skipped: current.broken,
        });
        let discontinuous = if finished_entry.is_some() {
            std::mem::take(&mut self.pending_discontinuity)
        } else {
            false
        };

        let new_path = self.base_dir.join(segment_filename(sequence));
        let playlist_path = self.base_dir.join(&self.playlist_name);
        let base_dir = self.base_dir.clone();
        let segment_duration = self.segment_duration;
        let max_segments = self.max_segments;
        let files = &mut self.files;
        let bookkeeping_delegate = self.delegate.clone();
        let rollover_delegate = self.delegate.clone();

        let bookkeeping = async move {
            let mut finished_path = None;
            if let Some(mut entry) = finished_entry {
                entry.discontinuous = discontinuous;
                finished_path = Some(base_dir.join(&entry.filename));
                files.push(entry);
                prune_segments(files, max_segments, &base_dir, bookkeeping_delegate.as_ref()).await;
            }
            let media_sequence = sequence - files.len() as u64;
            let playlist = render_playlist(segment_duration, media_sequence, files);
            match fs::write(&playlist_path, playlist.as_bytes()).await {
                Ok(()) => {
                    if let Some(delegate) = &bookkeeping_delegate {
                        if let Some(path) = &finished_path {
                            delegate.did_generate_ts(path).await;
                        }
                        delegate.did_generate_m3u8(&playlist_path).await;
                    }
                }
                Err(err) => {
                    warn!("playlist write failed: {}", err);
                    if let Some(delegate) = &bookkeeping_delegate {
                        delegate
                            .writer_error(WriterErrorKind::WriteToUrl, &err.to_string())
                            .await;
                    }
                }
            }
        };

        let create_path = new_path.clone();
        let rollover = async move {
            if let Some(current) = finished {
                if let Err(err) = current.file.sync_all().await {
                    warn!("segment close failed: {}", err);
                    if let Some(delegate) = &rollover_delegate {
                        delegate
                            .writer_error(WriterErrorKind::SyncAndClose, &err.to_string())
                            .await;
                    }
                }
            }
            match File::create(&create_path).await {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!("segment create failed: {}", err);
                    if let Some(delegate) = &rollover_delegate {
                        delegate
                            .writer_error(WriterErrorKind::WriteToUrl, &err.to_string())
                            .await;
                    }
                    None
                }
            }
        };

        let ((), new_file) = tokio::join!(bookkeeping, rollover);

        self.current = new_file.map(|file| CurrentSegment {
            file,
            path: new_path,
            broken: false,
        });
        self.sequence = sequence + 1;
        self.rotated_timestamp = timestamp;
        self.rotating.store(false, Ordering::Release);

        debug!("rotated to segment {} at {:?}", self.sequence - 1, timestamp);
        if let Some(delegate) = &self.delegate {
            delegate.did_rotate(timestamp).await;
        }
        true
    }

    /// Finishes the stream: syncs and closes the open segment now, then
    /// schedules the deferred task that lists it and writes the final
    /// playlist after `segment_duration + 1s` of quiescence.
    ///
    /// The returned handle can be awaited or aborted by the caller.
    ///
    /// # Arguments
    ///
    /// * `end_timestamp` - Media time the stream content actually ends at
    pub async fn finish(&mut self, end_timestamp: Duration) -> Option<JoinHandle<()>> {
        let current = self.current.take()?;
        let duration = end_timestamp
            .checked_sub(self.rotated_timestamp)
            .unwrap_or_default();

        if let Err(err) = current.file.sync_all().await {
            warn!("final segment close failed: {}", err);
            if let Some(delegate) = &self.delegate {
                delegate
                    .writer_error(WriterErrorKind::SyncAndClose, &err.to_string())
                    .await;
            }
        }

        let entry = MediaSegment {
            filename: file_name_of(&current.path),
            duration,
            discontinuous: std::mem::take(&mut self.pending_discontinuity),
            skipped: current.broken,
        };
        let final_path = current.path.clone();

        let mut files = std::mem::take(&mut self.files);
        let sequence = self.sequence;
        let base_dir = self.base_dir.clone();
        let playlist_path = self.base_dir.join(&self.playlist_name);
        let segment_duration = self.segment_duration;
        let max_segments = self.max_segments;
        let delegate = self.delegate.clone();
        let delay = self.segment_duration + Duration::from_secs(1);

        Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            files.push(entry);
            prune_segments(&mut files, max_segments, &base_dir, delegate.as_ref()).await;
            let media_sequence = sequence - files.len() as u64;
            let playlist = render_playlist(segment_duration, media_sequence, &files);

            match fs::write(&playlist_path, playlist.as_bytes()).await {
                Ok(()) => {
                    if let Some(delegate) = &delegate {
                        delegate.did_generate_ts(&final_path).await;
                        delegate.did_generate_m3u8(&playlist_path).await;
                    }
                }
                Err(err) => {
                    warn!("final playlist write failed: {}", err);
                    if let Some(delegate) = &delegate {
                        delegate
                            .writer_error(WriterErrorKind::WriteToUrl, &err.to_string())
                            .await;
                    }
                }
            }
        }))
    }
}

/// Removes the oldest entries (and their files) while the list exceeds
/// `max_segments`.
async fn prune_segments(
    files: &mut Vec<MediaSegment>,
    max_segments: usize,
    base_dir: &Path,
    delegate: Option<&Arc<dyn TsMuxerDelegate>>,
) {
    while files.len() > max_segments {
        let oldest = files.remove(0);
        let path = base_dir.join(&oldest.filename);
        if let Err(err) = fs::remove_file(&path).await {
            warn!("failed to remove {}: {}", path.display(), err);
            if let Some(delegate) = delegate {
                delegate
                    .writer_error(WriterErrorKind::RemoveItem, &err.to_string())
                    .await;
            }
        }
    }
}

fn segment_filename(sequence: u64) -> String {
    format!("part{:05}.ts", sequence)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Renders the media playlist with CRLF line endings.
///
/// The target duration honors both the configured segment duration and the
/// longest listed entry, so `EXT-X-TARGETDURATION >= ceil(entry.duration)`
/// holds for every entry.
pub(crate) fn render_playlist(
    segment_duration: Duration,
    media_sequence: u64,
    entries: &[MediaSegment],
) -> String {
    let longest = entries
        .iter()
        .map(|entry| entry.duration)
        .max()
        .unwrap_or(Duration::ZERO);
    let target = segment_duration.max(longest).as_secs_f64().ceil() as u64;

    let mut text = String::new();
    text.push_str("#EXTM3U\r\n");
    text.push_str("#EXT-X-VERSION:3\r\n");
    text.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\r\n", media_sequence));
    text.push_str(&format!("#EXT-X-TARGETDURATION:{}\r\n", target));
    for entry in entries {
        if entry.discontinuous {
            text.push_str("#EXT-X-DISCONTINUITY\r\n");
        }
        text.push_str(&format!("#EXTINF:{:.3},\r\n", entry.duration.as_secs_f64()));
        text.push_str(&entry.filename);
        text.push_str("\r\n");
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str, seconds: f64) -> MediaSegment {
        MediaSegment {
            filename: filename.to_string(),
            duration: Duration::from_secs_f64(seconds),
            discontinuous: false,
            skipped: false,
        }
    }

    #[test]
    fn test_playlist_rendering() {
        let entries = vec![entry("part00000.ts", 2.0), entry("part00001.ts", 2.004)];
        let text = render_playlist(Duration::from_secs(2), 0, &entries);

        let expected = "#EXTM3U\r\n\
                        #EXT-X-VERSION:3\r\n\
                        #EXT-X-MEDIA-SEQUENCE:0\r\n\
                        #EXT-X-TARGETDURATION:3\r\n\
                        #EXTINF:2.000,\r\n\
                        part00000.ts\r\n\
                        #EXTINF:2.004,\r\n\
                        part00001.ts\r\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_playlist_discontinuity_tag() {
        let mut entries = vec![entry("part00000.ts", 2.0), entry("part00001.ts", 2.0)];
        entries[1].discontinuous = true;
        let text = render_playlist(Duration::from_secs(2), 0, &entries);

        let tag_at = text.find("#EXT-X-DISCONTINUITY\r\n").unwrap();
        let second_entry_at = text.find("part00001.ts").unwrap();
        assert!(tag_at < second_entry_at);
        assert_eq!(text.matches("#EXT-X-DISCONTINUITY").count(), 1);
    }

    #[test]
    fn test_target_duration_covers_overlong_entry() {
        let entries = vec![entry("part00000.ts", 1.2)];
        let text = render_playlist(Duration::from_secs(1), 0, &entries);
        assert!(text.contains("#EXT-X-TARGETDURATION:2\r\n"));
    }

    #[test]
    fn test_empty_playlist_uses_configured_duration() {
        let text = render_playlist(Duration::from_secs(2), 0, &[]);
        assert!(text.contains("#EXT-X-TARGETDURATION:2\r\n"));
        assert!(!text.contains("#EXTINF"));
        assert!(!text.contains("#EXT-X-ENDLIST"));
    }

    #[tokio::test]
    async fn test_rotation_lifecycle() {
        let base = std::env::temp_dir().join(format!("tsio-hls-rotate-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&base).await;

        let mut writer = SegmentWriter::new(
            base.clone(),
            "ScreenRecording.m3u8".to_string(),
            Duration::from_secs(2),
            10,
            None,
        );
        writer.ensure_base_dir().await.unwrap();

        assert!(!writer.is_active());
        assert!(writer.rotate(Duration::ZERO).await);
        assert!(writer.is_active());
        assert_eq!(writer.sequence(), 1);
        assert!(writer.files().is_empty());

        writer.write(&[0x47; 188]).await;
        assert!(writer.rotate(Duration::from_secs_f64(2.5)).await);

        assert_eq!(writer.sequence(), 2);
        assert_eq!(writer.files().len(), 1);
        assert_eq!(writer.files()[0].filename, "part00000.ts");
        assert_eq!(writer.files()[0].duration, Duration::from_secs_f64(2.5));
        assert!(base.join("part00000.ts").exists());
        assert!(base.join("part00001.ts").exists());
        assert!(base.join("ScreenRecording.m3u8").exists());

        let _ = tokio::fs::remove_dir_all(&base).await;
    }

    #[tokio::test]
    async fn test_pruning_deletes_oldest_files() {
        let base = std::env::temp_dir().join(format!("tsio-hls-prune-{}", std::process::id()));
        let _ = tokio::fs::remove_dir_all(&base).await;

        let mut writer = SegmentWriter::new(
            base.clone(),
            "ScreenRecording.m3u8".to_string(),
            Duration::from_secs(1),
            2,
            None,
        );
        writer.ensure_base_dir().await.unwrap();

        for i in 0..5u64 {
            assert!(writer.rotate(Duration::from_secs(2 * i)).await);
            writer.write(&[0x47; 188]).await;
        }

        // part00000 and part00001 fell out of the window
        assert_eq!(writer.files().len(), 2);
        assert_eq!(writer.files()[0].filename, "part00002.ts");
        assert!(!base.join("part00000.ts").exists());
        assert!(!base.join("part00001.ts").exists());
        assert!(base.join("part00003.ts").exists());

        let _ = tokio::fs::remove_dir_all(&base).await;
    }
}
