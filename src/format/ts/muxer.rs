//! The muxer engine: owns PIDs, codec configurations, program tables and
//! timestamps, turns access units into PES packets and transport stream
//! bytes, and drives segment rotation.

use super::delegate::{TsMuxerDelegate, WriterErrorKind};
use super::hls::SegmentWriter;
use super::packetizer::packetize;
use super::pes::PesPacket;
use super::psi::program_packets;
use super::types::{
    pcr_ticks, Pat, Pmt, DEFAULT_PID_AUDIO, DEFAULT_PID_PMT, DEFAULT_PID_VIDEO, STREAM_ID_AAC,
    STREAM_ID_H264, STREAM_TYPE_AAC_ADTS, STREAM_TYPE_H264, TS_PACKET_SIZE,
};
use crate::codec::aac::{parse_audio_specific_config, AacConfig};
use crate::codec::h264::AvcConfig;
use crate::error::Result;
use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Minimum elapsed presentation time between two PCR stamps.
pub const PCR_INTERVAL: Duration = Duration::from_millis(20);

/// The kinds of elementary media the muxer can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// AAC audio
    Audio,
    /// H.264 video
    Video,
}

/// Muxer configuration.
///
/// The PID defaults match the common single-program layout; override them
/// only when a downstream consumer demands specific values.
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// PID of the Program Map Table
    pub pmt_pid: u16,
    /// PID of the H.264 elementary stream
    pub video_pid: u16,
    /// PID of the AAC elementary stream
    pub audio_pid: u16,
    /// Target duration of one segment
    pub segment_duration: Duration,
    /// Medias that must be configured before any byte is emitted; empty
    /// means "emit whatever arrives"
    pub expected_medias: Vec<MediaKind>,
    /// Directory for segment files and the playlist; `None` keeps the
    /// muxer in-memory, firing only byte callbacks
    pub base_dir: Option<PathBuf>,
    /// Sliding window size before old segments are deleted from disk
    pub max_segments: usize,
    /// Playlist file name inside `base_dir`
    pub playlist_name: String,
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            pmt_pid: DEFAULT_PID_PMT,
            video_pid: DEFAULT_PID_VIDEO,
            audio_pid: DEFAULT_PID_AUDIO,
            segment_duration: Duration::from_secs(2),
            expected_medias: Vec::new(),
            base_dir: None,
            max_segments: 10_000,
            playlist_name: "ScreenRecording.m3u8".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct PidState {
    continuity: u8,
    first_timestamp: Option<Duration>,
}

/// Live MPEG-TS muxer with HLS segment output.
///
/// Access units flow in through [`TsMuxer::on_audio_sample`] and
/// [`TsMuxer::on_video_sample`] after the matching configs arrived;
/// transport stream bytes flow out through the delegate and, when a base
/// directory is configured, into rotating `part%05d.ts` files with a
/// sliding-window playlist.
pub struct TsMuxer {
    config: MuxerConfig,
    delegate: Option<Arc<dyn TsMuxerDelegate>>,
    running: AtomicBool,
    pat: Pat,
    pmt: Pmt,
    pat_continuity: u8,
    pmt_continuity: u8,
    audio: PidState,
    video: PidState,
    aac: Option<AacConfig>,
    avc: Option<AvcConfig>,
    pcr_timestamp: Option<Duration>,
    program_written: bool,
    content_end: Duration,
    writer: Option<SegmentWriter>,
    final_task: Option<JoinHandle<()>>,
}

impl TsMuxer {
    /// Creates an idle muxer.
    pub fn new(config: MuxerConfig) -> Self {
        let pat = Pat::single_program(config.pmt_pid);
        let pmt = Pmt {
            pcr_pid: config.video_pid,
            streams: Vec::new(),
        };
        Self {
            config,
            delegate: None,
            running: AtomicBool::new(false),
            pat,
            pmt,
            pat_continuity: 0,
            pmt_continuity: 0,
            audio: PidState::default(),
            video: PidState::default(),
            aac: None,
            avc: None,
            pcr_timestamp: None,
            program_written: false,
            content_end: Duration::ZERO,
            writer: None,
            final_task: None,
        }
    }

    /// Attaches the event delegate.
    pub fn with_delegate(mut self, delegate: Arc<dyn TsMuxerDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Arms the muxer. Transitions idle to running exactly once; calling
    /// `start` while running is a no-op.
    ///
    /// When a base directory is configured it is created here; failure is
    /// reported as a `TempDirectory` error and the muxer keeps serving
    /// in-memory byte callbacks.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.final_task.take() {
            task.abort();
        }

        if let Some(base_dir) = self.config.base_dir.clone() {
            let writer = SegmentWriter::new(
                base_dir,
                self.config.playlist_name.clone(),
                self.config.segment_duration,
                self.config.max_segments,
                self.delegate.clone(),
            );
            match writer.ensure_base_dir().await {
                Ok(()) => self.writer = Some(writer),
                Err(err) => {
                    warn!("output directory unavailable: {}", err);
                    self.report(WriterErrorKind::TempDirectory, &err.to_string())
                        .await;
                }
            }
        }

        info!("muxer running");
        Ok(())
    }

    /// Stops the muxer: flushes and closes the current segment, schedules
    /// the deferred final playlist update, and resets counters, timestamps,
    /// program tables and codec configs. Calling `stop` twice is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(mut writer) = self.writer.take() {
            self.final_task = writer.finish(self.content_end).await;
        }

        self.pmt.streams.clear();
        self.pmt.pcr_pid = self.config.video_pid;
        self.aac = None;
        self.avc = None;
        self.pat_continuity = 0;
        self.pmt_continuity = 0;
        self.audio = PidState::default();
        self.video = PidState::default();
        self.pcr_timestamp = None;
        self.program_written = false;
        self.content_end = Duration::ZERO;

        info!("muxer stopped");
        Ok(())
    }

    /// Hands out the deferred final-playlist task scheduled by [`stop`],
    /// so the caller can await its completion or cancel it.
    ///
    /// [`stop`]: TsMuxer::stop
    pub fn take_final_task(&mut self) -> Option<JoinHandle<()>> {
        self.final_task.take()
    }

    /// Delivers the AAC decoder configuration (a raw AudioSpecificConfig).
    ///
    /// Adds the AAC entry to the PMT, resets the audio continuity counter
    /// and, on reconfiguration, flags a discontinuity for the next segment
    /// boundary.
    pub async fn on_audio_config(&mut self, asc: &[u8]) -> Result<()> {
        let config = parse_audio_specific_config(asc)?;
        let reconfig = self.aac.is_some();
        if self.pmt.streams.is_empty() {
            self.pmt.pcr_pid = self.config.audio_pid;
        }
        self.pmt.upsert_stream(STREAM_TYPE_AAC_ADTS, self.config.audio_pid);
        self.audio.continuity = 0;
        self.aac = Some(config);
        if reconfig {
            self.note_reconfiguration();
        }
        self.write_program_if_needed().await;
        Ok(())
    }

    /// Delivers the H.264 decoder configuration (an `avcC` record).
    pub async fn on_video_config(&mut self, avcc: &[u8]) -> Result<()> {
        let config = AvcConfig::parse(avcc)?;
        let reconfig = self.avc.is_some();
        if self.pmt.streams.is_empty() {
            self.pmt.pcr_pid = self.config.video_pid;
        }
        self.pmt.upsert_stream(STREAM_TYPE_H264, self.config.video_pid);
        self.video.continuity = 0;
        self.avc = Some(config);
        if reconfig {
            self.note_reconfiguration();
        }
        self.write_program_if_needed().await;
        Ok(())
    }

    /// Feeds one raw AAC access unit (no ADTS header) with its
    /// presentation timestamp.
    pub async fn on_audio_sample(&mut self, data: &[u8], pts: Duration) -> Result<()> {
        self.write_sample(MediaKind::Audio, data, pts, None, true).await
    }

    /// Feeds one length-prefixed H.264 access unit.
    pub async fn on_video_sample(
        &mut self,
        data: &[u8],
        pts: Duration,
        dts: Option<Duration>,
        is_sync: bool,
    ) -> Result<()> {
        self.write_sample(MediaKind::Video, data, pts, dts, is_sync).await
    }

    /// True when access units of `kind` would currently be emitted.
    pub fn can_write_for(&self, kind: MediaKind) -> bool {
        if self.config.expected_medias.is_empty() {
            return match kind {
                MediaKind::Audio => self.aac.is_some(),
                MediaKind::Video => self.avc.is_some(),
            };
        }
        self.config.expected_medias.iter().all(|media| match media {
            MediaKind::Audio => self.aac.is_some(),
            MediaKind::Video => self.avc.is_some(),
        })
    }

    fn can_write_any(&self) -> bool {
        if self.config.expected_medias.is_empty() {
            return self.aac.is_some() || self.avc.is_some();
        }
        self.can_write_for(MediaKind::Audio)
    }

    async fn write_sample(
        &mut self,
        kind: MediaKind,
        data: &[u8],
        pts: Duration,
        dts: Option<Duration>,
        random_access: bool,
    ) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            debug!("dropping sample, muxer is idle");
            return Ok(());
        }
        if !self.can_write_for(kind) {
            debug!("dropping {:?} sample, configs incomplete", kind);
            return Ok(());
        }

        // A boundary-eligible sample must open the first segment as well:
        // until one arrives, media headed for segment files is discarded.
        let boundary_allowed = self.boundary_allowed(kind, random_access);
        if let Some(writer) = &self.writer {
            if !writer.is_active() && !boundary_allowed {
                debug!(
                    "dropping {:?} sample, first segment awaits a random-access unit",
                    kind
                );
                return Ok(());
            }
        }

        let (pid, stream_id) = match kind {
            MediaKind::Audio => (self.config.audio_pid, STREAM_ID_AAC),
            MediaKind::Video => (self.config.video_pid, STREAM_ID_H264),
        };

        let payload = match kind {
            MediaKind::Audio => {
                let Some(config) = self.aac.as_ref() else {
                    return Ok(());
                };
                let header = config.adts_header(data.len())?;
                let mut buf = BytesMut::with_capacity(header.len() + data.len());
                buf.put_slice(&header);
                buf.put_slice(data);
                buf
            }
            MediaKind::Video => {
                let Some(config) = self.avc.as_ref() else {
                    return Ok(());
                };
                let converted = config.to_annex_b(data)?;
                if random_access {
                    let mut buf = config.idr_prefix();
                    buf.extend_from_slice(&converted);
                    buf
                } else {
                    converted
                }
            }
        };

        let content_end = match kind {
            MediaKind::Audio => {
                let frame = self
                    .aac
                    .as_ref()
                    .and_then(|config| config.frame_duration())
                    .map(Duration::from_secs_f64)
                    .unwrap_or_default();
                pts + frame
            }
            MediaKind::Video => pts,
        };
        if content_end > self.content_end {
            self.content_end = content_end;
        }

        let state = match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        };
        if state.first_timestamp.is_none() {
            state.first_timestamp = Some(pts);
        }

        let pcr = if pid == self.pmt.pcr_pid {
            match self.pcr_timestamp {
                None => {
                    self.pcr_timestamp = Some(pts);
                    None
                }
                Some(last) if pts.saturating_sub(last) >= PCR_INTERVAL => {
                    self.pcr_timestamp = Some(pts);
                    Some(pcr_ticks(pts))
                }
                Some(_) => None,
            }
        } else {
            None
        };

        // The boundary check runs before the batch is emitted, so the
        // access unit that crosses the threshold opens the new segment.
        let mut rotated = false;
        if let Some(writer) = self.writer.as_mut() {
            if boundary_allowed && (!writer.is_active() || writer.needs_rotation(pts)) {
                rotated = writer.rotate(pts).await;
            }
        }
        if rotated {
            self.reset_continuity();
            self.write_program().await;
        } else if !self.program_written && self.writer.is_none() {
            self.write_program().await;
        }

        let mut pes = PesPacket::new(stream_id, payload).with_pts(pts);
        if let Some(dts) = dts {
            if dts != pts {
                pes = pes.with_dts(dts);
            }
        }
        let mut pes_buf = BytesMut::with_capacity(pes.len());
        pes.write_to(&mut pes_buf);

        let mut batch = BytesMut::with_capacity((pes_buf.len() / 184 + 2) * TS_PACKET_SIZE);
        let continuity = match kind {
            MediaKind::Audio => &mut self.audio.continuity,
            MediaKind::Video => &mut self.video.continuity,
        };
        packetize(pid, &pes_buf, continuity, pcr, random_access, &mut batch);

        self.emit(&batch).await;
        Ok(())
    }

    /// Whether a sample may carry a segment boundary. When video is among
    /// the expected medias only an IDR may open a segment; otherwise any
    /// random-access unit does.
    fn boundary_allowed(&self, kind: MediaKind, random_access: bool) -> bool {
        if self.config.expected_medias.contains(&MediaKind::Video) {
            kind == MediaKind::Video && random_access
        } else {
            random_access
        }
    }

    fn note_reconfiguration(&mut self) {
        self.program_written = false;
        if let Some(writer) = self.writer.as_mut() {
            writer.mark_discontinuity();
        }
    }

    fn reset_continuity(&mut self) {
        self.pat_continuity = 0;
        self.pmt_continuity = 0;
        self.audio.continuity = 0;
        self.video.continuity = 0;
    }

    /// Emits fresh PAT and PMT packets.
    async fn write_program(&mut self) {
        let packets = program_packets(
            &self.pat,
            &self.pmt,
            self.config.pmt_pid,
            &mut self.pat_continuity,
            &mut self.pmt_continuity,
        );
        self.program_written = true;
        self.emit(&packets).await;
    }

    /// Re-emits the program tables for the in-memory path when the write
    /// gate opens or the program composition changed. The file path gets
    /// fresh tables at every segment start instead.
    async fn write_program_if_needed(&mut self) {
        if self.program_written || self.writer.is_some() || !self.can_write_any() {
            return;
        }
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.write_program().await;
    }

    async fn emit(&mut self, bytes: &[u8]) {
        debug_assert_eq!(bytes.len() % TS_PACKET_SIZE, 0);
        if let Some(delegate) = &self.delegate {
            delegate.did_output(bytes).await;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write(bytes).await;
        }
    }

    async fn report(&self, kind: WriterErrorKind, message: &str) {
        if let Some(delegate) = &self.delegate {
            delegate.writer_error(kind, message).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingDelegate {
        bytes: Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl TsMuxerDelegate for CollectingDelegate {
        async fn did_output(&self, bytes: &[u8]) {
            self.bytes.lock().unwrap().extend_from_slice(bytes);
        }
    }

    fn packet_pid(packet: &[u8]) -> u16 {
        ((packet[1] as u16 & 0x1F) << 8) | packet[2] as u16
    }

    #[tokio::test]
    async fn test_in_memory_audio_stream() {
        let delegate = Arc::new(CollectingDelegate::default());
        let mut muxer =
            TsMuxer::new(MuxerConfig::default()).with_delegate(delegate.clone());

        muxer.start().await.unwrap();
        muxer.on_audio_config(&[0x12, 0x10]).await.unwrap();
        for i in 0..4u32 {
            let pts = Duration::from_secs_f64(i as f64 * 1024.0 / 44100.0);
            muxer.on_audio_sample(&[0xABu8; 300], pts).await.unwrap();
        }
        muxer.stop().await.unwrap();

        let bytes = delegate.bytes.lock().unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(bytes.len() % TS_PACKET_SIZE, 0);

        let packets: Vec<&[u8]> = bytes.chunks(TS_PACKET_SIZE).collect();
        for packet in &packets {
            assert_eq!(packet[0], 0x47);
        }
        // program tables precede the media packets
        assert_eq!(packet_pid(packets[0]), 0);
        assert_eq!(packet_pid(packets[1]), DEFAULT_PID_PMT);
        assert_eq!(packet_pid(packets[2]), DEFAULT_PID_AUDIO);
    }

    #[tokio::test]
    async fn test_samples_dropped_until_expected_configs() {
        let delegate = Arc::new(CollectingDelegate::default());
        let config = MuxerConfig {
            expected_medias: vec![MediaKind::Audio, MediaKind::Video],
            ..MuxerConfig::default()
        };
        let mut muxer = TsMuxer::new(config).with_delegate(delegate.clone());

        muxer.start().await.unwrap();
        muxer.on_audio_config(&[0x12, 0x10]).await.unwrap();
        muxer
            .on_audio_sample(&[0x01u8; 128], Duration::ZERO)
            .await
            .unwrap();
        assert!(delegate.bytes.lock().unwrap().is_empty());
        assert!(!muxer.can_write_for(MediaKind::Audio));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut muxer = TsMuxer::new(MuxerConfig::default());
        muxer.start().await.unwrap();
        muxer.stop().await.unwrap();
        muxer.stop().await.unwrap();
        assert!(muxer.take_final_task().is_none());
    }

    #[tokio::test]
    async fn test_start_is_one_shot() {
        let mut muxer = TsMuxer::new(MuxerConfig::default());
        muxer.start().await.unwrap();
        muxer.start().await.unwrap();
        assert!(muxer.aac.is_none());
        muxer.on_audio_config(&[0x12, 0x10]).await.unwrap();
        assert!(muxer.can_write_for(MediaKind::Audio));
    }

    #[tokio::test]
    async fn test_pcr_follows_first_configured_media() {
        let mut muxer = TsMuxer::new(MuxerConfig::default());
        muxer.start().await.unwrap();
        assert_eq!(muxer.pmt.pcr_pid, DEFAULT_PID_VIDEO);
        muxer.on_audio_config(&[0x12, 0x10]).await.unwrap();
        assert_eq!(muxer.pmt.pcr_pid, DEFAULT_PID_AUDIO);
    }
}
