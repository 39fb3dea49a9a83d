//! Looping video decoded by an external `ffmpeg` process into RGBA frames.

use super::AssetError;
use crate::config::VideoConfig;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

#[derive(Clone)]
pub struct VideoFrame {
    /// Increments for every decoded frame.
    pub sequence: u64,
    pub pixels: Arc<[u8]>,
}

#[derive(Default)]
struct FrameSlot {
    latest: Mutex<Option<VideoFrame>>,
    stop: AtomicBool,
}

/// Owns the decoder process, its reader thread and any scratch file.
pub struct VideoSurface {
    pub width: u32,
    pub height: u32,
    slot: Arc<FrameSlot>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    scratch: Option<tempfile::TempPath>,
}

impl VideoSurface {
    pub fn open_path(path: &Path, config: &VideoConfig) -> Result<Self, AssetError> {
        Self::spawn(path, None, config)
    }

    /// Spill an in-memory upload to a scratch file ffmpeg can seek in.
    pub fn open_bytes(bytes: &[u8], config: &VideoConfig) -> Result<Self, AssetError> {
        let mut file = tempfile::Builder::new()
            .prefix("dropview-video-")
            .tempfile()
            .map_err(AssetError::VideoIo)?;
        file.write_all(bytes).map_err(AssetError::VideoIo)?;
        let scratch = file.into_temp_path();
        let path = scratch.to_path_buf();
        Self::spawn(&path, Some(scratch), config)
    }

    fn spawn(
        path: &Path,
        scratch: Option<tempfile::TempPath>,
        config: &VideoConfig,
    ) -> Result<Self, AssetError> {
        let (width, height) = (config.frame_width.max(1), config.frame_height.max(1));
        let mut child = Command::new(&config.ffmpeg_program)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-stream_loop", "-1", "-re", "-i"])
            .arg(path)
            .args(["-an", "-vf", &format!("scale={width}:{height}")])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AssetError::VideoSpawn {
                program: config.ffmpeg_program.clone(),
                source,
            })?;

        let slot = Arc::new(FrameSlot::default());
        let reader = child.stdout.take().map(|stdout| {
            let slot = Arc::clone(&slot);
            let frame_len = width as usize * height as usize * 4;
            std::thread::spawn(move || pump_frames(stdout, frame_len, &slot))
        });
        log::info!("Started video decoder for {} at {}x{}", path.display(), width, height);

        Ok(Self {
            width,
            height,
            slot,
            child: Some(child),
            reader,
            scratch,
        })
    }

    /// Most recent decoded frame, if any.
    pub fn latest_frame(&self) -> Option<VideoFrame> {
        self.slot
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn release(&mut self) {
        self.slot.stop.store(true, Ordering::Relaxed);
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                log::debug!("Video decoder already exited: {}", err);
            }
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                log::warn!("Video reader thread panicked");
            }
        }
        if let Some(scratch) = self.scratch.take() {
            if let Err(err) = scratch.close() {
                log::warn!("Failed to remove video scratch file: {}", err);
            }
        }
    }
}

impl fmt::Debug for VideoSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for VideoSurface {
    fn drop(&mut self) {
        self.release();
    }
}

/// Read whole frames until EOF, an error or a stop request.
fn pump_frames(mut source: impl Read, frame_len: usize, slot: &FrameSlot) {
    let mut sequence = 0u64;
    let mut buffer = vec![0u8; frame_len];
    while !slot.stop.load(Ordering::Relaxed) {
        if let Err(err) = source.read_exact(&mut buffer) {
            log::debug!("Video stream ended: {}", err);
            break;
        }
        sequence += 1;
        let frame = VideoFrame {
            sequence,
            pixels: Arc::from(buffer.as_slice()),
        };
        *slot.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pump_publishes_the_last_complete_frame() {
        let slot = FrameSlot::default();
        // Two 1x1 frames and a truncated third.
        let stream = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 9];
        pump_frames(Cursor::new(stream), 4, &slot);
        let frame = slot.latest.lock().unwrap().clone().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(&frame.pixels[..], &[5, 6, 7, 8]);
    }

    #[test]
    fn pump_honours_stop_before_reading() {
        let slot = FrameSlot::default();
        slot.stop.store(true, Ordering::Relaxed);
        pump_frames(Cursor::new([0u8; 8]), 4, &slot);
        assert!(slot.latest.lock().unwrap().is_none());
    }

    #[test]
    fn missing_decoder_is_a_spawn_error() {
        let config = VideoConfig {
            ffmpeg_program: "dropview-no-such-ffmpeg".to_string(),
            ..VideoConfig::default()
        };
        let err = VideoSurface::open_bytes(b"not a video", &config).unwrap_err();
        assert!(matches!(
            err,
            AssetError::VideoSpawn { ref program, .. } if program == "dropview-no-such-ffmpeg"
        ));
    }
}
