use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::{debug, info};

use crate::{
    encode::codec::{CodecKind, CodecProfile},
    encode::timecode::Timecode,
    error::{DailiesError, EncodeError, Result},
    pipeline::buffer::PixelBuffer,
};

/// JPEG quality for still-image codecs; subsampling stays disabled so chroma
/// survives review zoom-ins
const JPEG_QUALITY: u8 = 95;

/// Whether an ffmpeg binary is reachable on PATH
pub fn is_ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Build the full encoder argument list.
///
/// Everything is fixed before the first frame: input flags from the codec
/// kind, then the option flags in a stable order, then the output path.
pub fn build_encoder_args(
    profile: &CodecProfile,
    framerate: f64,
    width: u32,
    height: u32,
    start_timecode: &Timecode,
    output: &Path,
) -> Vec<String> {
    let rate = format_rate(framerate);
    let size = format!("{width}x{height}");
    let mut args: Vec<String> = Vec::new();

    match profile.kind {
        CodecKind::StillImage => {
            // Compressed images carry their own geometry; only the rate is needed
            args.extend(["-y", "-framerate", rate.as_str(), "-i", "pipe:0"].map(String::from));
        }
        CodecKind::RawVideo => {
            args.extend(
                [
                    "-hide_banner",
                    "-loglevel",
                    "error",
                    "-y",
                    "-f",
                    "rawvideo",
                    "-pixel_format",
                    profile.input_pixel_format(),
                    "-video_size",
                    size.as_str(),
                    "-framerate",
                    rate.as_str(),
                    "-i",
                    "pipe:0",
                ]
                .map(String::from),
            );
        }
    }

    // Start timecode so review tools display true frame positions
    args.extend(["-timecode".to_string(), start_timecode.to_string()]);

    let mut push_flag = |flag: &str, value: Option<String>| {
        if let Some(value) = value {
            args.push(flag.to_string());
            args.push(value);
        }
    };

    push_flag("-c:v", profile.codec.clone());
    push_flag("-profile:v", profile.profile.clone());
    push_flag("-qscale:v", profile.qscale.clone());
    push_flag("-preset", profile.preset.clone());
    push_flag("-g", profile.keyint.map(|v| v.to_string()));
    push_flag("-bf", profile.bframes.map(|v| v.to_string()));
    push_flag("-tune", profile.tune.clone());
    push_flag("-crf", profile.crf.map(|v| v.to_string()));
    push_flag("-pix_fmt", profile.pix_fmt.clone());
    push_flag("-r", Some(rate.clone()));
    push_flag("-vf", profile.vf.clone());
    push_flag("-vendor", profile.vendor.clone());
    push_flag("-metadata:s", profile.metadata_s.clone());
    push_flag("-b:v", profile.bitrate.clone());

    args.push(output.display().to_string());
    args
}

fn format_rate(framerate: f64) -> String {
    if framerate.fract().abs() < f64::EPSILON {
        format!("{}", framerate as u64)
    } else {
        format!("{framerate}")
    }
}

/// Serialize a processed frame into the byte stream the encoder expects:
/// raw RGB triples for raw-video codecs, an independent JPEG for
/// still-image codecs
pub fn serialize_frame(buffer: &PixelBuffer, profile: &CodecProfile) -> Result<Vec<u8>> {
    match profile.kind {
        CodecKind::RawVideo => Ok(buffer.rgb_bytes()),
        CodecKind::StillImage => {
            let rgb = buffer.dynamic().to_rgb8();
            let mut bytes = Vec::new();
            JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
                .encode(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )
                .map_err(|e| EncodeError::StillEncodeFailed {
                    reason: e.to_string(),
                })?;
            Ok(bytes)
        }
    }
}

/// A running encoder process and its input channel.
///
/// Created once per output movie, after the session resolution is fixed.
/// The stdin write blocks under encoder backpressure; that is the pipeline's
/// flow control.
pub struct EncodeSession {
    child: Child,
    stdin: Option<ChildStdin>,
    frames_accepted: u64,
}

impl EncodeSession {
    pub fn spawn(args: &[String]) -> Result<Self> {
        if !is_ffmpeg_available() {
            return Err(EncodeError::EncoderMissing.into());
        }

        debug!("Spawning encoder: ffmpeg {}", args.join(" "));
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::LaunchFailed {
                reason: e.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| EncodeError::LaunchFailed {
            reason: "could not open encoder stdin".to_string(),
        })?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            frames_accepted: 0,
        })
    }

    fn write_frame(&mut self, payload: &[u8], frame: u64) -> Result<()> {
        use std::io::Write as _;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(EncodeError::WriteFailed {
                frame,
                reason: "encoder input already closed".to_string(),
            }
            .into());
        };

        stdin
            .write_all(payload)
            .map_err(|e| EncodeError::WriteFailed {
                frame,
                reason: e.to_string(),
            })?;
        self.frames_accepted += 1;
        Ok(())
    }

    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted
    }

    /// Close the input channel and await the encoder's exit status.
    /// Must run on every path, fatal errors included, so the subprocess is
    /// never leaked.
    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());

        let output = self.child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EncodeError::ExitFailure {
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }

        info!("Encoder finished after {} frames", self.frames_accepted);
        Ok(())
    }
}

/// Restores strict ascending order over frames arriving from parallel
/// workers. `None` marks a frame that failed upstream and was skipped.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, Option<T>>,
}

impl<T> ReorderBuffer<T> {
    pub fn new(start: u64) -> Self {
        Self {
            next: start,
            pending: BTreeMap::new(),
        }
    }

    /// Accept a frame in any order. Returns the run of frames that became
    /// ready, in strictly ascending index order.
    pub fn push(
        &mut self,
        index: u64,
        item: Option<T>,
    ) -> std::result::Result<Vec<(u64, Option<T>)>, EncodeError> {
        if index < self.next || self.pending.contains_key(&index) {
            return Err(EncodeError::OutOfOrder {
                frame: index,
                expected: self.next,
            });
        }
        self.pending.insert(index, item);

        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push((self.next, item));
            self.next += 1;
        }
        Ok(ready)
    }

    pub fn next_expected(&self) -> u64 {
        self.next
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Writes serialized frames to the encoder in strict ascending order,
/// buffering out-of-order arrivals and stepping over skipped frames
pub struct FrameStreamer {
    session: EncodeSession,
    reorder: ReorderBuffer<Vec<u8>>,
    written: u64,
    skipped: u64,
}

impl FrameStreamer {
    pub fn new(session: EncodeSession) -> Self {
        Self {
            session,
            reorder: ReorderBuffer::new(0),
            written: 0,
            skipped: 0,
        }
    }

    /// Hand over one frame's serialized payload, or `None` for a frame that
    /// failed upstream. Writes happen as soon as the ascending run allows.
    pub fn submit(&mut self, frame: u64, payload: Option<Vec<u8>>) -> Result<()> {
        for (index, item) in self.reorder.push(frame, payload)? {
            match item {
                Some(bytes) => {
                    self.session.write_frame(&bytes, index)?;
                    self.written += 1;
                }
                None => self.skipped += 1,
            }
        }
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }

    /// Close the encoder and report how many frames were written
    pub fn finish(self) -> Result<u64> {
        let leftovers = self.reorder.pending_len();
        let next = self.reorder.next_expected();

        // Always drain the process, even when the stream has a gap
        self.session.finish()?;

        if leftovers > 0 {
            return Err(DailiesError::generic(format!(
                "{leftovers} frame(s) never arrived at the encoder, first gap at frame {next}"
            )));
        }
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::codec::CodecRegistry;
    use crate::pipeline::buffer::{BitDepth, PixelBuffer};
    use std::path::PathBuf;

    fn registry() -> CodecRegistry {
        CodecRegistry::new()
    }

    #[test]
    fn test_raw_video_args_order() {
        let profile = registry().resolve("hevc").unwrap();
        let tc = Timecode::from_frame(1001, 24.0);
        let args = build_encoder_args(
            &profile,
            24.0,
            1920,
            1080,
            &tc,
            &PathBuf::from("/out/shot.mov"),
        );

        let expected_prefix = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pixel_format",
            "rgb48le",
            "-video_size",
            "1920x1080",
            "-framerate",
            "24",
            "-i",
            "pipe:0",
            "-timecode",
            "00:00:41:17",
            "-c:v",
            "libx265",
        ];
        assert_eq!(&args[..expected_prefix.len()], &expected_prefix[..]);
        assert_eq!(args.last().unwrap(), "/out/shot.mov");

        // Output rate always present
        let r_pos = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r_pos + 1], "24");
    }

    #[test]
    fn test_still_image_args_omit_raw_input_flags() {
        let profile = registry().resolve("mjpeg").unwrap();
        let tc = Timecode::from_frame(0, 24.0);
        let args =
            build_encoder_args(&profile, 24.0, 1920, 1080, &tc, &PathBuf::from("out.mov"));

        assert_eq!(
            &args[..5],
            &["-y", "-framerate", "24", "-i", "pipe:0"][..]
        );
        assert!(!args.contains(&"rawvideo".to_string()));
        assert!(!args.contains(&"-video_size".to_string()));
        assert!(args.contains(&"-qscale:v".to_string()));
    }

    #[test]
    fn test_fractional_rate_formatting() {
        assert_eq!(format_rate(24.0), "24");
        assert_eq!(format_rate(23.976), "23.976");
        assert_eq!(format_rate(30.0), "30");
    }

    #[test]
    fn test_serialize_raw_sixteen_bit_length() {
        let profile = registry().resolve("hevc").unwrap();
        let buffer = PixelBuffer::blank(8, 4, BitDepth::Sixteen);
        let bytes = serialize_frame(&buffer, &profile).unwrap();
        assert_eq!(bytes.len(), 8 * 4 * 3 * 2);
    }

    #[test]
    fn test_serialize_still_image_is_jpeg() {
        let profile = registry().resolve("mjpeg").unwrap();
        let buffer = PixelBuffer::blank(8, 8, BitDepth::Eight);
        let bytes = serialize_frame(&buffer, &profile).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        // EOI marker closes each independent image
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_reorder_buffer_restores_order() {
        let mut reorder: ReorderBuffer<&'static str> = ReorderBuffer::new(0);

        assert!(reorder.push(2, Some("c")).unwrap().is_empty());
        assert!(reorder.push(1, Some("b")).unwrap().is_empty());

        let ready = reorder.push(0, Some("a")).unwrap();
        let order: Vec<u64> = ready.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(reorder.is_drained());
        assert_eq!(reorder.next_expected(), 3);
    }

    #[test]
    fn test_reorder_buffer_steps_over_skips() {
        let mut reorder: ReorderBuffer<&'static str> = ReorderBuffer::new(0);
        reorder.push(0, Some("a")).unwrap();
        reorder.push(2, Some("c")).unwrap();

        let ready = reorder.push(1, None).unwrap();
        assert_eq!(ready.len(), 2);
        assert!(ready[0].1.is_none());
        assert_eq!(ready[1].1, Some("c"));
    }

    #[test]
    fn test_reorder_buffer_rejects_stale_and_duplicate_frames() {
        let mut reorder: ReorderBuffer<()> = ReorderBuffer::new(0);
        reorder.push(0, Some(())).unwrap();
        assert!(reorder.push(0, Some(())).is_err());

        reorder.push(5, Some(())).unwrap();
        assert!(reorder.push(5, Some(())).is_err());
    }
}
