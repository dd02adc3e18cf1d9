use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::bounded;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::{
    config::{Config, TokenData},
    encode::{
        build_encoder_args, codec::CodecProfile, codec::CodecRegistry, serialize_frame,
        EncodeSession, FrameStreamer, Timecode,
    },
    error::{DailiesError, FrameError, Result},
    pipeline::{
        buffer::{BitDepth, PixelBuffer},
        color::ColorTransformStage,
        geometry::{GeometryConfig, GeometryEngine},
        overlay::OverlayCompositor,
    },
    sequence::{FrameRef, ImageSequence, SequenceResolver},
};

use super::output::{plan_movie_output, RunLog};

/// Main engine that turns image sequences into slated review movies
///
/// One sequence is processed fully before the next begins. Within a
/// sequence, frame decode/color/geometry/overlay work fans out over a
/// bounded worker pool; a single writer restores strict frame order through
/// a reorder buffer and performs the only serialized operation, the write to
/// the encoder's stdin.
pub struct DailiesEngine {
    config: Config,
    tokens: TokenData,
    registry: CodecRegistry,
}

/// What a run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    pub movies: Vec<PathBuf>,
    pub sequences_failed: usize,
}

/// One frame's worth of work coming back from the pool
struct ProcessedFrame {
    display: u64,
    result: Result<Vec<u8>>,
    elapsed: Duration,
}

/// Display-numbered work items for a sequence: the in-memory synthetic
/// blank leads as display frame 0, real frames follow as 1..=N in order.
/// Numbering comes from sequence position, never from filename digits.
fn frame_jobs(sequence: &ImageSequence) -> Vec<(u64, Option<&FrameRef>)> {
    std::iter::once((0u64, None))
        .chain(
            sequence
                .iter()
                .enumerate()
                .map(|(i, frame)| (i as u64 + 1, Some(frame))),
        )
        .collect()
}

impl DailiesEngine {
    pub fn new(config: Config, tokens: TokenData) -> Result<Self> {
        config.validate()?;
        let registry = CodecRegistry::with_overrides(&config.codecs)?;
        Ok(Self {
            config,
            tokens,
            registry,
        })
    }

    /// Process every sequence found under the given input paths.
    ///
    /// Inputs that resolve to nothing are skipped with a warning; a failed
    /// sequence is reported and the batch continues, unless the failure is
    /// run-fatal (missing encoder, broken configuration).
    pub async fn generate(&self, inputs: &[PathBuf]) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        for input in inputs {
            let sequences = match SequenceResolver::resolve(input) {
                Ok(sequences) => sequences,
                Err(e) => {
                    warn!("Skipping input {:?}: {e}", input);
                    continue;
                }
            };

            info!(
                "Found {} image sequence(s) under {:?}",
                sequences.len(),
                input
            );

            for sequence in &sequences {
                info!(
                    "🎬 Processing sequence {} ({} frames from {})",
                    sequence.pattern(),
                    sequence.length(),
                    sequence.start()
                );

                match self.process_sequence(sequence) {
                    Ok(path) => {
                        info!("✅ Wrote {:?}", path);
                        summary.movies.push(path);
                    }
                    Err(e) if e.is_run_fatal() => {
                        error!("Aborting run: {e}");
                        return Err(e);
                    }
                    Err(e) => {
                        error!("Sequence {} failed: {e}", sequence.pattern());
                        summary.sequences_failed += 1;
                    }
                }
            }
        }

        info!("Total processing time: {:?}", start.elapsed());
        Ok(summary)
    }

    fn process_sequence(&self, sequence: &ImageSequence) -> Result<PathBuf> {
        let run_start = Instant::now();
        let globals = &self.config.globals;

        let profile = self.registry.resolve(globals.codec_name())?;
        let depth = BitDepth::from_codec_bitdepth(profile.bitdepth);

        // The encoder command line bakes in the resolution, so geometry is
        // fixed from the first frame before anything is spawned
        let first = &sequence.frames()[0];
        let probe = PixelBuffer::from_file(&first.path, depth)?;
        if probe.height() == 0 {
            return Err(FrameError::ZeroHeight {
                frame: first.index,
                path: first.path.display().to_string(),
            }
            .into());
        }
        let geometry = GeometryEngine::resolve(
            GeometryConfig::from_globals(globals)?,
            probe.width(),
            probe.height(),
        )?;
        drop(probe);
        let (width, height) = geometry.resolution();

        let plan = plan_movie_output(sequence, globals, &profile.movie_ext, chrono::Local::now());
        if let Some(parent) = plan.movie_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                error!("Output directory is not writable: {:?}: {e}", parent);
                DailiesError::Io(e)
            })?;
        }

        let mut run_log = match RunLog::create(&plan.log_path, globals.debug) {
            Ok(log) => log,
            Err(e) => {
                warn!("Could not create run log {:?}: {e}", plan.log_path);
                RunLog::disabled(globals.debug)
            }
        };
        run_log.debug(&format!(
            "Codec config: {}\tImage sequence: {}",
            profile.name,
            sequence.pattern()
        ));
        run_log.debug(&format!("Output width x height: {width}x{height}"));

        let color = ColorTransformStage::from_globals(globals);
        if color.is_active() {
            let (src, dst) = color.transform_names();
            run_log.debug(&format!("Color transform: {src} -> {dst}"));
        } else {
            run_log.warn("No color transform will be applied");
        }

        let compositor = OverlayCompositor::build(
            &self.config.slate,
            globals,
            &self.tokens,
            width,
            height,
            depth,
        );

        let start_tc = Timecode::from_frame(sequence.start(), globals.framerate);
        let args = build_encoder_args(
            &profile,
            globals.framerate,
            width,
            height,
            &start_tc,
            &plan.movie_path,
        );
        run_log.info(&format!("ffmpeg command:\n\tffmpeg {}", args.join(" ")));

        let session = EncodeSession::spawn(&args)?;
        let mut streamer = FrameStreamer::new(session);

        let jobs = frame_jobs(sequence);
        let total = jobs.len() as u64;
        let workers = num_cpus::get().clamp(1, 8);
        let (tx, rx) = bounded::<ProcessedFrame>(workers * 2);

        let mut writer_error: Option<DailiesError> = None;

        std::thread::scope(|scope| {
            let color = &color;
            let geometry = &geometry;
            let compositor = &compositor;
            let profile = &profile;

            scope.spawn(move || {
                jobs.into_par_iter().for_each_with(tx, |tx, (display, frame)| {
                    let started = Instant::now();
                    let result =
                        self.process_frame(display, frame, depth, color, geometry, compositor, profile);
                    // The writer may already have bailed; nothing to do then
                    let _ = tx.send(ProcessedFrame {
                        display,
                        result,
                        elapsed: started.elapsed(),
                    });
                });
            });

            for message in rx.iter() {
                let ProcessedFrame {
                    display,
                    result,
                    elapsed,
                } = message;

                run_log.info(&format!(
                    "Processing frame {:04}: \t{:04} of {:04}",
                    display,
                    display + 1,
                    total
                ));

                let outcome = match result {
                    Ok(payload) => streamer.submit(display, Some(payload)),
                    Err(e) => {
                        let frame_display = display;
                        error!("Skipping frame {} of {}: {e}", frame_display, sequence.pattern());
                        run_log.error(&format!("Skipping frame {display}: {e}"));
                        streamer.submit(display, None)
                    }
                };
                run_log.info(&format!("Frame processing time: \t{elapsed:?}"));

                if let Err(e) = outcome {
                    writer_error = Some(e);
                    break;
                }
            }

            // After an early bail, keep draining so blocked workers can exit
            for _ in rx.iter() {}
        });

        if let Some(e) = writer_error {
            run_log.error(&format!("Encoder stream failed: {e}"));
            // Drain the subprocess before surfacing the failure
            if let Err(teardown) = streamer.finish() {
                error!("Encoder teardown after failure: {teardown}");
            }
            return Err(e);
        }

        let written = streamer.finish().map_err(|e| {
            run_log.error(&format!("Encoder failed: {e}"));
            e
        })?;

        run_log.info(&format!(
            "Total processing time: \t{:?}",
            run_start.elapsed()
        ));
        info!("Encoded {written} frames to {:?}", plan.movie_path);
        Ok(plan.movie_path)
    }

    /// Run one frame through the pipeline and serialize it for the encoder.
    /// `frame` is `None` for the synthetic blank leader.
    fn process_frame(
        &self,
        display: u64,
        frame: Option<&FrameRef>,
        depth: BitDepth,
        color: &ColorTransformStage,
        geometry: &GeometryEngine,
        compositor: &OverlayCompositor,
        profile: &CodecProfile,
    ) -> Result<Vec<u8>> {
        let (width, height) = geometry.resolution();

        let buffer = match frame {
            None => {
                // Created at the session resolution; skips color and geometry
                let blank = PixelBuffer::blank(width, height, depth);
                compositor.composite_blank_frame(blank)
            }
            Some(frame) => {
                let mut buffer = PixelBuffer::from_file(&frame.path, depth)?;
                if buffer.height() == 0 {
                    return Err(FrameError::ZeroHeight {
                        frame: frame.index,
                        path: frame.path.display().to_string(),
                    }
                    .into());
                }

                if let Err(e) = color.apply(&mut buffer) {
                    // Reported; the untransformed buffer continues downstream
                    error!("Color transform failed on frame {}: {e}", frame.index);
                }

                let buffer = geometry.apply(buffer)?;
                if (buffer.width(), buffer.height()) != (width, height) {
                    return Err(FrameError::ResolutionMismatch {
                        frame: frame.index,
                        got_width: buffer.width(),
                        got_height: buffer.height(),
                        want_width: width,
                        want_height: height,
                    }
                    .into());
                }

                compositor.composite_real_frame(buffer, display)
            }
        };

        serialize_frame(&buffer, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, GlobalsConfig, SlateProfile};
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::tempdir;

    fn sequence_of(dir: &Path, indices: &[u64]) -> ImageSequence {
        let frames = indices
            .iter()
            .map(|&i| {
                FrameRef::new(
                    dir.join(format!("shot_{i:04}.png")),
                    i,
                    4,
                    "png".to_string(),
                )
            })
            .collect();
        ImageSequence::new(
            dir.to_path_buf(),
            "shot_".to_string(),
            String::new(),
            "png".to_string(),
            frames,
        )
        .unwrap()
    }

    #[test]
    fn test_display_numbering_round_trip() {
        // Real frames 1001..1010 become display frames 1..10 behind the
        // synthetic blank at display 0
        let dir = tempdir().unwrap();
        let seq = sequence_of(dir.path(), &(1001..=1010).collect::<Vec<_>>());
        let jobs = frame_jobs(&seq);

        assert_eq!(jobs.len(), 11);
        assert_eq!(jobs[0].0, 0);
        assert!(jobs[0].1.is_none());

        for &(display, frame) in &jobs[1..] {
            let frame = frame.expect("real frame");
            assert_eq!(frame.index, 1000 + display);
        }
    }

    #[test]
    fn test_engine_rejects_bad_codec_override() {
        let mut config = Config::default();
        config.codecs.insert(
            "mjpeg".to_string(),
            crate::encode::codec::CodecOverride {
                bitdepth: Some(10),
                ..Default::default()
            },
        );
        assert!(DailiesEngine::new(config, TokenData::default()).is_err());
    }

    fn test_engine() -> DailiesEngine {
        let mut config = Config::default();
        config.globals = GlobalsConfig {
            output_codec: Some("mjpeg".to_string()),
            ..GlobalsConfig::default()
        };
        config.slate = SlateProfile::default();
        DailiesEngine::new(config, TokenData::default()).unwrap()
    }

    #[test]
    fn test_process_frame_synthetic_blank_is_jpeg() {
        let engine = test_engine();
        let profile = engine.registry.resolve("mjpeg").unwrap();
        let depth = BitDepth::from_codec_bitdepth(profile.bitdepth);

        let geometry = GeometryEngine::resolve(
            GeometryConfig::from_globals(&engine.config.globals).unwrap(),
            32,
            16,
        )
        .unwrap();
        let color = ColorTransformStage::from_globals(&engine.config.globals);
        let compositor = OverlayCompositor::build(
            &engine.config.slate,
            &engine.config.globals,
            &engine.tokens,
            32,
            16,
            depth,
        );

        let bytes = engine
            .process_frame(0, None, depth, &color, &geometry, &compositor, &profile)
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_process_frame_reads_real_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shot_0001.png");
        RgbImage::from_pixel(32, 16, Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let engine = test_engine();
        let profile = engine.registry.resolve("mjpeg").unwrap();
        let depth = BitDepth::from_codec_bitdepth(profile.bitdepth);
        let geometry = GeometryEngine::resolve(
            GeometryConfig::from_globals(&engine.config.globals).unwrap(),
            32,
            16,
        )
        .unwrap();
        let color = ColorTransformStage::from_globals(&engine.config.globals);
        let compositor = OverlayCompositor::build(
            &engine.config.slate,
            &engine.config.globals,
            &engine.tokens,
            32,
            16,
            depth,
        );

        let frame = FrameRef::new(path, 1, 4, "png".to_string());
        let bytes = engine
            .process_frame(1, Some(&frame), depth, &color, &geometry, &compositor, &profile)
            .unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_process_frame_missing_file_is_frame_scoped() {
        let engine = test_engine();
        let profile = engine.registry.resolve("mjpeg").unwrap();
        let depth = BitDepth::from_codec_bitdepth(profile.bitdepth);
        let geometry = GeometryEngine::resolve(
            GeometryConfig::from_globals(&engine.config.globals).unwrap(),
            32,
            16,
        )
        .unwrap();
        let color = ColorTransformStage::from_globals(&engine.config.globals);
        let compositor = OverlayCompositor::build(
            &engine.config.slate,
            &engine.config.globals,
            &engine.tokens,
            32,
            16,
            depth,
        );

        let frame = FrameRef::new("/nonexistent/shot_0001.png", 1, 4, "png".to_string());
        let err = engine
            .process_frame(1, Some(&frame), depth, &color, &geometry, &compositor, &profile)
            .unwrap_err();
        assert!(err.is_frame_scoped());
    }
}
