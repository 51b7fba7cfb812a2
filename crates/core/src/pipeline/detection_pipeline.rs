use std::time::{Duration, Instant};

use crate::capture::frame_source::FrameSource;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::model_resolver::load_detector;
use crate::display::domain::frame_display::{DisplayEvent, FrameDisplay};
use crate::pipeline::fps_counter::FpsCounter;
use crate::pipeline::overlay::{draw_face_boxes, Overlay};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::session::session_error::SessionError;
use crate::shared::cancellation::CancellationSignal;
use crate::shared::config::SessionConfig;

/// Pause between polls while the capture thread has not produced a frame.
const IDLE_PAUSE: Duration = Duration::from_millis(10);

/// Warm-up is spent in slices of this length so the signal stays observed.
const WARMUP_SLICE: Duration = Duration::from_millis(50);

/// Missing-frame polls between repeated warnings.
const MISSING_FRAME_LOG_EVERY: u64 = 100;

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineReport {
    pub frames: u64,
    /// The user pressed the quit key or closed the window.
    pub quit_requested: bool,
}

/// Foreground loop: latest frame → grayscale → detect → boxes → FPS →
/// labels → display, until the signal is set.
///
/// The pipeline owns the frame source and the display, and releases both on
/// every exit path, including errors and drops.
pub struct DetectionPipeline<V: FrameDisplay, L: PipelineLogger> {
    source: FrameSource,
    detector: Box<dyn FaceDetector>,
    display: V,
    logger: L,
    warmup: Duration,
}

impl<V: FrameDisplay, L: PipelineLogger> DetectionPipeline<V, L> {
    pub fn new(
        source: FrameSource,
        detector: Box<dyn FaceDetector>,
        display: V,
        logger: L,
        warmup: Duration,
    ) -> Self {
        Self {
            source,
            detector,
            display,
            logger,
            warmup,
        }
    }

    /// Loads the detector from the configured search list, then opens the
    /// camera. Fails before anything starts if either is unavailable.
    pub fn open(config: &SessionConfig, display: V, logger: L) -> Result<Self, SessionError> {
        let detector = load_detector(&config.model_search_paths, &config.detection)?;
        log::info!("Starting video stream...");
        let source = FrameSource::open(config.camera.device_index, &config.camera)?;
        Ok(Self::new(
            source,
            Box::new(detector),
            display,
            logger,
            config.warmup(),
        ))
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub async fn run(&mut self, signal: &CancellationSignal) -> Result<PipelineReport, SessionError> {
        let mut report = PipelineReport::default();
        let mut stage = Teardown {
            source: &mut self.source,
            display: &mut self.display,
        };

        stage.source.start()?;

        report.quit_requested = warm_up(&mut *stage.display, signal, self.warmup).await?;
        if signal.is_set() {
            return Ok(report);
        }

        let mut fps = FpsCounter::new();
        let mut missing_polls: u64 = 0;

        while !signal.is_set() {
            let Some(latest) = stage.source.read() else {
                missing_polls += 1;
                if missing_polls % MISSING_FRAME_LOG_EVERY == 1 {
                    log::warn!("No camera frame available yet");
                }
                self.logger.metric("frame_skipped", 1.0);
                if present_idle(&mut *stage.display).await? == DisplayEvent::Quit {
                    report.quit_requested = true;
                    signal.set();
                    break;
                }
                signal.wait_timeout(IDLE_PAUSE);
                continue;
            };
            missing_polls = 0;

            // Draw on a private copy; the slot's frame is shared.
            let mut frame = (*latest).clone();

            let t0 = Instant::now();
            let faces = match self.detector.detect(&frame.to_gray()) {
                Ok(faces) => faces,
                Err(e) => {
                    log::warn!("Face detection failed on frame {}: {e}", frame.generation());
                    Vec::new()
                }
            };
            self.logger.timing("detect", elapsed_ms(t0));

            let t1 = Instant::now();
            draw_face_boxes(&mut frame, &faces);
            fps.tick();
            let overlay = Overlay {
                fps: fps.fps(),
                faces: faces.len(),
            };
            let event = stage
                .display
                .present(&frame, &overlay)
                .await
                .map_err(|e| SessionError::Display(e.to_string()))?;
            self.logger.timing("render", elapsed_ms(t1));
            self.logger.metric("faces", faces.len() as f64);

            report.frames += 1;
            self.logger.frame_done(report.frames);

            if event == DisplayEvent::Quit {
                log::info!("Quit requested");
                report.quit_requested = true;
                signal.set();
            }
        }

        drop(stage);
        self.logger.summary();
        Ok(report)
    }
}

/// Stops the frame source and closes the display when dropped.
struct Teardown<'a, V: FrameDisplay> {
    source: &'a mut FrameSource,
    display: &'a mut V,
}

impl<V: FrameDisplay> Drop for Teardown<'_, V> {
    fn drop(&mut self) {
        self.source.stop();
        self.display.close();
    }
}

/// Waits out the camera warm-up while keeping the window alive.
///
/// Returns early once the signal is set. Returns `true` if the user quit.
async fn warm_up<V: FrameDisplay>(
    display: &mut V,
    signal: &CancellationSignal,
    warmup: Duration,
) -> Result<bool, SessionError> {
    let deadline = Instant::now() + warmup;
    while Instant::now() < deadline && !signal.is_set() {
        if present_idle(display).await? == DisplayEvent::Quit {
            log::info!("Quit requested during warm-up");
            signal.set();
            return Ok(true);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        signal.wait_timeout(WARMUP_SLICE.min(remaining));
    }
    Ok(false)
}

async fn present_idle<V: FrameDisplay>(display: &mut V) -> Result<DisplayEvent, SessionError> {
    display
        .idle()
        .await
        .map_err(|e| SessionError::Display(e.to_string()))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera_device::CameraDevice;
    use crate::pipeline::pipeline_logger::LogPipelineLogger;
    use crate::shared::frame::Frame;
    use crate::shared::region::Region;
    use image::GrayImage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct StubCamera {
        generation: u64,
        released: Arc<AtomicBool>,
    }

    impl CameraDevice for StubCamera {
        fn read_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
            std::thread::sleep(Duration::from_millis(1));
            self.generation += 1;
            Ok(Frame::new(vec![0; 64 * 48 * 3], 64, 48, 3, self.generation))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    /// Returns the same fixed regions for every image.
    struct StubDetector {
        faces: Vec<Region>,
        fail: bool,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, _image: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
            if self.fail {
                return Err("inference failed".into());
            }
            Ok(self.faces.clone())
        }
    }

    #[derive(Clone, Default)]
    struct Presented {
        overlays: Vec<Overlay>,
        green_pixels: Vec<usize>,
        idles: usize,
        closed: bool,
    }

    /// Records what it is shown and quits after `quit_after` frames.
    struct StubDisplay {
        quit_after: Option<usize>,
        seen: Arc<Mutex<Presented>>,
    }

    impl StubDisplay {
        fn new(quit_after: Option<usize>) -> (Self, Arc<Mutex<Presented>>) {
            let seen = Arc::new(Mutex::new(Presented::default()));
            (
                Self {
                    quit_after,
                    seen: seen.clone(),
                },
                seen,
            )
        }
    }

    impl FrameDisplay for StubDisplay {
        async fn present(
            &mut self,
            frame: &Frame,
            overlay: &Overlay,
        ) -> Result<DisplayEvent, Box<dyn std::error::Error>> {
            let mut seen = self.seen.lock().unwrap();
            seen.overlays.push(*overlay);
            let green = frame
                .data()
                .chunks_exact(3)
                .filter(|px| px == &[0, 255, 0])
                .count();
            seen.green_pixels.push(green);
            match self.quit_after {
                Some(n) if seen.overlays.len() >= n => Ok(DisplayEvent::Quit),
                _ => Ok(DisplayEvent::Continue),
            }
        }

        async fn idle(&mut self) -> Result<DisplayEvent, Box<dyn std::error::Error>> {
            self.seen.lock().unwrap().idles += 1;
            Ok(DisplayEvent::Continue)
        }

        fn close(&mut self) {
            self.seen.lock().unwrap().closed = true;
        }
    }

    fn pipeline(
        faces: Vec<Region>,
        quit_after: Option<usize>,
        warmup: Duration,
    ) -> (
        DetectionPipeline<StubDisplay, LogPipelineLogger>,
        Arc<Mutex<Presented>>,
        Arc<AtomicBool>,
    ) {
        let released = Arc::new(AtomicBool::new(false));
        let camera = StubCamera {
            generation: 0,
            released: released.clone(),
        };
        let (display, seen) = StubDisplay::new(quit_after);
        let pipeline = DetectionPipeline::new(
            FrameSource::with_device(Box::new(camera)),
            Box::new(StubDetector { faces, fail: false }),
            display,
            LogPipelineLogger::new(10),
            warmup,
        );
        (pipeline, seen, released)
    }

    #[test]
    fn test_zero_faces_draws_no_boxes() {
        let (mut pipeline, seen, _) = pipeline(Vec::new(), Some(5), Duration::ZERO);
        let signal = CancellationSignal::new().unwrap();

        let report = pollster::block_on(pipeline.run(&signal)).unwrap();

        assert_eq!(report.frames, 5);
        let seen = seen.lock().unwrap();
        assert!(seen.overlays.iter().all(|o| o.faces == 0));
        assert!(seen.green_pixels.iter().all(|&g| g == 0));
    }

    #[test]
    fn test_each_detected_face_gets_a_box() {
        let faces = vec![Region::new(2, 2, 20, 20), Region::new(30, 10, 30, 30)];
        let (mut pipeline, seen, _) = pipeline(faces, Some(3), Duration::ZERO);
        let signal = CancellationSignal::new().unwrap();

        pollster::block_on(pipeline.run(&signal)).unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.overlays.iter().all(|o| o.faces == 2));
        // Two 2 px outlines: perimeters of the outer and inner rings.
        let ring = |w: usize, h: usize| 2 * (w + h) - 4;
        let expected = ring(20, 20) + ring(18, 18) + ring(30, 30) + ring(28, 28);
        assert!(seen.green_pixels.iter().all(|&g| g == expected));
    }

    #[test]
    fn test_fps_label_changes_only_every_thirty_frames() {
        let (mut pipeline, seen, _) = pipeline(Vec::new(), Some(95), Duration::ZERO);
        let signal = CancellationSignal::new().unwrap();

        pollster::block_on(pipeline.run(&signal)).unwrap();

        let seen = seen.lock().unwrap();
        let fps: Vec<f64> = seen.overlays.iter().map(|o| o.fps).collect();
        let changes: Vec<usize> = (1..fps.len())
            .filter(|&i| fps[i] != fps[i - 1])
            .map(|i| i + 1)
            .collect();
        assert!(fps[..29].iter().all(|&f| f == 0.0));
        assert!(fps[29] > 0.0);
        assert!(changes.iter().all(|frame| frame % 30 == 0), "changes at {changes:?}");
    }

    #[test]
    fn test_quit_key_sets_signal_and_tears_down() {
        let (mut pipeline, seen, released) = pipeline(Vec::new(), Some(1), Duration::ZERO);
        let signal = CancellationSignal::new().unwrap();

        let report = pollster::block_on(pipeline.run(&signal)).unwrap();

        assert!(report.quit_requested);
        assert!(signal.is_set());
        assert!(seen.lock().unwrap().closed);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_external_signal_stops_loop() {
        let (mut pipeline, seen, released) = pipeline(Vec::new(), None, Duration::ZERO);
        let signal = CancellationSignal::new().unwrap();
        let setter = signal.clone();
        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            setter.set();
        });

        let start = Instant::now();
        let report = pollster::block_on(pipeline.run(&signal)).unwrap();
        trigger.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!report.quit_requested);
        assert!(seen.lock().unwrap().closed);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_warmup_honours_preset_signal() {
        let (mut pipeline, seen, released) = pipeline(Vec::new(), None, Duration::from_secs(10));
        let signal = CancellationSignal::new().unwrap();
        signal.set();

        let start = Instant::now();
        let report = pollster::block_on(pipeline.run(&signal)).unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(report.frames, 0);
        assert!(seen.lock().unwrap().closed);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_warmup_delays_first_frame() {
        let (mut pipeline, seen, _) = pipeline(Vec::new(), Some(1), Duration::from_millis(200));
        let signal = CancellationSignal::new().unwrap();

        let start = Instant::now();
        pollster::block_on(pipeline.run(&signal)).unwrap();

        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(seen.lock().unwrap().idles > 0);
    }

    #[test]
    fn test_detector_error_shows_frame_with_zero_faces() {
        let released = Arc::new(AtomicBool::new(false));
        let camera = StubCamera {
            generation: 0,
            released,
        };
        let (display, seen) = StubDisplay::new(Some(2));
        let mut pipeline = DetectionPipeline::new(
            FrameSource::with_device(Box::new(camera)),
            Box::new(StubDetector {
                faces: vec![Region::new(0, 0, 10, 10)],
                fail: true,
            }),
            display,
            LogPipelineLogger::new(10),
            Duration::ZERO,
        );
        let signal = CancellationSignal::new().unwrap();

        let report = pollster::block_on(pipeline.run(&signal)).unwrap();

        assert_eq!(report.frames, 2);
        assert!(seen.lock().unwrap().overlays.iter().all(|o| o.faces == 0));
    }

    #[test]
    fn test_stage_timings_are_logged() {
        let (mut pipeline, _, _) = pipeline(vec![Region::new(0, 0, 30, 30)], Some(4), Duration::ZERO);
        let signal = CancellationSignal::new().unwrap();

        pollster::block_on(pipeline.run(&signal)).unwrap();

        let logger = pipeline.logger();
        assert_eq!(logger.timings_for("detect").map(<[f64]>::len), Some(4));
        assert_eq!(logger.timings_for("render").map(<[f64]>::len), Some(4));
        assert_eq!(logger.metrics_for("faces").unwrap(), &[1.0; 4]);
        assert_eq!(logger.frames(), 4);
    }
}
