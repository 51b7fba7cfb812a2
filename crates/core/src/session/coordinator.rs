use std::time::Duration;

use crate::audio::audio_supervisor::AudioSupervisor;
use crate::audio::infrastructure::terminal_status_line::TerminalStatusLine;
use crate::display::domain::frame_display::FrameDisplay;
use crate::pipeline::detection_pipeline::{DetectionPipeline, PipelineReport};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::session::interrupt::{self, InterruptGuard};
use crate::session::isolated_process::IsolatedProcess;
use crate::session::session_error::SessionError;
use crate::shared::cancellation::CancellationSignal;
use crate::shared::config::SessionConfig;

/// How long the audio process gets to stop its recorder after the signal.
const AUDIO_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Wires the two halves of a session together.
///
/// ```text
///              CancellationSignal (shared mapping)
///               │                        │
///   main process: DetectionPipeline    forked child: AudioSupervisor
/// ```
///
/// The audio process is forked in [`Coordinator::start`], before the caller
/// spawns any thread (camera, inference pool, window). Shutdown is ordered:
/// signal, pipeline teardown, bounded wait for the audio process, kill.
pub struct Coordinator {
    config: SessionConfig,
    signal: CancellationSignal,
    audio: Option<IsolatedProcess>,
    interrupt: Option<InterruptGuard>,
}

impl Coordinator {
    /// Creates the signal and forks the audio process.
    ///
    /// Must run while the process is still single-threaded.
    pub fn start(config: SessionConfig) -> Result<Self, SessionError> {
        let signal = CancellationSignal::new()?;
        let audio = if config.audio_enabled {
            Some(spawn_audio(&config, &signal)?)
        } else {
            log::info!("Audio recording disabled");
            None
        };

        Ok(Self {
            config,
            signal,
            audio,
            interrupt: None,
        })
    }

    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn audio_pid(&self) -> Option<libc::pid_t> {
        self.audio.as_ref().map(IsolatedProcess::pid)
    }

    /// Runs the detection pipeline to completion, then shuts the session down.
    pub async fn run<V: FrameDisplay, L: PipelineLogger>(
        &mut self,
        display: V,
        logger: L,
    ) -> Result<PipelineReport, SessionError> {
        match interrupt::install(self.signal.clone()) {
            Ok(guard) => self.interrupt = Some(guard),
            Err(e) => log::warn!("Could not install interrupt handler: {e}"),
        }

        let result = match DetectionPipeline::open(&self.config, display, logger) {
            Ok(mut pipeline) => pipeline.run(&self.signal).await,
            Err(e) => Err(e),
        };
        self.run_pipeline_done(result)
    }

    fn run_pipeline_done(
        &mut self,
        result: Result<PipelineReport, SessionError>,
    ) -> Result<PipelineReport, SessionError> {
        if let Err(e) = &result {
            log::error!("Detection pipeline failed: {e}");
        }
        self.shutdown();
        result
    }

    /// Sets the signal and reaps the audio process. Idempotent.
    pub fn shutdown(&mut self) {
        self.signal.set();

        if let Some(mut audio) = self.audio.take() {
            match audio.shutdown(AUDIO_SHUTDOWN_TIMEOUT) {
                Ok(0) => log::debug!("Audio process exited cleanly"),
                Ok(code) => log::warn!("Audio process exited with code {code}"),
                Err(e) => log::warn!("Failed to reap audio process: {e}"),
            }
        }
        self.interrupt = None;
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_audio(
    config: &SessionConfig,
    signal: &CancellationSignal,
) -> Result<IsolatedProcess, SessionError> {
    let command = config.recorder.command();
    let policy = config.restart.clone();
    let child_signal = signal.clone();

    // SAFETY: called from `Coordinator::start`, before any thread exists.
    let process = unsafe {
        IsolatedProcess::spawn(move || {
            let supervisor = AudioSupervisor::new(command, policy, TerminalStatusLine::stderr());
            run_audio_process(supervisor, &child_signal)
        })
    }
    .map_err(SessionError::Fork)?;

    log::info!("Audio process started (pid {})", process.pid());
    Ok(process)
}

/// Body of the forked audio process.
fn run_audio_process(
    mut supervisor: AudioSupervisor<TerminalStatusLine>,
    signal: &CancellationSignal,
) -> i32 {
    #[cfg(target_os = "linux")]
    // SAFETY: prctl with PR_SET_PDEATHSIG only changes this process's state.
    unsafe {
        libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong);
    }

    // Ctrl+C reaches both processes; each one only raises the signal.
    let _interrupt = match interrupt::install(signal.clone()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            log::warn!("Audio process could not install interrupt handler: {e}");
            None
        }
    };

    supervisor.run(signal);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::model_resolver::DetectorResourceError;
    use crate::pipeline::pipeline_logger::NullPipelineLogger;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    /// Stand-in recorder: ignores its arguments, records its pid, then
    /// becomes a long `sleep` under the same pid.
    fn fake_recorder(dir: &Path) -> (PathBuf, PathBuf) {
        let pid_file = dir.join("recorder.pid");
        let script = dir.join("recorder.sh");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n",
                pid_file.display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        (script, pid_file)
    }

    fn audio_config(dir: &Path, recorder: &Path) -> SessionConfig {
        let mut config = SessionConfig {
            audio_enabled: true,
            model_search_paths: vec![dir.join("missing.onnx")],
            ..Default::default()
        };
        config.recorder.program = recorder.display().to_string();
        config.recorder.output = dir.join("take.wav");
        config
    }

    fn wait_for_pid(pid_file: &Path) -> libc::pid_t {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let pid = fs::read_to_string(pid_file)
                .ok()
                .and_then(|text| text.trim().parse().ok());
            if let Some(pid) = pid {
                return pid;
            }
            assert!(Instant::now() < deadline, "recorder never started");
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// False once the process is gone or only its zombie is left.
    fn is_running(pid: libc::pid_t) -> bool {
        let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return false;
        };
        let state = stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.trim_start().chars().next());
        !matches!(state, Some('Z' | 'X'))
    }

    fn wait_until_gone(pid: libc::pid_t, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while is_running(pid) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_failed_session_reaps_audio_process_and_recorder() {
        let tmp = TempDir::new().unwrap();
        let (script, pid_file) = fake_recorder(tmp.path());
        let mut coordinator = Coordinator::start(audio_config(tmp.path(), &script)).unwrap();
        let audio_pid = coordinator.audio_pid().unwrap();
        let recorder_pid = wait_for_pid(&pid_file);
        assert!(is_running(audio_pid));
        assert!(is_running(recorder_pid));

        let result = pollster::block_on(coordinator.run(NeverShown, NullPipelineLogger));

        assert!(matches!(
            result,
            Err(SessionError::Detector(DetectorResourceError::NotFound { .. }))
        ));
        assert!(coordinator.signal().is_set());
        assert!(coordinator.audio_pid().is_none());
        assert!(!is_running(audio_pid));
        assert!(wait_until_gone(recorder_pid, Duration::from_secs(5)));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_recorder_dies_with_killed_audio_process() {
        let tmp = TempDir::new().unwrap();
        let (script, pid_file) = fake_recorder(tmp.path());
        let mut coordinator = Coordinator::start(audio_config(tmp.path(), &script)).unwrap();
        let audio_pid = coordinator.audio_pid().unwrap();
        let recorder_pid = wait_for_pid(&pid_file);

        // SAFETY: audio_pid is our own unreaped child.
        assert_eq!(unsafe { libc::kill(audio_pid, libc::SIGKILL) }, 0);

        assert!(wait_until_gone(recorder_pid, Duration::from_secs(5)));
        coordinator.shutdown();
        assert!(coordinator.audio_pid().is_none());
        assert!(!is_running(audio_pid));
    }

    #[test]
    fn test_shutdown_without_audio_sets_signal() {
        let config = SessionConfig {
            audio_enabled: false,
            ..Default::default()
        };
        let mut coordinator = Coordinator::start(config).unwrap();
        assert!(coordinator.audio_pid().is_none());
        assert!(!coordinator.signal().is_set());

        coordinator.shutdown();
        coordinator.shutdown();
        assert!(coordinator.signal().is_set());
    }

    #[test]
    fn test_missing_model_fails_before_camera_and_stops_session() {
        let tmp = TempDir::new().unwrap();
        let config = SessionConfig {
            audio_enabled: false,
            model_search_paths: vec![tmp.path().join("missing.onnx")],
            ..Default::default()
        };
        let mut coordinator = Coordinator::start(config).unwrap();
        let display = NeverShown;

        let result = pollster::block_on(coordinator.run(display, NullPipelineLogger));

        assert!(matches!(
            result,
            Err(SessionError::Detector(DetectorResourceError::NotFound { .. }))
        ));
        assert!(coordinator.signal().is_set());
    }

    struct NeverShown;

    impl FrameDisplay for NeverShown {
        async fn present(
            &mut self,
            _frame: &crate::shared::frame::Frame,
            _overlay: &crate::pipeline::overlay::Overlay,
        ) -> Result<crate::display::domain::frame_display::DisplayEvent, Box<dyn std::error::Error>>
        {
            Err("not expected".into())
        }

        async fn idle(
            &mut self,
        ) -> Result<crate::display::domain::frame_display::DisplayEvent, Box<dyn std::error::Error>>
        {
            Err("not expected".into())
        }

        fn close(&mut self) {}
    }
}
