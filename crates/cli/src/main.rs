use std::path::PathBuf;
use std::process;

use clap::Parser;

use facecam_core::display::infrastructure::macroquad_display::MacroquadDisplay;
use facecam_core::pipeline::pipeline_logger::LogPipelineLogger;
use facecam_core::platform::performance;
use facecam_core::session::coordinator::Coordinator;
use facecam_core::shared::config::SessionConfig;
use facecam_core::shared::constants::WINDOW_TITLE;

/// Live camera face detection with background audio recording.
#[derive(Parser, Debug)]
#[command(name = "facecam")]
struct Cli {
    /// JSON session config. Missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device index (/dev/videoN).
    #[arg(long)]
    device: Option<u32>,

    /// Requested capture width.
    #[arg(long)]
    width: Option<u32>,

    /// Requested capture height.
    #[arg(long)]
    height: Option<u32>,

    /// Face detector model, searched before the default locations.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Audio output file (overwritten each run).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip audio recording.
    #[arg(long)]
    no_audio: bool,

    /// Run nvpmodel/jetson_clocks before starting.
    #[arg(long)]
    performance_mode: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let coordinator = match start() {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let conf = window_conf(coordinator.config());
    macroquad::Window::from_config(conf, async move {
        let code = run_session(coordinator).await;
        process::exit(code);
    });
}

/// Everything that must happen before the window exists and any thread starts.
fn start() -> Result<Coordinator, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    apply_overrides(&mut config, cli);

    if config.performance_mode {
        performance::apply(performance::DEFAULT_STEPS);
    }

    Ok(Coordinator::start(config)?)
}

fn apply_overrides(config: &mut SessionConfig, cli: Cli) {
    if let Some(device) = cli.device {
        config.camera.device_index = device;
    }
    if let Some(width) = cli.width {
        config.camera.width = width;
    }
    if let Some(height) = cli.height {
        config.camera.height = height;
    }
    if let Some(model) = cli.model {
        config.prepend_model_path(model);
    }
    if let Some(output) = cli.output {
        config.recorder.output = output;
    }
    if cli.no_audio {
        config.audio_enabled = false;
    }
    if cli.performance_mode {
        config.performance_mode = true;
    }
}

fn window_conf(config: &SessionConfig) -> macroquad::window::Conf {
    macroquad::window::Conf {
        window_title: WINDOW_TITLE.to_string(),
        window_width: config.camera.width as i32,
        window_height: config.camera.height as i32,
        ..Default::default()
    }
}

async fn run_session(mut coordinator: Coordinator) -> i32 {
    let display = MacroquadDisplay::new();
    let result = coordinator.run(display, LogPipelineLogger::default()).await;
    // Reaps the audio process before the exit code is reported.
    drop(coordinator);

    match result {
        Ok(report) => {
            log::info!("Stopped after {} frames", report.frames);
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}
