use ffmpeg_next::codec::Id;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use crate::capture::domain::camera_device::CameraDevice;
use crate::capture::domain::camera_settings::CameraSettings;
use crate::capture::frame_source::CaptureError;
use crate::shared::frame::Frame;

/// Captures from a V4L2 device through libavdevice and libavcodec.
///
/// Compressed streams (MJPEG, H.264) are decoded with a hardware decoder
/// when one is available, falling back to the software decoder. Every
/// decoded frame is converted to RGB24.
pub struct FfmpegCamera {
    state: Option<CameraState>,
    device: String,
    generation: u64,
}

struct CameraState {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    stream_index: usize,
    scaler: Option<RgbScaler>,
}

struct RgbScaler {
    context: scaling::Context,
    source: (Pixel, u32, u32),
}

// Safety: FfmpegCamera is owned by exactly one thread at a time (the capture
// thread once started). The raw pointers inside ffmpeg types are never shared.
unsafe impl Send for FfmpegCamera {}

impl FfmpegCamera {
    pub fn open(device_index: u32, settings: &CameraSettings) -> Result<Self, CaptureError> {
        let device = device_path(device_index);
        let unavailable = |source: ffmpeg_next::Error| CaptureError::DeviceUnavailable {
            device: device.clone(),
            source: Box::new(source),
        };

        ffmpeg_next::init().map_err(unavailable)?;

        let mut options = ffmpeg_next::Dictionary::new();
        options.set("video_size", &settings.video_size());
        options.set("framerate", &settings.framerate.to_string());

        let input = open_v4l2(&device, options).map_err(unavailable)?;

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| CaptureError::DeviceUnavailable {
                device: device.clone(),
                source: "no video stream on device".into(),
            })?;
        let stream_index = stream.index();
        let parameters = stream.parameters();

        let decoder = open_decoder(&parameters, settings.prefer_hardware_decoder)
            .map_err(unavailable)?;

        log::info!(
            "Opened {device}: {}x{} {:?} via {}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            decoder
                .codec()
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| "unknown decoder".to_string()),
        );

        Ok(Self {
            state: Some(CameraState {
                input,
                decoder,
                stream_index,
                scaler: None,
            }),
            device,
            generation: 0,
        })
    }

}

impl CameraDevice for FfmpegCamera {
    fn read_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        let Some(state) = self.state.as_mut() else {
            return Err(format!("{}: camera released", self.device).into());
        };

        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        loop {
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                break;
            }

            let Some((stream, packet)) = state.input.packets().next() else {
                return Err(format!("{}: capture stream ended", self.device).into());
            };
            if stream.index() != state.stream_index {
                continue;
            }
            if let Err(e) = state.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet: {e}");
            }
        }

        let width = decoded.width();
        let height = decoded.height();
        let scaler = rgb_scaler(&mut state.scaler, decoded.format(), width, height)?;

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        scaler.run(&decoded, &mut rgb_frame)?;

        self.generation += 1;
        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        Ok(Frame::new(pixels, width, height, 3, self.generation))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Released {}", self.device);
        }
    }
}

pub fn device_path(device_index: u32) -> String {
    format!("/dev/video{device_index}")
}

/// Opens `device` with the v4l2 demuxer, or lets libavformat probe it when
/// the demuxer is not registered.
fn open_v4l2(
    device: &str,
    options: ffmpeg_next::Dictionary,
) -> Result<ffmpeg_next::format::context::Input, ffmpeg_next::Error> {
    let v4l2 = ffmpeg_next::device::input::video()
        .find(|format| matches!(format.name(), "v4l2" | "video4linux2,v4l2" | "video4linux2"));

    match v4l2 {
        Some(format) => match ffmpeg_next::format::open_with(&device, &format, options)? {
            ffmpeg_next::format::context::Context::Input(input) => Ok(input),
            ffmpeg_next::format::context::Context::Output(_) => {
                Err(ffmpeg_next::Error::InvalidData)
            }
        },
        None => ffmpeg_next::format::input_with_dictionary(&device, options),
    }
}

/// Hardware decoders tried, in order, for a compressed camera codec.
pub fn hardware_decoder_candidates(codec: Id) -> &'static [&'static str] {
    match codec {
        Id::MJPEG => &["mjpeg_cuvid", "mjpeg_v4l2m2m"],
        Id::H264 => &["h264_cuvid", "h264_v4l2m2m"],
        _ => &[],
    }
}

fn open_decoder(
    parameters: &ffmpeg_next::codec::Parameters,
    prefer_hardware: bool,
) -> Result<ffmpeg_next::decoder::Video, ffmpeg_next::Error> {
    if prefer_hardware {
        let candidates = hardware_decoder_candidates(parameters.id());
        for name in candidates {
            let Some(codec) = ffmpeg_next::decoder::find_by_name(name) else {
                continue;
            };
            let opened = ffmpeg_next::codec::context::Context::from_parameters(parameters.clone())
                .and_then(|ctx| ctx.decoder().open_as(codec))
                .and_then(|opened| opened.video());
            match opened {
                Ok(decoder) => return Ok(decoder),
                Err(e) => log::info!("Hardware decoder {name} unavailable ({e}), trying next"),
            }
        }
        log::info!("{}", software_fallback_message(parameters.id(), candidates));
    }

    ffmpeg_next::codec::context::Context::from_parameters(parameters.clone())?
        .decoder()
        .video()
}

fn software_fallback_message(codec: Id, candidates: &[&str]) -> String {
    if candidates.is_empty() {
        format!("No hardware decoder for {codec:?}, using software decoding")
    } else {
        format!(
            "Hardware decoders {} unavailable, using software decoding",
            candidates.join(", ")
        )
    }
}

/// Returns a scaler converting `format` at `width × height` to RGB24,
/// rebuilding it if the decoder's output geometry changed.
fn rgb_scaler(
    slot: &mut Option<RgbScaler>,
    format: Pixel,
    width: u32,
    height: u32,
) -> Result<&mut scaling::Context, ffmpeg_next::Error> {
    let source = (format, width, height);
    if slot.as_ref().map(|s| s.source) != Some(source) {
        let context = scaling::Context::get(
            format,
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )?;
        *slot = Some(RgbScaler { context, source });
    }
    match slot {
        Some(scaler) => Ok(&mut scaler.context),
        None => Err(ffmpeg_next::Error::Bug),
    }
}

/// Copies an RGB24 frame into a tightly packed buffer, dropping row padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_bytes = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    pixels
}
