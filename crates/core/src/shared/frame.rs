use image::{GrayImage, ImageBuffer, Rgb};

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// `generation` is the capture sequence number assigned by the camera. It
/// stands in for a timestamp: a larger generation is a newer frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    generation: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, generation: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            generation,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Luma conversion used as detector input.
    pub fn to_gray(&self) -> GrayImage {
        match self.rgb_view() {
            Some(view) => image::imageops::grayscale(&view),
            None => GrayImage::new(self.width, self.height),
        }
    }

    /// Mutable RGB canvas over the frame bytes, for drawing overlays in place.
    ///
    /// Returns `None` for non-RGB frames.
    pub fn rgb_canvas(&mut self) -> Option<ImageBuffer<Rgb<u8>, &mut [u8]>> {
        if self.channels != 3 {
            return None;
        }
        ImageBuffer::from_raw(self.width, self.height, self.data.as_mut_slice())
    }

    /// Expands to RGBA with an opaque alpha channel (GPU texture layout).
    pub fn to_rgba(&self) -> Vec<u8> {
        let pixels = (self.width as usize) * (self.height as usize);
        let mut rgba = Vec::with_capacity(pixels * 4);
        match self.channels {
            3 => {
                for px in self.data.chunks_exact(3) {
                    rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
            }
            1 => {
                for &v in &self.data {
                    rgba.extend_from_slice(&[v, v, v, 255]);
                }
            }
            _ => rgba.resize(pixels * 4, 255),
        }
        rgba
    }

    fn rgb_view(&self) -> Option<ImageBuffer<Rgb<u8>, &[u8]>> {
        if self.channels != 3 {
            return None;
        }
        ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())
    }
}
