use crate::config::DEFAULT_INPUT_SIZE;
use common::span;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// How the original image was placed inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl TransformParams {
    /// Map a point from model-input pixels back to original-image pixels.
    #[inline]
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x) / self.scale,
            (y - self.offset_y) / self.scale,
        )
    }
}

/// Letterboxes an RGB image into the NCHW `[1, 3, S, S]` tensor YOLO
/// exports expect, pixel values scaled to `[0, 1]`.
///
/// Holds no buffers between calls, so one instance can serve concurrent
/// requests.
#[derive(Debug, Clone, Copy)]
pub struct PreProcessor {
    pub input_size: u32,
}

impl PreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }

    pub fn preprocess(
        &self,
        image: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, TransformParams)> {
        let _s = span!("preprocess_image");

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        tracing::trace!(width, height, input_size = self.input_size, "Preprocessing image");

        let (letterboxed, transform) = self.resize_and_letterbox(image)?;
        let input = self.normalize(&letterboxed)?;

        Ok((input, transform))
    }

    fn resize_and_letterbox(&self, image: &RgbImage) -> anyhow::Result<(Vec<u8>, TransformParams)> {
        let _s = span!("resize_and_letterbox");

        let size = self.input_size;
        let (width, height) = image.dimensions();

        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

        let offset_x = (size - new_width) / 2;
        let offset_y = (size - new_height) / 2;

        let mut src_pixels = image.as_raw().clone();
        let src = Image::from_slice_u8(width, height, &mut src_pixels, PixelType::U8x3)?;

        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        let mut letterboxed = vec![LETTERBOX_COLOR; (size * size * 3) as usize];

        let resized_data = resized.buffer();
        let stride = size * 3;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            letterboxed[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        };

        Ok((letterboxed, transform))
    }

    fn normalize(&self, letterboxed: &[u8]) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let side = self.input_size as usize;
        let spatial = side * side;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in letterboxed.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, side, side]), output)?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
