use image::RgbaImage;

/// One captured frame in packed BGR24, the layout the encoder is fed with.
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Rounds dimensions down to even values; H.264 rejects odd sizes.
pub fn even_dimensions(width: u32, height: u32) -> (u32, u32) {
    (width & !1, height & !1)
}

impl Frame {
    /// Converts an RGBA grab into a BGR24 frame of exactly `width` x `height`.
    ///
    /// A grab larger than the target is cropped from the top-left, a smaller
    /// one is padded with black. This keeps the encoder's input size fixed
    /// even if the monitor resolution changes mid-session.
    pub fn from_rgba(image: &RgbaImage, width: u32, height: u32) -> Self {
        let row_len = width as usize * 3;
        let mut data = vec![0u8; row_len * height as usize];

        let copy_w = width.min(image.width()) as usize;
        let copy_h = height.min(image.height());
        let src = image.as_raw();
        let src_stride = image.width() as usize * 4;

        for y in 0..copy_h as usize {
            let src_row = &src[y * src_stride..y * src_stride + copy_w * 4];
            let dst_row = &mut data[y * row_len..y * row_len + copy_w * 3];
            for (dst, px) in dst_row.chunks_exact_mut(3).zip(src_row.chunks_exact(4)) {
                dst[0] = px[2];
                dst[1] = px[1];
                dst[2] = px[0];
            }
        }

        Self {
            width,
            height,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_even_dimensions() {
        assert_eq!(even_dimensions(1921, 1081), (1920, 1080));
        assert_eq!(even_dimensions(1280, 720), (1280, 720));
        assert_eq!(even_dimensions(1, 1), (0, 0));
    }

    #[test]
    fn test_channel_order_swapped() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let frame = Frame::from_rgba(&image, 2, 2);
        assert_eq!(frame.data.len(), 12);
        assert_eq!(&frame.data[0..3], &[30, 20, 10]);
    }

    #[test]
    fn test_larger_grab_is_cropped() {
        let mut image = RgbaImage::from_pixel(5, 3, Rgba([1, 2, 3, 255]));
        image.put_pixel(4, 0, Rgba([200, 200, 200, 255]));
        let frame = Frame::from_rgba(&image, 4, 2);
        assert_eq!(frame.data.len(), 4 * 2 * 3);
        assert!(frame.data.chunks_exact(3).all(|p| p == [3, 2, 1]));
    }

    #[test]
    fn test_smaller_grab_is_padded_black() {
        let image = RgbaImage::from_pixel(2, 1, Rgba([255, 255, 255, 255]));
        let frame = Frame::from_rgba(&image, 4, 2);
        assert_eq!(&frame.data[0..6], &[255; 6]);
        assert!(frame.data[6..].iter().all(|&b| b == 0));
    }
}
