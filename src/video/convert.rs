//! Pixel format conversion
//!
//! Planar YCbCr 4:2:0 (arbitrary row and pixel strides) → NV21.
//!
//! ```text
//! Y  plane ──row copy, padding dropped──────────────> Y Y Y Y ...
//! U  plane ─┐
//!           ├─stride walk, one byte from each───────> V U V U ...
//! V  plane ─┘
//! ```
//!
//! Pixel stride 1 (I420 style) and pixel stride 2 (chroma already
//! interleaved by the camera) go through the same walk.

use crate::error::{AppError, Result};
use crate::video::format::Resolution;
use crate::video::frame::{Nv21Frame, PlanarImage, Plane};

/// Convert a planar 4:2:0 image to NV21
pub fn yuv420_to_nv21(image: &PlanarImage) -> Result<Nv21Frame> {
    let resolution = image.resolution();
    validate(image)?;

    let width = resolution.width as usize;
    let height = resolution.height as usize;
    let chroma = resolution.chroma();
    let chroma_width = chroma.width as usize;
    let chroma_height = chroma.height as usize;

    let mut out = Vec::with_capacity(resolution.nv21_size());

    // Luma: `width` bytes per row, stride padding is never copied
    let y = image.y_plane();
    for row in 0..height {
        let start = y.offset(row, 0);
        out.extend_from_slice(&y.data()[start..start + width]);
    }

    // Chroma: V then U for every sample position
    let (u, v) = (image.u_plane(), image.v_plane());
    let (u_data, v_data) = (u.data(), v.data());
    for row in 0..chroma_height {
        for col in 0..chroma_width {
            out.push(v_data[v.offset(row, col)]);
            out.push(u_data[u.offset(row, col)]);
        }
    }

    debug_assert_eq!(out.len(), resolution.nv21_size());
    Ok(Nv21Frame::from_vec(out, resolution))
}

fn validate(image: &PlanarImage) -> Result<()> {
    let resolution = image.resolution();
    if !resolution.is_even() {
        return Err(AppError::MalformedImage(format!(
            "dimensions must be even and non-zero, got {}",
            resolution
        )));
    }

    check_plane("Y", image.y_plane(), resolution)?;
    let chroma = resolution.chroma();
    check_plane("U", image.u_plane(), chroma)?;
    check_plane("V", image.v_plane(), chroma)?;
    Ok(())
}

fn check_plane(name: &str, plane: &Plane, dims: Resolution) -> Result<()> {
    let rows = dims.height as usize;
    let cols = dims.width as usize;

    if plane.pixel_stride() == 0 {
        return Err(AppError::MalformedImage(format!(
            "{} plane has zero pixel stride",
            name
        )));
    }

    let row_bytes = (cols - 1) * plane.pixel_stride() + 1;
    if plane.row_stride() < row_bytes {
        return Err(AppError::MalformedImage(format!(
            "{} plane row stride {} cannot hold {} samples with pixel stride {}",
            name,
            plane.row_stride(),
            cols,
            plane.pixel_stride()
        )));
    }

    let required = plane.required_len(rows, cols);
    if plane.data().len() < required {
        return Err(AppError::MalformedImage(format!(
            "{} plane buffer too small: {} < {}",
            name,
            plane.data().len(),
            required
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed_image(width: u32, height: u32, y_stride: usize) -> PlanarImage {
        let res = Resolution::new(width, height);
        let c = res.chroma();
        let y = Plane::packed(vec![16u8; y_stride * height as usize], y_stride);
        let u = Plane::packed(vec![128u8; c.pixels()], c.width as usize);
        let v = Plane::packed(vec![128u8; c.pixels()], c.width as usize);
        PlanarImage::new(res, y, u, v)
    }

    #[test]
    fn test_output_length() {
        for (w, h) in [(2, 2), (4, 2), (16, 8), (640, 480)] {
            let nv21 = yuv420_to_nv21(&packed_image(w, h, w as usize + 32)).unwrap();
            assert_eq!(nv21.len(), (w * h + w * h / 2) as usize);
        }
    }

    #[test]
    fn test_luma_padding_discarded() {
        // 4x2 luma with row stride 6: two bytes of padding per row
        let y = Plane::packed(vec![1, 2, 3, 4, 0xEE, 0xEE, 5, 6, 7, 8, 0xEE, 0xEE], 6);
        let u = Plane::packed(vec![0x10, 0x11], 2);
        let v = Plane::packed(vec![0x20, 0x21], 2);
        let image = PlanarImage::new(Resolution::new(4, 2), y, u, v);

        let nv21 = yuv420_to_nv21(&image).unwrap();
        assert_eq!(&nv21.as_bytes()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(nv21.vu_plane(), &[0x20, 0x10, 0x21, 0x11]);
    }

    #[test]
    fn test_chroma_order_is_v_then_u() {
        // 4x4 image, 2x2 chroma grid with distinct values
        let y = Plane::packed(vec![0u8; 16], 4);
        let u = Plane::packed(vec![0xA0, 0xA1, 0xA2, 0xA3], 2);
        let v = Plane::packed(vec![0xB0, 0xB1, 0xB2, 0xB3], 2);
        let image = PlanarImage::new(Resolution::new(4, 4), y, u, v);

        let nv21 = yuv420_to_nv21(&image).unwrap();
        assert_eq!(
            nv21.vu_plane(),
            &[0xB0, 0xA0, 0xB1, 0xA1, 0xB2, 0xA2, 0xB3, 0xA3]
        );
    }

    #[test]
    fn test_semi_planar_source() {
        // Camera-style layout: U and V views into one interleaved UV buffer,
        // pixel stride 2, row stride 8 for a 2-sample-wide chroma plane.
        let uv = vec![
            0xA0, 0xB0, 0xA1, 0xB1, 0, 0, 0, 0, //
            0xA2, 0xB2, 0xA3, 0xB3,
        ];
        let u = Plane::new(uv.clone(), 8, 2);
        let v = Plane::new(uv[1..].to_vec(), 8, 2);
        let y = Plane::packed(vec![0u8; 16], 4);
        let image = PlanarImage::new(Resolution::new(4, 4), y, u, v);

        let nv21 = yuv420_to_nv21(&image).unwrap();
        assert_eq!(
            nv21.vu_plane(),
            &[0xB0, 0xA0, 0xB1, 0xA1, 0xB2, 0xA2, 0xB3, 0xA3]
        );
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let y = Plane::packed(vec![0u8; 15], 5);
        let u = Plane::packed(vec![0u8; 2], 2);
        let v = Plane::packed(vec![0u8; 2], 2);
        let image = PlanarImage::new(Resolution::new(5, 3), y, u, v);
        assert!(matches!(
            yuv420_to_nv21(&image),
            Err(AppError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_short_plane_rejected() {
        let y = Plane::packed(vec![0u8; 8], 6); // needs 6 + 4 = 10
        let u = Plane::packed(vec![0u8; 2], 2);
        let v = Plane::packed(vec![0u8; 2], 2);
        let image = PlanarImage::new(Resolution::new(4, 2), y, u, v);
        assert!(matches!(
            yuv420_to_nv21(&image),
            Err(AppError::MalformedImage(_))
        ));
    }

    #[test]
    fn test_unpadded_last_row_accepted() {
        // stride 6, but the final row stops right after its 4 samples
        let y = Plane::packed(vec![9u8; 10], 6);
        let u = Plane::packed(vec![0u8; 2], 2);
        let v = Plane::packed(vec![0u8; 2], 2);
        let image = PlanarImage::new(Resolution::new(4, 2), y, u, v);
        assert!(yuv420_to_nv21(&image).is_ok());
    }

    #[test]
    fn test_bad_strides_rejected() {
        let y = Plane::packed(vec![0u8; 8], 3); // row stride below width
        let u = Plane::packed(vec![0u8; 2], 2);
        let v = Plane::packed(vec![0u8; 2], 2);
        let image = PlanarImage::new(Resolution::new(4, 2), y, u, v);
        assert!(yuv420_to_nv21(&image).is_err());

        let y = Plane::packed(vec![0u8; 8], 4);
        let u = Plane::new(vec![0u8; 2], 2, 0);
        let v = Plane::packed(vec![0u8; 2], 2);
        let image = PlanarImage::new(Resolution::new(4, 2), y, u, v);
        assert!(yuv420_to_nv21(&image).is_err());
    }
}
