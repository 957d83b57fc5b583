use crate::Result;
use image::GrayImage;
use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};
use std::path::Path;

/// Load a color image from disk. Missing or undecodable files are fatal.
pub fn load_image(path: &Path) -> Result<Mat> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "image file does not exist: {}",
            path.display()
        ));
    }

    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("image path is not valid UTF-8: {}", path.display()))?;
    let img = imgcodecs::imread(path_str, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(anyhow::anyhow!("unable to decode image: {}", path.display()));
    }

    Ok(img)
}

/// Resize both images to their common maximum dimensions so the larger image
/// never loses detail.
pub fn resize_to_common(img1: &Mat, img2: &Mat) -> Result<(Mat, Mat)> {
    let s1 = img1.size()?;
    let s2 = img2.size()?;
    if s1 == s2 {
        return Ok((img1.clone(), img2.clone()));
    }

    let target = Size::new(s1.width.max(s2.width), s1.height.max(s2.height));
    let mut out1 = Mat::default();
    let mut out2 = Mat::default();
    imgproc::resize(img1, &mut out1, target, 0.0, 0.0, imgproc::INTER_LINEAR)?;
    imgproc::resize(img2, &mut out2, target, 0.0, 0.0, imgproc::INTER_LINEAR)?;

    Ok((out1, out2))
}

/// File name without extension, used to derive artifact names.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string()
}

/// Convert a GrayImage to an OpenCV Mat.
pub fn grayimage_to_mat(image: &GrayImage) -> Result<Mat> {
    let (width, height) = image.dimensions();
    let data = image.as_raw();

    let mut mat = Mat::zeros(height as i32, width as i32, opencv::core::CV_8UC1)?.to_mat()?;
    for y in 0..height {
        for x in 0..width {
            let pixel = data[(y * width + x) as usize];
            *mat.at_2d_mut::<u8>(y as i32, x as i32)? = pixel;
        }
    }

    Ok(mat)
}

/// Convert a single-channel OpenCV Mat back to a GrayImage.
pub fn mat_to_grayimage(mat: &Mat) -> Result<GrayImage> {
    let rows = mat.rows();
    let cols = mat.cols();

    let mut data = Vec::with_capacity((rows * cols) as usize);
    for y in 0..rows {
        for x in 0..cols {
            data.push(*mat.at_2d::<u8>(y, x)?);
        }
    }

    GrayImage::from_raw(cols as u32, rows as u32, data)
        .ok_or_else(|| anyhow::anyhow!("failed to create GrayImage from Mat"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::path::PathBuf;

    #[test]
    fn test_load_missing_image_fails() {
        let err = load_image(Path::new("/nonexistent/image.png")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_file_stem_strips_extension() {
        assert_eq!(file_stem(&PathBuf::from("/tmp/drawing_v2.png")), "drawing_v2");
        assert_eq!(file_stem(&PathBuf::from("photo.jpeg")), "photo");
    }

    #[test]
    fn test_grayimage_mat_roundtrip() {
        let image = GrayImage::from_fn(17, 9, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
        let mat = grayimage_to_mat(&image).unwrap();
        assert_eq!(mat.cols(), 17);
        assert_eq!(mat.rows(), 9);
        assert_eq!(mat.channels(), 1);

        let back = mat_to_grayimage(&mat).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_resize_to_common_uses_max_dimensions() {
        let a = grayimage_to_mat(&GrayImage::from_pixel(40, 60, Luma([128]))).unwrap();
        let b = grayimage_to_mat(&GrayImage::from_pixel(80, 30, Luma([128]))).unwrap();

        let (ra, rb) = resize_to_common(&a, &b).unwrap();
        assert_eq!(ra.size().unwrap(), opencv::core::Size::new(80, 60));
        assert_eq!(rb.size().unwrap(), opencv::core::Size::new(80, 60));
    }
}
