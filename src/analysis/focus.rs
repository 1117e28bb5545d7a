//! Sobel-gradient focus metric.

use image::DynamicImage;

/// Average Sobel gradient magnitude of the image's luminance.
///
/// Sharper images have stronger local gradients, so higher is better focused.
/// The 1-pixel border is skipped since the kernel can't be applied there.
/// Images smaller than 3x3 score 0.
///
/// The Sobel kernels used are:
/// ```text
/// Gx:          Gy:
/// [-1  0  1]   [-1 -2 -1]
/// [-2  0  2]   [ 0  0  0]
/// [-1  0  1]   [ 1  2  1]
/// ```
pub fn focus_metric(image: &DynamicImage) -> f64 {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let sobel_x: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    let sobel_y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];
    let data = gray.as_raw();

    let mut total: u64 = 0;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut gx: i32 = 0;
            let mut gy: i32 = 0;
            for ky in 0..3 {
                for kx in 0..3 {
                    let idx = ((y + ky - 1) * width + (x + kx - 1)) as usize;
                    let val = data[idx] as i32;
                    gx += val * sobel_x[ky as usize][kx as usize];
                    gy += val * sobel_y[ky as usize][kx as usize];
                }
            }
            // |gx| + |gy| approximates the Euclidean magnitude
            total += (gx.abs() + gy.abs()) as u64;
        }
    }

    let interior = (width as u64 - 2) * (height as u64 - 2);
    total as f64 / interior as f64
}
