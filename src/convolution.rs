// convolution.rs -- Separable 1D convolution and Gaussian smoothing.
//
// A 2D Gaussian factors into a horizontal and a vertical 1D pass, so the
// pyramid smoothing step costs O(2k) per pixel instead of O(k²).
//
// BORDER HANDLING: replicate. Out-of-range taps read the nearest edge pixel.
// The same rule is used for every pyramid (left, right and mask), which is
// what keeps the blended reconstruction free of border artifacts.

use crate::image::{Image, Pixel};

/// Convolve each row of `src` with a centered 1D kernel (horizontal pass).
///
/// Interior pixels, where the whole kernel lies inside the row, skip the
/// bounds checks. Border pixels clamp their tap positions.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    check_kernel(kernel);

    let (w, h) = src.dimensions();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);
    if w == 0 {
        return dst;
    }

    let clamped = |x: usize, ki: usize| -> usize {
        ((x + ki) as isize - half as isize).clamp(0, (w - 1) as isize) as usize
    };

    for y in 0..h {
        for x in 0..w {
            let interior = x >= half && x + half < w;
            let mut acc = 0.0f32;
            if interior {
                // SAFETY: x - half >= 0 and x + half < w.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x + ki - half, y).to_f32() * kv;
                    }
                }
            } else {
                for (ki, &kv) in kernel.iter().enumerate() {
                    acc += src.get(clamped(x, ki), y).to_f32() * kv;
                }
            }
            // SAFETY: x < w, y < h.
            unsafe { dst.set_unchecked(x, y, acc); }
        }
    }
    dst
}

/// Convolve each column of `src` with a centered 1D kernel (vertical pass).
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    check_kernel(kernel);

    let (w, h) = src.dimensions();
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);
    if h == 0 {
        return dst;
    }

    for y in 0..h {
        let interior = y >= half && y + half < h;
        for x in 0..w {
            let mut acc = 0.0f32;
            if interior {
                // SAFETY: y - half >= 0 and y + half < h.
                unsafe {
                    for (ki, &kv) in kernel.iter().enumerate() {
                        acc += src.get_unchecked(x, y + ki - half) * kv;
                    }
                }
            } else {
                for (ki, &kv) in kernel.iter().enumerate() {
                    let sy = ((y + ki) as isize - half as isize).clamp(0, (h - 1) as isize) as usize;
                    acc += src.get(x, sy) * kv;
                }
            }
            // SAFETY: x < w, y < h.
            unsafe { dst.set_unchecked(x, y, acc); }
        }
    }
    dst
}

/// Full separable 2D convolution: horizontal pass, then vertical pass.
///
/// Always returns `Image<f32>` because accumulation happens in f32.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// Generate a normalized 1D Gaussian kernel of length `2 * half_size + 1`.
///
/// # Examples
/// ```
/// let k = lipflip::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let len = 2 * half_size + 1;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();

    // Coefficients sum to 1 so smoothing preserves brightness.
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Gaussian kernel truncated at three sigma (at least 3 taps).
pub fn gaussian_kernel_for_sigma(sigma: f32) -> Vec<f32> {
    let half_size = (3.0 * sigma).ceil().max(1.0) as usize;
    gaussian_kernel_1d(half_size, sigma)
}

/// Isotropic Gaussian blur with replicate borders.
pub fn gaussian_blur<T: Pixel>(src: &Image<T>, sigma: f32) -> Image<f32> {
    let k = gaussian_kernel_for_sigma(sigma);
    convolve_separable(src, &k, &k)
}

fn check_kernel(kernel: &[f32]) {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
}
