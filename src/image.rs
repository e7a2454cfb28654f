// image.rs -- Runtime-sized image containers.
//
// Two containers live here:
//   Image<T>     one scalar channel (gray frames, blend masks, single planes)
//   BgrImage<T>  three planes in OpenCV channel order (B, G, R)
//
// Color is stored planar rather than interleaved. Every per-pixel operation
// in the blender (blur, downsample, upsample, weighted sum) is channel
// independent, so a color image is just three Image<f32> runs sharing one
// mask pyramid. Planar storage lets convolution.rs and pyramid.rs stay
// scalar.
//
// Coordinates are (x, y) = (column, row) everywhere.

use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Pixel Trait
// ---------------------------------------------------------------------------

/// Trait for types that can serve as pixel values in an Image.
///
/// `to_f32` is a raw cast (u8 42 -> 42.0). Normalized [0, 1] conversions
/// live in `convert.rs`.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32 value, clamping and rounding for
    /// integer types.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        // `as u8` truncates, so clamp and round first.
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for u16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 65535.0).round() as u16
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

// ---------------------------------------------------------------------------
// Image<T>
// ---------------------------------------------------------------------------
// Row-major, contiguous buffer with explicit stride. Pixels for row y start
// at y * stride; elements between width and stride are padding.

/// A 2D single-channel image with runtime dimensions.
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
    /// Row stride in elements. stride >= width.
    stride: usize,
}

impl<T: Pixel> Clone for Image<T> {
    fn clone(&self) -> Self {
        Image {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Pixel> Image<T> {
    /// Create a zero-initialized image. Stride equals width.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: T) -> Self {
        Image {
            data: vec![value; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Create an image from an existing row-major pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Image {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Create an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image::from_vec(width, height, data)
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// True when the image holds no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the pixel value at (x, y).
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.bounds_check(x, y);
        self.data[y * self.stride + x]
    }

    /// Get pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height,
            "get_unchecked({x},{y}) out of bounds for {}x{}", self.width, self.height);
        *self.data.get_unchecked(y * self.stride + x)
    }

    /// Set pixel value without bounds checking.
    ///
    /// # Safety
    /// Caller must guarantee x < width and y < height.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        *self.data.get_unchecked_mut(y * self.stride + x) = value;
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        *self.get_mut(x, y) = value;
    }

    /// Borrow a single row (without stride padding).
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {y} out of bounds (height {})", self.height);
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    /// Borrow a rectangular sub-region as an `ImageView`.
    ///
    /// # Panics
    /// Panics if the sub-region extends beyond image bounds.
    pub fn sub_image(&self, x: usize, y: usize, w: usize, h: usize) -> ImageView<'_, T> {
        assert!(
            x + w <= self.width && y + h <= self.height,
            "sub_image region ({x},{y},{w},{h}) exceeds image bounds ({},{})",
            self.width,
            self.height,
        );
        let start = y * self.stride + x;
        let end = if h == 0 {
            start
        } else {
            (y + h - 1) * self.stride + self.width
        };
        ImageView {
            data: &self.data[start..end],
            width: w,
            height: h,
            parent_stride: self.stride,
        }
    }

    /// Copy `src` into this image with its top-left corner at (x, y).
    ///
    /// # Panics
    /// Panics if `src` does not fit.
    pub fn paste(&mut self, src: &Image<T>, x: usize, y: usize) {
        assert!(
            x + src.width() <= self.width && y + src.height() <= self.height,
            "paste of {}x{} at ({x},{y}) exceeds image bounds ({},{})",
            src.width(),
            src.height(),
            self.width,
            self.height,
        );
        for sy in 0..src.height() {
            let dst_start = (y + sy) * self.stride + x;
            self.data[dst_start..dst_start + src.width()].copy_from_slice(src.row(sy));
        }
    }

    /// Iterate over all pixels as `(x, y, value)` tuples, skipping padding.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| (x, y, self.data[y * self.stride + x]))
        })
    }

    /// Apply `f` to every pixel, producing a new image of another type.
    pub fn map<U: Pixel>(&self, mut f: impl FnMut(T) -> U) -> Image<U> {
        let mut out = Image::new(self.width, self.height);
        for y in 0..self.height {
            for (d, &s) in out.row_mut(y).iter_mut().zip(self.row(y)) {
                *d = f(s);
            }
        }
        out
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x},{y}) out of bounds for image {}×{}",
            self.width,
            self.height,
        );
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Image<{}> {{ {}×{}, stride={} }}",
            std::any::type_name::<T>(),
            self.width,
            self.height,
            self.stride,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl<T: Pixel> std::ops::Index<(usize, usize)> for Image<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &T {
        self.bounds_check(x, y);
        &self.data[y * self.stride + x]
    }
}

impl<T: Pixel> std::ops::IndexMut<(usize, usize)> for Image<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        self.bounds_check(x, y);
        let idx = y * self.stride + x;
        &mut self.data[idx]
    }
}

// ---------------------------------------------------------------------------
// ImageView<'a, T>
// ---------------------------------------------------------------------------

/// A borrowed, read-only view into a rectangular region of an `Image<T>`.
pub struct ImageView<'a, T: Pixel> {
    /// Parent data, starting at the view's (0, 0) pixel.
    data: &'a [T],
    width: usize,
    height: usize,
    parent_stride: usize,
}

impl<'a, T: Pixel> ImageView<'a, T> {
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Get the pixel at (x, y) relative to the view's top-left corner.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        assert!(
            x < self.width && y < self.height,
            "ImageView pixel ({x},{y}) out of bounds for view {}×{}",
            self.width,
            self.height,
        );
        self.data[y * self.parent_stride + x]
    }

    /// Copy the view's pixels into a new owned Image.
    pub fn to_owned_image(&self) -> Image<T> {
        Image::from_fn(self.width, self.height, |x, y| self.get(x, y))
    }
}

// ---------------------------------------------------------------------------
// BgrImage<T>
// ---------------------------------------------------------------------------

/// A three-channel color image stored as B, G and R planes.
///
/// All three planes always share the same dimensions.
#[derive(Clone)]
pub struct BgrImage<T: Pixel> {
    planes: [Image<T>; 3],
}

impl<T: Pixel> BgrImage<T> {
    /// Create a zero-initialized color image.
    pub fn new(width: usize, height: usize) -> Self {
        BgrImage {
            planes: [
                Image::new(width, height),
                Image::new(width, height),
                Image::new(width, height),
            ],
        }
    }

    /// Create an image where every pixel has the color `[b, g, r]`.
    pub fn filled(width: usize, height: usize, bgr: [T; 3]) -> Self {
        BgrImage {
            planes: [
                Image::filled(width, height, bgr[0]),
                Image::filled(width, height, bgr[1]),
                Image::filled(width, height, bgr[2]),
            ],
        }
    }

    /// Assemble a color image from three planes.
    ///
    /// Returns `SizeMismatch` if the planes disagree in size.
    pub fn from_planes(b: Image<T>, g: Image<T>, r: Image<T>) -> Result<Self> {
        for plane in [&g, &r] {
            ensure_same_size(b.dimensions(), plane.dimensions())?;
        }
        Ok(BgrImage { planes: [b, g, r] })
    }

    /// Build from interleaved BGR data (`[b, g, r, b, g, r, ...]`).
    ///
    /// # Panics
    /// Panics if `data.len() != width * height * 3`.
    pub fn from_interleaved(width: usize, height: usize, data: &[T]) -> Self {
        assert_eq!(
            data.len(),
            width * height * 3,
            "interleaved data length ({}) must equal width * height * 3 ({})",
            data.len(),
            width * height * 3,
        );
        let mut img = BgrImage::new(width, height);
        for (i, px) in data.chunks_exact(3).enumerate() {
            img.set(i % width, i / width, [px[0], px[1], px[2]]);
        }
        img
    }

    /// Create an image by evaluating `f(x, y) -> [b, g, r]` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> [T; 3]) -> Self {
        let mut img = BgrImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.set(x, y, f(x, y));
            }
        }
        img
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        self.planes[0].dimensions()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.planes[0].is_empty()
    }

    /// Pixel at (x, y) as `[b, g, r]`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> [T; 3] {
        [
            self.planes[0].get(x, y),
            self.planes[1].get(x, y),
            self.planes[2].get(x, y),
        ]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, bgr: [T; 3]) {
        for (plane, v) in self.planes.iter_mut().zip(bgr) {
            plane.set(x, y, v);
        }
    }

    /// Borrow a single plane (0 = B, 1 = G, 2 = R).
    #[inline]
    pub fn plane(&self, channel: usize) -> &Image<T> {
        &self.planes[channel]
    }

    #[inline]
    pub fn plane_mut(&mut self, channel: usize) -> &mut Image<T> {
        &mut self.planes[channel]
    }

    pub fn planes(&self) -> &[Image<T>; 3] {
        &self.planes
    }

    pub fn into_planes(self) -> [Image<T>; 3] {
        self.planes
    }

    /// Copy a rectangular region into a new color image.
    ///
    /// # Panics
    /// Panics if the region exceeds the image bounds.
    pub fn crop(&self, x: usize, y: usize, w: usize, h: usize) -> BgrImage<T> {
        BgrImage {
            planes: [
                self.planes[0].sub_image(x, y, w, h).to_owned_image(),
                self.planes[1].sub_image(x, y, w, h).to_owned_image(),
                self.planes[2].sub_image(x, y, w, h).to_owned_image(),
            ],
        }
    }

    /// Copy `src` into this image with its top-left corner at (x, y).
    pub fn paste(&mut self, src: &BgrImage<T>, x: usize, y: usize) {
        for (dst, s) in self.planes.iter_mut().zip(src.planes.iter()) {
            dst.paste(s, x, y);
        }
    }

    /// Iterate over all pixels in raster order as `[b, g, r]`.
    pub fn pixels(&self) -> impl Iterator<Item = [T; 3]> + '_ {
        let (w, h) = self.dimensions();
        (0..h).flat_map(move |y| (0..w).map(move |x| self.get(x, y)))
    }

    /// Apply `f` to every channel value.
    pub fn map<U: Pixel>(&self, mut f: impl FnMut(T) -> U) -> BgrImage<U> {
        BgrImage {
            planes: [
                self.planes[0].map(&mut f),
                self.planes[1].map(&mut f),
                self.planes[2].map(&mut f),
            ],
        }
    }
}

impl<T: Pixel + fmt::Debug> fmt::Debug for BgrImage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "BgrImage<{}> {{ {}×{} }}",
            std::any::type_name::<T>(),
            self.width(),
            self.height(),
        )?;
        for y in 0..self.height().min(4) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width().min(6) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self.get(x, y))?;
            }
            if self.width() > 6 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

/// Fail with `SizeMismatch` unless the two `(width, height)` pairs agree.
pub fn ensure_same_size(expected: (usize, usize), found: (usize, usize)) -> Result<()> {
    if expected != found {
        return Err(Error::SizeMismatch { expected, found });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bilinear interpolation and resizing
// ---------------------------------------------------------------------------

/// Bilinear interpolation for sub-pixel access on an f32 image.
///
/// Coordinates are clamped to the image, so samples beyond the border
/// replicate the edge pixels.
///
/// # Panics
/// Panics if the image is empty.
pub fn interpolate_bilinear(img: &Image<f32>, x: f32, y: f32) -> f32 {
    assert!(!img.is_empty(), "cannot interpolate on an empty image");

    let max_x = (img.width() - 1) as f32;
    let max_y = (img.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);

    // SAFETY: x0, x1 < width and y0, y1 < height after clamping.
    unsafe {
        let p00 = img.get_unchecked(x0, y0);
        let p10 = img.get_unchecked(x1, y0);
        let p01 = img.get_unchecked(x0, y1);
        let p11 = img.get_unchecked(x1, y1);
        (1.0 - fx) * (1.0 - fy) * p00
            + fx * (1.0 - fy) * p10
            + (1.0 - fx) * fy * p01
            + fx * fy * p11
    }
}

/// Resize a single-channel image to `(width, height)` with bilinear sampling.
///
/// Pixel centers are aligned: destination pixel `x` samples the source at
/// `(x + 0.5) * src_w / dst_w - 0.5`. Borders replicate edge pixels.
///
/// # Panics
/// Panics if `src` is empty.
pub fn resize_bilinear(src: &Image<f32>, width: usize, height: usize) -> Image<f32> {
    let sx = src.width() as f32 / width.max(1) as f32;
    let sy = src.height() as f32 / height.max(1) as f32;
    let mut dst = Image::new(width, height);
    for y in 0..height {
        let fy = (y as f32 + 0.5) * sy - 0.5;
        for x in 0..width {
            let fx = (x as f32 + 0.5) * sx - 0.5;
            // SAFETY: x < width, y < height.
            unsafe { dst.set_unchecked(x, y, interpolate_bilinear(src, fx, fy)); }
        }
    }
    dst
}

/// Resize each plane of a color image, converting through f32.
pub fn resize_bgr<T: Pixel>(src: &BgrImage<T>, width: usize, height: usize) -> BgrImage<T> {
    let [b, g, r] = src.planes().clone().map(|p| {
        resize_bilinear(&p.map(Pixel::to_f32), width, height).map(T::from_f32)
    });
    BgrImage { planes: [b, g, r] }
}
