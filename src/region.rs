// region.rs -- Mouth region derivation from face (and mouth) detections.
//
// Object detection itself is outside this crate. A `RegionDetector` turns a
// gray frame into candidate boxes. `MouthLocator` picks the largest face,
// places a coarse mouth box in its lower middle, and optionally refines it
// with a second detector run inside that box.
//
//   face (x, y, w, h)
//   coarse mouth = (x + 0.2w, y + 0.65h, 0.6w, 0.5h)
//   refined      = first mouth hit, grown 25% of its width per side and
//                  30% of its height per side
//
// Fractional coordinates are truncated toward zero.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::convert::bgr_to_gray;
use crate::error::{Error, Result};
use crate::image::{resize_bilinear, BgrImage, Image};

/// Pixel rectangle. Signed so grown boxes can hang off the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// True when the rectangle is non-empty and lies inside a
    /// `width x height` frame.
    pub fn fits_in(&self, width: usize, height: usize) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && self.right() as i64 <= width as i64
            && self.bottom() as i64 <= height as i64
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect { x: self.x + dx, y: self.y + dy, ..*self }
    }
}

/// Object detector over a gray frame (raw 0..255 scale).
pub trait RegionDetector {
    fn detect(&self, gray: &Image<f32>) -> Vec<Rect>;
}

impl<D: RegionDetector + ?Sized> RegionDetector for &D {
    fn detect(&self, gray: &Image<f32>) -> Vec<Rect> {
        (**self).detect(gray)
    }
}

/// Placement of the mouth box relative to the face box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Face detection runs on the gray frame shrunk by this factor.
    pub detection_scale: f64,
    /// Left edge of the mouth box, as a fraction of face width.
    pub mouth_left: f64,
    /// Top edge of the mouth box, as a fraction of face height.
    pub mouth_top: f64,
    pub mouth_width: f64,
    pub mouth_height: f64,
    /// Growth of a detected mouth box per side, as fractions of its size.
    pub grow_x: f64,
    pub grow_y: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        LocatorConfig {
            detection_scale: 1.0,
            mouth_left: 0.2,
            mouth_top: 0.65,
            mouth_width: 0.6,
            mouth_height: 0.5,
            grow_x: 0.25,
            grow_y: 0.3,
        }
    }
}

/// Where the mouth was found in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouthRegion {
    /// Largest face, in frame coordinates.
    pub face: Rect,
    /// Mouth box derived from the face geometry.
    pub coarse: Rect,
    /// Grown mouth-detector hit, when one was found and fits the frame.
    pub refined: Option<Rect>,
}

impl MouthRegion {
    /// The region to swap: refined if available, else coarse.
    pub fn roi(&self) -> Rect {
        self.refined.unwrap_or(self.coarse)
    }
}

/// Finds the mouth in a color frame.
pub struct MouthLocator<'a> {
    face: &'a dyn RegionDetector,
    mouth: Option<&'a dyn RegionDetector>,
    config: LocatorConfig,
}

impl<'a> MouthLocator<'a> {
    /// Fails when `detection_scale` is not a positive finite number.
    pub fn new(face: &'a dyn RegionDetector, config: LocatorConfig) -> Result<Self> {
        let s = config.detection_scale;
        if !(s > 0.0 && s.is_finite()) {
            return Err(Error::invalid("detection_scale", s));
        }
        Ok(MouthLocator { face, mouth: None, config })
    }

    /// Refine the coarse box with a mouth detector.
    pub fn with_mouth_detector(mut self, mouth: &'a dyn RegionDetector) -> Self {
        self.mouth = Some(mouth);
        self
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Locate the mouth. None when no face is found or the coarse box
    /// reaches the frame edge.
    pub fn locate(&self, frame: &BgrImage<u8>) -> Option<MouthRegion> {
        let (fw, fh) = frame.dimensions();
        if frame.is_empty() {
            return None;
        }
        let gray = bgr_to_gray(frame);
        let face = self.find_face(&gray)?;

        let c = &self.config;
        let (x, y) = (face.x as f64, face.y as f64);
        let (w, h) = (face.width as f64, face.height as f64);
        let coarse = Rect::new(
            (x + w * c.mouth_left) as i32,
            (y + h * c.mouth_top) as i32,
            (w * c.mouth_width) as i32,
            (h * c.mouth_height) as i32,
        );

        // The coarse box must stay strictly inside the frame.
        if coarse.x < 0
            || coarse.y < 0
            || coarse.width <= 0
            || coarse.height <= 0
            || coarse.bottom() as i64 >= fh as i64
            || coarse.right() as i64 >= fw as i64
        {
            debug!(?face, ?coarse, "mouth box leaves the frame");
            return None;
        }

        let refined = self.mouth.and_then(|detector| self.refine(detector, &gray, coarse));
        debug!(?face, ?coarse, ?refined, "mouth located");
        Some(MouthRegion { face, coarse, refined })
    }

    /// Largest detected face by width, first on ties, in frame coordinates.
    fn find_face(&self, gray: &Image<f32>) -> Option<Rect> {
        let s = self.config.detection_scale;
        let faces = if (s - 1.0).abs() < f64::EPSILON {
            self.face.detect(gray)
        } else {
            let sw = (gray.width() as f64 / s).round().max(1.0) as usize;
            let sh = (gray.height() as f64 / s).round().max(1.0) as usize;
            self.face.detect(&resize_bilinear(gray, sw, sh))
        };

        let mut best: Option<Rect> = None;
        for f in faces {
            if best.map_or(true, |b| f.width > b.width) {
                best = Some(f);
            }
        }

        best.map(|f| {
            Rect::new(
                (f.x as f64 * s).round() as i32,
                (f.y as f64 * s).round() as i32,
                ((f.width - 1) as f64 * s).round() as i32,
                ((f.height - 1) as f64 * s).round() as i32,
            )
        })
    }

    fn refine(&self, detector: &dyn RegionDetector, gray: &Image<f32>, coarse: Rect) -> Option<Rect> {
        let crop = gray
            .sub_image(coarse.x as usize, coarse.y as usize, coarse.width as usize, coarse.height as usize)
            .to_owned_image();
        let hit = detector.detect(&crop).into_iter().next()?;
        let hit = hit.translated(coarse.x, coarse.y);

        let dx = hit.width as f64 * self.config.grow_x;
        let dy = hit.height as f64 * self.config.grow_y;
        let grown = Rect::new(
            (hit.x as f64 - dx) as i32,
            (hit.y as f64 - dy) as i32,
            (hit.width as f64 + 2.0 * dx) as i32,
            (hit.height as f64 + 2.0 * dy) as i32,
        );
        grown.fits_in(gray.width(), gray.height()).then_some(grown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Rect>);

    impl RegionDetector for Fixed {
        fn detect(&self, _gray: &Image<f32>) -> Vec<Rect> {
            self.0.clone()
        }
    }

    /// Reports the size of the image it was given as a box.
    struct EchoSize;

    impl RegionDetector for EchoSize {
        fn detect(&self, gray: &Image<f32>) -> Vec<Rect> {
            vec![Rect::new(0, 0, gray.width() as i32, gray.height() as i32)]
        }
    }

    fn frame() -> BgrImage<u8> {
        BgrImage::filled(400, 225, [90, 100, 110])
    }

    fn locator_for(faces: &dyn RegionDetector) -> MouthLocator<'_> {
        MouthLocator::new(faces, LocatorConfig::default()).expect("default scale is valid")
    }

    #[test]
    fn test_rect_fits_in() {
        assert!(Rect::new(0, 0, 10, 10).fits_in(10, 10));
        assert!(!Rect::new(1, 0, 10, 10).fits_in(10, 10));
        assert!(!Rect::new(-1, 0, 5, 5).fits_in(10, 10));
        assert!(!Rect::new(2, 2, 0, 5).fits_in(10, 10));
    }

    #[test]
    fn test_coarse_box_from_largest_face() {
        let faces = Fixed(vec![
            Rect::new(10, 10, 50, 50),
            Rect::new(100, 40, 101, 101),
            Rect::new(300, 10, 101, 80),
        ]);
        let locator = locator_for(&faces);
        let region = locator.locate(&frame()).expect("face found");

        // (w - 1, h - 1) scaling of the detector box.
        assert_eq!(region.face, Rect::new(100, 40, 100, 100));
        assert_eq!(region.coarse, Rect::new(120, 105, 60, 50));
        assert_eq!(region.refined, None);
        assert_eq!(region.roi(), region.coarse);
    }

    #[test]
    fn test_no_face() {
        let faces = Fixed(vec![]);
        let locator = locator_for(&faces);
        assert!(locator.locate(&frame()).is_none());
    }

    #[test]
    fn test_mouth_box_touching_bottom_edge_rejected() {
        // face (100, 100, 100, 100): mouth y + h = 165 + 50 = 215 < 225 is fine,
        // face (100, 120, 100, 100): 185 + 50 = 235 leaves the frame.
        let ok = Fixed(vec![Rect::new(100, 100, 101, 101)]);
        assert!(locator_for(&ok).locate(&frame()).is_some());

        let low = Fixed(vec![Rect::new(100, 120, 101, 101)]);
        assert!(locator_for(&low).locate(&frame()).is_none());
    }

    #[test]
    fn test_detection_scale_maps_back() {
        // Detector sees a half-size frame and reports a face in its coordinates.
        let faces = Fixed(vec![Rect::new(50, 20, 51, 51)]);
        let config = LocatorConfig { detection_scale: 2.0, ..Default::default() };
        let locator = MouthLocator::new(&faces, config).expect("valid scale");
        let region = locator.locate(&frame()).expect("face");
        assert_eq!(region.face, Rect::new(100, 40, 100, 100));
    }

    #[test]
    fn test_detection_scale_shrinks_frame() {
        let config = LocatorConfig { detection_scale: 2.0, ..Default::default() };
        let locator = MouthLocator::new(&EchoSize, config).expect("valid scale");
        // EchoSize reports (0, 0, 200, 113) on the 200x113 frame, scaled back
        // to (0, 0, 398, 224). Its mouth box reaches the bottom edge.
        assert!(locator.locate(&frame()).is_none());
        let faces = locator.find_face(&bgr_to_gray(&frame())).expect("face");
        assert_eq!(faces, Rect::new(0, 0, 398, 224));
    }

    #[test]
    fn test_refined_mouth_box() {
        let faces = Fixed(vec![Rect::new(100, 40, 101, 101)]);
        let mouths = Fixed(vec![Rect::new(20, 10, 20, 10), Rect::new(0, 0, 5, 5)]);
        let locator = locator_for(&faces).with_mouth_detector(&mouths);
        let region = locator.locate(&frame()).expect("face found");

        // Hit (140, 115, 20, 10) grown by (5, 3) per side.
        assert_eq!(region.refined, Some(Rect::new(135, 112, 30, 16)));
        assert_eq!(region.roi(), Rect::new(135, 112, 30, 16));
    }

    #[test]
    fn test_refined_box_outside_frame_is_dropped() {
        let faces = Fixed(vec![Rect::new(100, 40, 101, 101)]);
        let mouths = Fixed(vec![Rect::new(-30, 0, 20, 10)]);
        let locator = locator_for(&faces).with_mouth_detector(&mouths);
        let region = locator.locate(&frame()).expect("face found");
        // Translated hit starts at x = 90; grown x = 85 fits. Push further left.
        assert!(region.refined.is_some());

        let far = Fixed(vec![Rect::new(-125, 0, 20, 10)]);
        let locator = locator_for(&faces).with_mouth_detector(&far);
        let region = locator.locate(&frame()).expect("face found");
        assert_eq!(region.refined, None);
        assert_eq!(region.roi(), region.coarse);
    }

    #[test]
    fn test_non_positive_detection_scale_rejected() {
        let faces = Fixed(vec![Rect::new(100, 40, 101, 101)]);
        for scale in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let config = LocatorConfig { detection_scale: scale, ..Default::default() };
            assert!(matches!(
                MouthLocator::new(&faces, config),
                Err(Error::InvalidParameter { name: "detection_scale", .. })
            ));
        }
    }
}
