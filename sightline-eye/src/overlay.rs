//! Bounding box and label overlays drawn into streamed frames
//!
//! Boxes and labels are drawn with `imageproc`, or with OpenCV's `imgproc`
//! when the `opencv` feature is enabled. Labels need a TrueType font unless
//! OpenCV draws them; without one only the boxes are drawn.

use crate::config::VisionConfig;
use crate::frame::Frame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use sightline_core::{BoundingBox, Detection, Mode};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 2;
/// Label height in pixels
const LABEL_SIZE: i32 = 18;
/// Space between the label and the top of its box
const LABEL_GAP: i32 = 10;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Load the label font from `path`, or from the first system font found
pub fn load_label_font(path: Option<&Path>) -> Option<Font<'static>> {
    if let Some(path) = path {
        let font = read_font(path);
        if font.is_none() {
            warn!("Overlay font {} could not be loaded", path.display());
        }
        return font;
    }

    let font = SYSTEM_FONTS.iter().map(Path::new).find_map(read_font);
    if font.is_none() {
        warn!("No overlay font found, labels will not be drawn");
    }
    font
}

fn read_font(path: &Path) -> Option<Font<'static>> {
    let bytes = std::fs::read(path).ok()?;
    let font = Font::try_from_vec(bytes)?;
    debug!("Overlay font loaded from {}", path.display());
    Some(font)
}

/// Box and label origin of one detection, clipped to the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    /// Top of the label text
    label_top: i32,
}

impl Placement {
    /// `None` when the box lies entirely outside a `width` x `height` frame
    fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let (max_x, max_y) = (i64::from(width) - 1, i64::from(height) - 1);
        let (x1, x2) = (i64::from(bbox.x1.min(bbox.x2)), i64::from(bbox.x1.max(bbox.x2)));
        let (y1, y2) = (i64::from(bbox.y1.min(bbox.y2)), i64::from(bbox.y1.max(bbox.y2)));
        if x2 < 0 || y2 < 0 || x1 > max_x || y1 > max_y {
            return None;
        }

        let (left, right) = (x1.max(0), x2.min(max_x));
        let (top, bottom) = (y1.max(0), y2.min(max_y));
        let label_top = i64::from(bbox.y1.saturating_sub(LABEL_GAP + LABEL_SIZE)).clamp(0, max_y);

        Some(Self {
            x: left as i32,
            y: top as i32,
            width: (right - left + 1) as u32,
            height: (bottom - top + 1) as u32,
            label_top: label_top as i32,
        })
    }
}

/// Draws detections into a frame
#[derive(Clone)]
pub struct Overlay {
    box_color: Rgb<u8>,
    font: Option<Font<'static>>,
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("box_color", &self.box_color)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Overlay {
    pub fn new(box_color: [u8; 3]) -> Self {
        Self {
            box_color: Rgb(box_color),
            font: None,
        }
    }

    /// Green boxes for navigation, red for object description
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Navigation => Self::new([0, 255, 0]),
            Mode::ObjectDetection => Self::new([255, 0, 0]),
        }
    }

    pub fn with_font(mut self, font: Option<Font<'static>>) -> Self {
        self.font = font;
        self
    }

    pub fn box_color(&self) -> [u8; 3] {
        self.box_color.0
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw each detection's box and its `label` text above the box
    pub fn annotate(&self, frame: &mut Frame, labelled: &[(&Detection, String)]) {
        let image = frame.image_mut();
        let (width, height) = image.dimensions();
        let placed: Vec<(Placement, &str)> = labelled
            .iter()
            .filter_map(|(d, label)| Placement::clip(&d.bbox, width, height).map(|p| (p, label.as_str())))
            .collect();
        if placed.is_empty() {
            return;
        }

        #[cfg(feature = "opencv")]
        {
            match cv::annotate(image, self.box_color, &placed) {
                Ok(()) => return,
                Err(e) => warn!("OpenCV overlay failed, drawing without it: {}", e),
            }
        }

        for (placement, label) in &placed {
            draw_box(image, placement, self.box_color);
            if let Some(font) = &self.font {
                draw_text_mut(
                    image,
                    LABEL_COLOR,
                    placement.x,
                    placement.label_top,
                    Scale::uniform(LABEL_SIZE as f32),
                    font,
                    label,
                );
            }
        }
    }
}

/// Overlay of each mode, sharing one label font
#[derive(Debug, Clone)]
pub struct ModeOverlays {
    navigation: Overlay,
    description: Overlay,
}

impl ModeOverlays {
    pub fn new(font: Option<Font<'static>>) -> Self {
        Self {
            navigation: Overlay::for_mode(Mode::Navigation).with_font(font.clone()),
            description: Overlay::for_mode(Mode::ObjectDetection).with_font(font),
        }
    }

    pub fn from_config(config: &VisionConfig) -> Self {
        Self::new(load_label_font(config.overlay_font.as_deref()))
    }

    pub fn for_mode(&self, mode: Mode) -> &Overlay {
        match mode {
            Mode::Navigation => &self.navigation,
            Mode::ObjectDetection => &self.description,
        }
    }
}

fn draw_box(image: &mut RgbImage, placement: &Placement, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let width = placement.width.saturating_sub(2 * inset);
        let height = placement.height.saturating_sub(2 * inset);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at(placement.x + inset as i32, placement.y + inset as i32).of_size(width, height);
        draw_hollow_rect_mut(image, rect, color);
    }
}

#[cfg(feature = "opencv")]
mod cv {
    //! Overlay drawing through OpenCV `imgproc`

    use super::{Placement, LABEL_COLOR, LABEL_SIZE};
    use image::{Rgb, RgbImage};
    use opencv::{
        core::{self, Mat, Point, Rect, Scalar},
        imgproc,
        prelude::*,
    };

    /// Hershey simplex scale whose capitals are about `LABEL_SIZE` pixels tall
    const FONT_SCALE: f64 = LABEL_SIZE as f64 / 22.0;

    // The buffer stays in RGB order, so colours are given as RGB too
    fn scalar(color: Rgb<u8>) -> Scalar {
        let [r, g, b] = color.0;
        Scalar::new(f64::from(r), f64::from(g), f64::from(b), 0.0)
    }

    pub(super) fn annotate(image: &mut RgbImage, box_color: Rgb<u8>, placed: &[(Placement, &str)]) -> opencv::Result<()> {
        let (width, height) = image.dimensions();
        let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, core::CV_8UC3, Scalar::all(0.0))?;
        mat.data_bytes_mut()?.copy_from_slice(image.as_raw());

        for (placement, label) in placed {
            let rect = Rect::new(placement.x, placement.y, placement.width as i32, placement.height as i32);
            imgproc::rectangle(&mut mat, rect, scalar(box_color), 2, imgproc::LINE_8, 0)?;
            imgproc::put_text(
                &mut mat,
                label,
                Point::new(placement.x, placement.label_top.saturating_add(LABEL_SIZE)),
                imgproc::FONT_HERSHEY_SIMPLEX,
                FONT_SCALE,
                scalar(LABEL_COLOR),
                2,
                imgproc::LINE_8,
                false,
            )?;
        }

        let pixels: &mut [u8] = image;
        pixels.copy_from_slice(mat.data_bytes()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(frame: &Frame, x: u32, y: u32) -> bool {
        frame.image().get_pixel(x, y).0 != [0, 0, 0]
    }

    #[test]
    fn test_box_is_drawn_in_mode_color() {
        let mut frame = Frame::filled(64, 64, [0, 0, 0]);
        let detection = Detection::new("cup", BoundingBox::new(10, 30, 40, 60));
        Overlay::for_mode(Mode::Navigation).annotate(&mut frame, &[(&detection, "cup 3.3m".to_string())]);

        assert_eq!(frame.image().get_pixel(25, 30).0, [0, 255, 0]);
        assert_eq!(frame.image().get_pixel(40, 45).0, [0, 255, 0]);
        if cfg!(not(feature = "opencv")) {
            // Second line of the border
            assert_eq!(frame.image().get_pixel(25, 31).0, [0, 255, 0]);
        }
        assert_eq!(frame.image().get_pixel(25, 45).0, [0, 0, 0]);
    }

    #[test]
    fn test_without_font_only_boxes_are_drawn() {
        let mut frame = Frame::filled(64, 64, [0, 0, 0]);
        let detection = Detection::new("cup", BoundingBox::new(10, 40, 40, 60));
        let overlay = Overlay::for_mode(Mode::ObjectDetection);
        assert!(!overlay.has_font());
        overlay.annotate(&mut frame, &[(&detection, "cup 3.3m".to_string())]);

        if cfg!(not(feature = "opencv")) {
            assert!((0..64).all(|x| (0..40).all(|y| !lit(&frame, x, y))));
        }
        assert_eq!(frame.image().get_pixel(20, 40).0, [255, 0, 0]);
    }

    #[test]
    fn test_label_is_drawn_above_box() {
        let Some(font) = load_label_font(None) else {
            return;
        };
        let mut frame = Frame::filled(64, 64, [0, 0, 0]);
        let detection = Detection::new("cup", BoundingBox::new(0, 40, 30, 60));
        Overlay::for_mode(Mode::Navigation)
            .with_font(Some(font))
            .annotate(&mut frame, &[(&detection, "cup".to_string())]);

        // Green box pixels have no red; label pixels are white-ish
        let label_pixels = (0..64)
            .flat_map(|x| (0..40).map(move |y| (x, y)))
            .filter(|&(x, y)| frame.image().get_pixel(x, y).0[0] > 0)
            .count();
        assert!(label_pixels > 0);
    }

    #[test]
    fn test_boxes_are_clipped_to_the_frame() {
        let mut frame = Frame::filled(16, 16, [0, 0, 0]);
        let detection = Detection::new("bus", BoundingBox::new(-50, -50, 500, 500));
        Overlay::for_mode(Mode::ObjectDetection).annotate(&mut frame, &[(&detection, String::new())]);
        assert_eq!(frame.image().get_pixel(0, 8).0, [255, 0, 0]);
        assert_eq!(frame.image().get_pixel(15, 8).0, [255, 0, 0]);
        assert_eq!(frame.image().get_pixel(8, 8).0, [0, 0, 0]);
    }

    #[test]
    fn test_extreme_coordinates_do_not_overflow() {
        let mut frame = Frame::filled(32, 32, [0, 0, 0]);
        let wide = Detection::new("wall", BoundingBox::new(4, i32::MIN, i32::MAX, 28));
        let huge = Detection::new("sky", BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX));
        Overlay::for_mode(Mode::Navigation)
            .with_font(load_label_font(None))
            .annotate(&mut frame, &[(&wide, "wall".to_string()), (&huge, "sky".to_string())]);
        // Below the label, on the left edge of the clipped box
        assert_eq!(frame.image().get_pixel(4, 26).0, [0, 255, 0]);
    }

    #[test]
    fn test_boxes_outside_the_frame_are_skipped() {
        let mut frame = Frame::filled(16, 16, [0, 0, 0]);
        let detection = Detection::new("car", BoundingBox::new(100, 100, 200, 200));
        Overlay::for_mode(Mode::Navigation)
            .with_font(load_label_font(None))
            .annotate(&mut frame, &[(&detection, "car".to_string())]);
        assert!(frame.image().pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_mode_overlays_share_the_font() {
        let overlays = ModeOverlays::new(None);
        assert_eq!(overlays.for_mode(Mode::Navigation).box_color(), [0, 255, 0]);
        assert_eq!(overlays.for_mode(Mode::ObjectDetection).box_color(), [255, 0, 0]);
        assert!(!overlays.for_mode(Mode::Navigation).has_font());

        let mut config = VisionConfig::default();
        config.overlay_font = Some("/nonexistent/font.ttf".into());
        assert!(!ModeOverlays::from_config(&config).for_mode(Mode::ObjectDetection).has_font());
    }

    #[test]
    fn test_placement_label_sits_above_box() {
        let placement = Placement::clip(&BoundingBox::new(10, 100, 50, 150), 640, 480).unwrap();
        assert_eq!((placement.x, placement.y, placement.width, placement.height), (10, 100, 41, 51));
        assert_eq!(placement.label_top, 100 - LABEL_GAP - LABEL_SIZE);

        // Near the top edge the label is pinned to row zero
        let placement = Placement::clip(&BoundingBox::new(10, 5, 50, 150), 640, 480).unwrap();
        assert_eq!(placement.label_top, 0);
    }
}
