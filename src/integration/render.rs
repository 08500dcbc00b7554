//! Draws an [`Overlay`] onto a frame.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};

use crate::tracker::{Overlay, Rect};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARKED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TRAIL_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const MARKED_TRAIL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const PREDICTION_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Boxes, trails and the prediction marker. Captions and the status line
/// are left to the display, which owns the fonts.
pub fn render_overlay(frame: &mut RgbImage, overlay: &Overlay) {
    for trail in &overlay.trails {
        let color = if trail.highlighted {
            MARKED_TRAIL_COLOR
        } else {
            TRAIL_COLOR
        };
        for pair in trail.points.windows(2) {
            draw_line_segment_mut(frame, (pair[0].x, pair[0].y), (pair[1].x, pair[1].y), color);
        }
    }

    for b in &overlay.boxes {
        let color = if b.highlighted { MARKED_COLOR } else { BOX_COLOR };
        if let Some(rect) = to_pixel_rect(&b.bbox) {
            draw_hollow_rect_mut(frame, rect, color);
        }
        if b.highlighted {
            // second outline, 2px thick in total
            let grown = Rect::new(
                b.bbox.x - 1.0,
                b.bbox.y - 1.0,
                b.bbox.width + 2.0,
                b.bbox.height + 2.0,
            );
            if let Some(rect) = to_pixel_rect(&grown) {
                draw_hollow_rect_mut(frame, rect, color);
            }
        }
    }

    if let Some(predicted) = overlay.predicted {
        let c = predicted.center();
        let centre = (c.x.round() as i32, c.y.round() as i32);
        draw_filled_circle_mut(frame, centre, 6, PREDICTION_COLOR);
    }
}

fn to_pixel_rect(bbox: &Rect) -> Option<imageproc::rect::Rect> {
    let width = bbox.width.round();
    let height = bbox.height.round();
    if width < 1.0 || height < 1.0 {
        return None;
    }
    Some(
        imageproc::rect::Rect::at(bbox.x.round() as i32, bbox.y.round() as i32)
            .of_size(width as u32, height as u32),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{OverlayBox, TrackId};

    #[test]
    fn test_renders_box_outline_and_prediction() {
        let mut frame = RgbImage::new(64, 64);
        let bbox = Rect::new(10.0, 10.0, 20.0, 20.0);
        let overlay = Overlay {
            boxes: vec![OverlayBox {
                id: TrackId::Num(1),
                bbox,
                caption: "Cup 1".into(),
                highlighted: false,
            }],
            predicted: Some(bbox),
            ..Overlay::default()
        };

        render_overlay(&mut frame, &overlay);
        assert_eq!(*frame.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*frame.get_pixel(20, 20), PREDICTION_COLOR);
        assert_eq!(*frame.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_box_is_skipped() {
        assert!(to_pixel_rect(&Rect::new(0.0, 0.0, 0.0, 5.0)).is_none());
    }
}
