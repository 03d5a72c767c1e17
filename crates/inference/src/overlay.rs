use crate::processing::post::Detection;
use capture::Frame;
use image::Rgb;

const BOX_THICKNESS: u32 = 2;

// Distinct hues cycled by class id
const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [203, 56, 255],
];

pub fn class_color(class_id: u32) -> Rgb<u8> {
    Rgb(PALETTE[class_id as usize % PALETTE.len()])
}

/// Copy of `frame` with every detection outlined in its class colour.
pub fn draw_detections(frame: &Frame, detections: &[Detection]) -> Frame {
    let mut rendered = frame.clone();
    for det in detections {
        let bbox = [
            det.x1.max(0.0) as u32,
            det.y1.max(0.0) as u32,
            det.x2.max(0.0) as u32,
            det.y2.max(0.0) as u32,
        ];
        draw_rect(&mut rendered, bbox, class_color(det.class_id), BOX_THICKNESS);
    }
    rendered
}

/// Outline `[x0, y0, x1, y1]`, clipped to the image.
fn draw_rect(img: &mut Frame, bbox: [u32; 4], color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let [x0, y0, x1, y1] = bbox;
    let (x1, y1) = (x1.min(w - 1), y1.min(h - 1));

    for t in 0..thickness {
        let (xx0, yy0) = (x0.saturating_add(t), y0.saturating_add(t));
        let (xx1, yy1) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}
