use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing;
use imageproc::rect::Rect;

use crate::plate::BoundingBox;

pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Copy of `img` with a 2 px outline drawn around every box.
pub fn annotate<'a>(img: &DynamicImage, boxes: impl IntoIterator<Item = &'a BoundingBox>) -> RgbImage {
    let mut annotated = img.to_rgb8();
    for a_box in boxes {
        drawing::draw_hollow_rect_mut(&mut annotated, Rect::from(*a_box), ANNOTATION_COLOR);
        // second, inner outline
        if a_box.width() > 2 && a_box.height() > 2 {
            let inner = Rect::at(a_box.x() as i32 + 1, a_box.y() as i32 + 1).of_size(a_box.width() - 2, a_box.height() - 2);
            drawing::draw_hollow_rect_mut(&mut annotated, inner, ANNOTATION_COLOR);
        }
    }
    annotated
}

#[cfg(feature = "display")]
pub fn display_image(image: &RgbImage, title: &str) {
    let (width, height) = image.dimensions();
    imageproc::window::display_image(title, image, width, height);
}
