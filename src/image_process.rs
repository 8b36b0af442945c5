//! Raster to mask, and mask to candidate boxes.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::morphology::close;
use imageproc::point::Point;
use tracing::debug;

use crate::config::{AdaptiveMethod, Binarization, LprConfig};
use crate::plate::BoundingBox;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

/// Widest closing kernel, its radius must fit in a `u8`.
pub const MAX_CLOSE_KERNEL: u32 = 2 * u8::MAX as u32 + 1;

/// Turn a colour raster into `(grayscale, mask)`.
///
/// The grayscale image is what candidates get cropped from, the mask is what
/// contours are traced on. Both have the dimensions of `img`.
pub fn preprocess(img: &DynamicImage, config: &LprConfig) -> (GrayImage, GrayImage) {
    let gray = to_grayscale(img);
    let mask = binarize(&gray, config.binarization);
    let mask = close_mask(&mask, config.close_kernel);
    debug!(width = gray.width(), height = gray.height(), "preprocessed");
    (gray, mask)
}

/// Luminance-weighted single channel.
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

pub fn binarize(gray: &GrayImage, binarization: Binarization) -> GrayImage {
    match binarization {
        Binarization::Global { threshold } => threshold_above(gray, threshold),
        Binarization::Otsu => {
            let level = otsu_level(gray);
            debug!(level, "otsu level");
            threshold_above(gray, level)
        },
        Binarization::Adaptive { block_size, offset, weighting } => {
            adaptive_threshold(gray, block_size, offset, weighting)
        },
    }
}

fn threshold_above(gray: &GrayImage, level: u8) -> GrayImage {
    let mut mask = gray.clone();
    mask.pixels_mut().for_each(|p| {
        p.0[0] = if p.0[0] > level { FOREGROUND } else { BACKGROUND };
    });
    mask
}

// dark detail (plate characters) against its surroundings becomes foreground,
// flat areas stay background whatever their brightness
fn adaptive_threshold(gray: &GrayImage, block_size: u32, offset: i16, weighting: AdaptiveMethod) -> GrayImage {
    let local = match weighting {
        AdaptiveMethod::Mean => {
            let radius = block_size / 2;
            box_filter(gray, radius, radius)
        },
        AdaptiveMethod::Gaussian => gaussian_blur_f32(gray, gaussian_sigma(block_size)),
    };
    let mut mask = GrayImage::new(gray.width(), gray.height());
    mask.pixels_mut().zip(gray.pixels()).zip(local.pixels()).for_each(|((m, src), mean)| {
        let limit = mean.0[0] as i32 - offset as i32;
        *m = if (src.0[0] as i32) < limit { Luma([FOREGROUND]) } else { Luma([BACKGROUND]) };
    });
    mask
}

// sigma a gaussian kernel of this size would get by default
fn gaussian_sigma(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Morphological closing with a `kernel` x `kernel` square. Kernels wider
/// than `MAX_CLOSE_KERNEL` are treated as `MAX_CLOSE_KERNEL`.
pub fn close_mask(mask: &GrayImage, kernel: u32) -> GrayImage {
    let radius = u8::try_from(kernel / 2).unwrap_or(u8::MAX);
    close(mask, Norm::LInf, radius)
}

/// Bounding boxes of the outermost foreground regions in `mask`, in the
/// order the scan discovers them. Holes and anything nested inside them are
/// skipped.
pub fn extract_regions(mask: &GrayImage) -> impl Iterator<Item = BoundingBox> {
    find_contours::<i32>(mask).into_iter()
        .filter(|contour| contour.parent.is_none() && matches!(contour.border_type, BorderType::Outer))
        .filter_map(|contour| bounding_box(&contour.points))
}

pub fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (min_x, min_y, max_x, max_y) = points.iter().fold(
        (first.x, first.y, first.x, first.y),
        |(min_x, min_y, max_x, max_y), p| (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y)),
    );
    let x = u32::try_from(min_x).ok()?;
    let y = u32::try_from(min_y).ok()?;
    let width = u32::try_from(max_x - min_x + 1).ok()?;
    let height = u32::try_from(max_y - min_y + 1).ok()?;
    BoundingBox::new(x, y, width, height)
}


#[cfg(test)]
mod test {

    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use imageproc::point::Point;

    use super::*;

    fn fill(img: &mut GrayImage, x: u32, y: u32, width: u32, height: u32, value: u8) {
        for py in y..y + height {
            for px in x..x + width {
                img.put_pixel(px, py, Luma([value]));
            }
        }
    }

    fn count_foreground(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    #[test]
    fn grayscale_keeps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([255, 255, 255])));
        let gray = to_grayscale(&img);
        assert_eq!(gray.dimensions(), (30, 20));
        assert!(gray.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn grayscale_weights_green_above_blue() {
        let green = to_grayscale(&DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 255, 0]))));
        let blue = to_grayscale(&DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 0, 255]))));
        assert!(green.get_pixel(0, 0).0[0] > blue.get_pixel(0, 0).0[0]);
    }

    #[test]
    fn global_threshold_splits_at_level() {
        let mut gray = GrayImage::from_pixel(4, 1, Luma([100]));
        gray.put_pixel(1, 0, Luma([200]));
        gray.put_pixel(2, 0, Luma([127]));
        gray.put_pixel(3, 0, Luma([128]));
        let mask = binarize(&gray, Binarization::Global { threshold: 127 });
        let values: Vec<u8> = mask.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 255, 0, 255]);
    }

    #[test]
    fn otsu_separates_two_levels() {
        let mut gray = GrayImage::from_pixel(20, 20, Luma([30]));
        fill(&mut gray, 0, 0, 10, 20, 220);
        let mask = binarize(&gray, Binarization::Otsu);
        assert_eq!(count_foreground(&mask), 200);
        assert_eq!(mask.get_pixel(2, 2).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(15, 2).0[0], BACKGROUND);
    }

    #[test]
    fn adaptive_ignores_flat_regions() {
        for weighting in [AdaptiveMethod::Mean, AdaptiveMethod::Gaussian] {
            let gray = GrayImage::from_pixel(32, 32, Luma([180]));
            let mask = binarize(&gray, Binarization::Adaptive { block_size: 11, offset: 2, weighting });
            assert_eq!(count_foreground(&mask), 0);
        }
    }

    #[test]
    fn adaptive_extreme_offsets_do_not_overflow() {
        let mut gray = GrayImage::from_pixel(20, 20, Luma([255]));
        fill(&mut gray, 5, 5, 3, 3, 0);
        let all = binarize(&gray, Binarization::Adaptive { block_size: 11, offset: i16::MIN, weighting: AdaptiveMethod::Mean });
        assert_eq!(count_foreground(&all), 400);
        let none = binarize(&gray, Binarization::Adaptive { block_size: 11, offset: i16::MAX, weighting: AdaptiveMethod::Mean });
        assert_eq!(count_foreground(&none), 0);
    }

    #[test]
    fn adaptive_marks_dark_strokes_under_uneven_light() {
        // left half lit, right half in shadow, one dark stroke in each half
        let mut gray = GrayImage::from_pixel(60, 30, Luma([220]));
        fill(&mut gray, 30, 0, 30, 30, 90);
        fill(&mut gray, 10, 10, 3, 10, 120);
        fill(&mut gray, 45, 10, 3, 10, 20);
        let adaptive = binarize(&gray, Binarization::Adaptive { block_size: 11, offset: 2, weighting: AdaptiveMethod::Mean });
        assert_eq!(adaptive.get_pixel(11, 15).0[0], FOREGROUND);
        assert_eq!(adaptive.get_pixel(46, 15).0[0], FOREGROUND);
        assert_eq!(adaptive.get_pixel(20, 25).0[0], BACKGROUND);
        assert_eq!(adaptive.get_pixel(55, 25).0[0], BACKGROUND);

        // a single global level cannot keep both strokes apart from both backgrounds
        let global = binarize(&gray, Binarization::Global { threshold: 127 });
        assert_eq!(global.get_pixel(11, 15).0[0], BACKGROUND);
        assert_eq!(global.get_pixel(55, 25).0[0], BACKGROUND);
        assert_eq!(global.get_pixel(20, 25).0[0], FOREGROUND);
    }

    #[test]
    fn closing_merges_broken_strokes() {
        let mut mask = GrayImage::new(64, 32);
        fill(&mut mask, 10, 10, 20, 10, FOREGROUND);
        fill(&mut mask, 32, 10, 20, 10, FOREGROUND);
        assert_eq!(extract_regions(&mask).count(), 2);

        let closed = close_mask(&mask, 5);
        let boxes: Vec<BoundingBox> = extract_regions(&closed).collect();
        assert_eq!(boxes, vec![BoundingBox::new(10, 10, 42, 10).unwrap()]);
    }

    #[test]
    fn single_blob_yields_its_box() {
        let mut mask = GrayImage::new(200, 100);
        fill(&mut mask, 20, 40, 120, 30, FOREGROUND);
        let boxes: Vec<BoundingBox> = extract_regions(&mask).collect();
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert_eq!((b.x(), b.y(), b.width(), b.height()), (20, 40, 120, 30));
    }

    #[test]
    fn nested_regions_are_skipped() {
        let mut mask = GrayImage::new(100, 60);
        fill(&mut mask, 10, 10, 80, 40, FOREGROUND);
        fill(&mut mask, 20, 20, 60, 20, BACKGROUND);
        fill(&mut mask, 40, 25, 20, 10, FOREGROUND);
        let boxes: Vec<BoundingBox> = extract_regions(&mask).collect();
        assert_eq!(boxes, vec![BoundingBox::new(10, 10, 80, 40).unwrap()]);
    }

    #[test]
    fn separate_regions_are_all_found() {
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 5, 5, 20, 10, FOREGROUND);
        fill(&mut mask, 50, 60, 30, 15, FOREGROUND);
        let mut boxes: Vec<(u32, u32, u32, u32)> = extract_regions(&mask)
            .map(|b| (b.x(), b.y(), b.width(), b.height()))
            .collect();
        boxes.sort();
        assert_eq!(boxes, vec![(5, 5, 20, 10), (50, 60, 30, 15)]);
    }

    #[test]
    fn empty_mask_has_no_regions() {
        assert_eq!(extract_regions(&GrayImage::new(40, 40)).count(), 0);
    }

    #[test]
    fn bounding_box_of_points() {
        let points = [Point::new(3, 7), Point::new(10, 2), Point::new(5, 9)];
        let b = bounding_box(&points).unwrap();
        assert_eq!((b.x(), b.y(), b.width(), b.height()), (3, 2, 8, 8));
        assert!(bounding_box(&[]).is_none());
        let single = bounding_box(&[Point::new(4, 4)]).unwrap();
        assert_eq!((single.width(), single.height()), (1, 1));
    }
}
