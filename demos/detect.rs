//! Geometric stage only: outline every plate-shaped region without OCR.
//!
//! cargo run --example detect -- car.jpg out.png

use std::error::Error;
use std::env::args;
use std::process;

use lpr_contour::{load_image, utils, Lpr, LprConfig, TesseractCli};

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = args();
    args.next();
    let (path, out) = match (args.next(), args.next()) {
        (Some(path), Some(out)) => (path, out),
        _ => {
            eprintln!("usage: detect <image> <output>");
            process::exit(1);
        }
    };

    let lpr = Lpr::new(LprConfig::default(), TesseractCli::default())?;
    let img = load_image(path)?;
    let candidates = lpr.detect_candidates(&img);
    for candidate in &candidates {
        let a_box = candidate.bbox;
        println!("{}x{} at ({}, {}), ratio {:.2}", a_box.width(), a_box.height(), a_box.x(), a_box.y(), a_box.aspect_ratio());
    }
    let annotated = utils::annotate(&img, candidates.iter().map(|c| &c.bbox));
    annotated.save(out)?;
    Ok(())
}
