use clap::{Parser, ValueEnum};
use tracing::Level;

use std::path::PathBuf;
use std::process;

use lpr_contour::{AdaptiveMethod, AspectRange, Binarization, CharWhitelist, Lpr, LprConfig, TesseractCli};
use lpr_contour::error::LprError;


#[derive(Debug, Parser)]
#[command(name = "lpr", version, about = "Locate license plates in an image and read them")]
struct Args {
    /// image file with license plate
    input: PathBuf,

    /// TOML file with pipeline settings, flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    binarization: Option<Method>,

    /// level for --binarization global
    #[arg(long, default_value_t = 127)]
    threshold: u8,

    #[arg(long)]
    min_aspect: Option<f32>,

    #[arg(long)]
    max_aspect: Option<f32>,

    /// minimum plate height in pixels
    #[arg(long)]
    min_height: Option<u32>,

    #[arg(long)]
    min_text_length: Option<usize>,

    /// characters tesseract may emit
    #[arg(long)]
    whitelist: Option<String>,

    #[arg(long, default_value = "tesseract")]
    tesseract: PathBuf,

    #[arg(long, default_value = "eng")]
    lang: String,

    #[arg(long, default_value_t = 8)]
    psm: u8,

    /// run OCR for candidates in parallel
    #[arg(long)]
    parallel: bool,

    /// write the annotated image here
    #[arg(long)]
    save: Option<PathBuf>,

    /// show the annotated image in a window
    #[arg(long)]
    display: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Method {
    Adaptive,
    Gaussian,
    Global,
    Otsu,
}

impl Args {

    fn build_config(&self) -> Result<LprConfig, LprError> {
        let mut config = match &self.config {
            Some(path) => LprConfig::from_toml_file(path)?,
            None => LprConfig::default(),
        };
        let (block_size, offset) = match config.binarization {
            Binarization::Adaptive { block_size, offset, .. } => (block_size, offset),
            _ => (11, 2),
        };
        match self.binarization {
            Some(Method::Adaptive) => config.binarization = Binarization::Adaptive { block_size, offset, weighting: AdaptiveMethod::Mean },
            Some(Method::Gaussian) => config.binarization = Binarization::Adaptive { block_size, offset, weighting: AdaptiveMethod::Gaussian },
            Some(Method::Global) => config.binarization = Binarization::Global { threshold: self.threshold },
            Some(Method::Otsu) => config.binarization = Binarization::Otsu,
            None => {},
        }
        let AspectRange { min, max } = config.aspect_ratio_range;
        config.aspect_ratio_range = AspectRange::new(self.min_aspect.unwrap_or(min), self.max_aspect.unwrap_or(max));
        if let Some(min_height) = self.min_height {
            config.min_height = min_height;
        }
        if let Some(min_text_length) = self.min_text_length {
            config.min_text_length = min_text_length;
        }
        if let Some(whitelist) = &self.whitelist {
            config.char_whitelist = CharWhitelist::from(whitelist.as_str());
        }
        config.parallel_ocr |= self.parallel;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<(), LprError> {
    let config = args.build_config()?;
    let tesseract = TesseractCli::new()
        .with_binary(&args.tesseract)
        .with_language(args.lang.as_str())
        .with_page_seg_mode(args.psm);
    let lpr = Lpr::new(config, tesseract)?;

    let res = lpr.recognize_path(&args.input)?;
    println!("{}", res);

    if let Some(path) = &args.save {
        res.annotated().save(path)?;
    }
    if args.display {
        show(res.annotated());
    }
    Ok(())
}

#[cfg(feature = "display")]
fn show(img: &image::RgbImage) {
    lpr_contour::utils::display_image(img, "Number Plate Recognition");
}

#[cfg(not(feature = "display"))]
fn show(_: &image::RgbImage) {
    eprintln!("built without the `display` feature, nothing to show");
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
