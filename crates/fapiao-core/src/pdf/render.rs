//! Rasterizers backed by external renderers.
//!
//! Both write the PDF into a scratch directory, let the renderer emit one PNG per page there,
//! and decode the pages back under an allocation limit.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::{ImageError, ImageReader, Limits};
use tempfile::TempDir;
use tracing::debug;

use super::{FailureClass, Rasterizer, RenderFailure, RenderOptions, page_count};
use crate::convert::{EncodedImage, ImageEncoding};

type RenderResult<T> = std::result::Result<T, RenderFailure>;

/// MuPDF `mutool draw` renderer.
#[derive(Debug, Clone)]
pub struct MutoolRasterizer {
    program: String,
}

impl MutoolRasterizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Rasterizer for MutoolRasterizer {
    fn name(&self) -> &str {
        "mutool"
    }

    fn rasterize(&self, pdf: &[u8], options: &RenderOptions) -> RenderResult<Vec<EncodedImage>> {
        // Parse errors surface here as structural failures, before any process is spawned
        let pages = page_count(pdf)?.min(options.max_pages.max(1));
        let scratch = Scratch::new(pdf)?;

        let output = Command::new(&self.program)
            .arg("draw")
            .arg("-r")
            .arg(options.dpi.to_string())
            .arg("-F")
            .arg("png")
            .arg("-o")
            .arg(scratch.dir().join("page-%03d.png"))
            .arg(scratch.input())
            .arg(format!("1-{pages}"))
            .output();

        let output = spawned(output, &self.program, "install mupdf-tools")?;
        check_status(&output, &self.program, |_| FailureClass::Corrupt)?;

        debug!(program = %self.program, pages, dpi = options.dpi, "rendered");
        decode_pages(scratch.dir(), options)
    }
}

/// poppler `pdftoppm` renderer.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    program: String,
}

impl PopplerRasterizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Rasterizer for PopplerRasterizer {
    fn name(&self) -> &str {
        "pdftoppm"
    }

    fn rasterize(&self, pdf: &[u8], options: &RenderOptions) -> RenderResult<Vec<EncodedImage>> {
        let scratch = Scratch::new(pdf)?;
        let last_page = options.max_pages.max(1);

        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(options.dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(last_page.to_string())
            .arg(scratch.input())
            .arg(scratch.dir().join("page"))
            .output();

        let output = spawned(output, &self.program, "install poppler-utils")?;
        // pdftoppm: 1 = cannot open the file, 2 = cannot write output, 3 = permissions, 99 = other
        check_status(&output, &self.program, |code| match code {
            Some(2) => FailureClass::Unavailable,
            _ => FailureClass::Corrupt,
        })?;

        debug!(program = %self.program, last_page, dpi = options.dpi, "rendered");
        let mut images = decode_pages(scratch.dir(), options)?;
        images.truncate(last_page);
        if images.is_empty() {
            return Err(RenderFailure::new(FailureClass::PageCount, "no pages rendered"));
        }
        Ok(images)
    }
}

/// Scratch directory holding the input PDF and the rendered pages.
struct Scratch {
    dir: TempDir,
    input: PathBuf,
}

impl Scratch {
    fn new(pdf: &[u8]) -> RenderResult<Self> {
        let dir = tempfile::tempdir().map_err(|e| {
            RenderFailure::new(FailureClass::Unavailable, format!("scratch directory: {e}"))
        })?;
        let input = dir.path().join("input.pdf");
        fs::write(&input, pdf).map_err(|e| {
            RenderFailure::new(FailureClass::Unavailable, format!("writing input: {e}"))
        })?;
        Ok(Self { dir, input })
    }

    fn dir(&self) -> &Path {
        self.dir.path()
    }

    fn input(&self) -> &Path {
        &self.input
    }
}

fn spawned(output: io::Result<Output>, program: &str, hint: &str) -> RenderResult<Output> {
    output.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            RenderFailure::new(FailureClass::Unavailable, format!("{program} not found; {hint}"))
        }
        io::ErrorKind::OutOfMemory => {
            RenderFailure::new(FailureClass::OutOfMemory, format!("{program}: {e}"))
        }
        _ => RenderFailure::new(FailureClass::Unavailable, format!("{program}: {e}")),
    })
}

/// Map a non-zero exit to a failure. Signals and allocation messages are out-of-memory.
fn check_status(
    output: &Output,
    program: &str,
    classify_exit: impl Fn(Option<i32>) -> FailureClass,
) -> RenderResult<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let lowered = stderr.to_lowercase();
    let class = if output.status.code().is_none()
        || lowered.contains("out of memory")
        || lowered.contains("cannot allocate")
        || lowered.contains("malloc")
    {
        FailureClass::OutOfMemory
    } else {
        classify_exit(output.status.code())
    };

    Err(RenderFailure::new(
        class,
        format!("{program} failed ({}): {stderr}", output.status),
    ))
}

/// Decode every PNG in `dir`, sorted by file name.
fn decode_pages(dir: &Path, options: &RenderOptions) -> RenderResult<Vec<EncodedImage>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        RenderFailure::new(FailureClass::Unavailable, format!("reading output: {e}"))
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("png"))
        .collect();
    paths.sort();
    paths.truncate(options.max_pages.max(1));

    if paths.is_empty() {
        return Err(RenderFailure::new(FailureClass::PageCount, "no pages rendered"));
    }

    paths
        .iter()
        .map(|path| {
            let data = fs::read(path).map_err(|e| {
                RenderFailure::new(FailureClass::Unavailable, format!("reading page: {e}"))
            })?;
            decode_png(data, options.max_image_bytes)
        })
        .collect()
}

/// Decode a rendered page, treating a limit breach as out-of-memory.
pub(crate) fn decode_png(data: Vec<u8>, max_image_bytes: u64) -> RenderResult<EncodedImage> {
    let mut limits = Limits::default();
    limits.max_alloc = Some(max_image_bytes);

    let mut reader = ImageReader::with_format(Cursor::new(&data), image::ImageFormat::Png);
    reader.limits(limits);

    let decoded = reader.decode().map_err(|e| match e {
        ImageError::Limits(_) => {
            RenderFailure::new(FailureClass::OutOfMemory, format!("page exceeds limits: {e}"))
        }
        other => RenderFailure::new(FailureClass::Corrupt, format!("unreadable page: {other}")),
    })?;

    Ok(EncodedImage {
        width: decoded.width(),
        height: decoded.height(),
        encoding: ImageEncoding::Png,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures;
    use image::{ImageBuffer, Rgb};
    use pretty_assertions::assert_eq;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::new(width, height);
        let mut out = Vec::new();
        buffer
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn options() -> RenderOptions {
        RenderOptions {
            dpi: 72,
            max_pages: 3,
            max_image_bytes: 64 * 1024 * 1024,
        }
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let pdf = fixtures::pdf_with_pages(&["page"]);
        let failure = MutoolRasterizer::new("fapiao-test-no-such-mutool")
            .rasterize(&pdf, &options())
            .unwrap_err();
        assert_eq!(failure.class, FailureClass::Unavailable);

        let failure = PopplerRasterizer::new("fapiao-test-no-such-pdftoppm")
            .rasterize(&pdf, &options())
            .unwrap_err();
        assert_eq!(failure.class, FailureClass::Unavailable);
        assert!(failure.message.contains("poppler-utils"));
    }

    #[test]
    fn test_unparseable_pdf_is_syntax_before_spawn() {
        let failure = MutoolRasterizer::new("fapiao-test-no-such-mutool")
            .rasterize(b"%PDF-1.4 garbage", &options())
            .unwrap_err();
        assert_eq!(failure.class, FailureClass::Syntax);
    }

    #[test]
    fn test_decode_png() {
        let image = decode_png(png(4, 3), 1024 * 1024).unwrap();
        assert_eq!((image.width, image.height), (4, 3));
        assert_eq!(image.encoding, ImageEncoding::Png);
    }

    #[test]
    fn test_decode_limit_is_out_of_memory() {
        let failure = decode_png(png(64, 64), 16).unwrap_err();
        assert_eq!(failure.class, FailureClass::OutOfMemory);
    }

    #[test]
    fn test_decode_pages_sorted_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        for (name, width) in [("page-003.png", 3), ("page-001.png", 1), ("page-002.png", 2)] {
            fs::write(dir.path().join(name), png(width, 1)).unwrap();
        }
        fs::write(dir.path().join("input.pdf"), b"%PDF").unwrap();

        let opts = RenderOptions {
            max_pages: 2,
            ..options()
        };
        let images = decode_pages(dir.path(), &opts).unwrap();
        let widths: Vec<u32> = images.iter().map(|i| i.width).collect();
        assert_eq!(widths, vec![1, 2]);
    }

    #[test]
    fn test_empty_output_is_page_count() {
        let dir = tempfile::tempdir().unwrap();
        let failure = decode_pages(dir.path(), &options()).unwrap_err();
        assert_eq!(failure.class, FailureClass::PageCount);
    }
}
