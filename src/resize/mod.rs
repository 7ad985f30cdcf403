//! # Resize Worker Pool
//!
//! CPU-bound image transformations run on a small pool of dedicated worker
//! threads, never on the request path. Each worker serves a fixed number of
//! jobs and is then replaced by a fresh thread, which keeps the image
//! engine's allocator footprint from creeping up over long uptimes.
//!
//! A job rewrites a file in place (the fetcher's temp file) and reports the
//! new byte length. The pool knows nothing about the cache.
//!
//! The transform itself: take the first frame (compositing a play badge if
//! frames were dropped), auto-orient by EXIF, then shrink proportionally to
//! fit the requested box. Images already small enough are left at their
//! original dimensions; the proxy never upscales.

mod badge;

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageFormat};
use tokio::sync::{mpsc, oneshot};

use crate::error::EspejoError;
use crate::normalize::TransformOptions;

pub use badge::composite_play_badge;

struct Job {
    path: PathBuf,
    options: TransformOptions,
    reply: oneshot::Sender<Result<u64, EspejoError>>,
}

type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<Job>>>;

/// Bounded pool of recycled resize workers.
#[derive(Debug)]
pub struct ResizePool {
    tx: mpsc::UnboundedSender<Job>,
}

impl ResizePool {
    /// Spawn `size` workers, each recycled after `recycle_after` jobs.
    pub fn new(size: usize, recycle_after: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue: SharedQueue = Arc::new(Mutex::new(rx));
        for id in 0..size.max(1) {
            spawn_worker(id, queue.clone(), recycle_after.max(1));
        }
        Self { tx }
    }

    /// Transform the file at `path` in place and return its new length.
    ///
    /// Resolves once a worker picks the job up and finishes; the caller's
    /// task suspends without blocking the runtime.
    pub async fn resize(
        &self,
        path: PathBuf,
        options: TransformOptions,
    ) -> Result<u64, EspejoError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Job {
                path,
                options,
                reply,
            })
            .map_err(|_| EspejoError::Pool("resize workers are gone".to_string()))?;
        response
            .await
            .map_err(|_| EspejoError::Pool("resize worker dropped the job".to_string()))?
    }
}

/// Spawn one worker thread. When it retires after `recycle_after` jobs it
/// spawns its own replacement, so the pool size stays constant.
fn spawn_worker(id: usize, queue: SharedQueue, recycle_after: usize) {
    let result = thread::Builder::new()
        .name(format!("resize-{}", id))
        .spawn(move || {
            let mut served = 0;
            while served < recycle_after {
                let job = {
                    let mut rx = queue.lock().unwrap_or_else(|e| e.into_inner());
                    match rx.blocking_recv() {
                        Some(job) => job,
                        None => return,
                    }
                };
                let result = apply(&job.path, &job.options);
                let _ = job.reply.send(result);
                served += 1;
            }
            println!("[resize] Worker {} recycled after {} jobs", id, served);
            spawn_worker(id, queue, recycle_after);
        });
    if let Err(e) = result {
        eprintln!("[resize] Failed to spawn worker {}: {}", id, e);
    }
}

/// Run the whole transform against the file at `path`.
fn apply(path: &Path, options: &TransformOptions) -> Result<u64, EspejoError> {
    let bytes = fs::read(path)?;
    let format = image::guess_format(&bytes)
        .map_err(|e| EspejoError::Image(format!("Unrecognized payload: {}", e)))?;

    let mut img = if options.still && format == ImageFormat::Gif {
        extract_still(&bytes)?
    } else {
        image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| EspejoError::Image(format!("Failed to decode: {}", e)))?
    };

    if let Some(orientation) = exif_orientation(&bytes) {
        img = orientation.apply(img);
    }

    img = shrink_to_fit(
        img,
        options.width.unwrap_or(0),
        options.height.unwrap_or(0),
    );

    write_back(&img, path, format)?;
    Ok(fs::metadata(path)?.len())
}

/// Decode the first GIF frame; when later frames exist (an animation) they
/// are dropped and a play badge is composited over the survivor.
fn extract_still(bytes: &[u8]) -> Result<DynamicImage, EspejoError> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| EspejoError::Image(format!("Failed to decode GIF: {}", e)))?;
    let mut frames = decoder.into_frames();
    let first = frames
        .next()
        .transpose()
        .map_err(|e| EspejoError::Image(format!("Failed to decode GIF frame: {}", e)))?
        .ok_or_else(|| EspejoError::Image("GIF has no frames".to_string()))?;
    let was_animated = frames.next().is_some();

    let mut frame = first.into_buffer();
    if was_animated {
        composite_play_badge(&mut frame);
    }
    Ok(DynamicImage::ImageRgba8(frame))
}

/// Proportionally shrink to fit `max_w`×`max_h`. A zero bound means "no
/// constraint on that axis"; an image already inside the box is untouched.
fn shrink_to_fit(img: DynamicImage, max_w: u32, max_h: u32) -> DynamicImage {
    if max_w == 0 && max_h == 0 {
        return img;
    }
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return img;
    }

    let scale_w = if max_w > 0 {
        max_w as f32 / w as f32
    } else {
        f32::INFINITY
    };
    let scale_h = if max_h > 0 {
        max_h as f32 / h as f32
    } else {
        f32::INFINITY
    };
    let scale = scale_w.min(scale_h);
    if scale >= 1.0 {
        return img;
    }

    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);
    img.resize_exact(new_w, new_h, FilterType::Lanczos3)
}

/// Re-encode in the original format at the original path. JPEG and BMP
/// cannot carry an alpha channel, so those flatten to RGB first.
fn write_back(img: &DynamicImage, path: &Path, format: ImageFormat) -> Result<(), EspejoError> {
    let flattened;
    let img = match format {
        ImageFormat::Jpeg | ImageFormat::Bmp => {
            flattened = DynamicImage::ImageRgb8(img.to_rgb8());
            &flattened
        }
        _ => img,
    };
    img.save_with_format(path, format)
        .map_err(|e| EspejoError::Image(format!("Failed to write transformed image: {}", e)))
}

/// EXIF orientation as the rotation/mirror to apply before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Orientation {
    quarter_turns: u8,
    flip_x: bool,
}

impl Orientation {
    fn apply(self, img: DynamicImage) -> DynamicImage {
        let img = match self.quarter_turns % 4 {
            1 => img.rotate90(),
            2 => img.rotate180(),
            3 => img.rotate270(),
            _ => img,
        };
        if self.flip_x {
            img.fliph()
        } else {
            img
        }
    }
}

/// Read the EXIF orientation tag, if the payload carries one. Only JPEG
/// (and TIFF-shaped) containers do; everything else reads as `None`.
fn exif_orientation(bytes: &[u8]) -> Option<Orientation> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let value = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)?;
    orientation_from_exif(value as u16)
}

fn orientation_from_exif(value: u16) -> Option<Orientation> {
    match value {
        1 => None,
        2 => Some(Orientation {
            quarter_turns: 0,
            flip_x: true,
        }),
        3 => Some(Orientation {
            quarter_turns: 2,
            flip_x: false,
        }),
        4 => Some(Orientation {
            quarter_turns: 2,
            flip_x: true,
        }),
        5 => Some(Orientation {
            quarter_turns: 1,
            flip_x: true,
        }),
        6 => Some(Orientation {
            quarter_turns: 1,
            flip_x: false,
        }),
        7 => Some(Orientation {
            quarter_turns: 3,
            flip_x: true,
        }),
        8 => Some(Orientation {
            quarter_turns: 3,
            flip_x: false,
        }),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        let mut img = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.put_pixel(x, y, Rgba([x as u8, y as u8, 128, 255]));
            }
        }
        img
    }

    fn write_png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        DynamicImage::ImageRgba8(gradient(width, height))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    // Solid frames survive GIF palette quantization byte-for-byte, which
    // keeps the pixel assertions below exact.
    fn write_gif(dir: &TempDir, name: &str, frames: usize) -> PathBuf {
        let path = dir.path().join(name);
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            for _ in 0..frames {
                encoder
                    .encode_frame(Frame::new(solid(40, 30, [200, 50, 50, 255])))
                    .unwrap();
            }
        }
        fs::write(&path, out).unwrap();
        path
    }

    fn opts(still: bool, width: Option<u32>, height: Option<u32>) -> TransformOptions {
        TransformOptions {
            still,
            width,
            height,
        }
    }

    #[test]
    fn test_proportional_shrink() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "a.png", 400, 300);

        let len = apply(&path, &opts(false, Some(200), Some(0))).unwrap();
        assert_eq!(len, fs::metadata(&path).unwrap().len());

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
    }

    #[test]
    fn test_height_only_constraint() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "b.png", 400, 300);

        apply(&path, &opts(false, Some(0), Some(150))).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
    }

    #[test]
    fn test_never_upscales() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "c.png", 40, 30);

        apply(&path, &opts(false, Some(400), Some(300))).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn test_still_drops_frames_and_stays_gif() {
        let dir = TempDir::new().unwrap();
        let path = write_gif(&dir, "anim.gif", 3);

        apply(&path, &opts(true, None, None)).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Gif);
        let decoder = GifDecoder::new(Cursor::new(&bytes[..])).unwrap();
        assert_eq!(decoder.into_frames().count(), 1);
    }

    #[test]
    fn test_still_single_frame_has_no_badge() {
        let dir = TempDir::new().unwrap();
        let path = write_gif(&dir, "flat.gif", 1);
        let before = image::open(&path).unwrap().to_rgba8();

        apply(&path, &opts(true, None, None)).unwrap();

        let after = image::open(&path).unwrap().to_rgba8();
        assert_eq!(before.dimensions(), after.dimensions());
        // Center pixel untouched: no badge was drawn
        let (w, h) = before.dimensions();
        assert_eq!(before.get_pixel(w / 2, h / 2), after.get_pixel(w / 2, h / 2));
    }

    #[test]
    fn test_garbage_payload_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.bin");
        fs::write(&path, b"definitely not an image").unwrap();

        assert!(apply(&path, &opts(false, Some(10), None)).is_err());
    }

    #[test]
    fn test_orientation_table_matches_exif_spec() {
        assert_eq!(orientation_from_exif(1), None);
        assert_eq!(
            orientation_from_exif(3),
            Some(Orientation {
                quarter_turns: 2,
                flip_x: false
            })
        );
        assert_eq!(
            orientation_from_exif(6),
            Some(Orientation {
                quarter_turns: 1,
                flip_x: false
            })
        );
        assert_eq!(
            orientation_from_exif(8),
            Some(Orientation {
                quarter_turns: 3,
                flip_x: false
            })
        );
        assert_eq!(orientation_from_exif(99), None);
    }

    #[test]
    fn test_orientation_apply_rotates_dimensions() {
        let img = DynamicImage::ImageRgba8(gradient(100, 50));
        let rotated = Orientation {
            quarter_turns: 1,
            flip_x: false,
        }
        .apply(img);
        assert_eq!((rotated.width(), rotated.height()), (50, 100));
    }

    #[tokio::test]
    async fn test_pool_resizes_off_thread() {
        let dir = TempDir::new().unwrap();
        let path = write_png(&dir, "pool.png", 400, 300);

        let pool = ResizePool::new(2, 250);
        let len = pool
            .resize(path.clone(), opts(false, Some(200), None))
            .await
            .unwrap();
        assert_eq!(len, fs::metadata(&path).unwrap().len());
    }

    #[tokio::test]
    async fn test_pool_survives_worker_recycling() {
        let dir = TempDir::new().unwrap();
        // One worker recycled after every job: each job after the first is
        // served by a replacement thread
        let pool = ResizePool::new(1, 1);

        for i in 0..3 {
            let path = write_png(&dir, &format!("r{}.png", i), 100, 80);
            pool.resize(path, opts(false, Some(50), None)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_pool_reports_job_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.png");

        let pool = ResizePool::new(1, 250);
        let result = pool.resize(path, opts(false, Some(50), None)).await;
        assert!(result.is_err());
    }
}
