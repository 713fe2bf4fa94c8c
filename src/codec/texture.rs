// src/codec/texture.rs

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use log::debug;

use crate::codec::TextureRepacker;
use crate::error::{Result, TilerError};
use crate::mesh::TexturesStrategy;

pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// `Repack` re-encodes as PNG, `RepackCompressed` as JPEG.
#[derive(Debug, Clone, Copy)]
pub struct ImageRepacker {
    jpeg_quality: u8,
}

impl Default for ImageRepacker {
    fn default() -> Self {
        ImageRepacker {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageRepacker {
    pub fn new(jpeg_quality: u8) -> Self {
        ImageRepacker {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }
}

impl TextureRepacker for ImageRepacker {
    fn repack(
        &self,
        source: &Path,
        strategy: TexturesStrategy,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<String> {
        let texture_err = |source_err| TilerError::Texture {
            path: source.to_path_buf(),
            source: source_err,
        };
        let img = image::open(source).map_err(texture_err)?;

        let file_name = match strategy {
            TexturesStrategy::Repack => {
                let file_name = format!("{stem}.png");
                img.save_with_format(dest_dir.join(&file_name), ImageFormat::Png)
                    .map_err(texture_err)?;
                file_name
            }
            TexturesStrategy::RepackCompressed => {
                let file_name = format!("{stem}.jpg");
                let dest = dest_dir.join(&file_name);
                let file = File::create(&dest).map_err(|e| TilerError::io(&dest, e))?;
                let mut writer = BufWriter::new(file);
                // JPEG carries no alpha channel.
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
                    .encode_image(&rgb)
                    .map_err(texture_err)?;
                file_name
            }
        };

        debug!("repacked {} as {} ({:?})", source.display(), file_name, strategy);
        Ok(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};
    use std::fs;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("mesh_tiler_tex_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("source.png");
        let img = ImageBuffer::from_pixel(4, 4, Rgba([200u8, 100, 50, 255]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_repack_png_and_jpeg() {
        let dir = scratch_dir("both");
        let source = write_png(&dir);
        let repacker = ImageRepacker::default();

        let png = repacker
            .repack(&source, TexturesStrategy::Repack, &dir, "tile-a")
            .unwrap();
        assert_eq!(png, "tile-a.png");
        assert_eq!(image::open(dir.join(&png)).unwrap().width(), 4);

        let jpg = repacker
            .repack(&source, TexturesStrategy::RepackCompressed, &dir, "tile-b")
            .unwrap();
        assert_eq!(jpg, "tile-b.jpg");
        assert_eq!(image::open(dir.join(&jpg)).unwrap().height(), 4);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_texture_is_an_error() {
        let dir = scratch_dir("missing");
        let err = ImageRepacker::new(50)
            .repack(&dir.join("nope.png"), TexturesStrategy::Repack, &dir, "x")
            .unwrap_err();
        assert!(matches!(err, TilerError::Texture { .. }));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(ImageRepacker::new(0).jpeg_quality(), 1);
        assert_eq!(ImageRepacker::new(255).jpeg_quality(), 100);
    }
}
