use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("could not open image {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("decoder crashed on image {path}: {message}")]
    Panicked { path: PathBuf, message: String },
}

/// Decodes the file at `path`, sniffing the format from its content rather
/// than its extension.
pub fn load_image(path: &Path) -> Result<DynamicImage, ImageLoadError> {
    let open_err = |source| ImageLoadError::Open {
        path: path.to_path_buf(),
        source,
    };

    image::ImageReader::open(path)
        .map_err(open_err)?
        .with_guessed_format()
        .map_err(open_err)?
        .decode()
        .map_err(|source| ImageLoadError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    pub(crate) fn write_png(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        RgbImage::from_pixel(width, height, Rgb([200, 30, 200]))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn decodes_by_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("001.jpeg");
        write_png(&path, 3, 5);

        let image = load_image(&path).unwrap();
        assert_eq!((image.width(), image.height()), (3, 5));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_image(&dir.path().join("cover.jpg")).unwrap_err();
        assert!(matches!(err, ImageLoadError::Open { .. }));
        assert!(err.to_string().contains("cover.jpg"));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, ImageLoadError::Decode { .. }));
    }
}
