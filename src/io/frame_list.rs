//! Recorded frame lists: `timestamp_ns,filename` CSV files.
//!
//! Lines starting with `#` are comments. Filenames are relative to the
//! directory that contains the list, or to an explicit image directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use image::GrayImage;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameEntry {
    pub timestamp_ns: u64,
    pub path: PathBuf,
}

/// Parse a frame list. Entries are returned sorted by timestamp.
pub fn load_frame_list<P: AsRef<Path>>(csv_path: P, image_dir: Option<&Path>) -> Result<Vec<FrameEntry>> {
    let csv_path = csv_path.as_ref();
    let base = match image_dir {
        Some(dir) => dir.to_path_buf(),
        None => csv_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let timestamp_ns: u64 = rec[0]
            .parse()
            .with_context(|| format!("bad timestamp on record {} of {}", line + 1, csv_path.display()))?;
        entries.push(FrameEntry {
            timestamp_ns,
            path: base.join(&rec[1]),
        });
    }

    if entries.is_empty() {
        bail!("frame list {} has no entries", csv_path.display());
    }
    entries.sort_by_key(|e| e.timestamp_ns);
    Ok(entries)
}

/// Decode an image file to 8-bit grayscale.
pub fn load_gray_image(path: &Path) -> Result<GrayImage> {
    let img = image::open(path).with_context(|| format!("Failed to read image {:?}", path))?;
    Ok(img.to_luma8())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_frame_list_sorted_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("frames.csv");
        let mut f = std::fs::File::create(&list).unwrap();
        writeln!(f, "#timestamp [ns],filename").unwrap();
        writeln!(f, "2000, b.png").unwrap();
        writeln!(f, "1000, a.png").unwrap();

        let entries = load_frame_list(&list, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].timestamp_ns, 1000);
        assert_eq!(entries[0].path, dir.path().join("a.png"));
    }

    #[test]
    fn test_empty_frame_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("frames.csv");
        std::fs::write(&list, "# nothing here\n").unwrap();
        assert!(load_frame_list(&list, None).is_err());
    }

    #[test]
    fn test_missing_frame_list_is_an_error() {
        let err = load_frame_list("/definitely/not/here.csv", None).unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }

    #[test]
    fn test_load_gray_image_converts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");
        image::RgbImage::from_pixel(8, 6, image::Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        let gray = load_gray_image(&path).unwrap();
        assert_eq!(gray.dimensions(), (8, 6));
        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
    }
}
