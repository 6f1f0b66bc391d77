//! Embedded-thumbnail probing for image documents.
//!
//! Scans a JPEG's EXIF segment for the embedded thumbnail byte range
//! and the orientation tag, so callers can decode a small range-scoped
//! slice instead of the full image. When no embedded thumbnail exists
//! the whole file is returned and the caller decodes (and orients)
//! itself.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::ProviderError;
use crate::types::CancelSignal;

/// EXIF scan is confined to the leading marker segments; the APP1
/// payload (which contains the thumbnail bytes) cannot exceed 64 KiB.
const SCAN_LIMIT: usize = 128 * 1024;

const TAG_ORIENTATION: u16 = 0x0112;
const TAG_THUMB_OFFSET: u16 = 0x0201;
const TAG_THUMB_LENGTH: u16 = 0x0202;

/// An openable view over a document's thumbnail.
///
/// When `length` is `Some`, the view is the embedded EXIF thumbnail and
/// `orientation_degrees` (90/180/270) tells the caller how to rotate
/// it. When `length` is `None` the view is the entire file and no
/// orientation hint is provided.
#[derive(Debug)]
pub struct Thumbnail {
    /// The opened image file.
    pub file: File,
    /// Byte offset the thumbnail starts at.
    pub offset: u64,
    /// Thumbnail byte count, or `None` for the whole file.
    pub length: Option<u64>,
    /// Clockwise rotation to apply, when an embedded thumbnail is used.
    pub orientation_degrees: Option<u16>,
}

/// Probe `path` for an embedded thumbnail.
///
/// # Errors
///
/// - [`ProviderError::Io`] if the file cannot be opened or read, or if
///   `signal` is cancelled mid-probe
pub fn probe_thumbnail(path: &Path, signal: &CancelSignal) -> Result<Thumbnail, ProviderError> {
    let mut file = File::open(path).map_err(|e| ProviderError::io("open_thumbnail", path, e))?;

    let mut prefix = Vec::with_capacity(SCAN_LIMIT.min(64 * 1024));
    file.by_ref()
        .take(SCAN_LIMIT as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| ProviderError::io("open_thumbnail", path, e))?;

    if signal.is_cancelled() {
        return Err(ProviderError::io(
            "open_thumbnail",
            path,
            std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled"),
        ));
    }

    let exif = find_exif_segment(&prefix).and_then(|(tiff, tiff_file_offset)| {
        parse_tiff(tiff, tiff_file_offset)
    });

    file.seek(SeekFrom::Start(0))
        .map_err(|e| ProviderError::io("open_thumbnail", path, e))?;

    match exif {
        Some(ExifInfo {
            thumb: Some((offset, length)),
            orientation,
        }) => Ok(Thumbnail {
            file,
            offset,
            length: Some(length),
            orientation_degrees: orientation,
        }),
        _ => Ok(Thumbnail {
            file,
            offset: 0,
            length: None,
            orientation_degrees: None,
        }),
    }
}

struct ExifInfo {
    thumb: Option<(u64, u64)>,
    orientation: Option<u16>,
}

/// Walk JPEG marker segments looking for the EXIF APP1 payload.
///
/// Returns the TIFF block and its absolute file offset.
fn find_exif_segment(buf: &[u8]) -> Option<(&[u8], u64)> {
    if buf.len() < 4 || buf[0] != 0xff || buf[1] != 0xd8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= buf.len() {
        if buf[pos] != 0xff {
            return None;
        }
        let marker = buf[pos + 1];
        // Start-of-scan: image data follows, no more metadata segments.
        if marker == 0xda {
            return None;
        }
        let seg_len = u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]) as usize;
        if seg_len < 2 || pos + 2 + seg_len > buf.len() {
            return None;
        }
        let payload = &buf[pos + 4..pos + 2 + seg_len];
        if marker == 0xe1 && payload.len() > 6 && &payload[..6] == b"Exif\0\0" {
            let tiff_file_offset = (pos + 4 + 6) as u64;
            return Some((&payload[6..], tiff_file_offset));
        }
        pos += 2 + seg_len;
    }
    None
}

fn parse_tiff(tiff: &[u8], tiff_file_offset: u64) -> Option<ExifInfo> {
    if tiff.len() < 8 {
        return None;
    }
    let big_endian = match &tiff[..2] {
        b"MM" => true,
        b"II" => false,
        _ => return None,
    };
    if read_u16(tiff, 2, big_endian)? != 42 {
        return None;
    }

    let ifd0 = read_u32(tiff, 4, big_endian)? as usize;
    let (orientation, next_ifd) = parse_ifd0(tiff, ifd0, big_endian)?;

    let thumb = next_ifd.and_then(|ifd1| {
        let (offset, length) = parse_ifd1(tiff, ifd1, big_endian)?;
        Some((tiff_file_offset + u64::from(offset), u64::from(length)))
    });

    Some(ExifInfo { thumb, orientation })
}

fn parse_ifd0(tiff: &[u8], at: usize, big_endian: bool) -> Option<(Option<u16>, Option<usize>)> {
    let count = read_u16(tiff, at, big_endian)? as usize;
    let mut orientation = None;
    for i in 0..count {
        let entry = at + 2 + i * 12;
        if read_u16(tiff, entry, big_endian)? == TAG_ORIENTATION {
            orientation = match read_u16(tiff, entry + 8, big_endian)? {
                6 => Some(90),
                3 => Some(180),
                8 => Some(270),
                _ => None,
            };
        }
    }
    let next = read_u32(tiff, at + 2 + count * 12, big_endian)? as usize;
    Some((orientation, (next != 0).then_some(next)))
}

fn parse_ifd1(tiff: &[u8], at: usize, big_endian: bool) -> Option<(u32, u32)> {
    let count = read_u16(tiff, at, big_endian)? as usize;
    let mut offset = None;
    let mut length = None;
    for i in 0..count {
        let entry = at + 2 + i * 12;
        match read_u16(tiff, entry, big_endian)? {
            TAG_THUMB_OFFSET => offset = read_u32(tiff, entry + 8, big_endian),
            TAG_THUMB_LENGTH => length = read_u32(tiff, entry + 8, big_endian),
            _ => {}
        }
    }
    offset.zip(length)
}

fn read_u16(buf: &[u8], at: usize, big_endian: bool) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(at..at + 2)?.try_into().ok()?;
    Some(if big_endian {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    })
}

fn read_u32(buf: &[u8], at: usize, big_endian: bool) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal JPEG: SOI + EXIF APP1 (orientation 6, thumbnail at TIFF
    /// offset 56, 4 bytes) + the thumbnail payload "ABCD".
    fn exif_jpeg() -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II");
        tiff.extend_from_slice(&42u16.to_le_bytes());
        tiff.extend_from_slice(&8u32.to_le_bytes()); // IFD0 offset

        // IFD0: one entry (orientation = 6, i.e. 90 degrees)
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x0112u16.to_le_bytes());
        tiff.extend_from_slice(&3u16.to_le_bytes()); // SHORT
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&6u16.to_le_bytes());
        tiff.extend_from_slice(&0u16.to_le_bytes());
        tiff.extend_from_slice(&26u32.to_le_bytes()); // next IFD

        // IFD1: thumbnail offset + length
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&0x0201u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes()); // LONG
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&56u32.to_le_bytes());
        tiff.extend_from_slice(&0x0202u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&4u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes()); // no next IFD

        assert_eq!(tiff.len(), 56);
        tiff.extend_from_slice(b"ABCD");

        let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1];
        let payload_len = 2 + 6 + tiff.len();
        jpeg.extend_from_slice(&(payload_len as u16).to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xff, 0xd9]); // EOI
        jpeg
    }

    #[test]
    fn embedded_thumbnail_is_found_with_orientation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("photo.jpg");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&exif_jpeg())
            .unwrap();

        let thumb = probe_thumbnail(&path, &CancelSignal::new()).unwrap();
        assert_eq!(thumb.length, Some(4));
        assert_eq!(thumb.orientation_degrees, Some(90));

        let mut file = thumb.file;
        file.seek(SeekFrom::Start(thumb.offset)).unwrap();
        let mut slice = vec![0u8; 4];
        file.read_exact(&mut slice).unwrap();
        assert_eq!(&slice, b"ABCD");
    }

    #[test]
    fn plain_file_falls_back_to_whole_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plain.jpg");
        std::fs::write(&path, b"not a jpeg at all").unwrap();

        let thumb = probe_thumbnail(&path, &CancelSignal::new()).unwrap();
        assert_eq!(thumb.offset, 0);
        assert_eq!(thumb.length, None);
        assert_eq!(thumb.orientation_degrees, None);
    }

    #[test]
    fn cancelled_signal_aborts_probe() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("photo.jpg");
        std::fs::write(&path, exif_jpeg()).unwrap();

        let signal = CancelSignal::new();
        signal.cancel();
        assert!(probe_thumbnail(&path, &signal).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = probe_thumbnail(&tmp.path().join("gone.jpg"), &CancelSignal::new()).unwrap_err();
        assert!(err.is_not_found());
    }
}
