use std::io::{Cursor, Read, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::model::Measurement;

// ---------------------------------------------------------------------------
// Streak image (.img) layout
// ---------------------------------------------------------------------------
//
//  offset  size      field
//  0       2         magic "IM"
//  2       2         comment length C         (u16 LE)
//  4       2         width  W  (wavelengths)  (u16 LE)
//  6       2         height H  (time samples) (u16 LE)
//  8       2         x offset                 (u16 LE)
//  10      2         y offset                 (u16 LE)
//  12      2         pixel type, 3 = u32      (u16 LE)
//  14      50        reserved
//  64      C         comment, CRLF separated
//  ...     4*W*H     counts, u32 LE, one row per time sample
//  ...     4*W       wavelength axis, f32 LE
//  ...     4*H       time axis, f32 LE

const MAGIC: &[u8; 2] = b"IM";
const HEADER_LEN: usize = 64;
const PIXEL_TYPE_U32: u16 = 3;
const LINE_SEPARATOR: &str = "\r\n";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a streak image from disk.
pub fn read_file(path: &Path) -> Result<Measurement> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse(&bytes).with_context(|| format!("parsing streak image {}", path.display()))
}

/// Parse a streak image from its raw bytes.
pub fn parse(bytes: &[u8]) -> Result<Measurement> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 2];
    cursor.read_exact(&mut magic).context("reading magic")?;
    ensure!(&magic == MAGIC, "not a streak image: bad magic {magic:?}");

    let comment_len = cursor.read_u16::<LittleEndian>().context("reading comment length")? as usize;
    let width = cursor.read_u16::<LittleEndian>().context("reading width")? as usize;
    let height = cursor.read_u16::<LittleEndian>().context("reading height")? as usize;
    let x_offset = cursor.read_u16::<LittleEndian>().context("reading x offset")?;
    let y_offset = cursor.read_u16::<LittleEndian>().context("reading y offset")?;
    let pixel_type = cursor.read_u16::<LittleEndian>().context("reading pixel type")?;
    if pixel_type != PIXEL_TYPE_U32 {
        bail!("unsupported pixel type {pixel_type}, only 32-bit counts are supported");
    }
    ensure!(bytes.len() >= HEADER_LEN, "unexpected end of data in header");
    cursor.set_position(HEADER_LEN as u64);

    let mut comment = vec![0u8; comment_len];
    cursor.read_exact(&mut comment).context("reading comment")?;
    let comment = String::from_utf8(comment).context("comment is not valid UTF-8")?;
    let metadata: Vec<String> = if comment.is_empty() {
        Vec::new()
    } else {
        comment.split(LINE_SEPARATOR).map(str::to_string).collect()
    };

    let mut counts = vec![0u32; width * height];
    cursor
        .read_u32_into::<LittleEndian>(&mut counts)
        .context("reading intensity grid")?;
    let mut wavelength = vec![0f32; width];
    cursor
        .read_f32_into::<LittleEndian>(&mut wavelength)
        .context("reading wavelength axis")?;
    let mut time = vec![0f32; height];
    cursor
        .read_f32_into::<LittleEndian>(&mut time)
        .context("reading time axis")?;

    let mut measurement = Measurement::new(
        wavelength.into_iter().map(f64::from).collect(),
        time.into_iter().map(f64::from).collect(),
        counts,
        metadata,
    )?;
    measurement.offsets = (x_offset, y_offset);
    log::debug!(
        "parsed streak image: {width} wavelengths x {height} time samples, {} metadata lines",
        measurement.metadata().len()
    );
    Ok(measurement)
}

impl Measurement {
    /// Re-serialise into the native `.img` layout.
    ///
    /// Axes are written as `f32`; values that came from a file round-trip exactly.
    /// Fails when the comment or an axis is too long for the 16-bit header fields.
    pub fn to_raw_binary(&self) -> Result<Vec<u8>> {
        let comment = self.metadata().join(LINE_SEPARATOR);
        let comment_len = u16::try_from(comment.len())
            .with_context(|| format!("comment of {} bytes does not fit the header", comment.len()))?;
        let width = u16::try_from(self.width())
            .with_context(|| format!("{} wavelengths do not fit the header", self.width()))?;
        let height = u16::try_from(self.height())
            .with_context(|| format!("{} time samples do not fit the header", self.height()))?;

        let mut out = Vec::with_capacity(
            HEADER_LEN + comment.len() + 4 * (self.counts().len() + self.width() + self.height()),
        );
        out.write_all(MAGIC)?;
        out.write_u16::<LittleEndian>(comment_len)?;
        out.write_u16::<LittleEndian>(width)?;
        out.write_u16::<LittleEndian>(height)?;
        out.write_u16::<LittleEndian>(self.offsets.0)?;
        out.write_u16::<LittleEndian>(self.offsets.1)?;
        out.write_u16::<LittleEndian>(PIXEL_TYPE_U32)?;
        out.resize(HEADER_LEN, 0);

        out.write_all(comment.as_bytes())?;
        for &c in self.counts() {
            out.write_u32::<LittleEndian>(c)?;
        }
        for &w in self.wavelength() {
            out.write_f32::<LittleEndian>(w as f32)?;
        }
        for &t in self.time() {
            out.write_f32::<LittleEndian>(t as f32)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Measurement {
        Measurement::new(
            vec![450.0, 450.5, 451.0],
            vec![0.0, 0.25],
            vec![10, 20, 30, 40, 50, u32::MAX],
            vec!["Frame=3,".to_string(), "second line".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn raw_binary_parses_back_to_the_same_measurement() {
        let m = sample();
        let bytes = m.to_raw_binary().unwrap();
        assert_eq!(&bytes[..2], b"IM");
        assert_eq!(bytes.len(), 64 + "Frame=3,\r\nsecond line".len() + 4 * (6 + 3 + 2));
        assert_eq!(parse(&bytes).unwrap(), m);
    }

    #[test]
    fn preserves_header_offsets() {
        let mut m = sample();
        m.offsets = (7, 9);
        let parsed = parse(&m.to_raw_binary().unwrap()).unwrap();
        assert_eq!(parsed.offsets, (7, 9));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample().to_raw_binary().unwrap();
        bytes[0] = b'X';
        let err = parse(&bytes).unwrap_err();
        assert!(format!("{err:#}").contains("bad magic"));
    }

    #[test]
    fn rejects_other_pixel_types() {
        let mut bytes = sample().to_raw_binary().unwrap();
        bytes[12] = 2;
        assert!(format!("{:#}", parse(&bytes).unwrap_err()).contains("pixel type"));
    }

    #[test]
    fn rejects_truncated_payload() {
        let bytes = sample().to_raw_binary().unwrap();
        let err = parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(format!("{err:#}").contains("time axis"));
    }

    #[test]
    fn empty_comment_gives_no_metadata_lines() {
        let m = Measurement::new(vec![1.0], vec![2.0], vec![3], vec![]).unwrap();
        assert!(parse(&m.to_raw_binary().unwrap()).unwrap().metadata().is_empty());
    }

    #[test]
    fn refuses_to_write_oversized_header_fields() {
        let long = Measurement::new(vec![1.0], vec![2.0], vec![3], vec!["x".repeat(70_000)]).unwrap();
        let err = long.to_raw_binary().unwrap_err();
        assert!(format!("{err:#}").contains("comment of 70000 bytes"));

        let wide = Measurement::new(
            (0..70_000).map(f64::from).collect(),
            vec![0.0],
            vec![0; 70_000],
            vec![],
        )
        .unwrap();
        assert!(format!("{:#}", wide.to_raw_binary().unwrap_err()).contains("70000 wavelengths"));
    }

    #[test]
    fn longest_comment_still_round_trips() {
        let m = Measurement::new(vec![1.0], vec![2.0], vec![3], vec!["y".repeat(u16::MAX as usize)]).unwrap();
        assert_eq!(parse(&m.to_raw_binary().unwrap()).unwrap(), m);
    }

    #[test]
    fn read_file_reports_the_path() {
        let err = read_file(Path::new("/nonexistent/streak.img")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/streak.img"));
    }
}
