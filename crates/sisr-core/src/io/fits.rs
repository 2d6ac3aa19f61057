use std::fs::File;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::Array2;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::{Result, SisrError};
use crate::frame::{Card, Frame, FrameHeader, HeaderValue};

/// Layout of the primary data unit, taken from the structural keywords.
#[derive(Clone, Debug, PartialEq)]
pub struct DataLayout {
    pub bitpix: i32,
    pub width: usize,
    pub height: usize,
    pub bzero: f64,
    pub bscale: f64,
    /// Byte offset of the first pixel.
    pub data_offset: usize,
}

impl DataLayout {
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bitpix.unsigned_abs() / 8) as usize
    }

    pub fn row_bytes(&self) -> usize {
        self.width * self.bytes_per_pixel()
    }

    pub fn data_bytes(&self) -> usize {
        self.row_bytes() * self.height
    }

    fn is_identity_scaling(&self) -> bool {
        self.bzero == 0.0 && self.bscale == 1.0
    }
}

/// Memory-mapped reader for single-HDU FITS images.
pub struct FitsReader {
    mmap: Mmap,
    path: PathBuf,
    pub header: FrameHeader,
    pub layout: DataLayout,
}

impl FitsReader {
    /// Open a FITS file and parse its primary header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len < FITS_BLOCK_SIZE {
            return Err(invalid(path, "file too small for a FITS header"));
        }
        let mmap = unsafe { Mmap::map(&file)? };

        if !mmap.starts_with(b"SIMPLE  =") {
            return Err(invalid(path, "missing SIMPLE keyword"));
        }

        let (cards, header_bytes) = parse_cards(&mmap).map_err(|reason| invalid(path, &reason))?;
        let layout =
            layout_from_cards(&cards, header_bytes).map_err(|reason| invalid(path, &reason))?;

        let expected = layout.data_offset + layout.data_bytes();
        if mmap.len() < expected {
            return Err(invalid(
                path,
                &format!(
                    "file truncated: expected at least {} bytes, got {}",
                    expected,
                    mmap.len()
                ),
            ));
        }

        let mut header = FrameHeader::new();
        for card in cards {
            header.push(card);
        }

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            header,
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shape as (height, width).
    pub fn shape(&self) -> (usize, usize) {
        (self.layout.height, self.layout.width)
    }

    /// Decode `count` rows starting at `start` into physical values.
    pub fn read_rows(&self, start: usize, count: usize) -> Result<Array2<f32>> {
        let (h, w) = self.shape();
        if start + count > h {
            return Err(invalid(
                &self.path,
                &format!("row range {}..{} outside image height {}", start, start + count, h),
            ));
        }
        let row_bytes = self.layout.row_bytes();
        let offset = self.layout.data_offset + start * row_bytes;
        let raw = &self.mmap[offset..offset + count * row_bytes];

        let mut pixels = vec![0.0f32; count * w];
        decode_pixels(raw, &self.layout, &mut pixels);

        Array2::from_shape_vec((count, w), pixels)
            .map_err(|e| invalid(&self.path, &e.to_string()))
    }

    /// Decode the whole image together with its header.
    pub fn read_frame(&self) -> Result<Frame> {
        let data = self.read_rows(0, self.layout.height)?;
        Ok(Frame::with_header(data, self.header.clone()))
    }
}

/// Read a FITS image from disk.
pub fn read_fits(path: &Path) -> Result<Frame> {
    FitsReader::open(path)?.read_frame()
}

/// Read only the header of a FITS image.
pub fn read_header(path: &Path) -> Result<FrameHeader> {
    Ok(FitsReader::open(path)?.header)
}

fn invalid(path: &Path, reason: &str) -> SisrError {
    SisrError::InvalidFits(format!("{}: {}", path.display(), reason))
}

/// Parse header cards up to END. Returns the cards and the padded header size.
fn parse_cards(bytes: &[u8]) -> std::result::Result<(Vec<Card>, usize), String> {
    let mut cards = Vec::new();
    for (index, raw) in bytes.chunks_exact(FITS_CARD_SIZE).enumerate() {
        let text: String = raw
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        let keyword = text[..8].trim_end().to_string();
        if keyword == "END" {
            let consumed = (index + 1) * FITS_CARD_SIZE;
            let padded = consumed.div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
            return Ok((cards, padded));
        }
        cards.push(parse_card(keyword, &text));
    }
    Err("END card not found".into())
}

fn parse_card(keyword: String, text: &str) -> Card {
    if &text[8..10] == "= " {
        let (value, comment) = parse_value_field(&text[10..]);
        Card {
            keyword,
            value: Some(value),
            comment,
        }
    } else {
        let comment = text[8..].trim_end();
        Card {
            keyword,
            value: None,
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        }
    }
}

fn parse_value_field(field: &str) -> (HeaderValue, Option<String>) {
    let trimmed = field.trim_start();

    if let Some(rest) = trimmed.strip_prefix('\'') {
        let mut value = String::new();
        let mut end = rest.len();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                } else {
                    end = i + 1;
                    break;
                }
            } else {
                value.push(c);
            }
        }
        let comment = trailing_comment(&rest[end..]);
        return (HeaderValue::Text(value.trim_end().to_string()), comment);
    }

    let (raw, comment) = match trimmed.split_once('/') {
        Some((v, c)) => (v.trim(), non_empty(c)),
        None => (trimmed.trim(), None),
    };

    let value = match raw {
        "T" => HeaderValue::Logical(true),
        "F" => HeaderValue::Logical(false),
        _ => {
            if let Ok(v) = raw.parse::<i64>() {
                HeaderValue::Integer(v)
            } else if let Ok(v) = raw.replace(['D', 'd'], "E").parse::<f64>() {
                HeaderValue::Real(v)
            } else {
                HeaderValue::Text(raw.to_string())
            }
        }
    };
    (value, comment)
}

fn trailing_comment(rest: &str) -> Option<String> {
    rest.split_once('/').and_then(|(_, c)| non_empty(c))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn card_int(cards: &[Card], keyword: &str) -> Option<i64> {
    cards
        .iter()
        .find(|c| c.keyword == keyword)
        .and_then(|c| c.value.as_ref())
        .and_then(HeaderValue::as_i64)
}

fn card_real(cards: &[Card], keyword: &str) -> Option<f64> {
    cards
        .iter()
        .find(|c| c.keyword == keyword)
        .and_then(|c| c.value.as_ref())
        .and_then(HeaderValue::as_f64)
}

fn layout_from_cards(
    cards: &[Card],
    data_offset: usize,
) -> std::result::Result<DataLayout, String> {
    let bitpix = card_int(cards, "BITPIX").ok_or("missing BITPIX")? as i32;
    if !matches!(bitpix, 8 | 16 | 32 | -32 | -64) {
        return Err(format!("unsupported BITPIX {bitpix}"));
    }

    let naxis = card_int(cards, "NAXIS").ok_or("missing NAXIS")?;
    let width = card_int(cards, "NAXIS1").unwrap_or(0);
    let height = card_int(cards, "NAXIS2").unwrap_or(0);
    match naxis {
        2 => {}
        3 if card_int(cards, "NAXIS3") == Some(1) => {}
        0 => return Err("primary HDU holds no image data".into()),
        n => return Err(format!("expected a 2-D image, got NAXIS = {n}")),
    }
    if width <= 0 || height <= 0 {
        return Err(format!("invalid dimensions {width}x{height}"));
    }

    Ok(DataLayout {
        bitpix,
        width: width as usize,
        height: height as usize,
        bzero: card_real(cards, "BZERO").unwrap_or(0.0),
        bscale: card_real(cards, "BSCALE").unwrap_or(1.0),
        data_offset,
    })
}

fn decode_pixels(raw: &[u8], layout: &DataLayout, out: &mut [f32]) {
    let bpp = layout.bytes_per_pixel();
    let samples = raw.chunks_exact(bpp).zip(out.iter_mut());

    if layout.bitpix == -32 && layout.is_identity_scaling() {
        for (chunk, px) in samples {
            *px = BigEndian::read_f32(chunk);
        }
        return;
    }

    let (bzero, bscale) = (layout.bzero, layout.bscale);
    for (chunk, px) in samples {
        let stored = match layout.bitpix {
            8 => chunk[0] as f64,
            16 => BigEndian::read_i16(chunk) as f64,
            32 => BigEndian::read_i32(chunk) as f64,
            -32 => BigEndian::read_f32(chunk) as f64,
            _ => BigEndian::read_f64(chunk),
        };
        *px = (bzero + bscale * stored) as f32;
    }
}
