use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE};
use crate::error::Result;
use crate::frame::{Card, Frame, HeaderValue};

/// Width of the fixed-format value field (columns 11-30).
const VALUE_FIELD_WIDTH: usize = 20;

/// Write a frame as a single-HDU, BITPIX = -32 FITS file.
pub fn write_fits(path: &Path, frame: &Frame) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&encode_fits(frame))?;
    writer.flush()?;
    Ok(())
}

/// Encode a frame to FITS bytes. The output depends only on the pixels and
/// header, so equal frames always encode to identical bytes.
pub fn encode_fits(frame: &Frame) -> Vec<u8> {
    let (h, w) = frame.shape();
    let mut out = Vec::with_capacity(FITS_BLOCK_SIZE * 2 + h * w * 4);

    let structural = [
        valued("SIMPLE", HeaderValue::Logical(true), Some("conforms to FITS standard")),
        valued("BITPIX", HeaderValue::Integer(-32), Some("IEEE single precision")),
        valued("NAXIS", HeaderValue::Integer(2), None),
        valued("NAXIS1", HeaderValue::Integer(w as i64), None),
        valued("NAXIS2", HeaderValue::Integer(h as i64), None),
    ];
    for card in structural.iter().chain(frame.header.cards()) {
        out.extend_from_slice(format_card(card).as_bytes());
    }
    out.extend_from_slice(format!("{:<80}", "END").as_bytes());
    pad_to_block(&mut out, b' ');

    for &px in frame.data.iter() {
        out.extend_from_slice(&px.to_be_bytes());
    }
    pad_to_block(&mut out, 0);
    out
}

fn pad_to_block(out: &mut Vec<u8>, fill: u8) {
    let rem = out.len() % FITS_BLOCK_SIZE;
    if rem != 0 {
        out.resize(out.len() + FITS_BLOCK_SIZE - rem, fill);
    }
}

fn valued(keyword: &str, value: HeaderValue, comment: Option<&str>) -> Card {
    Card {
        keyword: keyword.to_string(),
        value: Some(value),
        comment: comment.map(str::to_string),
    }
}

/// Render one card as exactly 80 ASCII characters.
fn format_card(card: &Card) -> String {
    let keyword: String = card.keyword.chars().take(8).collect();

    let mut text = match &card.value {
        None => format!("{:<8}{}", keyword, card.comment.as_deref().unwrap_or("")),
        Some(value) => {
            let mut text = format!("{:<8}= {}", keyword, format_value(value));
            if let Some(comment) = &card.comment {
                if text.len() + 3 < FITS_CARD_SIZE {
                    text.push_str(" / ");
                    text.push_str(comment);
                }
            }
            text
        }
    };

    text.retain(|c| c.is_ascii() && !c.is_ascii_control());
    text.truncate(FITS_CARD_SIZE);
    format!("{:<80}", text)
}

fn format_value(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Logical(v) => {
            format!("{:>width$}", if *v { "T" } else { "F" }, width = VALUE_FIELD_WIDTH)
        }
        HeaderValue::Integer(v) => format!("{:>width$}", v, width = VALUE_FIELD_WIDTH),
        HeaderValue::Real(v) if v.is_finite() => {
            format!("{:>width$}", format_real(*v), width = VALUE_FIELD_WIDTH)
        }
        HeaderValue::Real(v) => format_string(&v.to_string()),
        HeaderValue::Text(s) => format_string(s),
    }
}

/// Shortest round-tripping representation that still reads as a real.
fn format_real(v: f64) -> String {
    let plain = v.to_string();
    if plain.len() <= VALUE_FIELD_WIDTH {
        if plain.contains('.') {
            return plain;
        }
        if plain.len() + 2 <= VALUE_FIELD_WIDTH {
            return format!("{plain}.0");
        }
    }
    format!("{v:E}")
}

fn format_string(s: &str) -> String {
    let escaped: String = s.replace('\'', "''").chars().take(68).collect();
    format!("'{:<8}'", escaped)
}
