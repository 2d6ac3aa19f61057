use std::fmt;

use ndarray::Array2;

/// A single grayscale CCD frame with its FITS header.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Header cards carried alongside the pixels
    pub header: FrameHeader,
}

impl Frame {
    pub fn new(data: Array2<f32>) -> Self {
        Self {
            data,
            header: FrameHeader::default(),
        }
    }

    pub fn with_header(data: Array2<f32>, header: FrameHeader) -> Self {
        Self { data, header }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// Shape as (height, width).
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Typed value of a header card.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Integer(v) => Some(*v as f64),
            HeaderValue::Real(v) => Some(*v),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            HeaderValue::Logical(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(v) => Some(*v),
            HeaderValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            HeaderValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Logical(true) => write!(f, "T"),
            HeaderValue::Logical(false) => write!(f, "F"),
            HeaderValue::Integer(v) => write!(f, "{v}"),
            HeaderValue::Real(v) => write!(f, "{v}"),
            HeaderValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        HeaderValue::Logical(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Integer(v)
    }
}

impl From<usize> for HeaderValue {
    fn from(v: usize) -> Self {
        HeaderValue::Integer(v as i64)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Real(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Text(v)
    }
}

/// One header card. Commentary cards (COMMENT, HISTORY, blank) have no value.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<HeaderValue>,
    pub comment: Option<String>,
}

impl Card {
    pub fn is_commentary(&self) -> bool {
        self.value.is_none()
    }
}

/// Keywords describing the data layout. They are derived from the pixel
/// array on write and never stored in a `FrameHeader`.
pub const STRUCTURAL_KEYWORDS: [&str; 10] = [
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE", "END",
];

pub fn is_structural(keyword: &str) -> bool {
    STRUCTURAL_KEYWORDS.contains(&keyword)
}

/// Ordered header cards. Lookups are by exact (upper-case) keyword and
/// return the first matching valued card.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameHeader {
    cards: Vec<Card>,
}

impl FrameHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Append a card as-is. Structural keywords are dropped.
    pub fn push(&mut self, card: Card) {
        if !is_structural(&card.keyword) {
            self.cards.push(card);
        }
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword && c.value.is_some())
            .and_then(|c| c.value.as_ref())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(HeaderValue::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(HeaderValue::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(HeaderValue::as_str)
    }

    /// Set a valued card, replacing the first existing one in place.
    pub fn set(&mut self, keyword: &str, value: impl Into<HeaderValue>) {
        self.set_with_comment(keyword, value, None);
    }

    pub fn set_with_comment(
        &mut self,
        keyword: &str,
        value: impl Into<HeaderValue>,
        comment: Option<&str>,
    ) {
        let keyword = keyword.to_ascii_uppercase();
        if is_structural(&keyword) {
            return;
        }
        let value = value.into();
        let comment = comment.map(str::to_string);
        match self
            .cards
            .iter_mut()
            .find(|c| c.keyword == keyword && c.value.is_some())
        {
            Some(card) => {
                card.value = Some(value);
                if comment.is_some() {
                    card.comment = comment;
                }
            }
            None => self.cards.push(Card {
                keyword,
                value: Some(value),
                comment,
            }),
        }
    }

    /// Remove every valued card with this keyword.
    pub fn remove(&mut self, keyword: &str) {
        self.cards
            .retain(|c| !(c.keyword == keyword && c.value.is_some()));
    }

    pub fn add_history(&mut self, text: &str) {
        self.add_commentary("HISTORY", text);
    }

    pub fn add_comment(&mut self, text: &str) {
        self.add_commentary("COMMENT", text);
    }

    fn add_commentary(&mut self, keyword: &str, text: &str) {
        self.cards.push(Card {
            keyword: keyword.to_string(),
            value: None,
            comment: Some(text.to_string()),
        });
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.cards
            .iter()
            .filter(|c| c.keyword == "HISTORY")
            .filter_map(|c| c.comment.as_deref())
    }

    // ------------------------------------------------------------------
    // Well-known acquisition keywords
    // ------------------------------------------------------------------

    /// Exposure time in seconds (EXPTIME, falling back to EXPOSURE).
    pub fn exposure_time(&self) -> Option<f64> {
        self.get_f64("EXPTIME").or_else(|| self.get_f64("EXPOSURE"))
    }

    pub fn image_type(&self) -> Option<&str> {
        self.get_str("IMAGETYP").map(str::trim)
    }

    pub fn date_obs(&self) -> Option<&str> {
        self.get_str("DATE-OBS").map(str::trim)
    }

    pub fn filter(&self) -> Option<&str> {
        self.get_str("FILTER").map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn ccd_temperature(&self) -> Option<f64> {
        self.get_f64("CCD-TEMP")
    }

    pub fn binning(&self) -> Option<(i64, i64)> {
        Some((self.get_i64("XBINNING")?, self.get_i64("YBINNING")?))
    }

    pub fn instrument(&self) -> Option<&str> {
        self.get_str("INSTRUME").map(str::trim)
    }
}
