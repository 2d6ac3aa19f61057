//! Gnomonic (TAN) world coordinate systems read from FITS headers.

use crate::error::{Result, SisrError};
use crate::frame::FrameHeader;

/// Linear part plus tangent point of a TAN projection.
///
/// Pixel coordinates follow the FITS convention: 1-based, `x` along a row
/// (column index + 1), `y` down the rows (row index + 1). World coordinates
/// are right ascension and declination in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct Wcs {
    pub crpix: [f64; 2],
    pub crval: [f64; 2],
    /// Degrees per pixel, `[[CD1_1, CD1_2], [CD2_1, CD2_2]]`.
    pub cd: [[f64; 2]; 2],
}

impl Wcs {
    /// Read the projection from `CRPIX`/`CRVAL` and either a `CD` matrix,
    /// `CDELT` with `PC`, or `CDELT` with `CROTA2`.
    pub fn from_header(header: &FrameHeader) -> Result<Self> {
        for key in ["CTYPE1", "CTYPE2"] {
            if let Some(ctype) = header.get_str(key).map(str::trim) {
                if !ctype.ends_with("-TAN") && !ctype.ends_with("-TAN-SIP") {
                    return Err(SisrError::Registration(format!(
                        "unsupported projection {key} = '{ctype}'"
                    )));
                }
            }
        }

        let required = |key: &str| {
            header
                .get_f64(key)
                .ok_or_else(|| SisrError::Registration(format!("missing WCS keyword {key}")))
        };
        let crpix = [required("CRPIX1")?, required("CRPIX2")?];
        let crval = [required("CRVAL1")?, required("CRVAL2")?];

        let cd = if header.contains("CD1_1") {
            [
                [required("CD1_1")?, header.get_f64("CD1_2").unwrap_or(0.0)],
                [header.get_f64("CD2_1").unwrap_or(0.0), required("CD2_2")?],
            ]
        } else {
            let cdelt = [required("CDELT1")?, required("CDELT2")?];
            if header.contains("PC1_1") {
                let pc = |key: &str, default: f64| header.get_f64(key).unwrap_or(default);
                [
                    [cdelt[0] * pc("PC1_1", 1.0), cdelt[0] * pc("PC1_2", 0.0)],
                    [cdelt[1] * pc("PC2_1", 0.0), cdelt[1] * pc("PC2_2", 1.0)],
                ]
            } else {
                let rho = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
                [
                    [cdelt[0] * rho.cos(), -cdelt[1] * rho.sin()],
                    [cdelt[0] * rho.sin(), cdelt[1] * rho.cos()],
                ]
            }
        };

        let wcs = Self { crpix, crval, cd };
        if wcs.determinant().abs() < 1e-20 {
            return Err(SisrError::Registration("singular WCS matrix".into()));
        }
        Ok(wcs)
    }

    fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }

    /// `(ra, dec)` in degrees of the 1-based pixel `(x, y)`.
    pub fn pixel_to_world(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix[0];
        let dy = y - self.crpix[1];
        let xi = (self.cd[0][0] * dx + self.cd[0][1] * dy).to_radians();
        let eta = (self.cd[1][0] * dx + self.cd[1][1] * dy).to_radians();

        let ra0 = self.crval[0].to_radians();
        let dec0 = self.crval[1].to_radians();
        let denom = dec0.cos() - eta * dec0.sin();
        let ra = ra0 + xi.atan2(denom);
        let dec = (dec0.sin() + eta * dec0.cos()).atan2((xi * xi + denom * denom).sqrt());

        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// 1-based pixel of `(ra, dec)`, or `None` for points on the far side
    /// of the tangent plane.
    pub fn world_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let ra0 = self.crval[0].to_radians();
        let dec0 = self.crval[1].to_radians();
        let (ra, dec) = (ra.to_radians(), dec.to_radians());
        let dra = ra - ra0;

        let cos_c = dec0.sin() * dec.sin() + dec0.cos() * dec.cos() * dra.cos();
        if cos_c <= 0.0 {
            return None;
        }
        let xi = (dec.cos() * dra.sin() / cos_c).to_degrees();
        let eta =
            ((dec0.cos() * dec.sin() - dec0.sin() * dec.cos() * dra.cos()) / cos_c).to_degrees();

        let det = self.determinant();
        let dx = (self.cd[1][1] * xi - self.cd[0][1] * eta) / det;
        let dy = (-self.cd[1][0] * xi + self.cd[0][0] * eta) / det;
        Some((dx + self.crpix[0], dy + self.crpix[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn header(cards: &[(&str, f64)]) -> FrameHeader {
        let mut header = FrameHeader::new();
        header.set("CTYPE1", "RA---TAN");
        header.set("CTYPE2", "DEC--TAN");
        for (key, value) in cards {
            header.set(key, *value);
        }
        header
    }

    #[test]
    fn test_reference_pixel_maps_to_reference_value() {
        let h = header(&[
            ("CRPIX1", 50.5),
            ("CRPIX2", 40.0),
            ("CRVAL1", 83.82),
            ("CRVAL2", -5.39),
            ("CD1_1", -2.8e-4),
            ("CD1_2", 0.0),
            ("CD2_1", 0.0),
            ("CD2_2", 2.8e-4),
        ]);
        let wcs = Wcs::from_header(&h).unwrap();
        let (ra, dec) = wcs.pixel_to_world(50.5, 40.0);
        assert_abs_diff_eq!(ra, 83.82, epsilon = 1e-9);
        assert_abs_diff_eq!(dec, -5.39, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip_with_rotation() {
        let h = header(&[
            ("CRPIX1", 100.0),
            ("CRPIX2", 100.0),
            ("CRVAL1", 10.0),
            ("CRVAL2", 60.0),
            ("CDELT1", -1e-3),
            ("CDELT2", 1e-3),
            ("CROTA2", 12.0),
        ]);
        let wcs = Wcs::from_header(&h).unwrap();
        let (ra, dec) = wcs.pixel_to_world(17.25, 183.5);
        let (x, y) = wcs.world_to_pixel(ra, dec).unwrap();
        assert_abs_diff_eq!(x, 17.25, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 183.5, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_keywords_are_reported() {
        let h = header(&[("CRPIX1", 1.0), ("CRPIX2", 1.0)]);
        assert!(matches!(Wcs::from_header(&h), Err(SisrError::Registration(_))));
    }

    #[test]
    fn test_non_tan_projection_rejected() {
        let mut h = header(&[]);
        h.set("CTYPE1", "RA---SIN");
        assert!(matches!(Wcs::from_header(&h), Err(SisrError::Registration(_))));
    }
}
