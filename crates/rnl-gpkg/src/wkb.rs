//! GeoPackage geometry blobs: the `GP` header around a WKB body.
//!
//! The WKB body is handled by geozero. Decoding accepts either byte order
//! and drops Z/M ordinates; encoding writes little-endian 2D WKB. Blob
//! envelopes of every kind (XY, XYZ, XYM, XYZM) are skipped on read; on
//! write non-point geometries get an XY envelope.

use geo::{BoundingRect, Geometry};
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};

use crate::error::{GpkgError, GpkgResult};

const GP_MAGIC: &[u8; 2] = b"GP";
const GP_HEADER_LEN: usize = 8;
const GP_FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const GP_FLAG_EMPTY: u8 = 0b0001_0000;
const GP_ENVELOPE_XY: u8 = 1;

/// Bytes taken by the envelope for an envelope indicator.
fn envelope_len(indicator: u8) -> GpkgResult<usize> {
    match indicator {
        0 => Ok(0),
        1 => Ok(32),
        2 | 3 => Ok(48),
        4 => Ok(64),
        other => Err(GpkgError::InvalidBlob(format!("invalid envelope indicator {other}"))),
    }
}

/// Decode a WKB geometry.
pub fn decode_wkb(bytes: &[u8]) -> GpkgResult<Geometry<f64>> {
    Ok(Wkb(bytes.to_vec()).to_geo()?)
}

/// Encode a geometry as little-endian 2D WKB.
pub fn encode_wkb(geometry: &Geometry<f64>) -> GpkgResult<Vec<u8>> {
    Ok(geometry.to_wkb(CoordDimensions::xy())?)
}

fn is_empty(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::LineString(ls) => ls.0.is_empty(),
        Geometry::Polygon(p) => p.exterior().0.is_empty(),
        Geometry::MultiPoint(mp) => mp.0.is_empty(),
        Geometry::MultiLineString(mls) => mls.0.is_empty(),
        Geometry::MultiPolygon(mp) => mp.0.is_empty(),
        Geometry::GeometryCollection(gc) => gc.0.is_empty(),
        _ => false,
    }
}

/// Encode a geometry as a GeoPackage binary blob (header + WKB).
///
/// Points carry no envelope; other geometries carry a 2D envelope.
pub fn encode_gpkg_blob(geometry: &Geometry<f64>, srs_id: i32) -> GpkgResult<Vec<u8>> {
    let envelope = match geometry {
        Geometry::Point(_) => None,
        other => other.bounding_rect(),
    };
    let mut flags = GP_FLAG_LITTLE_ENDIAN;
    if envelope.is_some() {
        flags |= GP_ENVELOPE_XY << 1;
    }
    if is_empty(geometry) {
        flags |= GP_FLAG_EMPTY;
    }
    let mut out = Vec::with_capacity(72);
    out.extend_from_slice(GP_MAGIC);
    out.push(0);
    out.push(flags);
    out.extend_from_slice(&srs_id.to_le_bytes());
    if let Some(rect) = envelope {
        for v in [rect.min().x, rect.max().x, rect.min().y, rect.max().y] {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out.extend_from_slice(&encode_wkb(geometry)?);
    Ok(out)
}

/// Decode a GeoPackage binary blob, returning the geometry and its srs id.
pub fn decode_gpkg_blob(blob: &[u8]) -> GpkgResult<(Geometry<f64>, i32)> {
    let Some(header) = blob.get(..GP_HEADER_LEN).filter(|h| &h[0..2] == GP_MAGIC) else {
        return Err(GpkgError::InvalidBlob("missing GP magic".to_string()));
    };
    if header[2] != 0 {
        return Err(GpkgError::InvalidBlob(format!(
            "unsupported GeoPackage blob version {}",
            header[2]
        )));
    }
    let flags = header[3];
    let srs_raw = [header[4], header[5], header[6], header[7]];
    let srs_id = if flags & GP_FLAG_LITTLE_ENDIAN != 0 {
        i32::from_le_bytes(srs_raw)
    } else {
        i32::from_be_bytes(srs_raw)
    };
    let start = GP_HEADER_LEN + envelope_len((flags >> 1) & 0b111)?;
    let wkb = blob
        .get(start..)
        .ok_or_else(|| GpkgError::InvalidBlob("blob shorter than its envelope".to_string()))?;
    Ok((decode_wkb(wkb)?, srs_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiPolygon, Point, line_string, polygon};

    /// A blob with a hand-written header around `wkb`.
    fn blob(flags: u8, srs: [u8; 4], envelope: &[f64], wkb: &[u8]) -> Vec<u8> {
        let mut out = b"GP\0".to_vec();
        out.push(flags);
        out.extend_from_slice(&srs);
        for v in envelope {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(wkb);
        out
    }

    #[test]
    fn point_blob_has_no_envelope() {
        let blob = encode_gpkg_blob(&Geometry::Point(Point::new(1.0, 2.0)), 28992).unwrap();
        // 8 header bytes + 1 order + 4 type + 16 coords
        assert_eq!(blob.len(), 29);
        let (geometry, srs) = decode_gpkg_blob(&blob).unwrap();
        assert_eq!(srs, 28992);
        assert_eq!(geometry, Geometry::Point(Point::new(1.0, 2.0)));
    }

    #[test]
    fn polygon_with_hole_survives() {
        let p = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 0.0)],
            interiors: [[(x: 5.0, y: 1.0), (x: 8.0, y: 1.0), (x: 8.0, y: 4.0), (x: 5.0, y: 1.0)]],
        );
        let geometry = Geometry::MultiPolygon(MultiPolygon::new(vec![p]));
        let blob = encode_gpkg_blob(&geometry, 28992).unwrap();
        assert_eq!((blob[3] >> 1) & 0b111, GP_ENVELOPE_XY);
        assert_eq!(decode_gpkg_blob(&blob).unwrap().0, geometry);
    }

    #[test]
    fn big_endian_linestring_z_is_flattened() {
        // ISO LineString Z (1002), big-endian, two vertices
        let mut wkb = vec![0u8];
        wkb.extend_from_slice(&1002u32.to_be_bytes());
        wkb.extend_from_slice(&2u32.to_be_bytes());
        for v in [0.0f64, 0.0, 5.0, 3.0, 4.0, 6.0] {
            wkb.extend_from_slice(&v.to_be_bytes());
        }
        let geometry = decode_wkb(&wkb).unwrap();
        assert_eq!(
            geometry,
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 4.0)])
        );
    }

    #[test]
    fn z_and_m_envelopes_are_skipped() {
        let wkb = encode_wkb(&Geometry::Point(Point::new(7.0, 8.0))).unwrap();
        // indicator 2 (XYZ) and 3 (XYM) take six values, 4 (XYZM) eight
        for (indicator, values) in [(2u8, 6), (3, 6), (4, 8)] {
            let envelope = vec![1.5; values];
            let flags = GP_FLAG_LITTLE_ENDIAN | (indicator << 1);
            let (geometry, srs) = decode_gpkg_blob(&blob(flags, 28992i32.to_le_bytes(), &envelope, &wkb)).unwrap();
            assert_eq!(geometry, Geometry::Point(Point::new(7.0, 8.0)), "indicator {indicator}");
            assert_eq!(srs, 28992);
        }
        let bad = blob(GP_FLAG_LITTLE_ENDIAN | (5 << 1), [0; 4], &[], &wkb);
        assert!(matches!(decode_gpkg_blob(&bad), Err(GpkgError::InvalidBlob(_))));
    }

    #[test]
    fn big_endian_header_srs_is_read() {
        let wkb = encode_wkb(&Geometry::Point(Point::new(1.0, 1.0))).unwrap();
        let (_, srs) = decode_gpkg_blob(&blob(0, 4326i32.to_be_bytes(), &[], &wkb)).unwrap();
        assert_eq!(srs, 4326);
    }

    #[test]
    fn truncated_data_is_rejected() {
        let wkb = encode_wkb(&Geometry::Point(Point::new(1.0, 1.0))).unwrap();
        assert!(matches!(decode_wkb(&wkb[..wkb.len() - 3]), Err(GpkgError::Wkb(_))));
        assert!(decode_gpkg_blob(b"XX\0\x01\0\0\0\0").is_err());
        let short = blob(GP_FLAG_LITTLE_ENDIAN | (GP_ENVELOPE_XY << 1), [0; 4], &[0.0, 1.0], &[]);
        assert!(matches!(decode_gpkg_blob(&short), Err(GpkgError::InvalidBlob(_))));
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut wkb = vec![1u8];
        wkb.extend_from_slice(&17u32.to_le_bytes());
        assert!(matches!(decode_wkb(&wkb), Err(GpkgError::Wkb(_))));
    }
}
