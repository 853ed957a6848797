//! In-memory GeoTIFF decoding.
//!
//! Only what the fetcher needs is read from the first IFD: dimensions, the
//! first band's pixels, the affine transform and the CRS from the GeoKey
//! directory.
//!
//! Payloads come off the network, so the decoded size is checked against
//! [`MAX_DECODED_BYTES`] before any pixel buffer is allocated.

use std::io::Cursor;

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::geometry::Crs;

use super::affine::Affine;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;

const GEOKEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEOKEY_GEOG_ELLIPSOID: u16 = 2056;
const GEOKEY_PROJECTED_CS_TYPE: u16 = 3072;
const GEOKEY_PROJECTION: u16 = 3074;
const GEOKEY_USER_DEFINED: u16 = 32767;

const EPSG_WGS84: u16 = 4326;
const ELLIPSOID_WGS84: u16 = 7030;

/// EPSG projection codes "UTM zone N" (16001-16060) and "UTM zone S" (16101-16160).
const PROJ_UTM_NORTH: u16 = 16000;
const PROJ_UTM_SOUTH: u16 = 16100;

/// Ceiling on the decoded first-IFD buffer.
///
/// A 3660 x 3660 Int16 HLS tile is about 27 MB.
pub const MAX_DECODED_BYTES: usize = 64 * 1024 * 1024;

/// Errors raised while reading a raster payload.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("TIFF decode failed: {0}")]
    Decode(#[from] tiff::TiffError),

    #[error("missing georeferencing: {0}")]
    MissingGeoreference(&'static str),

    #[error("unsupported raster layout: {0}")]
    Unsupported(String),

    #[error("invalid raster geometry: {0}")]
    InvalidGeometry(String),

    #[error("raster of {width}x{height} needs {bytes} bytes, above the {limit} byte limit")]
    TooLarge {
        width: u32,
        height: u32,
        bytes: u64,
        limit: usize,
    },
}

/// Decoded samples of the first band.
#[derive(Debug, Clone)]
enum Pixels {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// First band of a GeoTIFF, decoded into memory.
#[derive(Debug, Clone)]
pub struct GeoTiff {
    pub width: usize,
    pub height: usize,
    pub transform: Affine,
    pub crs: Crs,
    pixels: Pixels,
}

impl GeoTiff {
    /// Decodes a GeoTIFF held in memory, capped at [`MAX_DECODED_BYTES`].
    pub fn decode(bytes: &[u8]) -> Result<Self, RasterError> {
        Self::decode_with_limit(bytes, MAX_DECODED_BYTES)
    }

    /// Decodes a GeoTIFF, refusing images whose pixels would exceed `max_bytes`.
    pub fn decode_with_limit(bytes: &[u8], max_bytes: usize) -> Result<Self, RasterError> {
        let mut limits = Limits::default();
        limits.decoding_buffer_size = max_bytes;
        let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let (samples, bits) = match decoder.colortype()? {
            tiff::ColorType::Gray(bits) => (1, bits),
            tiff::ColorType::RGB(bits) => (3, bits),
            tiff::ColorType::RGBA(bits) => (4, bits),
            other => {
                return Err(RasterError::Unsupported(format!("color type {:?}", other)));
            }
        };

        let needed = decoded_size(width, height, samples, bits);
        if needed > max_bytes as u64 {
            return Err(RasterError::TooLarge {
                width,
                height,
                bytes: needed,
                limit: max_bytes,
            });
        }

        let transform = read_transform(&mut decoder)?;
        let crs = read_crs(&mut decoder)?;
        let pixels = first_sample(decoder.read_image()?, samples as usize)?;

        Ok(Self {
            width: width as usize,
            height: height as usize,
            transform,
            crs,
            pixels,
        })
    }

    /// Value at a row-major flat index, widened to `f64`.
    pub fn value(&self, idx: usize) -> f64 {
        match &self.pixels {
            Pixels::U8(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::U16(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::U32(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::I8(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::I16(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::I32(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::F32(v) => v.get(idx).map_or(f64::NAN, |x| f64::from(*x)),
            Pixels::F64(v) => v.get(idx).copied().unwrap_or(f64::NAN),
        }
    }
}

/// Bytes `read_image` would allocate for the whole image.
fn decoded_size(width: u32, height: u32, samples: u64, bits: u8) -> u64 {
    let bytes_per_sample = u64::from(bits).div_ceil(8).max(1);
    u64::from(width)
        .saturating_mul(u64::from(height))
        .saturating_mul(samples)
        .saturating_mul(bytes_per_sample)
}

fn read_transform<R>(decoder: &mut Decoder<R>) -> Result<Affine, RasterError>
where
    R: std::io::Read + std::io::Seek,
{
    if let Some(matrix) = decoder.find_tag(Tag::from_u16_exhaustive(TAG_MODEL_TRANSFORMATION))? {
        return Affine::from_model_transformation(&matrix.into_f64_vec()?)
            .ok_or(RasterError::MissingGeoreference("ModelTransformation has fewer than 8 values"));
    }

    let scale = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE))?
        .ok_or(RasterError::MissingGeoreference("ModelPixelScale"))?
        .into_f64_vec()?;
    let tiepoint = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT))?
        .ok_or(RasterError::MissingGeoreference("ModelTiepoint"))?
        .into_f64_vec()?;

    Affine::from_tiepoint(&scale, &tiepoint)
        .ok_or(RasterError::MissingGeoreference("ModelPixelScale/ModelTiepoint too short"))
}

fn read_crs<R>(decoder: &mut Decoder<R>) -> Result<Crs, RasterError>
where
    R: std::io::Read + std::io::Seek,
{
    let keys = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))?
        .ok_or(RasterError::MissingGeoreference("GeoKeyDirectory"))?
        .into_u16_vec()?;

    crs_from_geokeys(&keys).ok_or(RasterError::MissingGeoreference(
        "no resolvable CRS in GeoKeyDirectory",
    ))
}

/// Short-valued GeoKeys relevant to CRS resolution.
#[derive(Debug, Default)]
struct CrsKeys {
    geographic: Option<u16>,
    ellipsoid: Option<u16>,
    projected: Option<u16>,
    projection: Option<u16>,
}

impl CrsKeys {
    fn resolve(&self) -> Option<Crs> {
        let defined = |code: Option<u16>| code.filter(|c| *c != GEOKEY_USER_DEFINED);
        defined(self.projected)
            .map(Crs::new)
            .or_else(|| self.user_defined_utm())
            .or_else(|| defined(self.geographic).map(Crs::new))
    }

    /// UTM given as a projection code on a WGS84-ellipsoid datum, the form
    /// GDAL writes for "Unknown datum based upon the WGS 84 ellipsoid".
    fn user_defined_utm(&self) -> Option<Crs> {
        let (zone, north) = match self.projection? {
            code @ 16001..=16060 => (code - PROJ_UTM_NORTH, true),
            code @ 16101..=16160 => (code - PROJ_UTM_SOUTH, false),
            _ => return None,
        };
        let wgs84 = match (self.geographic, self.ellipsoid) {
            (_, Some(ELLIPSOID_WGS84)) => true,
            (Some(EPSG_WGS84), _) => true,
            (Some(GEOKEY_USER_DEFINED) | None, None) => true,
            _ => false,
        };
        wgs84.then(|| Crs::utm(zone as u8, north))
    }
}

/// CRS from a GeoKey directory.
///
/// Layout: a 4-short header whose last entry is the key count, followed by
/// `(key_id, location, count, value)` quadruples. An EPSG projected system
/// wins, then a user-defined UTM projection on WGS84, then an EPSG
/// geographic system.
pub fn crs_from_geokeys(keys: &[u16]) -> Option<Crs> {
    let header = keys.get(..4)?;
    let count = header[3] as usize;

    let mut crs_keys = CrsKeys::default();
    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 {
            continue;
        }
        match key_id {
            GEOKEY_GEOGRAPHIC_TYPE => crs_keys.geographic = Some(value),
            GEOKEY_GEOG_ELLIPSOID => crs_keys.ellipsoid = Some(value),
            GEOKEY_PROJECTED_CS_TYPE => crs_keys.projected = Some(value),
            GEOKEY_PROJECTION => crs_keys.projection = Some(value),
            _ => {}
        }
    }
    crs_keys.resolve()
}

/// Keeps the first sample of every pixel.
fn first_sample(pixels: DecodingResult, samples: usize) -> Result<Pixels, RasterError> {
    fn take<T>(v: Vec<T>, step: usize) -> Vec<T> {
        if step == 1 {
            v
        } else {
            v.into_iter().step_by(step).collect()
        }
    }
    Ok(match pixels {
        DecodingResult::U8(v) => Pixels::U8(take(v, samples)),
        DecodingResult::U16(v) => Pixels::U16(take(v, samples)),
        DecodingResult::U32(v) => Pixels::U32(take(v, samples)),
        DecodingResult::I8(v) => Pixels::I8(take(v, samples)),
        DecodingResult::I16(v) => Pixels::I16(take(v, samples)),
        DecodingResult::I32(v) => Pixels::I32(take(v, samples)),
        DecodingResult::F32(v) => Pixels::F32(take(v, samples)),
        DecodingResult::F64(v) => Pixels::F64(take(v, samples)),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RasterError::Unsupported(
                "64-bit integer or half-float samples".to_string(),
            ))
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder};

    /// GeoKeys naming an EPSG projected CRS.
    pub(crate) fn epsg_geokeys(epsg: u16) -> Vec<u16> {
        vec![1, 1, 0, 1, GEOKEY_PROJECTED_CS_TYPE, 0, 1, epsg]
    }

    /// GeoKeys in the layout GDAL writes for UTM on an unnamed WGS84-ellipsoid
    /// datum: user-defined projected and geographic types plus a projection code.
    pub(crate) fn user_defined_utm_geokeys(zone: u16, north: bool) -> Vec<u16> {
        let base = if north { PROJ_UTM_NORTH } else { PROJ_UTM_SOUTH };
        let projection = base + zone;
        vec![
            1, 1, 0, 6,
            1024, 0, 1, 1, // GTModelType: projected
            1025, 0, 1, 1, // GTRasterType: pixel is area
            GEOKEY_GEOGRAPHIC_TYPE, 0, 1, GEOKEY_USER_DEFINED,
            GEOKEY_GEOG_ELLIPSOID, 0, 1, ELLIPSOID_WGS84,
            GEOKEY_PROJECTED_CS_TYPE, 0, 1, GEOKEY_USER_DEFINED,
            GEOKEY_PROJECTION, 0, 1, projection,
        ]
    }

    /// Writes a single-band Int16 GeoTIFF with a north-up transform.
    pub(crate) fn encode_i16(
        width: u32,
        height: u32,
        data: &[i16],
        origin: (f64, f64),
        pixel: f64,
        epsg: u16,
    ) -> Vec<u8> {
        encode_i16_with_geokeys(width, height, data, origin, pixel, &epsg_geokeys(epsg))
    }

    /// Int16 GeoTIFF with an explicit GeoKey directory.
    pub(crate) fn encode_i16_with_geokeys(
        width: u32,
        height: u32,
        data: &[i16],
        origin: (f64, f64),
        pixel: f64,
        geokeys: &[u16],
    ) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder.new_image::<colortype::GrayI16>(width, height).unwrap();
            write_geotags(image.encoder(), origin, pixel, geokeys);
            image.write_data(data).unwrap();
        }
        buf.into_inner()
    }

    /// Writes a single-band UInt8 GeoTIFF with a north-up transform.
    pub(crate) fn encode_u8(
        width: u32,
        height: u32,
        data: &[u8],
        origin: (f64, f64),
        pixel: f64,
        epsg: u16,
    ) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            let mut image = encoder.new_image::<colortype::Gray8>(width, height).unwrap();
            write_geotags(image.encoder(), origin, pixel, &epsg_geokeys(epsg));
            image.write_data(data).unwrap();
        }
        buf.into_inner()
    }

    fn write_geotags<W, K>(
        dir: &mut tiff::encoder::DirectoryEncoder<'_, W, K>,
        origin: (f64, f64),
        pixel: f64,
        geokeys: &[u16],
    ) where
        W: std::io::Write + std::io::Seek,
        K: tiff::encoder::TiffKind,
    {
        let scale = [pixel, pixel, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, origin.0, origin.1, 0.0];
        dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE), &scale[..])
            .unwrap();
        dir.write_tag(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT), &tiepoint[..])
            .unwrap();
        dir.write_tag(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY), geokeys)
            .unwrap();
    }

    #[test]
    fn test_decode_int16_geotiff() {
        let data: Vec<i16> = (0..12).collect();
        let bytes = encode_i16(4, 3, &data, (300_000.0, 5_900_040.0), 30.0, 32633);

        let tiff = GeoTiff::decode(&bytes).unwrap();
        assert_eq!((tiff.width, tiff.height), (4, 3));
        assert_eq!(tiff.crs, Crs::new(32633));
        assert_eq!(tiff.transform, Affine::from_origin(300_000.0, 5_900_040.0, 30.0, 30.0));
        assert_eq!(tiff.value(5), 5.0);
        assert!(tiff.value(100).is_nan());
    }

    #[test]
    fn test_decode_uint8_geotiff() {
        let bytes = encode_u8(2, 2, &[1, 2, 3, 255], (0.0, 0.0), 30.0, 32733);
        let tiff = GeoTiff::decode(&bytes).unwrap();
        assert_eq!(tiff.crs, Crs::new(32733));
        assert_eq!(tiff.value(3), 255.0);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            GeoTiff::decode(b"definitely not a tiff"),
            Err(RasterError::Decode(_))
        ));
    }

    #[test]
    fn test_plain_tiff_lacks_georeference() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            encoder
                .write_image::<colortype::Gray8>(1, 1, &[0u8])
                .unwrap();
        }
        assert!(matches!(
            GeoTiff::decode(&buf.into_inner()),
            Err(RasterError::MissingGeoreference(_))
        ));
    }

    #[test]
    fn test_geokeys_prefer_projected() {
        let keys = [1, 1, 0, 2, GEOKEY_GEOGRAPHIC_TYPE, 0, 1, 4326, GEOKEY_PROJECTED_CS_TYPE, 0, 1, 32610];
        assert_eq!(crs_from_geokeys(&keys), Some(Crs::new(32610)));
        let geographic = [1, 1, 0, 1, GEOKEY_GEOGRAPHIC_TYPE, 0, 1, 4326];
        assert_eq!(crs_from_geokeys(&geographic), Some(Crs::WGS84));
        let user_defined = [1, 1, 0, 1, GEOKEY_PROJECTED_CS_TYPE, 0, 1, GEOKEY_USER_DEFINED];
        assert_eq!(crs_from_geokeys(&user_defined), None);
        assert_eq!(crs_from_geokeys(&[1, 1]), None);
    }

    #[test]
    fn test_geokeys_user_defined_utm() {
        assert_eq!(crs_from_geokeys(&user_defined_utm_geokeys(33, true)), Some(Crs::new(32633)));
        assert_eq!(crs_from_geokeys(&user_defined_utm_geokeys(55, false)), Some(Crs::new(32755)));

        // WGS84 named through the geographic type instead of the ellipsoid
        let keys = [1, 1, 0, 2, GEOKEY_GEOGRAPHIC_TYPE, 0, 1, EPSG_WGS84, GEOKEY_PROJECTION, 0, 1, 16110];
        assert_eq!(crs_from_geokeys(&keys), Some(Crs::new(32710)));
    }

    #[test]
    fn test_geokeys_user_defined_non_wgs84_is_unresolved() {
        // GRS 1980 ellipsoid
        let keys = [
            1, 1, 0, 3,
            GEOKEY_GEOGRAPHIC_TYPE, 0, 1, GEOKEY_USER_DEFINED,
            GEOKEY_GEOG_ELLIPSOID, 0, 1, 7019,
            GEOKEY_PROJECTION, 0, 1, 16033,
        ];
        assert_eq!(crs_from_geokeys(&keys), None);

        // Not a UTM projection code
        let keys = [1, 1, 0, 2, GEOKEY_GEOG_ELLIPSOID, 0, 1, ELLIPSOID_WGS84, GEOKEY_PROJECTION, 0, 1, 16201];
        assert_eq!(crs_from_geokeys(&keys), None);
    }

    #[test]
    fn test_decode_user_defined_utm_geotiff() {
        let data = [10i16, 20, 30, 40];
        let bytes = encode_i16_with_geokeys(
            2,
            2,
            &data,
            (500_000.0, 5_760_000.0),
            30.0,
            &user_defined_utm_geokeys(33, true),
        );
        let tiff = GeoTiff::decode(&bytes).unwrap();
        assert_eq!(tiff.crs, Crs::new(32633));
        assert_eq!(tiff.value(3), 40.0);
    }

    #[test]
    fn test_oversized_raster_is_rejected_before_decoding() {
        let data = vec![0i16; 64 * 64];
        let bytes = encode_i16(64, 64, &data, (0.0, 0.0), 30.0, 32633);

        let err = GeoTiff::decode_with_limit(&bytes, 4096).unwrap_err();
        assert!(matches!(
            err,
            RasterError::TooLarge { width: 64, height: 64, bytes: 8192, limit: 4096 }
        ));
        assert!(GeoTiff::decode_with_limit(&bytes, 8192).is_ok());
    }

    #[test]
    fn test_decoded_size() {
        assert_eq!(decoded_size(3660, 3660, 1, 16), 3660 * 3660 * 2);
        assert!(decoded_size(3660, 3660, 1, 16) < MAX_DECODED_BYTES as u64);
        assert_eq!(decoded_size(10, 10, 1, 1), 100);
        assert!(decoded_size(u32::MAX, u32::MAX, 4, 64) > MAX_DECODED_BYTES as u64);
    }
}
