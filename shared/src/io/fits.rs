//! FITS reading and writing for [`ImagePlane`] and [`SpectralCube`]
//!
//! Arrays are read in C order, so a FITS image with `NAXIS1 = nx` and
//! `NAXIS2 = ny` becomes an `(ny, nx)` array and a cube becomes
//! `(NAXIS3, NAXIS2, NAXIS1)`. Trailing degenerate axes (such as a single
//! Stokes plane) are dropped.
//!
//! Recognised keywords: `CRPIXn`, `CRVALn`, `CDELTn` (or `CDi_i`), `CTYPEn`,
//! `BUNIT`, `BMAJ`/`BMIN`/`BPA` in degrees and `RESTFRQ`/`RESTFREQ`. Per-channel
//! beams are read from and written to a `BEAMS` table with arcsecond columns.

use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;
use log::{debug, warn};
use ndarray::{Array2, Array3};

use super::FitsError;
use crate::image_proc::{
    Beam, CelestialWcs, CubeBeams, CubeHeader, ImageHeader, ImagePlane, SpectralCube,
};
use crate::units::{Angle, AngleExt, FluxUnit};

const BEAMS_EXTENSION: &str = "BEAMS";

/// Read one image HDU as a plane.
///
/// `extension` is the zero-based HDU index; 0 is the primary array.
pub fn read_image_plane<P: AsRef<Path>>(path: P, extension: usize) -> Result<ImagePlane, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = image_hdu(&mut fptr, extension)?;

    let dims = significant_dimensions(&hdu, 2)?;
    let (rows, cols) = (dims[0], dims[1]);

    let header = ImageHeader {
        shape: (rows, cols),
        wcs: read_celestial_wcs(&hdu, &mut fptr)?,
        unit: read_unit(&hdu, &mut fptr)?,
        beam: read_beam(&hdu, &mut fptr),
        rest_frequency_hz: read_rest_frequency(&hdu, &mut fptr),
    };

    let raw: Vec<f64> = hdu.read_image(&mut fptr)?;
    let data = Array2::from_shape_vec((rows, cols), raw).map_err(|_| {
        FitsError::UnsupportedLayout(format!("cannot reshape HDU {extension} to {rows}x{cols}"))
    })?;

    debug!(
        "Read {}x{} plane from {} (unit {})",
        rows,
        cols,
        path.as_ref().display(),
        header.unit
    );
    Ok(ImagePlane::new(data, header)?)
}

/// Read one image HDU as a spectral cube
pub fn read_spectral_cube<P: AsRef<Path>>(
    path: P,
    extension: usize,
) -> Result<SpectralCube, FitsError> {
    let mut fptr = FitsFile::open(path.as_ref())?;
    let hdu = image_hdu(&mut fptr, extension)?;

    let dims = significant_dimensions(&hdu, 3)?;
    let (nchan, rows, cols) = (dims[0], dims[1], dims[2]);

    let wcs = read_celestial_wcs(&hdu, &mut fptr)?;
    let unit = read_unit(&hdu, &mut fptr)?;
    let rest_frequency_hz = read_rest_frequency(&hdu, &mut fptr);
    let spectral_axis = read_spectral_axis(&hdu, &mut fptr, nchan)?;

    let raw: Vec<f64> = hdu.read_image(&mut fptr)?;
    let data = Array3::from_shape_vec((nchan, rows, cols), raw).map_err(|_| {
        FitsError::UnsupportedLayout(format!(
            "cannot reshape HDU {extension} to {nchan}x{rows}x{cols}"
        ))
    })?;

    let beams = match read_beam_table(&mut fptr)? {
        Some(beams) => CubeBeams::PerChannel(beams),
        None => match read_beam(&hdu, &mut fptr) {
            Some(beam) => CubeBeams::Single(beam),
            None => CubeBeams::None,
        },
    };

    debug!(
        "Read {}x{}x{} cube from {}",
        nchan,
        rows,
        cols,
        path.as_ref().display()
    );

    let header = CubeHeader {
        wcs,
        spectral_axis,
        unit,
        beams,
        rest_frequency_hz,
    };
    Ok(SpectralCube::new(data, header)?)
}

/// Write a plane as the primary HDU, replacing any existing file
pub fn write_image_plane<P: AsRef<Path>>(path: P, plane: &ImagePlane) -> Result<(), FitsError> {
    let (rows, cols) = plane.shape();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[rows, cols],
    };
    let mut fptr = FitsFile::create(path.as_ref())
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let flat: Vec<f64> = plane.data().iter().copied().collect();
    hdu.write_image(&mut fptr, &flat)?;

    let header = plane.header();
    write_celestial_wcs(&hdu, &mut fptr, &header.wcs)?;
    hdu.write_key(&mut fptr, "BUNIT", header.unit.to_string())?;
    if let Some(beam) = &header.beam {
        write_beam(&hdu, &mut fptr, beam)?;
    }
    if let Some(freq) = header.rest_frequency_hz {
        hdu.write_key(&mut fptr, "RESTFRQ", freq)?;
    }
    Ok(())
}

/// Write a cube as the primary HDU, with a `BEAMS` table when beams vary per channel
pub fn write_spectral_cube<P: AsRef<Path>>(path: P, cube: &SpectralCube) -> Result<(), FitsError> {
    let (nchan, rows, cols) = cube.shape();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[nchan, rows, cols],
    };
    let mut fptr = FitsFile::create(path.as_ref())
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    let flat: Vec<f64> = cube.data().iter().copied().collect();
    hdu.write_image(&mut fptr, &flat)?;

    let header = cube.header();
    write_celestial_wcs(&hdu, &mut fptr, &header.wcs)?;
    write_spectral_axis(&hdu, &mut fptr, &header.spectral_axis)?;
    hdu.write_key(&mut fptr, "BUNIT", header.unit.to_string())?;
    if let Some(freq) = header.rest_frequency_hz {
        hdu.write_key(&mut fptr, "RESTFRQ", freq)?;
    }

    match &header.beams {
        CubeBeams::None => {}
        CubeBeams::Single(beam) => write_beam(&hdu, &mut fptr, beam)?,
        CubeBeams::PerChannel(beams) => write_beam_table(&mut fptr, beams)?,
    }
    Ok(())
}

fn image_hdu(fptr: &mut FitsFile, extension: usize) -> Result<FitsHdu, FitsError> {
    let hdu = fptr
        .hdu(extension)
        .map_err(|_| FitsError::HduNotFound(format!("extension {extension}")))?;
    match &hdu.info {
        HduInfo::ImageInfo { .. } => Ok(hdu),
        _ => Err(FitsError::UnsupportedLayout(format!(
            "extension {extension} is not an image"
        ))),
    }
}

/// Leading `wanted` axes in C order, after dropping trailing length-1 axes
fn significant_dimensions(hdu: &FitsHdu, wanted: usize) -> Result<Vec<usize>, FitsError> {
    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => return Err(FitsError::UnsupportedLayout("not an image".to_string())),
    };

    // fitsio reports the shape slowest-axis first, so degenerate Stokes or
    // frequency axes appear at the front
    let extra = shape.len().saturating_sub(wanted);
    if shape.len() < wanted || shape[..extra].iter().any(|&n| n != 1) {
        return Err(FitsError::UnsupportedLayout(format!(
            "expected {wanted} significant axes, found shape {shape:?}"
        )));
    }
    Ok(shape[extra..].to_vec())
}

fn read_f64(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<f64> {
    hdu.read_key::<f64>(fptr, key).ok()
}

fn require_f64(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Result<f64, FitsError> {
    read_f64(hdu, fptr, key).ok_or_else(|| FitsError::MissingKeyword(key.to_string()))
}

fn read_celestial_wcs(hdu: &FitsHdu, fptr: &mut FitsFile) -> Result<CelestialWcs, FitsError> {
    let mut crpix = [0.0; 2];
    let mut crval = [0.0; 2];
    let mut cdelt = [0.0; 2];
    for axis in 0..2 {
        let n = axis + 1;
        crpix[axis] = require_f64(hdu, fptr, &format!("CRPIX{n}"))?;
        crval[axis] = require_f64(hdu, fptr, &format!("CRVAL{n}"))?;
        cdelt[axis] = match read_f64(hdu, fptr, &format!("CDELT{n}")) {
            Some(v) => v,
            None => require_f64(hdu, fptr, &format!("CD{n}_{n}"))?,
        };
    }

    let mut wcs = CelestialWcs::new(crpix, crval, cdelt);
    for axis in 0..2 {
        if let Ok(ctype) = hdu.read_key::<String>(fptr, &format!("CTYPE{}", axis + 1)) {
            wcs.ctype[axis] = ctype;
        }
    }
    Ok(wcs)
}

fn write_celestial_wcs(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    wcs: &CelestialWcs,
) -> Result<(), FitsError> {
    for axis in 0..2 {
        let n = axis + 1;
        hdu.write_key(fptr, &format!("CTYPE{n}"), wcs.ctype[axis].clone())?;
        hdu.write_key(fptr, &format!("CRPIX{n}"), wcs.crpix[axis])?;
        hdu.write_key(fptr, &format!("CRVAL{n}"), wcs.crval[axis])?;
        hdu.write_key(fptr, &format!("CDELT{n}"), wcs.cdelt[axis])?;
    }
    Ok(())
}

fn read_unit(hdu: &FitsHdu, fptr: &mut FitsFile) -> Result<FluxUnit, FitsError> {
    match hdu.read_key::<String>(fptr, "BUNIT") {
        Ok(text) if !text.trim().is_empty() => Ok(text.parse()?),
        _ => {
            warn!("No BUNIT keyword; treating data as dimensionless");
            Ok(FluxUnit::dimensionless())
        }
    }
}

fn read_beam(hdu: &FitsHdu, fptr: &mut FitsFile) -> Option<Beam> {
    let major = read_f64(hdu, fptr, "BMAJ")?;
    let minor = read_f64(hdu, fptr, "BMIN")?;
    let pa = read_f64(hdu, fptr, "BPA").unwrap_or(0.0);
    Some(Beam::new(
        Angle::from_degrees(major),
        Angle::from_degrees(minor),
        Angle::from_degrees(pa),
    ))
}

fn write_beam(hdu: &FitsHdu, fptr: &mut FitsFile, beam: &Beam) -> Result<(), FitsError> {
    hdu.write_key(fptr, "BMAJ", beam.major.as_degrees())?;
    hdu.write_key(fptr, "BMIN", beam.minor.as_degrees())?;
    hdu.write_key(fptr, "BPA", beam.position_angle.as_degrees())?;
    Ok(())
}

fn read_rest_frequency(hdu: &FitsHdu, fptr: &mut FitsFile) -> Option<f64> {
    read_f64(hdu, fptr, "RESTFRQ").or_else(|| read_f64(hdu, fptr, "RESTFREQ"))
}

fn read_spectral_axis(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    nchan: usize,
) -> Result<Vec<f64>, FitsError> {
    let crpix = require_f64(hdu, fptr, "CRPIX3")?;
    let crval = require_f64(hdu, fptr, "CRVAL3")?;
    let cdelt = match read_f64(hdu, fptr, "CDELT3") {
        Some(v) => v,
        None => require_f64(hdu, fptr, "CD3_3")?,
    };
    Ok((0..nchan)
        .map(|i| crval + (i as f64 + 1.0 - crpix) * cdelt)
        .collect())
}

fn write_spectral_axis(hdu: &FitsHdu, fptr: &mut FitsFile, axis: &[f64]) -> Result<(), FitsError> {
    let cdelt = match axis {
        [first, second, ..] => second - first,
        _ => 1.0,
    };
    hdu.write_key(fptr, "CTYPE3", "FREQ".to_string())?;
    hdu.write_key(fptr, "CRPIX3", 1.0)?;
    hdu.write_key(fptr, "CRVAL3", axis.first().copied().unwrap_or(0.0))?;
    hdu.write_key(fptr, "CDELT3", cdelt)?;
    Ok(())
}

fn read_beam_table(fptr: &mut FitsFile) -> Result<Option<Vec<Beam>>, FitsError> {
    let hdu = match fptr.hdu(BEAMS_EXTENSION) {
        Ok(hdu) => hdu,
        Err(_) => return Ok(None),
    };
    let major: Vec<f64> = hdu.read_col(fptr, "BMAJ")?;
    let minor: Vec<f64> = hdu.read_col(fptr, "BMIN")?;
    let pa: Vec<f64> = hdu.read_col(fptr, "BPA")?;

    let beams = major
        .iter()
        .zip(&minor)
        .zip(&pa)
        .map(|((maj, min), pa)| {
            Beam::new(
                Angle::from_arcseconds(*maj),
                Angle::from_arcseconds(*min),
                Angle::from_degrees(*pa),
            )
        })
        .collect();
    Ok(Some(beams))
}

fn write_beam_table(fptr: &mut FitsFile, beams: &[Beam]) -> Result<(), FitsError> {
    let columns = ["BMAJ", "BMIN", "BPA"]
        .iter()
        .map(|name| {
            ColumnDescription::new(*name)
                .with_type(ColumnDataType::Double)
                .create()
        })
        .collect::<Result<Vec<_>, _>>()?;
    let hdu = fptr.create_table(BEAMS_EXTENSION.to_string(), &columns)?;

    let major: Vec<f64> = beams.iter().map(|b| b.major.as_arcseconds()).collect();
    let minor: Vec<f64> = beams.iter().map(|b| b.minor.as_arcseconds()).collect();
    let pa: Vec<f64> = beams.iter().map(|b| b.position_angle.as_degrees()).collect();
    hdu.write_col(fptr, "BMAJ", &major)?;
    hdu.write_col(fptr, "BMIN", &minor)?;
    hdu.write_col(fptr, "BPA", &pa)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn wcs(shape: (usize, usize)) -> CelestialWcs {
        CelestialWcs::centered(shape, (201.365, -43.019), Angle::from_arcseconds(1.0))
    }

    #[test]
    fn test_plane_roundtrip_keeps_metadata() {
        let header = ImageHeader::new((6, 5), wcs((6, 5)), FluxUnit::jansky_per_beam())
            .with_beam(Beam::circular(Angle::from_arcseconds(4.0)))
            .with_rest_frequency(1.4204e9);
        let data = Array2::from_shape_fn((6, 5), |(r, c)| r as f64 * 10.0 + c as f64);
        let plane = ImagePlane::new(data.clone(), header).unwrap();

        let temp = NamedTempFile::new().unwrap();
        write_image_plane(temp.path(), &plane).unwrap();
        let read = read_image_plane(temp.path(), 0).unwrap();

        assert_eq!(read.shape(), (6, 5));
        assert_eq!(read.data(), &data);
        assert_eq!(read.unit(), FluxUnit::jansky_per_beam());
        assert!(read.wcs().approx_eq(plane.wcs()));
        let beam = read.beam().unwrap();
        assert_relative_eq!(beam.major.as_arcseconds(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(read.header().rest_frequency_hz.unwrap(), 1.4204e9);
    }

    #[test]
    fn test_cube_roundtrip_with_per_channel_beams() {
        let beams: Vec<Beam> = (0..3)
            .map(|i| Beam::circular(Angle::from_arcseconds(5.0 + i as f64)))
            .collect();
        let header = CubeHeader {
            wcs: wcs((4, 4)),
            spectral_axis: vec![1.0e9, 1.001e9, 1.002e9],
            unit: FluxUnit::kelvin(),
            beams: CubeBeams::PerChannel(beams),
            rest_frequency_hz: None,
        };
        let data = Array3::from_shape_fn((3, 4, 4), |(c, r, x)| (c * 16 + r * 4 + x) as f64);
        let cube = SpectralCube::new(data.clone(), header).unwrap();

        let temp = NamedTempFile::new().unwrap();
        write_spectral_cube(temp.path(), &cube).unwrap();
        let read = read_spectral_cube(temp.path(), 0).unwrap();

        assert_eq!(read.data(), &data);
        assert!(read.spectral_axis_matches(&cube));
        assert!(read.has_varying_beams());
        assert_relative_eq!(
            read.channel_beam(2).unwrap().major.as_arcseconds(),
            7.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_missing_extension() {
        let plane = ImagePlane::new(
            Array2::zeros((2, 2)),
            ImageHeader::new((2, 2), wcs((2, 2)), FluxUnit::kelvin()),
        )
        .unwrap();
        let temp = NamedTempFile::new().unwrap();
        write_image_plane(temp.path(), &plane).unwrap();
        assert!(matches!(
            read_image_plane(temp.path(), 3),
            Err(FitsError::HduNotFound(_))
        ));
    }
}
