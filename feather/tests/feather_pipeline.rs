use approx::assert_abs_diff_eq;
use feather::fft::{fft2, ifft2};
use feather::{
    build_kernel, compare, feather_cube, feather_plane, Combination, CompareConfig,
    CubeFeatherConfig, FeatherError, LowResTreatment, MergePolicy, PlaneFeatherConfig,
};
use ndarray::{Array2, Zip};
use shared::image_proc::{ChannelsPerChunk, ImageHeader, ImagePlane};
use shared::units::{Angle, AngleExt, FluxUnit};
use test_helpers::{cube_from_planes, gaussian_blob, jy_beam_header, plane, smoothed_noise};

const SHAPE: (usize, usize) = (64, 64);
const PIXEL_ARCSEC: f64 = 1.0;
const LORES_BEAM_ARCSEC: f64 = 8.0;
const HIRES_BEAM_ARCSEC: f64 = 1.5;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn zero_mean_blob() -> Array2<f64> {
    let blob = gaussian_blob(SHAPE, (31.5, 31.5), 5.0);
    let mean = blob.mean().unwrap();
    blob.mapv(|v| v - mean)
}

/// What a single dish with the low-resolution beam would see of `image`
fn beam_smoothed(image: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let kernel = build_kernel(
        rows,
        cols,
        Angle::from_arcseconds(LORES_BEAM_ARCSEC),
        Angle::from_arcseconds(PIXEL_ARCSEC),
    )
    .unwrap();
    let spectrum = Zip::from(&fft2(&image.view()))
        .and(&kernel.kfft())
        .map_collect(|f, k| *f * *k);
    ifft2(&spectrum.view()).mapv(|c| c.re)
}

fn hires_header() -> ImageHeader {
    jy_beam_header(SHAPE, PIXEL_ARCSEC, HIRES_BEAM_ARCSEC)
}

fn lores_header() -> ImageHeader {
    jy_beam_header(SHAPE, PIXEL_ARCSEC, LORES_BEAM_ARCSEC)
}

fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[test]
fn identical_blobs_with_lowpass_reproduce_input() {
    init_logging();
    let blob = zero_mean_blob();
    let header = lores_header();
    let config = PlaneFeatherConfig {
        policy: MergePolicy::new(LowResTreatment::LowPass, Combination::WeightedSum),
        ..Default::default()
    };

    let result = feather_plane(
        plane(blob.clone(), header.clone()),
        plane(blob.clone(), header),
        &config,
    )
    .unwrap();

    assert!(max_abs_diff(result.image.data(), &blob) < 1e-6);
}

#[test]
fn default_policy_restores_image_from_single_dish_view() {
    init_logging();
    let blob = zero_mean_blob();
    let single_dish = beam_smoothed(&blob);

    let result = feather_plane(
        plane(blob.clone(), lores_header()),
        plane(single_dish, lores_header()),
        &PlaneFeatherConfig::default(),
    )
    .unwrap();

    assert!(max_abs_diff(result.image.data(), &blob) < 1e-6);
    assert_eq!(result.image.header(), &lores_header());
}

#[test]
fn sequential_cube_matches_manual_plane_loop() {
    init_logging();
    let hires_planes: Vec<_> = (0..4).map(|c| smoothed_noise(SHAPE, 1, c)).collect();
    let lores_planes: Vec<_> = hires_planes
        .iter()
        .map(|p| beam_smoothed(p).mapv(|v| v * 1.1))
        .collect();
    let hires = cube_from_planes(&hires_planes, &hires_header(), None);
    let lores = cube_from_planes(&lores_planes, &lores_header(), None);

    let config = CubeFeatherConfig::default();
    let cube = feather_cube(hires.clone(), lores.clone(), &config).unwrap();

    for c in 0..4 {
        let expected = feather_plane(
            hires.plane(c).unwrap(),
            lores.plane(c).unwrap(),
            &config.plane,
        )
        .unwrap()
        .image;
        assert_eq!(cube.plane(c).unwrap().data(), expected.data());
    }
}

#[test]
fn blockwise_cube_matches_sequential() {
    init_logging();
    let hires_planes: Vec<_> = (0..5).map(|c| smoothed_noise(SHAPE, 2, 100 + c)).collect();
    let lores_planes: Vec<_> = hires_planes.iter().map(beam_smoothed).collect();
    let hires = cube_from_planes(&hires_planes, &hires_header(), None);
    let lores = cube_from_planes(&lores_planes, &lores_header(), None);

    let sequential =
        feather_cube(hires.clone(), lores.clone(), &CubeFeatherConfig::default()).unwrap();
    let blockwise_config = CubeFeatherConfig {
        use_blockwise: true,
        force_spatial_rechunk: true,
        channels_per_chunk: ChannelsPerChunk::Count(2),
        ..Default::default()
    };
    let blockwise = feather_cube(
        hires.rechunk(ChannelsPerChunk::Count(2)).unwrap(),
        lores.rechunk(ChannelsPerChunk::Count(2)).unwrap(),
        &blockwise_config,
    )
    .unwrap();
    assert_eq!(blockwise.chunks().unwrap().channels, 2);

    for (a, b) in blockwise.data().iter().zip(sequential.data().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
}

#[test]
fn mismatched_weights_are_rejected() {
    init_logging();
    let blob = zero_mean_blob();
    let config = PlaneFeatherConfig {
        weights: Some(Array2::ones((32, 64))),
        ..Default::default()
    };

    let err = feather_plane(
        plane(blob.clone(), hires_header()),
        plane(blob, lores_header()),
        &config,
    )
    .unwrap_err();

    assert!(matches!(err, FeatherError::ShapeMismatch { .. }), "{err}");
}

#[test]
fn flux_density_and_dimensionless_are_incompatible() {
    init_logging();
    let blob = zero_mean_blob();
    let mut counts = lores_header();
    counts.unit = FluxUnit::dimensionless();

    let err = feather_plane(
        plane(blob.clone(), hires_header()),
        ImagePlane::new(blob, counts).unwrap(),
        &PlaneFeatherConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, FeatherError::IncompatibleUnits { .. }), "{err}");
}

#[test]
fn comparison_band_beyond_the_grid_is_empty() {
    init_logging();
    let hires = smoothed_noise(SHAPE, 1, 9);
    let lores = beam_smoothed(&hires);

    // The largest representable scale is roughly the 64" field itself
    let err = compare(
        &plane(hires, hires_header()),
        &plane(lores, lores_header()),
        Angle::from_arcseconds(1000.0),
        Angle::from_arcseconds(5000.0),
        Angle::from_arcseconds(LORES_BEAM_ARCSEC),
        &CompareConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, FeatherError::EmptyOverlap(_)), "{err}");
}

#[test]
fn comparison_band_below_beam_floor_is_empty() {
    init_logging();
    let hires = smoothed_noise(SHAPE, 1, 9);
    let lores = beam_smoothed(&hires);

    // Scales of 1" to 2.5" sit far out in the 8" beam's tail
    let err = compare(
        &plane(hires, hires_header()),
        &plane(lores, lores_header()),
        Angle::from_arcseconds(1.0),
        Angle::from_arcseconds(2.5),
        Angle::from_arcseconds(LORES_BEAM_ARCSEC),
        &CompareConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, FeatherError::EmptyOverlap(_)), "{err}");
}
