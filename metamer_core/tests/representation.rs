use foveated_metamer_core::windows::geometry::pixel_polar_grid;
use foveated_metamer_core::{
    calc_eccentricity_n_windows, calc_eccentricity_window_spacing, ChannelKind, CorticalModel,
    MetamerError, ModelParams, PoolingOperator, RepresentationModel, RetinalModel, VisualModel,
    WindowBank, WindowCache, WindowParams, WindowType,
};
use ndarray::{Array2, Axis};
use std::sync::Arc;

fn textured(resolution: (usize, usize)) -> Array2<f32> {
    Array2::from_shape_fn(resolution, |(r, c)| {
        let x = r as f32 * 0.37 + c as f32 * 0.21;
        0.5 + 0.4 * x.sin() * (c as f32 * 0.13).cos()
    })
}

#[test]
fn eccentricity_bands_sum_to_one_inside_the_range() {
    for (scaling, resolution) in [(0.5, (48, 48)), (0.3, (40, 56)), (1.0, (64, 32))] {
        let params = WindowParams::new(scaling, resolution).with_eccentricity_range(1.0, 12.0);
        let bank = WindowBank::build(&params).expect("valid params");
        let windows = &bank.scales()[0];
        let sums = windows.eccentricity.sum_axis(Axis(0));
        let (ecc, _) = pixel_polar_grid(resolution, 12.0);
        for (&e, &total) in ecc.iter().zip(sums.iter()) {
            if (1.0..=12.0).contains(&e) {
                assert!((total - 1.0).abs() < 1e-5, "scaling {scaling} ecc {e}: {total}");
            }
        }
    }
}

#[test]
fn spacing_and_window_count_are_inverse() {
    for n in 2..40 {
        let spacing = calc_eccentricity_window_spacing(0.5, 15.0, n as f64);
        let back = calc_eccentricity_n_windows(spacing, 0.5, 15.0);
        assert!((back - n as f64).abs() < 1e-9, "{n} -> {back}");
    }
}

#[test]
fn uniform_images_pool_to_their_value() {
    for wt in [WindowType::cosine(0.5), WindowType::gaussian(1.0)] {
        let params = WindowParams::new(0.5, (64, 64)).with_num_scales(2).with_window_type(wt);
        let pooling = PoolingOperator::new(Arc::new(WindowBank::build(&params).expect("bank")));
        for value in [0.0f32, 0.25, 1.0] {
            let image = Array2::from_elem((32, 32), value);
            let pooled = pooling.pool_scale(1, image.view()).expect("pool");
            assert!(pooled.iter().all(|&p| (p - value).abs() < 1e-5), "{}", wt.name());
        }
    }
}

#[test]
fn gaussian_bank_at_256_pools_gray_to_half() {
    let params = WindowParams::new(0.5, (256, 256))
        .with_eccentricity_range(0.5, 15.0)
        .with_num_scales(1)
        .with_window_type(WindowType::gaussian(1.0));
    let model = RetinalModel::new(params, &WindowCache::default()).expect("bank builds");
    let bank = model.window_bank();
    let gray = Array2::from_elem((256, 256), 0.5f32);
    let output = model.forward(gray.view()).expect("forward");
    assert_eq!(
        output.representation.len(),
        bank.n_polar_windows() * bank.n_eccentricity_bands()
    );
    assert!(output.representation.iter().all(|&v| (v - 0.5).abs() < 1e-5));
}

#[test]
fn unsupported_gaussian_width_fails_before_building() {
    let cache = WindowCache::default();
    let params = WindowParams::new(0.5, (256, 256)).with_window_type(WindowType::gaussian(0.5));
    let err = RetinalModel::new(params, &cache).unwrap_err();
    assert!(matches!(err, MetamerError::Configuration { ref parameter, .. } if parameter == "std_dev"));
    assert_eq!(cache.stats().misses, 0);
    assert_eq!(cache.memory_len(), 0);
}

#[test]
fn retinal_output_equals_cortical_luminance() {
    let cache = WindowCache::default();
    let params = WindowParams::new(0.5, (32, 32)).with_num_scales(2);
    let cortical = CorticalModel::new(params, 1, &cache).expect("cortical");
    let retinal = RetinalModel::from_bank(Arc::clone(cortical.window_bank()));

    let image = textured((32, 32));
    let cortical_out = cortical.forward(image.view()).expect("forward");
    let retinal_out = retinal.forward(image.view()).expect("forward");
    let luminance = cortical
        .layout()
        .channel(ChannelKind::Luminance)
        .expect("luminance channel")
        .range
        .clone();
    assert_eq!(
        cortical_out.representation.slice(ndarray::s![luminance]).to_vec(),
        retinal_out.representation.to_vec()
    );
}

#[test]
fn cortical_gradient_matches_finite_differences() {
    let cache = WindowCache::default();
    let params = WindowParams::new(0.5, (32, 32)).with_num_scales(2);
    let model = CorticalModel::new(params, 1, &cache).expect("cortical");

    let image = textured((32, 32));
    let target = model
        .forward(Array2::from_elem((32, 32), 0.3f32).view())
        .expect("forward")
        .representation;
    let loss = |img: &Array2<f32>| -> f64 {
        let rep = model.forward(img.view()).expect("forward").representation;
        rep.iter()
            .zip(target.iter())
            .map(|(&a, &b)| ((a - b) as f64).powi(2))
            .sum::<f64>()
            / rep.len() as f64
    };

    let output = model.forward(image.view()).expect("forward");
    let rep_grad = (&output.representation - &target) * (2.0 / target.len() as f32);
    let grad = model.backward(&output, rep_grad.view()).expect("backward");

    let direction = Array2::from_shape_fn((32, 32), |(r, c)| ((r * 7 + c * 3) % 5) as f32 / 5.0 - 0.4);
    let eps = 1e-2f32;
    let plus = &image + &(&direction * eps);
    let minus = &image - &(&direction * eps);
    let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps as f64);
    let analytic: f64 = grad
        .iter()
        .zip(direction.iter())
        .map(|(&g, &d)| g as f64 * d as f64)
        .sum();
    let tolerance = 0.05 * numeric.abs().max(analytic.abs()) + 1e-7;
    assert!((numeric - analytic).abs() < tolerance, "numeric {numeric} analytic {analytic}");
}

#[test]
fn params_records_rebuild_the_same_representation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache = WindowCache::default();
    let params = ModelParams::Cortical {
        windows: WindowParams::new(0.5, (32, 32)),
        order: 3,
    };
    let model = RepresentationModel::from_params(&params, &cache).expect("model");
    let path = dir.path().join("model.json");
    model.save_params(&path).expect("save");

    let restored = RepresentationModel::load(&path, &cache).expect("load");
    assert_eq!(restored.params(), params);
    let image = textured((32, 32));
    assert_eq!(
        model.forward(image.view()).expect("forward").representation,
        restored.forward(image.view()).expect("forward").representation
    );
}

#[test]
fn window_cache_round_trip_is_exact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let params = WindowParams::new(0.5, (48, 48)).with_num_scales(2);

    let fresh = WindowBank::build(&params).expect("bank");
    let writer = WindowCache::with_dir(dir.path(), 2);
    writer.load_or_build(&params).expect("build and save");
    assert_eq!(writer.stats().misses, 1);

    let reader = WindowCache::with_dir(dir.path(), 2);
    let loaded = reader.load_or_build(&params).expect("load");
    assert_eq!(reader.stats().disk_hits, 1);
    assert_eq!(*loaded, fresh);
}

#[test]
fn shape_mismatch_is_reported() {
    let model = RetinalModel::new(WindowParams::new(0.5, (32, 32)), &WindowCache::default())
        .expect("model");
    let err = model.forward(Array2::<f32>::zeros((32, 16)).view()).unwrap_err();
    assert!(err.is_shape_mismatch());
}
