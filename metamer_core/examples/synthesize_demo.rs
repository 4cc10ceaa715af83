use std::path::PathBuf;

use foveated_metamer_core::config::ConfigError;
use foveated_metamer_core::{
    MetamerConfig, MetamerSynthesis, RepresentationModel, SynthesisStatus, VisualModel,
};
use ndarray::Array2;

const RESOLUTION: (usize, usize) = (128, 128);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    println!(
        "Loaded config: model={:?} scaling={} scales={} max_iter={} seed={}",
        config.model.kind,
        config.model.scaling,
        config.model.num_scales,
        config.synthesis.max_iter,
        config.synthesis.seed
    );

    let cache = config.cache.build();
    let model = RepresentationModel::from_params(&config.model.to_params(RESOLUTION), &cache)?;
    let bank = model.window_bank();
    println!(
        "Windows: {} angular x {} eccentricity, representation length {}",
        bank.n_polar_windows(),
        bank.n_eccentricity_bands(),
        model.representation_len()
    );

    let reference = synthetic_reference(RESOLUTION);
    let mut synthesis = MetamerSynthesis::new(&model, reference.view(), config.synthesis.clone())?;
    let status = synthesis.run()?;

    let state = synthesis.state();
    match status {
        SynthesisStatus::Failed => eprintln!("Synthesis failed: {:?}", state.failure),
        _ => println!(
            "Synthesis {:?} after {} iterations. Loss {:.6} -> {:.6}",
            status,
            state.iteration_count,
            state.loss_history.first().copied().unwrap_or(f32::NAN),
            state.final_loss().unwrap_or(f32::NAN)
        ),
    }

    let summary_path = PathBuf::from("out/metamer_summary.json");
    synthesis.summary().save_json(&summary_path)?;
    model.save_params("out/metamer_model.json")?;
    println!("Summary written to {}", summary_path.display());
    Ok(())
}

/// Concentric rings over an oriented grating, in [0, 1].
fn synthetic_reference(resolution: (usize, usize)) -> Array2<f32> {
    let (h, w) = resolution;
    let cy = (h as f32 - 1.0) / 2.0;
    let cx = (w as f32 - 1.0) / 2.0;
    Array2::from_shape_fn(resolution, |(r, c)| {
        let dy = r as f32 - cy;
        let dx = c as f32 - cx;
        let rings = (dx.hypot(dy) * 0.35).sin();
        let grating = ((dx + dy) * 0.5).cos();
        (0.5 + 0.25 * rings + 0.2 * grating).clamp(0.0, 1.0)
    })
}

fn load_config() -> Result<MetamerConfig, ConfigError> {
    MetamerConfig::load_from_file("config/metamer.toml").or_else(|err| {
        eprintln!("Falling back to default config: {err}");
        Ok(MetamerConfig::default())
    })
}
