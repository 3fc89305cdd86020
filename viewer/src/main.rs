//! Headless slice exporter for synthetic case volumes.

use std::{env, fs, time::Instant};

use anyhow::{Context as _, Result};
use log::info;
use volsynth_engine::{CaseRegistry, SynthConfig, VolumeSynthesizer};

mod export;
mod options;

use options::ViewerOptions;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = ViewerOptions::parse(env::args().skip(1))?;

    let mut registry = CaseRegistry::builtin();
    if let Some(path) = &options.cases_file {
        registry
            .load_file(path)
            .with_context(|| format!("failed to load cases from {}", path.display()))?;
    }

    if options.list {
        for id in registry.case_ids() {
            if let Some(case) = registry.get(id) {
                println!("{:<32} {:?} ({} lesions)", id, case.volume_type, case.lesion_count());
            }
        }
        return Ok(());
    }

    let config = SynthConfig { threads: options.threads, ..SynthConfig::default() };
    let synth = VolumeSynthesizer::new(registry, config).context("failed to set up the synthesizer")?;

    let started = Instant::now();
    let dims = options.dims;
    let volume = synth
        .generate(&options.case_id, dims.width, dims.height, dims.depth)
        .with_context(|| format!("failed to generate '{}'", options.case_id))?;

    fs::create_dir_all(&options.out_dir)
        .with_context(|| format!("failed to create {}", options.out_dir.display()))?;
    let slices = export::export_slices(
        &volume,
        options.axis,
        options.slices,
        &options.render_options(),
        &options.out_dir,
    )?;
    let metadata = export::write_metadata(&volume, &options.out_dir)?;

    info!(
        "Wrote {} {} slices and {} in {:.2?}",
        slices.len(),
        options.axis.as_str(),
        metadata.display(),
        started.elapsed()
    );
    Ok(())
}
