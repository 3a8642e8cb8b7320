#![warn(clippy::pedantic)]

//! Headless front-end: composites scene files and exports the results.
//!
//! Usage: `strata <scene.toml>...`. Scenes are independent and composited in parallel.

mod png_export;
mod scene;
mod settings;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult};
use strata_core::export::{self, CancelToken, ExportStatus, FileSequence, FrameExporter};
use strata_core::graph::NodeID;
use strata_core::Image;

use scene::Scene;
use settings::Settings;

/// Composite one scene and write its output(s) next to it.
fn render_scene(path: &Path, settings: &Settings, cancel: &CancelToken) -> AnyResult<ExportStatus> {
    let scene = Scene::load(path)?;
    let (image, named) = scene.build(&settings.compositing)?;
    let output = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&scene.output);
    let extension = output
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let filter = export::global()
        .by_extension(extension)
        .with_context(|| format!("no export filter for {}", output.display()))?;

    let exporter = FrameExporter::new(filter, cancel.clone());
    if scene.frames.is_empty() {
        let mut frames: Vec<Vec<u8>> = Vec::with_capacity(1);
        let status = exporter.export(0..1, |_| Ok(image.request_projection(image.bounds())?), &mut frames)?;
        if let Some(encoded) = frames.pop() {
            std::fs::write(&output, encoded)
                .with_context(|| format!("writing {}", output.display()))?;
        }
        return Ok(status);
    }

    let animated: Vec<(NodeID, &str)> = scene
        .animated_layers()
        .into_iter()
        .filter_map(|name| {
            let id = named.iter().find(|(n, _)| n == name).map(|(_, id)| *id);
            if id.is_none() {
                log::warn!("{}: frames mention unknown layer {name:?}", path.display());
            }
            Some((id?, name))
        })
        .collect();
    let mut sink = FileSequence {
        directory: output.parent().map(Path::to_path_buf).unwrap_or_default(),
        stem: output
            .file_stem()
            .map(|stem| format!("{}_", stem.to_string_lossy()))
            .unwrap_or_default(),
        extension: extension.to_owned(),
    };
    let status = exporter.export(
        0..scene.frames.len(),
        |frame| {
            let shown = &scene.frames[frame].show;
            for (id, name) in &animated {
                set_visible(&image, *id, shown.iter().any(|s| s == name))?;
            }
            Ok(image.request_projection(image.bounds())?)
        },
        &mut sink,
    )?;
    Ok(status)
}

fn set_visible(image: &Image, id: NodeID, visible: bool) -> Result<(), strata_core::image::ImageError> {
    let properties = {
        let graph = image.graph();
        let Some(node) = graph.get(id) else {
            return Ok(());
        };
        let mut properties = node.properties().clone();
        properties.visible = visible;
        properties
    };
    image.set_properties(id, properties)
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Info)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Info);
    }

    let settings = Settings::get();
    if settings.did_fail_to_load() {
        if let Err(e) = settings.save() {
            log::warn!("Failed to save default settings:\n{e:?}");
        }
    }
    if let Some(threads) = settings.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            log::warn!("couldn't size the thread pool: {e}");
        }
    }
    export::global().register(Arc::new(png_export::PngExportFilter))?;

    let rendered_all = {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        // Args are a simple list of scene paths.
        // Paths are OSStrings, let the system handle character encoding restrictions.
        let paths: Vec<std::path::PathBuf> = std::env::args_os().skip(1).map(Into::into).collect();
        if paths.is_empty() {
            log::warn!("No scenes given. Usage: strata <scene.toml>...");
        }
        let cancel = CancelToken::new();
        let failures = std::sync::atomic::AtomicUsize::new(0);
        paths.into_par_iter().for_each(|path| {
            match render_scene(&path, settings, &cancel) {
                Ok(ExportStatus::Completed { frames }) => {
                    log::info!("{}: wrote {frames} frame(s)", path.display());
                }
                Ok(ExportStatus::Cancelled { frames }) => {
                    log::warn!("{}: cancelled after {frames} frame(s)", path.display());
                }
                Err(e) => {
                    log::error!("failed to render {}: {e:#}", path.display());
                    failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
            }
        });
        failures.into_inner() == 0
    };
    if !rendered_all {
        anyhow::bail!("some scenes failed to render");
    }
    Ok(())
}
