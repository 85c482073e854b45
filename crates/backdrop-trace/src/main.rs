//! Runs the background compositor on the recording backend for a scripted
//! sequence of frames and prints the GL calls each step issues.
//!
//! Usage: `backdrop-trace [ASSET_DIR]`
//!
//! Without `ASSET_DIR` the built-in background shaders are used.

use std::rc::Rc;

use anyhow::{Context, Result};
use backdrop_engine::assets::{AssetSource, DirAssets, EmbeddedAssets};
use backdrop_engine::backend::RecordingBackend;
use backdrop_engine::background::{
    BackgroundCompositor, BackgroundConfig, DisplayGeometry, VisualizationMode,
};
use backdrop_engine::logging::{init_logging, LoggingConfig};
use backdrop_engine::render::Renderer;

const VIEWPORT: (u32, u32) = (1080, 1920);

/// Display geometry with the camera image rotated by `quarter_turns`.
struct ScriptedDisplay {
    quarter_turns: u32,
    changed: bool,
}

impl DisplayGeometry for ScriptedDisplay {
    fn has_display_geometry_changed(&self) -> bool {
        self.changed
    }

    fn transform_ndc_to_texture(&self, ndc: &[f32; 8]) -> [f32; 8] {
        let mut out = [0.0; 8];
        for (src, dst) in ndc.chunks_exact(2).zip(out.chunks_exact_mut(2)) {
            // Texture space has its origin top-left.
            let (mut u, mut v) = ((src[0] + 1.0) * 0.5, (1.0 - src[1]) * 0.5);
            for _ in 0..self.quarter_turns % 4 {
                (u, v) = (v, 1.0 - u);
            }
            dst[0] = u;
            dst[1] = v;
        }
        out
    }
}

struct Frame {
    label: &'static str,
    mode: VisualizationMode,
    display: ScriptedDisplay,
}

fn script() -> Vec<Frame> {
    use VisualizationMode::{CameraImage, DepthVisualization};

    let display = |quarter_turns, changed| ScriptedDisplay {
        quarter_turns,
        changed,
    };
    vec![
        Frame { label: "first frame", mode: CameraImage, display: display(0, true) },
        Frame { label: "steady frame", mode: CameraImage, display: display(0, false) },
        Frame { label: "display rotated", mode: CameraImage, display: display(1, true) },
        Frame { label: "depth visualization on", mode: DepthVisualization, display: display(1, false) },
        Frame { label: "depth visualization again", mode: DepthVisualization, display: display(1, false) },
        Frame { label: "back to camera", mode: CameraImage, display: display(1, false) },
    ]
}

fn print_section(title: &str, gl: &RecordingBackend) {
    println!("== {title}");
    for call in gl.take_calls() {
        println!("   {call}");
    }
}

fn run<A: AssetSource>(assets: A) -> Result<()> {
    let gl = Rc::new(RecordingBackend::new());
    let mut renderer = Renderer::new(gl.clone());
    renderer.set_viewport(VIEWPORT.0, VIEWPORT.1);

    let mut compositor = BackgroundCompositor::new(&renderer, assets, BackgroundConfig::default())
        .context("failed to create background compositor")?;
    print_section("setup", &gl);

    for (index, frame) in script().into_iter().enumerate() {
        compositor
            .set_mode(frame.mode)
            .with_context(|| format!("frame {index}: failed to switch to {:?}", frame.mode))?;
        compositor
            .update_display_geometry(&frame.display)
            .with_context(|| format!("frame {index}: failed to update display geometry"))?;
        renderer
            .clear(0.0, 0.0, 0.0, 1.0)
            .with_context(|| format!("frame {index}: failed to clear"))?;
        compositor
            .draw(&renderer)
            .with_context(|| format!("frame {index}: failed to draw background"))?;
        print_section(&format!("frame {index}: {}", frame.label), &gl);
    }

    log::info!("{} draws issued", gl.draw_count());
    drop(compositor);
    print_section("teardown", &gl);

    anyhow::ensure!(
        gl.live_objects() == 0,
        "{} native objects leaked",
        gl.live_objects()
    );
    anyhow::ensure!(
        gl.stale_deletes() == 0,
        "{} native objects freed twice",
        gl.stale_deletes()
    );
    println!("all native objects released");
    Ok(())
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    match std::env::args().nth(1) {
        Some(dir) => {
            log::info!("loading shaders from {dir}");
            run(DirAssets::new(dir))
        }
        None => run(EmbeddedAssets),
    }
}
