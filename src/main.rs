//! # Lumen - Remote Desktop Compositor
//!
//! Replays synthetic frames through the desktop renderer on the software
//! headless backend and reports what happened: transfer path, filter state,
//! sampling decisions and draw counts.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::sync::Arc;

use lumen::backend::headless::HeadlessBackend;
use lumen::config::{DesktopOptions, OptionStore};
use lumen::input::{KeyCode, LogHost};
use lumen::logging;
use lumen::renderer::damage::{DamageRect, FrameDamage};
use lumen::renderer::scale::ScaleType;
use lumen::renderer::{
    Desktop, FrameBuffer, FrameFormat, FrameType, HandoffHandle, RenderParams,
};

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Composite a remote desktop frame stream into a window")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/lumen/lumen.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Number of frames to replay
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Desktop width in pixels
    #[arg(long, default_value_t = 1920)]
    width: u32,

    /// Desktop height in pixels
    #[arg(long, default_value_t = 1080)]
    height: u32,

    /// Window width in pixels (defaults to the desktop width)
    #[arg(long)]
    window_width: Option<u32>,

    /// Window height in pixels (defaults to the desktop height)
    #[arg(long)]
    window_height: Option<u32>,

    /// Make zero-copy imports fail from this frame on
    #[arg(long)]
    fail_zero_copy_at: Option<u32>,
}

fn load_options(path: &str) -> DesktopOptions {
    let mut store = OptionStore::with_desktop_options();

    match store.load(path) {
        Ok(report) => {
            info!("✅ Configuration loaded from: {} ({} values)", path, report.applied);
            for rejected in &report.rejected {
                warn!("⚠️ {}", rejected);
            }
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
        }
    }

    DesktopOptions::from_store(&store).unwrap_or_else(|e| {
        error!("❌ Invalid configuration: {}", e);
        DesktopOptions::default()
    })
}

/// BGRA test pattern that scrolls one column per frame
fn synthetic_frame(format: &FrameFormat, index: u32) -> FrameBuffer {
    let mut data = vec![0u8; (format.pitch * format.height) as usize];
    for (y, row) in data.chunks_exact_mut(format.pitch as usize).enumerate() {
        for (x, pixel) in row.chunks_exact_mut(4).take(format.width as usize).enumerate() {
            let shifted = (x as u32).wrapping_add(index);
            pixel.copy_from_slice(&[(shifted & 0xff) as u8, (y & 0xff) as u8, 0x40, 0xff]);
        }
    }
    FrameBuffer::new(data)
}

/// Damage for one frame: a moving band, with a full refresh every 30 frames
fn synthetic_damage(damage: &mut FrameDamage, format: &FrameFormat, index: u32) {
    damage.clear();
    if index % 30 == 0 {
        damage.mark_full();
        return;
    }

    let band = (format.height / 8).max(1);
    let y = (index * band) % format.height.max(1);
    damage.add(DamageRect::new(0, y, format.width, band));
}

fn scale_type(window: (u32, u32), desktop: (u32, u32)) -> ScaleType {
    if window == desktop {
        ScaleType::NoScale
    } else if window.0 > desktop.0 || window.1 > desktop.1 {
        ScaleType::Upscale
    } else {
        ScaleType::Downscale
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.debug);

    info!("🚀 Starting Lumen desktop compositor");
    info!("📄 Version: {}", env!("CARGO_PKG_VERSION"));

    let options = load_options(&cli.config);

    let backend = HeadlessBackend::new();
    let monitor = backend.monitor();
    let mut desktop = Desktop::new(Box::new(backend), Arc::new(LogHost), &options)
        .context("Failed to create the desktop renderer")?;

    let format = FrameFormat {
        frame_type: FrameType::Bgra,
        width: cli.width,
        height: cli.height,
        pitch: cli.width * 4,
    };
    desktop
        .setup(format)
        .context("Failed to negotiate the frame format")?;

    let window = (
        cli.window_width.unwrap_or(cli.width),
        cli.window_height.unwrap_or(cli.height),
    );
    desktop.resize(window.0, window.1);

    let params = RenderParams {
        scale_type: scale_type(window, (cli.width, cli.height)),
        ..Default::default()
    };

    let mut damage = FrameDamage::new(options.max_rects);
    let mut last_report = None;
    for index in 0..cli.frames {
        if cli.fail_zero_copy_at == Some(index) {
            info!("💥 Zero-copy imports fail from frame {}", index);
            monitor.set_fail_zero_copy(true);
        }

        let frame = synthetic_frame(&format, index);
        synthetic_damage(&mut damage, &format, index);
        desktop
            .update(&frame, Some(HandoffHandle(index as i32)), damage.rects())
            .with_context(|| format!("Failed to update frame {}", index))?;

        last_report = Some(desktop.render(&params, damage.rects()));

        // halfway through, cycle night vision once like a user would
        if index == cli.frames / 2 {
            desktop.handle_key(KeyCode::N);
        }
    }

    let stats = monitor.stats();
    info!("📊 Replayed {} frames", cli.frames);
    info!("   Transfer path: {:?}", desktop.transfer_path());
    info!(
        "   Zero-copy imports: {} (failures: {})",
        stats.zero_copy_imports, stats.zero_copy_failures
    );
    info!(
        "   Buffered uploads: {} ({} bytes)",
        stats.buffered_uploads, stats.uploaded_bytes
    );
    info!("   Draws: {} ({} rects)", stats.draws, stats.drawn_rects);
    for filter in desktop.panel_state().filters {
        info!(
            "   {}: enabled={} active={} sharpness={:.2}",
            filter.name, filter.enabled, filter.active, filter.sharpness
        );
    }
    if let Some(report) = last_report {
        info!(
            "   Last frame: {:?} {:?} sampling, texture {}x{}",
            report.scale_type, report.scale_algorithm, report.texture_size.0, report.texture_size.1
        );
    }
    info!("   Night vision: {:?}", desktop.night_vision().level());

    Ok(())
}
