//! Integration tests for the desktop renderer
//!
//! These drive the public `Desktop` API against the software headless
//! backend, covering format negotiation, resize-driven filter activation,
//! the zero-copy downgrade and the night vision cycle end to end.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use lumen::backend::headless::{HeadlessBackend, HeadlessMonitor};
use lumen::backend::{ShaderKind, TextureKind, TextureStatus};
use lumen::config::{DesktopOptions, OptionStore, OptionValue};
use lumen::error::{ConfigError, DesktopError};
use lumen::input::{AlertLevel, AppHost, KeyCode};
use lumen::panel::PanelCommand;
use lumen::renderer::damage::DamageRect;
use lumen::renderer::filter::{FilterSettings, StageId};
use lumen::renderer::scale::{ScaleAlgorithm, ScaleType};
use lumen::renderer::uniform::UniformValue;
use lumen::renderer::{
    Desktop, FrameBuffer, FrameFormat, FrameType, HandoffHandle, RenderParams, SharedDesktop,
    TransferPath,
};

/// Host that records everything the desktop asks of it
#[derive(Default)]
struct RecordingHost {
    alerts: Mutex<Vec<(AlertLevel, String)>>,
    invalidations: Mutex<Vec<bool>>,
}

impl AppHost for RecordingHost {
    fn alert(&self, level: AlertLevel, message: &str) {
        self.alerts.lock().push((level, message.to_string()));
    }

    fn invalidate_window(&self, full: bool) {
        self.invalidations.lock().push(full);
    }
}

fn bgra(width: u32, height: u32) -> FrameFormat {
    FrameFormat {
        frame_type: FrameType::Bgra,
        width,
        height,
        pitch: width * 4,
    }
}

fn frame_for(format: &FrameFormat) -> FrameBuffer {
    FrameBuffer::new(vec![0x20; (format.pitch * format.height) as usize])
}

fn build(options: &DesktopOptions) -> Result<(Desktop, HeadlessMonitor, Arc<RecordingHost>)> {
    let backend = HeadlessBackend::new();
    let monitor = backend.monitor();
    let host = Arc::new(RecordingHost::default());
    let desktop = Desktop::new(Box::new(backend), host.clone(), options)?;
    Ok((desktop, monitor, host))
}

/// 1080p BGRA, resize up to 4K and back
#[test]
fn test_resize_drives_upscale_only_stage() -> Result<()> {
    let options = DesktopOptions {
        filters: FilterSettings {
            fsr_enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let (mut desktop, _monitor, _host) = build(&options)?;

    let format = FrameFormat {
        frame_type: FrameType::Bgra,
        width: 1920,
        height: 1080,
        pitch: 7680,
    };
    desktop.setup(format)?;
    assert_eq!(desktop.size(), (1920, 1080));

    desktop.resize(3840, 2160);
    assert!(desktop.filters().upscale());
    let fsr = desktop.filters().stage(StageId::Fsr);
    assert!(fsr.enabled_by_user());
    assert!(fsr.active_now());

    desktop.resize(1920, 1080);
    assert!(!desktop.filters().upscale());
    let fsr = desktop.filters().stage(StageId::Fsr);
    assert!(fsr.enabled_by_user());
    assert!(!fsr.active_now());

    Ok(())
}

#[test]
fn test_upscaled_output_is_sampled_linearly() -> Result<()> {
    let options = DesktopOptions {
        filters: FilterSettings {
            fsr_enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let (mut desktop, monitor, _host) = build(&options)?;
    let format = bgra(640, 360);
    desktop.setup(format)?;
    desktop.resize(1280, 720);
    desktop.update(&frame_for(&format), None, None)?;

    let report = desktop.render(
        &RenderParams {
            scale_type: ScaleType::Upscale,
            ..Default::default()
        },
        None,
    );

    assert_eq!(report.status, TextureStatus::Ok);
    assert_eq!(report.texture_size, (1280, 720));
    assert_eq!(report.scale_type, ScaleType::Downscale);
    assert_eq!(report.scale_algorithm, ScaleAlgorithm::Linear);
    assert_eq!(
        monitor.uniform(ShaderKind::Desktop, "textureSize"),
        Some(UniformValue::Int2([1280, 720]))
    );
    assert_eq!(
        monitor.uniform(ShaderKind::Desktop, "desktopSize"),
        Some(UniformValue::Float2([640.0, 360.0]))
    );

    Ok(())
}

#[test]
fn test_explicit_algorithm_is_kept() -> Result<()> {
    let options = DesktopOptions {
        scale_algorithm: ScaleAlgorithm::Nearest,
        ..Default::default()
    };
    let (mut desktop, _monitor, _host) = build(&options)?;
    let format = bgra(64, 64);
    desktop.setup(format)?;
    desktop.update(&frame_for(&format), None, None)?;

    let report = desktop.render(
        &RenderParams {
            scale_type: ScaleType::Downscale,
            ..Default::default()
        },
        None,
    );
    assert_eq!(report.scale_algorithm, ScaleAlgorithm::Nearest);

    Ok(())
}

#[test]
fn test_out_of_range_scale_algorithm_rejected() -> Result<()> {
    let mut store = OptionStore::with_desktop_options();
    let err = store
        .set("egl", "scale", OptionValue::Int(99))
        .unwrap_err();
    assert_eq!(err, ConfigError::InvalidScaleAlgorithm(99));

    let options = DesktopOptions::from_store(&store)?;
    assert_eq!(options.scale_algorithm, ScaleAlgorithm::Auto);

    let (mut desktop, _monitor, _host) = build(&options)?;
    assert!(desktop.set_scale_algorithm_index(99).is_err());
    assert_eq!(desktop.scale_algorithm(), ScaleAlgorithm::Auto);

    desktop.set_scale_algorithm_index(2)?;
    assert_eq!(desktop.scale_algorithm(), ScaleAlgorithm::Linear);

    Ok(())
}

#[test]
fn test_zero_copy_failure_at_frame_k_is_permanent() -> Result<()> {
    let (mut desktop, monitor, _host) = build(&DesktopOptions::default())?;
    let format = bgra(32, 16);
    desktop.setup(format)?;
    let frame = frame_for(&format);

    const K: i32 = 5;
    for index in 0..20 {
        if index == K {
            monitor.set_fail_zero_copy(true);
        }
        // imports would succeed again, the surface must not retry
        if index == K + 1 {
            monitor.set_fail_zero_copy(false);
        }

        desktop.update(&frame, Some(HandoffHandle(index)), None)?;
        let expected = if index < K {
            TransferPath::ZeroCopy
        } else {
            TransferPath::Buffered
        };
        assert_eq!(desktop.transfer_path(), expected);
    }

    let stats = monitor.stats();
    assert_eq!(stats.zero_copy_imports, K as u64);
    assert_eq!(stats.zero_copy_failures, 1);
    assert_eq!(stats.buffered_uploads, 20 - K as u64);
    assert_eq!(
        stats.textures_created,
        vec![TextureKind::ZeroCopy, TextureKind::Buffered]
    );

    // the replacement texture renders straight away
    let report = desktop.render(&RenderParams::default(), None);
    assert_eq!(report.status, TextureStatus::Ok);
    assert_eq!(report.texture_size, (32, 16));

    Ok(())
}

#[test]
fn test_buffered_failure_is_surfaced() -> Result<()> {
    let options = DesktopOptions {
        zero_copy: false,
        ..Default::default()
    };
    let (mut desktop, monitor, _host) = build(&options)?;
    let format = bgra(16, 16);
    desktop.setup(format)?;

    monitor.set_fail_buffered(true);
    let result = desktop.update(&frame_for(&format), None, None);
    assert!(matches!(result, Err(DesktopError::Upload(_))));

    Ok(())
}

#[test]
fn test_unsupported_format_fails_setup() -> Result<()> {
    let (mut desktop, _monitor, _host) = build(&DesktopOptions::default())?;

    let result = desktop.setup(FrameFormat {
        frame_type: FrameType::Yuv420,
        ..bgra(64, 64)
    });
    assert!(matches!(
        result,
        Err(DesktopError::UnsupportedFormat(FrameType::Yuv420))
    ));
    assert!(desktop.format().is_none());

    Ok(())
}

#[test]
fn test_texture_failure_aborts_construction() {
    let backend = HeadlessBackend::new();
    backend.monitor().set_fail_texture(Some(TextureKind::ZeroCopy));

    let result = Desktop::new(
        Box::new(backend),
        Arc::new(RecordingHost::default()),
        &DesktopOptions::default(),
    );
    assert!(matches!(result, Err(DesktopError::Init { .. })));
}

#[test]
fn test_night_vision_cycle() -> Result<()> {
    let options = DesktopOptions {
        nv_gain_max: 3,
        ..Default::default()
    };
    let (mut desktop, monitor, host) = build(&options)?;
    let format = bgra(16, 16);
    desktop.setup(format)?;
    desktop.update(&frame_for(&format), None, None)?;

    let mut gains = Vec::new();
    for _ in 0..8 {
        assert!(desktop.handle_key(KeyCode::N));
        desktop.render(&RenderParams::default(), None);
        match monitor.uniform(ShaderKind::Desktop, "nvGain") {
            Some(UniformValue::Float(gain)) => gains.push(gain as u32),
            other => panic!("unexpected nvGain uniform {:?}", other),
        }
    }
    assert_eq!(gains, vec![1, 2, 3, 0, 1, 2, 3, 0]);

    let alerts: Vec<String> = host.alerts.lock().iter().map(|(_, m)| m.clone()).collect();
    assert_eq!(
        &alerts[..4],
        &["NV Enabled", "NV Gain + 1", "NV Gain + 2", "NV Disabled"]
    );
    assert!(host.invalidations.lock().iter().all(|full| *full));

    Ok(())
}

#[test]
fn test_night_vision_wraps_at_largest_gain() -> Result<()> {
    let options = DesktopOptions {
        nv_gain: u32::MAX - 1,
        nv_gain_max: u32::MAX,
        ..Default::default()
    };
    let (mut desktop, _monitor, _host) = build(&options)?;

    assert!(desktop.handle_key(KeyCode::N));
    assert_eq!(desktop.night_vision().gain(), u32::MAX);
    assert!(desktop.handle_key(KeyCode::N));
    assert_eq!(desktop.night_vision().gain(), 0);
    assert!(desktop.handle_key(KeyCode::N));
    assert_eq!(desktop.night_vision().gain(), 1);

    Ok(())
}

#[test]
fn test_failed_downgrade_keeps_surface_consistent() -> Result<()> {
    let (mut desktop, monitor, _host) = build(&DesktopOptions::default())?;
    let format = bgra(32, 16);
    desktop.setup(format)?;
    let frame = frame_for(&format);

    monitor.set_fail_zero_copy(true);
    monitor.set_fail_texture(Some(TextureKind::Buffered));
    let result = desktop.update(&frame, Some(HandoffHandle(0)), None);
    assert!(matches!(result, Err(DesktopError::Init { .. })));
    assert_eq!(desktop.transfer_path(), TransferPath::ZeroCopy);
    assert!(matches!(
        desktop.transfer_error(),
        Some(DesktopError::Transfer(_))
    ));

    monitor.set_fail_zero_copy(false);
    monitor.set_fail_texture(None);
    desktop.update(&frame, Some(HandoffHandle(1)), None)?;
    assert_eq!(desktop.transfer_path(), TransferPath::Buffered);

    let stats = monitor.stats();
    assert_eq!(stats.zero_copy_imports, 0);
    assert_eq!(stats.zero_copy_failures, 1);
    assert_eq!(stats.buffered_uploads, 1);

    let report = desktop.render(&RenderParams::default(), None);
    assert_eq!(report.status, TextureStatus::Ok);

    Ok(())
}

#[test]
fn test_filter_resolution_override() -> Result<()> {
    let options = DesktopOptions {
        filters: FilterSettings {
            fsr_enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let (mut desktop, _monitor, _host) = build(&options)?;
    let format = bgra(64, 32);
    desktop.setup(format)?;
    desktop.update(&frame_for(&format), None, None)?;

    desktop.resize(256, 128);
    let report = desktop.render(&RenderParams::default(), None);
    assert_eq!(report.texture_size, (256, 128));

    desktop.set_filter_resolution(StageId::Fsr, 200, 100);
    let report = desktop.render(&RenderParams::default(), None);
    assert_eq!(report.texture_size, (200, 100));

    desktop.set_filter_resolution(StageId::Fsr, 0, 0);
    let report = desktop.render(&RenderParams::default(), None);
    assert_eq!(report.texture_size, (64, 32));

    Ok(())
}

#[test]
fn test_panel_sharpness_enables_stage() -> Result<()> {
    let (mut desktop, monitor, host) = build(&DesktopOptions::default())?;
    desktop.setup(bgra(64, 64))?;

    assert!(!desktop.panel_state().filter(StageId::Fsr).map_or(true, |f| f.enabled));
    desktop.apply(PanelCommand::SetSharpness(StageId::Fsr, 0.5))?;

    let state = desktop.panel_state();
    let fsr = state.filter(StageId::Fsr).copied();
    assert!(fsr.map_or(false, |f| f.enabled));
    // not upscaling, so the stage waits for a larger window
    assert!(fsr.map_or(false, |f| !f.active));
    assert_eq!(
        monitor.uniform(ShaderKind::FsrRcas, "uSharpness"),
        Some(UniformValue::Float(1.0))
    );
    assert_eq!(monitor.stats().invalidations, 1);
    assert_eq!(host.invalidations.lock().len(), 1);

    assert!(matches!(
        desktop.apply(PanelCommand::SetSharpness(StageId::Cas, -0.1)),
        Err(DesktopError::InvalidParameter { .. })
    ));

    Ok(())
}

#[test]
fn test_damage_limits_drawn_rects() -> Result<()> {
    let options = DesktopOptions {
        max_rects: 2,
        ..Default::default()
    };
    let (mut desktop, monitor, _host) = build(&options)?;
    let format = bgra(100, 100);
    desktop.setup(format)?;
    desktop.update(&frame_for(&format), None, None)?;

    let damage = [DamageRect::new(0, 0, 10, 10), DamageRect::new(50, 50, 10, 10)];
    desktop.render(&RenderParams::default(), Some(&damage));
    assert_eq!(monitor.stats().drawn_rects, 2);

    let too_many = [
        DamageRect::new(0, 0, 1, 1),
        DamageRect::new(2, 2, 1, 1),
        DamageRect::new(4, 4, 1, 1),
    ];
    desktop.render(&RenderParams::default(), Some(&too_many));
    assert_eq!(monitor.stats().drawn_rects, 3);

    Ok(())
}

#[test]
fn test_shared_desktop_across_threads() -> Result<()> {
    let (mut desktop, monitor, _host) = build(&DesktopOptions::default())?;
    let format = bgra(32, 32);
    desktop.setup(format)?;
    let shared: SharedDesktop = Arc::new(Mutex::new(desktop));

    let control = {
        let shared = shared.clone();
        std::thread::spawn(move || {
            for _ in 0..10 {
                shared.lock().handle_key(KeyCode::N);
            }
        })
    };

    let frame = frame_for(&format);
    for _ in 0..10 {
        let mut desktop = shared.lock();
        desktop.update(&frame, None, None)?;
        desktop.render(&RenderParams::default(), None);
    }
    control.join().map_err(|_| anyhow::anyhow!("control thread panicked"))?;

    assert_eq!(monitor.stats().draws, 10);
    // default max gain is 1, ten toggles land back on zero
    assert_eq!(shared.lock().night_vision().gain(), 0);

    Ok(())
}
