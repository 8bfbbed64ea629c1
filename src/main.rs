use engine_bridge::logging;
use engine_bridge::pipeline::messages::{DialogRequest, DialogResponse, HostAction, HostEvent};
use engine_bridge::pipeline::{Bridge, EnginePump, HeadlessEngine, HostBridge};
use engine_bridge::settings::PipelineSettings;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const SESSION_LENGTH: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.json".to_string());
    let settings = PipelineSettings::load(&settings_path)?;
    logging::init(settings.debug_logging, settings.log_file.as_ref().map(PathBuf::from));

    let bridge = Bridge::new(&settings);
    let pump = EnginePump::new(bridge.clone(), settings.clone());
    pump.start(|| Ok(HeadlessEngine::new()))?;

    let mut host = HostBridge::new(bridge);
    let surface = host.create_surface(320, 240)?;
    host.send(surface, HostAction::LoadUrl("https://example.org/".into()))?;
    host.send(surface, HostAction::ExecuteScript("confirm:Continue?".into()))?;
    host.request_screenshot(surface, settings.screenshot_timeout())?;

    let started = Instant::now();
    while started.elapsed() < SESSION_LENGTH {
        host.wait_for_events(settings.tick_interval());
        host.tick();
        while let Some(event) = host.poll() {
            match event {
                HostEvent::FramePainted { surface, frame } => {
                    let corner = host.with_frame(surface, frame.slot, |buffer| buffer.pixel(0, 0))?;
                    tracing::info!(%surface, slot = frame.slot, ?corner, "frame");
                    host.ack_texture(surface, frame.slot);
                }
                HostEvent::Dialog {
                    surface,
                    request,
                    dialog,
                } => {
                    let response = match dialog {
                        DialogRequest::Alert { .. } => DialogResponse::Alert,
                        DialogRequest::Confirm { .. } => DialogResponse::Confirm { accepted: true },
                        DialogRequest::FileChooser { .. } => {
                            DialogResponse::FileChooser { paths: Vec::new() }
                        }
                        DialogRequest::Fullscreen { .. } => {
                            DialogResponse::Fullscreen { allowed: false }
                        }
                    };
                    host.respond(request, surface, response);
                }
                HostEvent::ScreenshotReady { surface, size } => {
                    let captured = host.take_screenshot(surface).is_some();
                    tracing::info!(%surface, width = size.width, height = size.height, captured, "screenshot");
                }
                other => tracing::info!(?other, "event"),
            }
        }
    }

    host.destroy_surface(surface);
    pump.shutdown()?;
    tracing::info!(stats = ?host.stats(), "session finished");
    Ok(())
}
