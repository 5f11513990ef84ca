use std::fs;
use std::sync::OnceLock;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod sim;

use cli::{Cli, Commands};

static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Build a file sink writer with optional rotation, storing the non-blocking
/// guard in OnceLock.
fn file_layer(
    file: Option<&str>,
    rotation: Option<&str>,
) -> Option<tracing_appender::non_blocking::NonBlocking> {
    let path = file?;
    let p = std::path::Path::new(path);
    if let Some(parent) = p.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let file_appender = match rotation.unwrap_or("never").to_ascii_lowercase().as_str() {
        "daily" => tracing_appender::rolling::daily(".", path),
        "hourly" => tracing_appender::rolling::hourly(".", path),
        _ => tracing_appender::rolling::never(".", path),
    };
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    let _ = FILE_GUARD.set(guard);
    Some(nb_writer)
}

/// Initialize tracing once for the whole app. RUST_LOG wins over --log-level.
fn init_tracing(json: bool, level: &str, file: Option<&str>, rotation: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console: Box<dyn Layer<_> + Send + Sync> = if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    let file = file_layer(file, rotation)
        .map(|w| fmt::layer().json().with_ansi(false).with_writer(w).boxed());
    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

fn load_config(args: &Cli) -> eyre::Result<movement_config::Config> {
    let raw = fs::read_to_string(&args.config)
        .wrap_err_with(|| format!("read {}", args.config.display()))?;
    let cfg = movement_config::load_toml(&raw)
        .wrap_err_with(|| format!("parse {}", args.config.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

fn main() -> eyre::Result<()> {
    let args = Cli::parse();
    match args.cmd {
        Commands::Sim { duration } => {
            init_tracing(args.json, args.log_level.as_deref().unwrap_or("info"), None, None);
            sim::run(duration)
        }
        Commands::Check => {
            let cfg = load_config(&args)?;
            println!("ok: {} hands configured", cfg.hands.len());
            Ok(())
        }
        Commands::Run { status_every } => {
            let cfg = load_config(&args)?;
            let level = args
                .log_level
                .as_deref()
                .or(cfg.logging.level.as_deref())
                .unwrap_or("info");
            init_tracing(
                args.json,
                level,
                cfg.logging.file.as_deref(),
                cfg.logging.rotation.as_deref(),
            );
            run_clock(&cfg, status_every)
        }
    }
}

#[cfg(feature = "hardware")]
fn run_clock(cfg: &movement_config::Config, status_every: u64) -> eyre::Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use movement_core::{ClockMovement, HandHardware, HandParams};
    use movement_hardware::open_hand_pins;
    use movement_traits::SystemClock;
    use tracing::info;

    let clock = Arc::new(SystemClock::new());
    let mut movement = ClockMovement::new();
    for (name, h) in &cfg.hands {
        let (stepper_pins, encoder_pin) = open_hand_pins(h.stepper_pins, h.encoder_pin)
            .wrap_err_with(|| format!("{name}: open pins"))?;
        movement.add_hand(
            HandParams {
                name: name.clone(),
                rpm: h.rpm,
                period: Duration::from_secs(h.period_secs),
                update: Duration::from_secs(h.update_secs),
                reference: h.steps,
                offset: h.offset,
                mark_width: h.mark_width,
                debounce: h.debounce,
                invert: h.invert,
            },
            HandHardware {
                stepper_pins,
                encoder_pin,
            },
            clock.clone(),
        )?;
    }
    movement.start()?;
    info!("movement running");
    loop {
        std::thread::sleep(Duration::from_secs(status_every.max(1)));
        if status_every > 0 {
            for st in movement.snapshot() {
                info!(
                    hand = %st.name,
                    position = st.position,
                    revolution = st.revolution,
                    offset = st.offset,
                    ticking = st.ticking,
                    marks = st.marks,
                    skipped = st.skipped,
                    fast_forward = st.fast_forward,
                    adjusted = st.adjusted,
                    "status"
                );
            }
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn run_clock(_cfg: &movement_config::Config, _status_every: u64) -> eyre::Result<()> {
    Err(eyre::eyre!(
        "built without the `hardware` feature; use `movement sim` or rebuild with --features hardware"
    ))
}
