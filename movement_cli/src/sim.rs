//! Virtual movement: the control loop running against a simulated gear
//! train and encoder, for development without hardware.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use tracing::{error, info};

use movement_core::mocks::{SimGear, SimMovement};
use movement_core::{DEFAULT_DEBOUNCE, Encoder, EncoderParams, Hand, calibrate};
use movement_traits::{Clock, SystemClock};

#[derive(Clone, Copy)]
struct SimParams {
    name: &'static str,
    period: Duration,
    update: Duration,
    reference: i64,
    per_step: f64,
    edge1: i64,
    edge2: i64,
    mark_width: i64,
}

/// Three hands with deliberately non-integral gearing.
fn table() -> [SimParams; 3] {
    [
        SimParams {
            name: "hours",
            period: Duration::from_secs(12 * 3600),
            update: Duration::from_secs(60),
            reference: 4096,
            per_step: 1.003884,
            edge1: 2000,
            edge2: 2199,
            mark_width: 180,
        },
        SimParams {
            name: "minutes",
            period: Duration::from_secs(3600),
            update: Duration::from_secs(2),
            reference: 5123,
            per_step: 1.01234,
            edge1: 3000,
            edge2: 3399,
            mark_width: 360,
        },
        SimParams {
            name: "seconds",
            period: Duration::from_secs(60),
            update: Duration::from_millis(100),
            reference: 4017,
            per_step: 0.995654,
            edge1: 1500,
            edge2: 1599,
            mark_width: 90,
        },
    ]
}

pub fn run(duration_secs: u64) -> eyre::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let mut hands: Vec<Arc<Hand>> = Vec::new();
    for p in table() {
        let (sim, edge_pin) = SimMovement::new(SimGear {
            reference: p.reference,
            per_step: p.per_step,
            edge1: p.edge1,
            edge2: p.edge2,
        });
        let hand = Arc::new(Hand::new(
            p.name,
            p.period,
            p.update,
            p.reference,
            0,
            sim.clone(),
            sim.clone(),
            clock.clone(),
        ));
        let encoder = Encoder::spawn(
            edge_pin,
            sim.clone(),
            hand.clone(),
            EncoderParams {
                mark_width: p.mark_width,
                debounce: DEFAULT_DEBOUNCE,
                invert: false,
            },
        )
        .wrap_err_with(|| format!("{}: encoder", p.name))?;
        let run_hand = hand.clone();
        thread::spawn(move || {
            if let Err(e) = calibrate(sim.as_ref(), &encoder, &run_hand, p.reference) {
                error!(hand = p.name, error = %e, "calibration failed");
                return;
            }
            run_hand.run();
        });
        hands.push(hand);
    }

    let started = Instant::now();
    loop {
        thread::sleep(Duration::from_secs(5));
        for h in &hands {
            let st = h.status();
            info!(
                hand = %st.name,
                position = st.position,
                revolution = st.revolution,
                ticking = st.ticking,
                marks = st.marks,
                skipped = st.skipped,
                fast_forward = st.fast_forward,
                "status"
            );
        }
        if duration_secs > 0 && started.elapsed().as_secs() >= duration_secs {
            return Ok(());
        }
    }
}
