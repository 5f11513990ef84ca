//! movement_hardware: GPIO and simulation backends behind `movement_traits`.
//!
//! Features:
//! - `hardware`: enable Raspberry Pi GPIO-backed pins via `rppal`.
//! - (default) no `hardware` feature: use simulation types that satisfy the traits.
//!
//! Note: The `rppal` dependency is optional and only enabled when the `hardware`
//!       feature is active. This lets CI on x86 build without pulling GPIO libs.

pub mod error;

#[cfg(feature = "hardware")]
mod gpio;

#[cfg(feature = "hardware")]
pub use gpio::{GpioEdgePin, GpioOutputPin, open_hand_pins};

pub mod sim {
    use std::error::Error;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::{Arc, mpsc};

    use movement_traits::{Edge, EdgePin, OutputPin};

    use crate::error::HwError;

    /// Output pin that just stores the last level written.
    /// The shared handle lets a test or simulator observe the line.
    pub struct SimOutputPin {
        level: Arc<AtomicU8>,
    }

    impl SimOutputPin {
        pub fn new() -> (Self, Arc<AtomicU8>) {
            let level = Arc::new(AtomicU8::new(0));
            (
                Self {
                    level: level.clone(),
                },
                level,
            )
        }
    }

    impl OutputPin for SimOutputPin {
        fn set(&mut self, high: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.level.store(u8::from(high), Ordering::Relaxed);
            Ok(())
        }
    }

    /// Edge-triggered input fed from a channel; `wait_and_read` blocks on the
    /// sender, which plays the role of the photo-interrupter.
    pub struct SimEdgePin {
        rx: mpsc::Receiver<u8>,
    }

    impl SimEdgePin {
        pub fn new() -> (Self, mpsc::Sender<u8>) {
            let (tx, rx) = mpsc::channel();
            (Self { rx }, tx)
        }
    }

    impl EdgePin for SimEdgePin {
        fn configure_edge(&mut self, _edge: Edge) -> Result<(), Box<dyn Error + Send + Sync>> {
            Ok(())
        }

        fn wait_and_read(&mut self) -> Result<u8, Box<dyn Error + Send + Sync>> {
            self.rx
                .recv()
                .map_err(|_| -> Box<dyn Error + Send + Sync> { Box::new(HwError::Disconnected) })
        }
    }
}
