//! Raspberry Pi GPIO pins via `rppal`.

use std::error::Error;

use eyre::{Result, WrapErr};
use rppal::gpio::{Gpio, InputPin, Level, Trigger};
use tracing::trace;

use movement_traits::{Edge, EdgePin, OutputPin};

/// Stepper coil output backed by a real GPIO line.
pub struct GpioOutputPin {
    pin: rppal::gpio::OutputPin,
}

impl GpioOutputPin {
    pub fn try_new(gpio: &Gpio, pin: u8) -> Result<Self> {
        let pin = gpio
            .get(pin)
            .wrap_err_with(|| format!("get output pin {pin}"))?
            .into_output_low();
        Ok(Self { pin })
    }
}

impl OutputPin for GpioOutputPin {
    fn set(&mut self, high: bool) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

/// Encoder input backed by a real GPIO line with kernel edge interrupts.
pub struct GpioEdgePin {
    pin: InputPin,
}

impl GpioEdgePin {
    pub fn try_new(gpio: &Gpio, pin: u8) -> Result<Self> {
        let pin = gpio
            .get(pin)
            .wrap_err_with(|| format!("get input pin {pin}"))?
            .into_input();
        Ok(Self { pin })
    }
}

impl EdgePin for GpioEdgePin {
    fn configure_edge(&mut self, edge: Edge) -> std::result::Result<(), Box<dyn Error + Send + Sync>> {
        let trigger = match edge {
            Edge::None => Trigger::Disabled,
            Edge::Rising => Trigger::RisingEdge,
            Edge::Falling => Trigger::FallingEdge,
            Edge::Both => Trigger::Both,
        };
        self.pin
            .set_interrupt(trigger, None)
            .map_err(|e| -> Box<dyn Error + Send + Sync> { e.to_string().into() })
    }

    fn wait_and_read(&mut self) -> std::result::Result<u8, Box<dyn Error + Send + Sync>> {
        // No timeout is given, so a None here means the interrupt was
        // cleared out from under us; fall back to the line level.
        let level = self
            .pin
            .poll_interrupt(false, None)
            .map_err(|e| -> Box<dyn Error + Send + Sync> { e.to_string().into() })?
            .unwrap_or_else(|| self.pin.read());
        trace!(pin = self.pin.pin(), level = ?level, "encoder edge");
        Ok(u8::from(level == Level::High))
    }
}

/// Open the four coil outputs and the encoder input for one hand.
pub fn open_hand_pins(
    stepper_pins: [u8; 4],
    encoder_pin: u8,
) -> Result<([Box<dyn OutputPin>; 4], Box<dyn EdgePin>)> {
    let gpio = Gpio::new().wrap_err("open GPIO")?;
    let gpio = &gpio;
    let [p1, p2, p3, p4] = stepper_pins;
    let outputs: [Box<dyn OutputPin>; 4] = [
        Box::new(GpioOutputPin::try_new(gpio, p1)?),
        Box::new(GpioOutputPin::try_new(gpio, p2)?),
        Box::new(GpioOutputPin::try_new(gpio, p3)?),
        Box::new(GpioOutputPin::try_new(gpio, p4)?),
    ];
    let input = Box::new(GpioEdgePin::try_new(gpio, encoder_pin)?);
    Ok((outputs, input))
}
