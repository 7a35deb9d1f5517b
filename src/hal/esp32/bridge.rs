//! Bridge pins on ESP32: GPIO drivers for the direction lines and LEDC PWM
//! channels for the enables.
//!
//! The result is an [`EmbeddedHalPins`] keyed by the pin numbers in
//! [`ActuatorConfig`], so the GPIOs handed in must match the configuration.

use crate::config::ActuatorConfig;
use crate::hal::EmbeddedHalPins;
use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution};
use esp_idf_hal::peripheral::Peripheral;
use esp_idf_hal::prelude::*;
use esp_idf_hal::sys::EspError;
use log::info;

/// Pin driver type produced by [`bridge_pins`].
pub type Esp32BridgePins<'d> =
    EmbeddedHalPins<PinDriver<'d, AnyOutputPin, Output>, LedcDriver<'d>>;

/// PWM resolution (10-bit = 1024 steps)
const PWM_RESOLUTION: Resolution = Resolution::Bits10;

/// The four direction GPIOs, already downgraded.
pub struct DirectionGpios {
    /// Normal polarity, side A
    pub in1: AnyOutputPin,
    /// Reverse polarity, side A
    pub in2: AnyOutputPin,
    /// Normal polarity, side B
    pub in3: AnyOutputPin,
    /// Reverse polarity, side B
    pub in4: AnyOutputPin,
}

/// Configure the LEDC timer, both enable channels and the four direction
/// outputs. Every line starts low / at zero duty.
///
/// # Errors
///
/// Returns an error if LEDC or GPIO initialization fails.
///
/// # Example
///
/// ```ignore
/// let peripherals = Peripherals::take()?;
/// let pins = bridge_pins(
///     &ActuatorConfig::default(),
///     peripherals.pins.gpio16,
///     peripherals.pins.gpio21,
///     DirectionGpios {
///         in1: peripherals.pins.gpio17.downgrade_output(),
///         in2: peripherals.pins.gpio18.downgrade_output(),
///         in3: peripherals.pins.gpio19.downgrade_output(),
///         in4: peripherals.pins.gpio20.downgrade_output(),
///     },
///     peripherals.ledc.timer0,
///     peripherals.ledc.channel0,
///     peripherals.ledc.channel1,
/// )?;
/// ```
#[allow(clippy::too_many_arguments)]
pub fn bridge_pins<'d, T, TI, AC, ACI, BC, BCI, AP, API, BP, BPI>(
    config: &ActuatorConfig,
    enable_a: AP,
    enable_b: BP,
    direction: DirectionGpios,
    timer: T,
    channel_a: AC,
    channel_b: BC,
) -> Result<Esp32BridgePins<'d>, EspError>
where
    TI: esp_idf_hal::ledc::LedcTimer + 'd,
    T: Peripheral<P = TI> + 'd,
    ACI: esp_idf_hal::ledc::LedcChannel<SpeedMode = TI::SpeedMode> + 'd,
    AC: Peripheral<P = ACI> + 'd,
    BCI: esp_idf_hal::ledc::LedcChannel<SpeedMode = TI::SpeedMode> + 'd,
    BC: Peripheral<P = BCI> + 'd,
    API: esp_idf_hal::gpio::OutputPin + 'd,
    AP: Peripheral<P = API> + 'd,
    BPI: esp_idf_hal::gpio::OutputPin + 'd,
    BP: Peripheral<P = BPI> + 'd,
{
    let timer_config = TimerConfig::default()
        .frequency(config.pwm_frequency_hz.Hz())
        .resolution(PWM_RESOLUTION);
    let timer_driver = LedcTimerDriver::new(timer, &timer_config)?;

    let mut pwm_a = LedcDriver::new(channel_a, &timer_driver, enable_a)?;
    let mut pwm_b = LedcDriver::new(channel_b, &timer_driver, enable_b)?;
    pwm_a.set_duty(0)?;
    pwm_b.set_duty(0)?;

    // Dropping the timer driver resets the timer; it has to run for as long
    // as the channels do.
    core::mem::forget(timer_driver);

    let mut pins = EmbeddedHalPins::new()
        .with_pwm(config.enable_a, pwm_a)
        .with_pwm(config.enable_b, pwm_b);

    let DirectionGpios { in1, in2, in3, in4 } = direction;
    for (id, gpio) in [
        (config.in1, in1),
        (config.in2, in2),
        (config.in3, in3),
        (config.in4, in4),
    ] {
        let mut driver = PinDriver::output(gpio)?;
        driver.set_low()?;
        pins = pins.with_output(id, driver);
    }

    info!(
        "[HBRIDGE] LEDC {} Hz on GPIO{}/GPIO{}, direction GPIO{}/{}/{}/{}",
        config.pwm_frequency_hz,
        config.enable_a,
        config.enable_b,
        config.in1,
        config.in2,
        config.in3,
        config.in4
    );
    Ok(pins)
}
