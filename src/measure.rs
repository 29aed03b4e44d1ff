// measure.rs

use anyhow::anyhow;
use embedded_hal::digital::OutputPin;
use log::*;

use crate::Tunables;

/// One-wire temperature sensor as the sampling unit sees it.
pub trait TempSensor {
    /// Make sure the chip runs at the resolution we expect.
    fn fix_configuration(&mut self) -> anyhow::Result<()>;
    /// One conversion, in Celsius.
    fn read_temperature(&mut self) -> anyhow::Result<f32>;
}

pub fn c_to_f(celsius: f32) -> f32 {
    celsius * 1.8 + 32.0
}

/// Checks the sensor configuration, retrying up to the configured bound.
/// Failure is not fatal, the following reads will just fail too.
pub fn fix_sensor_configuration(sensor: &mut impl TempSensor, tunables: &Tunables) -> bool {
    for attempt in 1..=tunables.sensor_config_attempts {
        match sensor.fix_configuration() {
            Ok(()) => return true,
            Err(e) => warn!("Sensor config attempt {attempt} failed: {e:?}"),
        }
    }
    error!(
        "Could not verify sensor config after {} attempts",
        tunables.sensor_config_attempts
    );
    false
}

/// Reads the sensor until a real conversion comes back. The power-on-reset
/// sentinel counts as a failed read. Returns the value in the configured unit.
pub fn sample_temperature(
    sensor: &mut impl TempSensor,
    tunables: &Tunables,
    use_celsius: bool,
) -> Option<f32> {
    for attempt in 1..=tunables.sample_attempts {
        match sensor.read_temperature() {
            Ok(t) if t == tunables.sentinel => {
                warn!("Discarding default reading of {t}");
            }
            Ok(t) => {
                if attempt > 1 {
                    warn!("It took {attempt} tries to read temperature.");
                }
                return Some(if use_celsius { t } else { c_to_f(t) });
            }
            Err(e) => {
                warn!("Temperature read attempt {attempt} failed: {e:?}");
            }
        }
    }
    error!(
        "No valid temperature after {} attempts",
        tunables.sample_attempts
    );
    None
}

/// Runs one bus transaction with the sensor powered, then powers it down.
/// A power pin that cannot be raised fails the transaction without running it.
/// Failing to power down is only logged, the reading is still good.
pub fn with_sensor_power<Q: OutputPin, T>(
    power: &mut Q,
    settle: impl FnOnce(),
    transaction: impl FnOnce() -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    power
        .set_high()
        .map_err(|e| anyhow!("sensor power on failed: {e:?}"))?;
    settle();
    let res = transaction();
    if let Err(e) = power.set_low() {
        warn!("Sensor power off failed: {e:?}");
    }
    res
}

#[cfg(feature = "esp")]
pub use ds::*;

#[cfg(feature = "esp")]
mod ds {
    use std::fmt::Debug;

    use anyhow::anyhow;
    use embedded_hal::digital::{InputPin, OutputPin};
    use esp_idf_hal::delay::{Ets, FreeRtos};
    use log::*;
    use one_wire_bus::{OneWire, OneWireError};

    use super::{with_sensor_power, TempSensor};

    // settle time after switching sensor power on
    const SENSOR_ON_DELAY_MS: u32 = 10;

    pub struct Ds18b20Sensor<P, Q> {
        bus: OneWire<P>,
        power: Q,
    }

    impl<P, Q, E> Ds18b20Sensor<P, Q>
    where
        P: OutputPin<Error = E> + InputPin<Error = E>,
        Q: OutputPin,
        E: Debug,
    {
        pub fn new(bus: OneWire<P>, power: Q) -> Self {
            Ds18b20Sensor { bus, power }
        }

        fn first_device(bus: &mut OneWire<P>) -> Result<ds18b20::Ds18b20, MeasurementError<E>> {
            match bus.device_search(None, false, &mut Ets)? {
                None => Err(MeasurementError::NoDeviceFound),
                Some((address, _)) => Ok(ds18b20::Ds18b20::new::<E>(address)?),
            }
        }

        fn do_fix(bus: &mut OneWire<P>) -> Result<(), MeasurementError<E>> {
            let sensor = Self::first_device(bus)?;
            let data = sensor.read_data(bus, &mut Ets)?;
            if data.resolution == ds18b20::Resolution::Bits12 {
                info!("Temperature sensor config is correct.");
                return Ok(());
            }
            info!("Temperature sensor config is incorrect - rewriting.");
            sensor.set_config(
                data.alarm_temp_low,
                data.alarm_temp_high,
                ds18b20::Resolution::Bits12,
                bus,
                &mut Ets,
            )?;
            sensor.save_to_eeprom(bus, &mut Ets)?;
            Ok(())
        }

        fn do_read(bus: &mut OneWire<P>) -> Result<f32, MeasurementError<E>> {
            ds18b20::start_simultaneous_temp_measurement(bus, &mut Ets)?;
            ds18b20::Resolution::Bits12.delay_for_measurement_time(&mut FreeRtos);
            let sensor = Self::first_device(bus)?;
            Ok(sensor.read_data(bus, &mut Ets)?.temperature)
        }
    }

    fn settle() {
        FreeRtos::delay_ms(SENSOR_ON_DELAY_MS);
    }

    impl<P, Q, E> TempSensor for Ds18b20Sensor<P, Q>
    where
        P: OutputPin<Error = E> + InputPin<Error = E>,
        Q: OutputPin,
        E: Debug,
    {
        fn fix_configuration(&mut self) -> anyhow::Result<()> {
            let bus = &mut self.bus;
            with_sensor_power(&mut self.power, settle, || {
                Self::do_fix(bus).map_err(|e| anyhow!("{e:?}"))
            })
        }

        fn read_temperature(&mut self) -> anyhow::Result<f32> {
            let bus = &mut self.bus;
            with_sensor_power(&mut self.power, settle, || {
                Self::do_read(bus).map_err(|e| anyhow!("{e:?}"))
            })
        }
    }

    // When performing a measurement it can happen that no device was found on the one-wire-bus
    // in addition to the bus errors. Therefore we extend the error cases for proper error handling.
    #[derive(Debug)]
    pub enum MeasurementError<E> {
        OneWireError(OneWireError<E>),
        NoDeviceFound,
    }

    impl<E> From<OneWireError<E>> for MeasurementError<E> {
        fn from(value: OneWireError<E>) -> Self {
            MeasurementError::OneWireError(value)
        }
    }
}


// EOF
