/*
 * This file is part of Addin Monitor.
 *
 * Copyright (C) 2025 Addin Monitor contributors
 *
 * Addin Monitor is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Addin Monitor is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Addin Monitor. If not, see <https://www.gnu.org/licenses/>.
 */

/*
 * Test utilities for Addin Monitor
 *
 * A simulated add-in module (expander, EEPROM, sensor) behind the same
 * DeviceOpener / SmbusDevice seams the real i2c-dev transport implements.
 */

#[cfg(test)]
pub mod test_utils {
    use crate::config::{DeviceConfig, ThresholdConfig};
    use crate::constants::addr::{EEPROM, IO_EXPANDER, TEMP_SENSOR};
    use crate::constants::expander::{DIRECTION_REG, ENABLE_BIT, OUTPUT_REG};
    use crate::constants::tmp431::{LOCAL_HIGH_REG, LOCAL_LOW_REG};
    use crate::constants::vpd::CAPACITY;
    use crate::error::BusError;
    use crate::smbus::{DeviceOpener, SmbusDevice};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Hardware state of one module, shared by every handle opened on its bus.
    #[derive(Clone)]
    pub struct SimulatedModule {
        expander: Arc<Mutex<(u8, u8)>>,
        eeprom: Arc<[u8; CAPACITY]>,
        temperature: Arc<Mutex<(u8, u8)>>,
        has_sensor: bool,
        failing_writes: bool,
    }

    impl Default for SimulatedModule {
        fn default() -> Self {
            Self {
                // power-on: all pins inputs, outputs low
                expander: Arc::new(Mutex::new((0xff, 0x00))),
                eeprom: Arc::new([0xff; CAPACITY]),
                temperature: Arc::new(Mutex::new((0x19, 0x50))),
                has_sensor: true,
                failing_writes: false,
            }
        }
    }

    impl SimulatedModule {
        pub fn with_expander(self, direction: u8, output: u8) -> Self {
            *self.expander.lock() = (direction, output);
            self
        }

        pub fn with_eeprom(mut self, image: &[u8]) -> Self {
            let mut bytes = [0xff; CAPACITY];
            let n = image.len().min(CAPACITY);
            bytes[..n].copy_from_slice(&image[..n]);
            self.eeprom = Arc::new(bytes);
            self
        }

        pub fn without_sensor(mut self) -> Self {
            self.has_sensor = false;
            self
        }

        pub fn with_failing_writes(mut self) -> Self {
            self.failing_writes = true;
            self
        }

        /// Live (direction, output) registers of the expander
        pub fn expander_registers(&self) -> Arc<Mutex<(u8, u8)>> {
            self.expander.clone()
        }

        /// Live (high, low) sensor registers
        pub fn temperature_registers(&self) -> Arc<Mutex<(u8, u8)>> {
            self.temperature.clone()
        }

        fn downstream_enabled(&self) -> bool {
            let (direction, output) = *self.expander.lock();
            direction & ENABLE_BIT == 0 && output & ENABLE_BIT != 0
        }

        fn acknowledges(&self, addr: u8) -> bool {
            match addr {
                IO_EXPANDER => true,
                EEPROM => self.downstream_enabled(),
                TEMP_SENSOR => self.has_sensor && self.downstream_enabled(),
                _ => false,
            }
        }
    }

    struct OverlapDetector {
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
    }

    impl OverlapDetector {
        fn track(&self) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_micros(50));
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }

    /// Opener over simulated buses. Buses never registered have no device node.
    #[derive(Default)]
    pub struct SimOpener {
        buses: HashMap<usize, Option<SimulatedModule>>,
        detector: Option<Arc<OverlapDetector>>,
    }

    impl SimOpener {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_module(mut self, bus: usize, module: SimulatedModule) -> Self {
            self.buses.insert(bus, Some(module));
            self
        }

        /// Bus node exists but nothing answers on it
        pub fn with_empty_bus(mut self, bus: usize) -> Self {
            self.buses.insert(bus, None);
            self
        }

        pub fn with_overlap_detector(
            mut self,
            in_flight: Arc<AtomicBool>,
            overlapped: Arc<AtomicBool>,
        ) -> Self {
            self.detector = Some(Arc::new(OverlapDetector { in_flight, overlapped }));
            self
        }
    }

    impl DeviceOpener for SimOpener {
        fn open(&self, bus: usize) -> Result<Box<dyn SmbusDevice>, BusError> {
            let module = self.buses.get(&bus).ok_or(BusError::NotPresent(bus))?;
            Ok(Box::new(SimDevice {
                module: module.clone(),
                selected: None,
                eeprom_pointer: 0,
                detector: self.detector.clone(),
            }))
        }
    }

    struct SimDevice {
        module: Option<SimulatedModule>,
        selected: Option<u8>,
        eeprom_pointer: usize,
        detector: Option<Arc<OverlapDetector>>,
    }

    fn nack() -> io::Error {
        io::Error::from_raw_os_error(libc::ENXIO)
    }

    impl SimDevice {
        fn target(&self) -> io::Result<(&SimulatedModule, u8)> {
            if let Some(detector) = &self.detector {
                detector.track();
            }
            let addr = self.selected.ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))?;
            match &self.module {
                Some(module) if module.acknowledges(addr) => Ok((module, addr)),
                _ => Err(nack()),
            }
        }
    }

    impl SmbusDevice for SimDevice {
        fn set_slave_addr(&mut self, addr: u8, _force: bool) -> io::Result<()> {
            self.selected = Some(addr);
            Ok(())
        }

        fn write_quick(&mut self) -> io::Result<()> {
            self.target().map(|_| ())
        }

        fn read_byte_data(&mut self, reg: u8) -> io::Result<u8> {
            let (module, addr) = self.target()?;
            let value = match (addr, reg) {
                (IO_EXPANDER, DIRECTION_REG) => module.expander.lock().0,
                (IO_EXPANDER, OUTPUT_REG) => module.expander.lock().1,
                (TEMP_SENSOR, LOCAL_HIGH_REG) => module.temperature.lock().0,
                (TEMP_SENSOR, LOCAL_LOW_REG) => module.temperature.lock().1,
                (EEPROM, offset) => {
                    let value = module.eeprom[usize::from(offset)];
                    self.eeprom_pointer = (usize::from(offset) + 1) % CAPACITY;
                    return Ok(value);
                }
                _ => 0,
            };
            Ok(value)
        }

        fn write_byte_data(&mut self, reg: u8, value: u8) -> io::Result<()> {
            let (module, addr) = self.target()?;
            if module.failing_writes {
                return Err(io::Error::from_raw_os_error(libc::EIO));
            }
            match (addr, reg) {
                (IO_EXPANDER, DIRECTION_REG) => module.expander.lock().0 = value,
                (IO_EXPANDER, OUTPUT_REG) => module.expander.lock().1 = value,
                _ => {}
            }
            Ok(())
        }

        fn read_byte(&mut self) -> io::Result<u8> {
            let (module, addr) = self.target()?;
            if addr != EEPROM {
                return Ok(0);
            }
            let value = module.eeprom[self.eeprom_pointer];
            self.eeprom_pointer = (self.eeprom_pointer + 1) % CAPACITY;
            Ok(value)
        }
    }

    /// Thresholds used across tests, in whole degrees
    pub fn create_mock_thresholds() -> ThresholdConfig {
        ThresholdConfig {
            critical_high: 95,
            critical_low: 0,
            max_value: 127,
            min_value: 0,
            warning_high: 85,
            warning_low: 5,
        }
    }

    pub fn create_mock_device_config(index: usize, bus: usize) -> DeviceConfig {
        DeviceConfig { index, bus, thresholds: create_mock_thresholds() }
    }

    /// Creates a temporary file with the given text
    pub fn create_temp_config_file(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }
}
