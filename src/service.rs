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

//! Monitor loop
//!
//! Discovery runs once per module: announce the inventory object, enable and
//! probe the module, decode its EEPROM and publish. Every present module then
//! gets its own task refreshing the temperature on a fixed interval. Absent
//! modules are never polled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::bus::BusChannel;
use crate::config::{DeviceConfig, MonitorConfig};
use crate::constants::addr::EEPROM;
use crate::constants::MONITOR_INTERVAL;
use crate::inventory::{
    create_inventory, publish_inventory, publish_temperature, publish_thresholds, PublishSink,
};
use crate::probe::enable_and_probe;
use crate::sensor::{read_temperature, ScaledThresholds, TemperatureSample};
use crate::vpd::{read_identity, IdentityRecord};

/// What discovery learned about one module.
#[derive(Debug, Clone)]
pub struct ModuleState {
    pub config: DeviceConfig,
    pub present: bool,
    pub identity: IdentityRecord,
}

pub struct Monitor {
    channel: Arc<BusChannel>,
    sink: Arc<dyn PublishSink>,
    config: MonitorConfig,
    interval: Duration,
}

impl Monitor {
    pub fn new(
        channel: Arc<BusChannel>,
        sink: Arc<dyn PublishSink>,
        config: MonitorConfig,
    ) -> Self {
        Self { channel, sink, config, interval: MONITOR_INTERVAL }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Blocking: probes the bus and reads the EEPROM.
    pub fn discover_module(&self, config: &DeviceConfig) -> ModuleState {
        let sink = self.sink.as_ref();
        create_inventory(sink, config.index);

        let present = enable_and_probe(&self.channel, config.bus);
        let identity = if present {
            read_identity(&self.channel, config.bus, EEPROM, &self.config.device_id)
        } else {
            IdentityRecord::unavailable()
        };
        publish_inventory(sink, config.index, present, identity.map());

        if present {
            info!(
                "Add-in module {} present on SMBus {} (VPD {})",
                config.index,
                config.bus,
                if identity.is_valid() { "valid" } else { "invalid" }
            );
            publish_thresholds(sink, config.index, &ScaledThresholds::from(&config.thresholds));
        } else {
            info!("Add-in module {} not present on SMBus {}", config.index, config.bus);
        }

        ModuleState { config: config.clone(), present, identity }
    }

    pub fn discover(&self) -> Vec<ModuleState> {
        self.config.modules.iter().map(|m| self.discover_module(m)).collect()
    }

    /// Blocking: one temperature refresh. `None` if absent or the read failed.
    pub fn poll_module(&self, module: &ModuleState) -> Option<TemperatureSample> {
        if !module.present {
            return None;
        }
        match read_temperature(&self.channel, module.config.bus) {
            Ok(sample) => {
                publish_temperature(self.sink.as_ref(), module.config.index, &sample);
                Some(sample)
            }
            Err(e) => {
                warn!("Add-in module {}: no temperature this cycle: {}", module.config.index, e);
                None
            }
        }
    }

    /// Discovery plus a single temperature pass.
    pub fn run_once(&self) -> Vec<ModuleState> {
        let modules = self.discover();
        for module in &modules {
            self.poll_module(module);
        }
        modules
    }
}

async fn poll_loop(monitor: Arc<Monitor>, module: ModuleState, shutdown: Arc<AtomicBool>) {
    let index = module.config.index;
    let module = Arc::new(module);
    let mut ticker = tokio::time::interval(monitor.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!("Polling add-in module {} every {:?}", index, monitor.interval);
    loop {
        ticker.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let m = monitor.clone();
        let state = module.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || m.poll_module(&state)).await {
            error!("Add-in module {}: temperature task failed: {}", index, e);
        }
    }
    debug!("Polling of add-in module {} stopped", index);
}

/// Discover every configured module, then poll the present ones until `shutdown` is set.
pub async fn run_monitor(
    monitor: Arc<Monitor>,
    shutdown: Arc<AtomicBool>,
) -> Result<Vec<ModuleState>> {
    info!("Monitor starting with {} configured module(s)", monitor.config.modules.len());

    let discovering = monitor.clone();
    let modules = tokio::task::spawn_blocking(move || discovering.discover())
        .await
        .context("discovery task failed")?;

    let pollers: Vec<_> = modules
        .iter()
        .filter(|m| m.present)
        .map(|m| tokio::spawn(poll_loop(monitor.clone(), m.clone(), shutdown.clone())))
        .collect();
    info!("{} of {} module(s) present", pollers.len(), modules.len());

    let mut ticker = tokio::time::interval(monitor.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    while !shutdown.load(Ordering::SeqCst) {
        ticker.tick().await;
    }

    for poller in pollers {
        if let Err(e) = poller.await {
            error!("Polling task ended abnormally: {}", e);
        }
    }
    info!("Monitor stopped");
    Ok(modules)
}
