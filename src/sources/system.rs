//! Built-in sources backed by the local machine.

use crate::sources::{Readings, Source};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use sysinfo::System;
use tokio::sync::Mutex;

/// CPU, memory and uptime readings collected with `sysinfo`.
pub struct SystemSource {
    name: String,
    system: Mutex<System>,
}

impl SystemSource {
    pub fn new(name: impl Into<String>) -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        Self {
            name: name.into(),
            system: Mutex::new(system),
        }
    }
}

#[async_trait]
impl Source for SystemSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_readings(&self) -> anyhow::Result<Readings> {
        let mut system = self.system.lock().await;
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpus = system.cpus();
        if cpus.is_empty() {
            anyhow::bail!("No CPU information available");
        }
        let core_usage: Vec<f32> = cpus.iter().map(|cpu| cpu.cpu_usage()).collect();
        let usage_percent = core_usage.iter().sum::<f32>() / core_usage.len() as f32;

        let total_bytes = system.total_memory();
        let used_bytes = system.used_memory();
        let memory_percent = if total_bytes > 0 {
            (used_bytes as f32 / total_bytes as f32) * 100.0
        } else {
            0.0
        };
        let load = System::load_average();

        let mut readings = Readings::new();
        readings.insert("timestamp".into(), json!(chrono::Utc::now().to_rfc3339()));
        readings.insert(
            "hostname".into(),
            json!(System::host_name().unwrap_or_else(|| "unknown".to_string())),
        );
        readings.insert("uptime_seconds".into(), json!(System::uptime()));
        readings.insert(
            "cpu".into(),
            json!({
                "model": cpus[0].brand(),
                "cores": cpus.len(),
                "usage_percent": usage_percent,
                "core_usage": core_usage,
                "load_average": [load.one, load.five, load.fifteen],
            }),
        );
        readings.insert(
            "memory".into(),
            json!({
                "total_bytes": total_bytes,
                "used_bytes": used_bytes,
                "available_bytes": system.available_memory(),
                "usage_percent": memory_percent,
                "swap_total_bytes": system.total_swap(),
                "swap_used_bytes": system.used_swap(),
            }),
        );
        Ok(readings)
    }
}

/// Temperatures from the Linux thermal zones, in degrees Celsius.
pub struct ThermalSource {
    name: String,
    root: PathBuf,
}

impl ThermalSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_root(name, "/sys/class/thermal")
    }

    /// Read zones from a directory laid out like `/sys/class/thermal`.
    pub fn with_root(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

#[async_trait]
impl Source for ThermalSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_readings(&self) -> anyhow::Result<Readings> {
        let mut zones = serde_json::Map::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to list {}", self.root.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let zone = entry.file_name().to_string_lossy().into_owned();
            let Some(index) = zone.strip_prefix("thermal_zone") else {
                continue;
            };
            let Ok(raw) = tokio::fs::read_to_string(entry.path().join("temp")).await else {
                continue;
            };
            if let Ok(millicelsius) = raw.trim().parse::<i64>() {
                zones.insert(format!("zone{}", index), json!(millicelsius as f64 / 1000.0));
            }
        }

        if zones.is_empty() {
            anyhow::bail!("No thermal zones found under {}", self.root.display());
        }

        let mut readings = Readings::new();
        readings.insert("timestamp".into(), json!(chrono::Utc::now().to_rfc3339()));
        if let Some(cpu) = zones.get("zone0").cloned() {
            readings.insert("cpu_celsius".into(), cpu);
        }
        readings.insert("zones".into(), Value::Object(zones));
        Ok(readings)
    }
}
