//! Instance health gate
//!
//! Before claiming work the dispatcher samples the host. An instance under
//! too much CPU load or memory pressure skips the trigger cycle until it is
//! back at a normal level.

use std::fmt;
use std::sync::{Arc, Mutex};
use sysinfo::System;

/// Host load at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemLoad {
    /// One minute load average divided by the available processors
    pub cpu_load: f64,
    /// Used memory in percent of the total memory
    pub memory_percent: f64,
}

pub trait SystemMonitor: Send + Sync {
    fn sample(&self) -> SystemLoad;
}

/// Monitor reading the host through `sysinfo`
pub struct SysinfoMonitor {
    system: Mutex<System>,
    processors: f64,
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        let processors = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        Self {
            system: Mutex::new(System::new()),
            processors: processors as f64,
        }
    }
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor for SysinfoMonitor {
    fn sample(&self) -> SystemLoad {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_memory();

        let total = system.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            system.used_memory() as f64 * 100.0 / total as f64
        };

        SystemLoad {
            cpu_load: System::load_average().one / self.processors,
            memory_percent,
        }
    }
}

/// Reason a trigger cycle is skipped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overload {
    Cpu { load: f64, max: f64 },
    Memory { percent: f64, max: f64 },
}

impl fmt::Display for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overload::Cpu { load, max } => {
                write!(f, "CPU load average {:.2} per processor, max {:.2}", load, max)
            }
            Overload::Memory { percent, max } => {
                write!(f, "memory usage {:.1}%, max {:.1}%", percent, max)
            }
        }
    }
}

/// Thresholds checked against a monitor sample
#[derive(Clone)]
pub struct HealthCheck {
    monitor: Arc<dyn SystemMonitor>,
    max_cpu_load: f64,
    max_memory_percent: f64,
}

impl HealthCheck {
    pub fn new(monitor: Arc<dyn SystemMonitor>, max_cpu_load: f64, max_memory_percent: f64) -> Self {
        Self {
            monitor,
            max_cpu_load,
            max_memory_percent,
        }
    }

    /// Returns the first exceeded threshold, CPU before memory
    pub fn overload(&self) -> Option<Overload> {
        let load = self.monitor.sample();

        if load.cpu_load >= self.max_cpu_load {
            return Some(Overload::Cpu {
                load: load.cpu_load,
                max: self.max_cpu_load,
            });
        }

        if load.memory_percent >= self.max_memory_percent {
            return Some(Overload::Memory {
                percent: load.memory_percent,
                max: self.max_memory_percent,
            });
        }

        None
    }
}
