use std::{path::PathBuf, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::{EventHub, HubEvent};

/// Host utilisation in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

pub trait StatsSource: Send + Sync {
    fn sample(&self) -> SystemStats;
}

/// Samples the host through `sysinfo`.
///
/// CPU usage is the busy share since the previous sample, so the first
/// sample after construction reports zero.
pub struct HostStatsSource {
    system: Mutex<System>,
    disk_mount: PathBuf,
}

impl Default for HostStatsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HostStatsSource {
    pub fn new() -> Self {
        Self::with_mount("/")
    }

    /// Reports disk usage for the filesystem mounted at `mount`.
    pub fn with_mount(mount: impl Into<PathBuf>) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
            disk_mount: mount.into(),
        }
    }

    fn disk_percent(&self) -> f64 {
        let disks = Disks::new_with_refreshed_list();
        let (total, available) = match disks
            .list()
            .iter()
            .find(|d| d.mount_point() == self.disk_mount.as_path())
        {
            Some(disk) => (disk.total_space(), disk.available_space()),
            None => disks.list().iter().fold((0, 0), |(t, a), d| {
                (t + d.total_space(), a + d.available_space())
            }),
        };
        percent(total.saturating_sub(available), total)
    }
}

impl StatsSource for HostStatsSource {
    fn sample(&self) -> SystemStats {
        let (cpu, memory) = {
            let mut system = self.system.lock();
            system.refresh_cpu_usage();
            system.refresh_memory();
            (
                f64::from(system.global_cpu_usage()),
                percent(system.used_memory(), system.total_memory()),
            )
        };
        SystemStats {
            cpu: cpu.clamp(0.0, 100.0),
            memory,
            disk: self.disk_percent(),
        }
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used.min(total) as f64 * 100.0 / total as f64
}

/// Periodically publishes `system_stats` events.
pub struct StatsSampler {
    hub: Arc<EventHub>,
    source: Arc<dyn StatsSource>,
    interval: Duration,
}

impl StatsSampler {
    pub fn new(hub: Arc<EventHub>, source: Arc<dyn StatsSource>, interval: Duration) -> Self {
        Self {
            hub,
            source,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Stats: sampler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let source = Arc::clone(&self.source);
                    let stats = match tokio::task::spawn_blocking(move || source.sample()).await {
                        Ok(stats) => stats,
                        Err(e) => {
                            log::warn!("Stats: sample failed: {}", e);
                            continue;
                        }
                    };
                    self.hub.broadcast(&HubEvent::SystemStats(stats));
                }
            }
        }
    }
}
