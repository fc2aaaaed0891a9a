use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{Disks, Pid, System};

#[derive(Serialize)]
pub struct MemoryStats {
    pub rss: u64,
    pub vms: u64,
}

#[derive(Serialize)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Serialize)]
pub struct Resources {
    pub cpu_percent: f32,
    pub memory: MemoryStats,
    pub disk: DiskStats,
}

#[derive(Serialize)]
pub struct ServerInfo {
    pub uptime_secs: f64,
    pub resources: Resources,
}

lazy_static::lazy_static! {
    static ref START_TIME: f64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
}

pub async fn get_server_info() -> ServerInfo {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let uptime_secs = now - *START_TIME;

    let mut sys = System::new_all();
    let pid = Pid::from_u32(std::process::id());

    // Two refreshes with a short gap so cpu_usage has a delta to work from.
    sys.refresh_pids(&[pid]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    sys.refresh_pids(&[pid]);

    let (cpu_percent, memory) = match sys.process(pid) {
        Some(process) => (
            process.cpu_usage(),
            MemoryStats {
                rss: process.memory(),
                vms: process.virtual_memory(),
            },
        ),
        None => (0.0, MemoryStats { rss: 0, vms: 0 }),
    };

    let mut disk = DiskStats {
        total: 0,
        used: 0,
        free: 0,
    };
    let disks = Disks::new_with_refreshed_list();
    for entry in &disks {
        if entry.mount_point() == std::path::Path::new("/") {
            disk.total = entry.total_space();
            disk.free = entry.available_space();
            disk.used = disk.total - disk.free;
            break;
        }
    }

    ServerInfo {
        uptime_secs,
        resources: Resources {
            cpu_percent,
            memory,
            disk,
        },
    }
}
