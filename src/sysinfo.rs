//! Builtins that only read system state: process statistics from `/proc`,
//! disk usage, the invoking user, and network interface details.

use crate::error::{Result, ShellError};
use nix::ifaddrs::getifaddrs;
use nix::unistd::{getuid, User};
use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::thread;
use std::time::Duration;
use walkdir::WalkDir;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// `watchproc <pid>`: CPU share over a short sample and resident memory.
pub fn watch_proc(pid: i32) -> Result<String> {
    let proc_dir = format!("/proc/{}", pid);
    if !Path::new(&proc_dir).exists() {
        return Err(ShellError::domain(
            "watchproc",
            format!("pid {} does not exist", pid),
        ));
    }
    let read = |path: &str| fs::read_to_string(path).map_err(ShellError::io("read"));
    let stat_path = format!("{}/stat", proc_dir);
    let malformed = || ShellError::domain("watchproc", format!("cannot parse stats of pid {}", pid));

    let proc_before = parse_process_ticks(&read(&stat_path)?).ok_or_else(malformed)?;
    let total_before = parse_total_ticks(&read("/proc/stat")?).ok_or_else(malformed)?;
    thread::sleep(SAMPLE_INTERVAL);
    let proc_after = parse_process_ticks(&read(&stat_path)?).ok_or_else(malformed)?;
    let total_after = parse_total_ticks(&read("/proc/stat")?).ok_or_else(malformed)?;

    let total = total_after.saturating_sub(total_before);
    let cpu = if total == 0 {
        0.0
    } else {
        100.0 * proc_after.saturating_sub(proc_before) as f64 / total as f64
    };
    let rss_kb = parse_vm_rss_kb(&read(&format!("{}/status", proc_dir))?).unwrap_or(0);

    Ok(format!(
        "PID: {} | CPU Usage: {:.1}% | Memory Usage: {:.1} MB",
        pid,
        cpu,
        rss_kb as f64 / 1024.0
    ))
}

/// utime + stime from a `/proc/<pid>/stat` line. The command name may hold
/// spaces, so fields are counted from the closing parenthesis.
fn parse_process_ticks(stat: &str) -> Option<u64> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Sum of the aggregate `cpu` line of `/proc/stat`.
fn parse_total_ticks(stat: &str) -> Option<u64> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    line.split_whitespace()
        .skip(1)
        .map(|v| v.parse::<u64>().ok())
        .sum()
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// `du [path]`: allocated size of everything under `path`, in KiB. Hard
/// links are counted once.
pub fn disk_usage(path: Option<&str>) -> Result<String> {
    let root = path.unwrap_or(".");
    if fs::symlink_metadata(root).is_err() {
        return Err(ShellError::domain(
            "du",
            format!("{}: No such file or directory", root),
        ));
    }
    let mut seen = HashSet::new();
    let mut bytes = 0u64;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if seen.insert((meta.dev(), meta.ino())) {
            bytes += meta.blocks() * 512;
        }
    }
    Ok(format!("Total disk usage: {} KB", bytes.div_ceil(1024)))
}

/// `whoami`: the real user's name and home directory.
pub fn who_am_i() -> Result<String> {
    let uid = getuid();
    let user = User::from_uid(uid)
        .map_err(ShellError::sys("getpwuid"))?
        .ok_or_else(|| ShellError::domain("whoami", format!("no user with uid {}", uid)))?;
    Ok(format!("{} {}", user.name, user.dir.display()))
}

/// `netinfo <interface>`: IPv4 address, netmask, default gateway and DNS
/// servers.
pub fn net_info(iface: &str) -> Result<String> {
    let mut found = false;
    let mut address = None;
    let mut netmask = None;
    for ifaddr in getifaddrs().map_err(ShellError::sys("getifaddrs"))? {
        if ifaddr.interface_name != iface {
            continue;
        }
        found = true;
        if let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) {
            address = Some(Ipv4Addr::from(sin.ip()));
            netmask = ifaddr
                .netmask
                .as_ref()
                .and_then(|m| m.as_sockaddr_in())
                .map(|m| Ipv4Addr::from(m.ip()));
        }
    }
    if !found {
        return Err(ShellError::domain(
            "netinfo",
            format!("interface {} does not exist", iface),
        ));
    }

    let gateway = fs::read_to_string("/proc/net/route")
        .ok()
        .and_then(|routes| parse_default_gateway(&routes, iface));
    let dns = fs::read_to_string("/etc/resolv.conf")
        .map(|conf| parse_nameservers(&conf))
        .unwrap_or_default();

    let or_none = |v: Option<Ipv4Addr>| v.map_or_else(|| "none".to_string(), |a| a.to_string());
    Ok(format!(
        "IP Address: {}\nSubnet Mask: {}\nDefault Gateway: {}\nDNS Servers: {}\n",
        or_none(address),
        or_none(netmask),
        or_none(gateway),
        if dns.is_empty() { "none".to_string() } else { dns.join(", ") }
    ))
}

/// Gateway of the `0.0.0.0` route through `iface` in `/proc/net/route`,
/// whose addresses are hex in host byte order.
fn parse_default_gateway(routes: &str, iface: &str) -> Option<Ipv4Addr> {
    routes.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [name, "00000000", gateway, ..] if *name == iface => {
                let raw = u32::from_str_radix(gateway, 16).ok()?;
                Some(Ipv4Addr::from(raw.to_ne_bytes()))
            }
            _ => None,
        }
    })
}

fn parse_nameservers(conf: &str) -> Vec<String> {
    conf.lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("nameserver"), Some(addr)) => Some(addr.to_string()),
                _ => None,
            }
        })
        .collect()
}
