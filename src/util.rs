use std::fs::File;
use std::io::Read;
use std::process;

#[cfg(not(target_os = "linux"))]
pub fn mem_used_peak() -> Option<usize> {
    None
}

#[cfg(target_os = "linux")]
pub fn mem_used_peak() -> Option<usize> {
    let mut buf = String::new();
    File::open(&format!("/proc/{}/status", process::id()))
        .ok()?
        .read_to_string(&mut buf)
        .ok()?;
    let line = buf.lines().find(|line| line.starts_with("VmPeak:"))?;
    let mem_kb: String = line.chars().filter(|c| c.is_digit(10)).collect();
    mem_kb.parse().ok()
}
