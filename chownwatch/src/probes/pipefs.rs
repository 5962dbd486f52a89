//! Mount id of the kernel internal pipefs mount.
//!
//! Ownership changes on anonymous pipes are noise; the kernel side drops
//! events whose file lives on this mount.

use anyhow::{Context, Result, bail};

/// Opens a throwaway pipe and reads the mount id of its read end from
/// `/proc/self/fdinfo`.
pub fn pipefs_mount_id() -> Result<u32> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        bail!("pipe() failed: {}", std::io::Error::last_os_error());
    }

    let fdinfo = std::fs::read_to_string(format!("/proc/self/fdinfo/{}", fds[0]));
    unsafe {
        libc::close(fds[0]);
        libc::close(fds[1]);
    }

    let fdinfo = fdinfo.context("Failed to read pipe fdinfo")?;
    parse_mnt_id(&fdinfo).context("fdinfo has no mnt_id field")
}

pub fn parse_mnt_id(fdinfo: &str) -> Option<u32> {
    fdinfo
        .lines()
        .find_map(|line| line.strip_prefix("mnt_id:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mnt_id() {
        let fdinfo = "pos:\t0\nflags:\t02000000\nmnt_id:\t15\nino:\t123456\n";
        assert_eq!(parse_mnt_id(fdinfo), Some(15));
    }

    #[test]
    fn test_parse_mnt_id_missing() {
        assert_eq!(parse_mnt_id("pos:\t0\nflags:\t0\n"), None);
    }

    #[test]
    fn test_pipefs_mount_id_on_host() {
        assert!(pipefs_mount_id().unwrap() > 0);
    }
}
