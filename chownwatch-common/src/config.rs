/// Runtime knobs written by userspace into the `CONFIG` map before the
/// programs are attached.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Syscall entry symbols take a single `struct pt_regs *` holding the
    /// user registers (`__x64_sys_*`, `__arm64_sys_*`).
    pub syscall_wrapper: u8,
    pub _pad: [u8; 7],
}

impl ProbeConfig {
    pub const fn new(syscall_wrapper: bool) -> Self {
        Self {
            syscall_wrapper: syscall_wrapper as u8,
            _pad: [0; 7],
        }
    }

    pub const fn uses_syscall_wrapper(&self) -> bool {
        self.syscall_wrapper != 0
    }
}

#[cfg(feature = "user")]
unsafe impl aya::Pod for ProbeConfig {}
