//! Syscall symbol discovery from `/proc/kallsyms`.
//!
//! Depending on the architecture and kernel configuration a syscall is
//! exported as `__x64_sys_chown`, `__ia32_sys_chown16`, `__arm64_sys_chown`
//! or plain `sys_chown`. Only the arch prefixed forms go through the
//! `pt_regs` wrapper.

use std::collections::HashSet;

use anyhow::{Context, Result};

const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Entry of 32-bit tasks on x86_64 kernels.
const COMPAT_PREFIX: &str = "__ia32_sys_";

/// Prefixes tried in order, with whether the symbol takes a `pt_regs`.
const SYSCALL_PREFIXES: [(&str, bool); 5] = [
    ("__x64_sys_", true),
    (COMPAT_PREFIX, true),
    ("__arm64_sys_", true),
    ("__se_sys_", false),
    ("sys_", false),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallSymbol {
    pub name: String,
    pub wrapper: bool,
}

#[derive(Debug, Default)]
pub struct KernelSymbols {
    functions: HashSet<String>,
}

impl KernelSymbols {
    pub fn load() -> Result<Self> {
        let text = std::fs::read_to_string(KALLSYMS_PATH)
            .with_context(|| format!("Failed to read {}", KALLSYMS_PATH))?;
        Ok(Self::parse(&text))
    }

    /// Keeps text symbols (`t`/`T`) only; module symbols carry a trailing
    /// `[module]` column that is ignored.
    pub fn parse(text: &str) -> Self {
        let functions = text
            .lines()
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let _addr = cols.next()?;
                let kind = cols.next()?;
                let name = cols.next()?;
                matches!(kind, "t" | "T").then(|| name.to_string())
            })
            .collect();
        Self { functions }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    /// Entry symbol of `syscall` (`chown`, `fchown16` ...), if the running
    /// kernel has it.
    pub fn syscall_symbol(&self, syscall: &str) -> Option<SyscallSymbol> {
        SYSCALL_PREFIXES.iter().find_map(|(prefix, wrapper)| {
            let name = format!("{}{}", prefix, syscall);
            self.contains(&name).then_some(SyscallSymbol {
                name,
                wrapper: *wrapper,
            })
        })
    }

    /// ia32 entry of `syscall`. Always a `pt_regs` wrapper.
    pub fn compat_syscall_symbol(&self, syscall: &str) -> Option<SyscallSymbol> {
        let name = format!("{}{}", COMPAT_PREFIX, syscall);
        self.contains(&name).then_some(SyscallSymbol {
            name,
            wrapper: true,
        })
    }
}
