use anyhow::{Context, Result, bail};
use aya::Ebpf;
use aya::maps::{Array, HashMap};
use chownwatch_common::{
    BASENAME_LEN, Basename, CHOWN_VARIANTS, ChownEvent, ChownVariant, CompatPrograms, EventType,
    Policy, PolicyMode, ProbeConfig,
};
use log::{info, warn};

use crate::probes::kallsyms::{KernelSymbols, SyscallSymbol};
use crate::probes::pipefs::pipefs_mount_id;
use crate::probes::{Probe, TracepointConfig, attach_kprobe, attach_tracepoint, spawn_ringbuf_handler};
use crate::report::{ChownReport, container_id_for_pid};
use crate::settings::{ExitMode, OutputFormat, Settings};
use crate::telemetry;

/// Kernel function every chown variant funnels into once the target path
/// is known.
const CHOWN_COMMON: &str = "chown_common";
const RESOLVE_PROGRAM: &str = "kprobe_chown_common";
const EVENTS_MAP: &str = "CHOWN_EVENTS";

pub struct ChownProbe {
    settings: Settings,
}

impl ChownProbe {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn exit_mode(&self) -> ExitMode {
        self.settings.probes.chown.exit_mode.unwrap_or_default()
    }
}

impl Probe for ChownProbe {
    fn attach(&self, bpf: &mut Ebpf) -> Result<()> {
        let symbols = KernelSymbols::load()?;
        let targets = resolve_targets(&symbols);
        let Some(first) = targets.first() else {
            bail!("No chown syscall entry point found in /proc/kallsyms");
        };

        // Maps are filled before any program runs.
        self.write_config(bpf, self.settings.to_probe_config(first.symbol.wrapper))?;
        self.populate_policy(bpf)?;
        self.populate_approvers(bpf)?;
        self.populate_discarders(bpf)?;
        self.set_pipefs_mount_id(bpf)?;

        let mut attached = 0;
        for target in &targets {
            let symbol = &target.symbol.name;
            match target.compat {
                None => {
                    attach_kprobe(bpf, target.variant.entry_program(), symbol)?;
                    self.attach_exit(bpf, target.variant, symbol)?;
                }
                Some(programs) => {
                    attach_kprobe(bpf, programs.entry, symbol)?;
                    attach_kprobe(bpf, programs.kretprobe, symbol)?;
                }
            }
            info!("Attached chown variant {} on {}", target.variant.syscall(), symbol);
            attached += 1;
        }

        let policy = self.settings.probes.chown.policy();
        if let Err(e) = attach_kprobe(bpf, RESOLVE_PROGRAM, CHOWN_COMMON) {
            if requires_resolution(policy) {
                return Err(e).with_context(|| {
                    format!("{} is required by the deny policy", CHOWN_COMMON)
                });
            }
            warn!(
                "Failed to attach {}: {:#}; events will carry no file identity",
                CHOWN_COMMON, e
            );
        }

        self.spawn_event_handler(bpf)?;

        telemetry::record_active_probe("chown", attached);
        info!(
            "ChownProbe attached ({} entry points for {} variants, exit via {:?})",
            attached,
            CHOWN_VARIANTS.len(),
            self.exit_mode()
        );

        Ok(())
    }
}

impl ChownProbe {
    fn attach_exit(&self, bpf: &mut Ebpf, variant: ChownVariant, symbol: &str) -> Result<()> {
        if exits_via_tracepoint(self.exit_mode(), variant) {
            let name = format!("sys_exit_{}", variant.syscall());
            let config = TracepointConfig {
                program_name: variant.tracepoint_program(),
                category: "syscalls",
                name: &name,
            };
            if attach_tracepoint(bpf, config)? {
                return Ok(());
            }
            info!("Falling back to a return probe for {}", variant.syscall());
        }
        attach_kprobe(bpf, variant.kretprobe_program(), symbol)
    }

    fn write_config(&self, bpf: &mut Ebpf, config: ProbeConfig) -> Result<()> {
        let mut config_map: Array<_, ProbeConfig> = bpf
            .map_mut("CONFIG")
            .context("Failed to find CONFIG map")?
            .try_into()
            .context("CONFIG is not an Array")?;

        config_map.set(0, config, 0)?;
        info!("Syscall wrapper: {}", config.uses_syscall_wrapper());
        Ok(())
    }

    fn populate_policy(&self, bpf: &mut Ebpf) -> Result<()> {
        let policy = self.settings.probes.chown.policy();
        let mut policies: Array<_, Policy> = bpf
            .map_mut("POLICIES")
            .context("Failed to find POLICIES map")?
            .try_into()
            .context("POLICIES is not an Array")?;

        policies.set(EventType::Chown as u32, policy, 0)?;
        info!("Chown policy: {:?} (flags {:#x})", policy.mode(), policy.flags.0);
        Ok(())
    }

    fn populate_approvers(&self, bpf: &mut Ebpf) -> Result<()> {
        let basenames = self.settings.probes.chown.approved_basenames();
        if self.settings.probes.chown.policy().mode() != PolicyMode::Deny && !basenames.is_empty() {
            warn!("Approved basenames only apply under the deny policy");
        }

        let mut approvers: HashMap<_, Basename, u64> = bpf
            .map_mut("APPROVER_BASENAMES")
            .context("Failed to find APPROVER_BASENAMES map")?
            .try_into()
            .context("APPROVER_BASENAMES is not a HashMap")?;

        for name in basenames {
            let Some(basename) = approver_basename(name) else {
                warn!("Skipping approver basename {:?}: empty or longer than {} bytes", name, BASENAME_LEN - 1);
                continue;
            };
            approvers.insert(basename, EventType::Chown.mask(), 0)?;
            info!("Added approver basename: {}", name);
        }
        Ok(())
    }

    fn populate_discarders(&self, bpf: &mut Ebpf) -> Result<()> {
        let pids = self.settings.probes.chown.discarded_pids();
        if self.settings.probes.chown.policy().mode() == PolicyMode::NoFilter && !pids.is_empty() {
            warn!("Discarded pids are ignored without a filtering policy");
        }

        let mut discarders: HashMap<_, u32, u64> = bpf
            .map_mut("DISCARDED_PIDS")
            .context("Failed to find DISCARDED_PIDS map")?
            .try_into()
            .context("DISCARDED_PIDS is not a HashMap")?;

        for &pid in pids {
            discarders.insert(pid, EventType::Chown.mask(), 0)?;
            info!("Added discarded pid: {}", pid);
        }
        Ok(())
    }

    /// Without the mount id pipe events are reported like any other file.
    fn set_pipefs_mount_id(&self, bpf: &mut Ebpf) -> Result<()> {
        let mount_id = match pipefs_mount_id() {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to discover pipefs mount id: {:#}", e);
                return Ok(());
            }
        };

        let mut pipefs: Array<_, u32> = bpf
            .map_mut("PIPEFS_MOUNT_ID")
            .context("Failed to find PIPEFS_MOUNT_ID map")?
            .try_into()
            .context("PIPEFS_MOUNT_ID is not an Array")?;

        pipefs.set(0, mount_id, 0)?;
        info!("pipefs mount id: {}", mount_id);
        Ok(())
    }

    fn spawn_event_handler(&self, bpf: &mut Ebpf) -> Result<()> {
        let format = self.settings.output_format();

        spawn_ringbuf_handler(bpf, EVENTS_MAP, move |event: ChownEvent| {
            let report = ChownReport::from_event(&event, container_id_for_pid);
            telemetry::record_chown_event(report.retval, &report.comm, report.container_id.as_deref());

            match format {
                OutputFormat::Log => info!("{}", report),
                OutputFormat::Json => match serde_json::to_string(&report) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("Failed to serialize chown report: {}", e),
                },
            }
        })
    }
}

/// Kernel entry point of a variant. `compat` carries the programs of an
/// ia32 entry; native entries use the variant's own programs.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChownTarget {
    variant: ChownVariant,
    symbol: SyscallSymbol,
    compat: Option<CompatPrograms>,
}

/// Entry points present in the running kernel, in table order, each native
/// entry followed by its ia32 one. Missing variants are logged and skipped.
fn resolve_targets(symbols: &KernelSymbols) -> Vec<ChownTarget> {
    let mut targets = Vec::new();
    for &variant in CHOWN_VARIANTS.iter() {
        let Some(symbol) = symbols.syscall_symbol(variant.syscall()) else {
            warn!("Syscall {} not found; skipping", variant.syscall());
            continue;
        };

        let compat = variant.compat_programs().and_then(|programs| {
            symbols
                .compat_syscall_symbol(variant.syscall())
                .map(|compat_symbol| ChownTarget {
                    variant,
                    symbol: compat_symbol,
                    compat: Some(programs),
                })
        });

        match compat {
            // Only the ia32 entry exists.
            Some(target) if target.symbol == symbol => targets.push(target),
            compat => {
                targets.push(ChownTarget {
                    variant,
                    symbol,
                    compat: None,
                });
                targets.extend(compat);
            }
        }
    }
    targets
}

/// `sys_exit_*` tracepoints do not fire for compat tasks, so the legacy
/// 16-bit forms always exit through a return probe.
fn exits_via_tracepoint(mode: ExitMode, variant: ChownVariant) -> bool {
    mode == ExitMode::Tracepoint && !variant.is_legacy16()
}

/// Under `Deny` approvers only run from the resolution kprobe; without it
/// every call would be dropped.
fn requires_resolution(policy: Policy) -> bool {
    policy.mode() == PolicyMode::Deny
}

fn approver_basename(name: &str) -> Option<Basename> {
    if name.is_empty() || name.len() >= BASENAME_LEN || name.contains('/') {
        return None;
    }
    Some(Basename::from_bytes(name.as_bytes()))
}
