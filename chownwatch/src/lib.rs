pub mod probes;
pub mod report;
pub mod settings;
pub mod telemetry;

use anyhow::{Context, Result};
use aya::Ebpf;
use aya_log::EbpfLogger;
use log::{info, warn};
use tokio::signal;

use crate::probes::{Probe, builtin::ChownProbe, request_shutdown};
use crate::settings::Settings;

pub struct ChownWatchEngine {
    pub settings: Settings,
    bpf: Ebpf,
}

impl ChownWatchEngine {
    pub fn new(settings: Settings, bytecode: &[u8]) -> Result<Self> {
        bump_memlock_rlimit()?;
        let mut bpf = Ebpf::load(bytecode).context("Failed to load eBPF object")?;
        if let Err(e) = EbpfLogger::init(&mut bpf) {
            warn!("Failed to initialize eBPF logger: {}", e);
        }
        Ok(Self { settings, bpf })
    }

    pub async fn run(mut self) -> Result<()> {
        self.attach_probes()?;

        info!("Monitoring active. Press Ctrl-C to exit.");
        signal::ctrl_c().await?;
        info!("Exiting...");

        request_shutdown();
        telemetry::shutdown_metrics();
        Ok(())
    }

    fn attach_probes(&mut self) -> Result<()> {
        if !self.settings.probes.chown.is_enabled() {
            warn!("Chown probe disabled; nothing to monitor");
            return Ok(());
        }

        ChownProbe::new(self.settings.clone()).attach(&mut self.bpf)
    }
}

fn bump_memlock_rlimit() -> Result<()> {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("Failed to increase rlimit");
    }
    Ok(())
}
