use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_CFG_BPF_TARGET_ARCH");
    println!("cargo::rustc-check-cfg=cfg(bpf_target_arch, values(\"x86_64\", \"aarch64\"))");

    // The BPF target hides the machine the programs will run on; syscall
    // register layouts depend on it.
    let arch = env::var("CARGO_CFG_BPF_TARGET_ARCH").unwrap_or_else(|_| {
        env::var("HOST")
            .ok()
            .and_then(|host| host.split('-').next().map(str::to_owned))
            .unwrap_or_else(|| "x86_64".to_owned())
    });
    println!("cargo:rustc-cfg=bpf_target_arch=\"{arch}\"");

    if which::which("bpf-linker").is_err() {
        println!("cargo:warning=bpf-linker not found in PATH; install it with `cargo install bpf-linker`");
    }
}
