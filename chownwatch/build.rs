use std::{
    env,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

const EBPF_CRATE: &str = "../chownwatch-ebpf";
const EBPF_BINARY: &str = "chownwatch";

fn bpf_target(arch: &str) -> &'static str {
    match arch {
        "x86_64" | "x86" | "aarch64" | "arm" | "riscv64" => "bpfel-unknown-none",
        "mips" | "mips64" | "powerpc" | "powerpc64" | "s390x" => "bpfeb-unknown-none",
        _ => {
            println!(
                "cargo:warning=Unknown architecture '{}', defaulting to bpfel-unknown-none",
                arch
            );
            "bpfel-unknown-none"
        }
    }
}

/// Builds the eBPF crate with nightly `build-std` and returns the object
/// path. The programs read syscall registers, so the host architecture is
/// forwarded as the `bpf_target_arch` cfg.
fn build_ebpf(arch: &str, target_dir: &Path) -> Result<PathBuf, String> {
    let target = bpf_target(arch);
    println!(
        "cargo:warning=Building eBPF for target: {} (host arch: {})",
        target, arch
    );

    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let status = Command::new(cargo)
        .current_dir(EBPF_CRATE)
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .env("CARGO_TARGET_DIR", target_dir)
        .env(
            "CARGO_ENCODED_RUSTFLAGS",
            format!("--cfg=bpf_target_arch=\"{}\"", arch),
        )
        .args([
            "build",
            "--release",
            &format!("--target={}", target),
            "-Z",
            "build-std=core",
        ])
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| format!("Failed to execute cargo: {}", e))?;

    if !status.success() {
        return Err(format!("eBPF build failed with {}", status));
    }

    Ok(target_dir.join(target).join("release").join(EBPF_BINARY))
}

fn main() {
    println!("cargo:rerun-if-changed={}/src", EBPF_CRATE);
    println!("cargo:rerun-if-changed={}/Cargo.toml", EBPF_CRATE);
    println!("cargo:rerun-if-changed=../chownwatch-common/src");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let arch = env::var("CARGO_CFG_TARGET_ARCH").expect("CARGO_CFG_TARGET_ARCH is set by cargo");

    // Separate target directory so the nested cargo does not wait on our lock.
    let target_dir = out_dir.join("ebpf-target");

    let object = match build_ebpf(&arch, &target_dir) {
        Ok(object) => object,
        Err(e) => panic!("{}", e),
    };

    std::fs::copy(&object, out_dir.join(EBPF_BINARY))
        .unwrap_or_else(|e| panic!("Failed to copy {}: {}", object.display(), e));
}
