use std::path::{Path, PathBuf};
use std::process::Command;
use std::fs;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

const BINARY: &str = "chownwatch";
const CONFIG_DIR: &str = "/etc/chownwatch";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build and deploy chownwatch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the complete binary (eBPF + userspace)
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,

        /// Target architecture for cross-compilation (e.g., x86_64-unknown-linux-gnu, aarch64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },

    /// Run the host side tests (common engine + userspace agent)
    Test,

    /// Deploy the binary to a remote host
    Deploy {
        /// Remote host (e.g., user@host or just host)
        #[arg(long)]
        host: String,

        /// Remote path to deploy to
        #[arg(long, default_value = "/usr/local/bin/chownwatch")]
        path: String,

        /// Build in release mode before deploying
        #[arg(long, default_value = "true")]
        release: bool,

        /// Target architecture for cross-compilation
        #[arg(long)]
        target: Option<String>,

        /// Restart the service after deployment (if systemd service exists)
        #[arg(long)]
        restart: bool,
    },

    /// Install systemd service on remote host
    InstallService {
        /// Remote host
        #[arg(long)]
        host: String,

        /// EnvironmentFile for the unit (CHOWNWATCH_* variables)
        #[arg(long)]
        env_file: Option<String>,

        /// Settings file passed with --config
        #[arg(long)]
        config: Option<String>,
    },

    /// Package binary for distribution
    Package {
        /// Target architecture
        #[arg(long)]
        target: Option<String>,

        /// Output directory
        #[arg(long, default_value = "dist")]
        output: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { release, target } => {
            build(release, target.as_deref())?;
        }
        Commands::Test => test()?,
        Commands::Deploy {
            host,
            path,
            release,
            target,
            restart,
        } => {
            deploy(&host, &path, release, target.as_deref(), restart)?;
        }
        Commands::InstallService {
            host,
            env_file,
            config,
        } => {
            install_service(&host, env_file.as_deref(), config.as_deref())?;
        }
        Commands::Package { target, output } => {
            package(target.as_deref(), &output)?;
        }
    }

    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn binary_path(root: &Path, release: bool, target: Option<&str>) -> PathBuf {
    let profile = if release { "release" } else { "debug" };
    match target {
        Some(t) => root.join("target").join(t).join(profile).join(BINARY),
        None => root.join("target").join(profile).join(BINARY),
    }
}

fn build(release: bool, target: Option<&str>) -> Result<PathBuf> {
    let root = project_root()?;

    println!("🔨 Building {}...", BINARY);

    if which::which("bpf-linker").is_err() {
        bail!(
            "bpf-linker not found.\n\
             Install with: cargo install bpf-linker"
        );
    }

    // Cross-compiling to Linux from another host goes through 'cross'
    let is_cross_compile = target
        .map(|t| t.contains("linux"))
        .unwrap_or(false) && !cfg!(target_os = "linux");

    let build_cmd = if is_cross_compile {
        if which::which("cross").is_ok() {
            println!("   Using 'cross' for cross-compilation");
            "cross"
        } else {
            bail!(
                "Cross-compilation to Linux requires 'cross' tool.\n\
                 Install with: cargo install cross\n\
                 Also requires Docker to be running."
            );
        }
    } else {
        "cargo"
    };

    let mut cmd = Command::new(build_cmd);
    cmd.current_dir(&root);
    cmd.arg("build");

    if release {
        cmd.arg("--release");
    }

    if let Some(t) = target {
        cmd.arg("--target").arg(t);
        println!("   Target: {}", t);
    }

    cmd.arg("-p").arg(BINARY);

    let status = cmd.status().context("Failed to run cargo build")?;
    if !status.success() {
        bail!("Build failed");
    }

    let binary = binary_path(&root, release, target);
    println!("✅ Build complete: {}", binary.display());

    Ok(binary)
}

fn test() -> Result<()> {
    let root = project_root()?;

    for package in ["chownwatch-common", BINARY] {
        println!("🧪 Testing {}...", package);
        let status = Command::new("cargo")
            .current_dir(&root)
            .args(["test", "-p", package])
            .status()
            .context("Failed to run cargo test")?;
        if !status.success() {
            bail!("Tests failed in {}", package);
        }
    }

    println!("✅ All tests passed");
    Ok(())
}

fn deploy(host: &str, remote_path: &str, release: bool, target: Option<&str>, restart: bool) -> Result<()> {
    let binary = build(release, target)?;
    if !binary.exists() {
        bail!("Binary not found at: {}", binary.display());
    }

    println!("📦 Deploying to {}:{}", host, remote_path);

    let tmp = format!("/tmp/{}.tmp", BINARY);
    let status = Command::new("scp")
        .arg(&binary)
        .arg(format!("{}:{}", host, tmp))
        .status()
        .context("Failed to run scp")?;

    if !status.success() {
        bail!("scp failed");
    }

    let move_cmd = format!(
        "sudo mv {} {} && sudo chmod +x {}",
        tmp, remote_path, remote_path
    );
    ssh(host, &move_cmd).context("Failed to move binary to final location")?;

    println!("✅ Deployed to {}:{}", host, remote_path);

    if restart {
        println!("🔄 Restarting {} service...", BINARY);
        match ssh(host, &format!("sudo systemctl restart {}", BINARY)) {
            Ok(()) => println!("✅ Service restarted"),
            Err(_) => println!("⚠️  Service restart failed (service might not exist)"),
        }
    }

    Ok(())
}

fn ssh(host: &str, command: &str) -> Result<()> {
    let status = Command::new("ssh")
        .arg(host)
        .arg(command)
        .status()
        .context("Failed to run ssh command")?;

    if !status.success() {
        bail!("ssh {} '{}' failed", host, command);
    }
    Ok(())
}

fn install_service(host: &str, env_file: Option<&str>, config: Option<&str>) -> Result<()> {
    let service_content = generate_systemd_service(env_file, config);

    println!("📝 Installing systemd service on {}...", host);

    let escaped_content = service_content.replace("'", "'\\''");
    let cmd = format!(
        "echo '{}' | sudo tee /etc/systemd/system/{}.service > /dev/null && \
         sudo systemctl daemon-reload && \
         sudo systemctl enable {}",
        escaped_content, BINARY, BINARY
    );
    ssh(host, &cmd).context("Failed to install systemd service")?;

    println!("✅ Systemd service installed and enabled");
    println!("   Start with: ssh {} sudo systemctl start {}", host, BINARY);

    Ok(())
}

fn generate_systemd_service(env_file: Option<&str>, config: Option<&str>) -> String {
    let env_line = env_file
        .map(|c| format!("EnvironmentFile=-{}", c))
        .unwrap_or_default();
    let config_arg = config
        .map(|c| format!(" --config {}", c))
        .unwrap_or_default();

    format!(
        r#"[Unit]
Description=chownwatch file ownership audit
After=network.target

[Service]
Type=simple
ExecStart=/usr/local/bin/{binary}{config_arg}
Restart=on-failure
RestartSec=5
{env_line}

# kprobes, tracepoints and BPF maps
NoNewPrivileges=no
CapabilityBoundingSet=CAP_SYS_ADMIN CAP_BPF CAP_PERFMON CAP_SYS_RESOURCE
AmbientCapabilities=CAP_SYS_ADMIN CAP_BPF CAP_PERFMON CAP_SYS_RESOURCE

[Install]
WantedBy=multi-user.target
"#,
        binary = BINARY,
        config_arg = config_arg,
        env_line = env_line,
    )
}

fn package(target: Option<&str>, output_dir: &str) -> Result<()> {
    let binary = build(true, target)?;
    if !binary.exists() {
        bail!("Binary not found at: {}", binary.display());
    }

    let root = project_root()?;
    let output_path = root.join(output_dir);
    fs::create_dir_all(&output_path).context("Failed to create output directory")?;

    let arch = target.unwrap_or(std::env::consts::ARCH);
    let version = env!("CARGO_PKG_VERSION");
    let package_name = format!("{}-{}-{}", BINARY, version, arch);

    let package_dir = output_path.join(&package_name);
    fs::create_dir_all(&package_dir)?;

    fs::copy(&binary, package_dir.join(BINARY))?;

    let env_example = root.join("example.env");
    if env_example.exists() {
        fs::copy(&env_example, package_dir.join(format!("{}.env.example", BINARY)))?;
    }

    let install_script = format!(
        r#"#!/bin/bash
set -e

INSTALL_DIR="${{INSTALL_DIR:-/usr/local/bin}}"
CONFIG_DIR="${{CONFIG_DIR:-{config_dir}}}"

echo "Installing {binary}..."

sudo install -m 755 {binary} "$INSTALL_DIR/{binary}"

sudo mkdir -p "$CONFIG_DIR"
if [ -f {binary}.env.example ]; then
    sudo cp {binary}.env.example "$CONFIG_DIR/{binary}.env.example"
    if [ ! -f "$CONFIG_DIR/{binary}.env" ]; then
        sudo cp {binary}.env.example "$CONFIG_DIR/{binary}.env"
    fi
fi

echo "✅ Installed to $INSTALL_DIR/{binary}"
echo ""
echo "To install as a systemd service, run:"
echo "  sudo ./install-service.sh"
"#,
        binary = BINARY,
        config_dir = CONFIG_DIR,
    );
    fs::write(package_dir.join("install.sh"), install_script)?;

    let service_script = format!(
        r#"#!/bin/bash
set -e

cat > /tmp/{binary}.service << 'EOF'
{unit}
EOF

sudo mv /tmp/{binary}.service /etc/systemd/system/{binary}.service
sudo systemctl daemon-reload
sudo systemctl enable {binary}

echo "✅ Systemd service installed"
echo "   Start with: sudo systemctl start {binary}"
"#,
        binary = BINARY,
        unit = generate_systemd_service(Some(&format!("{}/{}.env", CONFIG_DIR, BINARY)), None),
    );
    fs::write(package_dir.join("install-service.sh"), service_script)?;

    let tarball = output_path.join(format!("{}.tar.gz", package_name));
    let status = Command::new("tar")
        .current_dir(&output_path)
        .args(["-czf", &tarball.to_string_lossy(), &package_name])
        .status()
        .context("Failed to create tarball")?;

    if !status.success() {
        bail!("Failed to create tarball");
    }

    fs::remove_dir_all(&package_dir)?;

    println!("✅ Package created: {}", tarball.display());

    Ok(())
}
