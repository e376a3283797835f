//! Build automation for kube-node-setup
//!
//! Usage: cargo xtask <command>
//!
//! Available commands:
//! - build: Build the binary
//! - test: Run unit and integration tests
//! - dist: Build a release tarball (binary + sample settings)
//! - deb: Build the Debian package via cargo-deb
//! - install: Install the binary under <prefix>/sbin
//! - ci: Run CI checks

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BIN: &str = "kube-node-setup";

const SAMPLE_SETTINGS: &str = r#"# kube-node-setup settings. Command line flags take precedence.

[node]
# node_type = "cp"
# hostname = "node-a"
# k8s_version = "1.31"
# pod_cidr = "192.168.0.0/16"

[join]
# endpoint = "10.0.0.1:6443"
# token = "abcdef.0123456789abcdef"
# discovery_token_hash = "sha256:..."

[cni]
calico_version = "v3.28.0"

[readiness]
max_attempts = 150
interval_secs = 2
probe = "kubectl"

[paths]
log_file = "/var/log/kube-node-setup.log"
join_descriptor = "/etc/kubernetes/join-descriptor.json"
"#;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for kube-node-setup")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the binary
    Build {
        /// Build in release mode
        #[arg(long)]
        release: bool,
    },
    /// Run tests
    Test {
        /// Run only integration tests
        #[arg(long)]
        integration: bool,
    },
    /// Create a release tarball
    Dist {
        /// Target triple (e.g., x86_64-unknown-linux-gnu)
        #[arg(long)]
        target: Option<String>,
    },
    /// Build a .deb with cargo-deb
    Deb,
    /// Install to system
    Install {
        /// Installation prefix (default: /usr/local)
        #[arg(long, default_value = "/usr/local")]
        prefix: String,
    },
    /// Run CI checks (format, clippy, test)
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    sh.change_dir(project_root()?);

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { integration } => test(&sh, integration),
        Commands::Dist { target } => dist(&sh, target),
        Commands::Deb => deb(&sh),
        Commands::Install { prefix } => install(&sh, &prefix),
        Commands::Ci => ci(&sh),
    }
}

fn build(sh: &Shell, release: bool) -> Result<()> {
    println!("🔨 Building {}...", BIN);

    if release {
        cmd!(sh, "cargo build --release --bin {BIN}").run()?;
        println!("✅ Release build completed: target/release/{}", BIN);
    } else {
        cmd!(sh, "cargo build --bin {BIN}").run()?;
        println!("✅ Debug build completed: target/debug/{}", BIN);
    }

    Ok(())
}

fn test(sh: &Shell, integration: bool) -> Result<()> {
    println!("🧪 Running tests...");

    if integration {
        cmd!(sh, "cargo test -p {BIN} --tests").run()?;
    } else {
        cmd!(sh, "cargo test --workspace").run()?;
    }

    println!("✅ All tests passed");
    Ok(())
}

fn dist(sh: &Shell, target: Option<String>) -> Result<()> {
    println!("📦 Creating distribution package...");

    let root = project_root()?;
    let binary_src = match target {
        Some(ref target_triple) => {
            cmd!(sh, "cargo build --release --bin {BIN} --target {target_triple}").run()?;
            root.join(format!("target/{}/release/{}", target_triple, BIN))
        }
        None => {
            cmd!(sh, "cargo build --release --bin {BIN}").run()?;
            root.join(format!("target/release/{}", BIN))
        }
    };

    let dist_dir = root.join("dist");
    sh.create_dir(&dist_dir)?;
    sh.copy_file(&binary_src, dist_dir.join(BIN))?;
    sh.write_file(dist_dir.join(format!("{}.toml", BIN)), SAMPLE_SETTINGS)?;

    let version = env!("CARGO_PKG_VERSION");
    let archive_name = format!("{}-{}.tar.gz", BIN, version);
    let settings_name = format!("{}.toml", BIN);

    cmd!(sh, "tar -czf {archive_name} -C dist {BIN} {settings_name}")
        .run()
        .context("Failed to create tarball")?;

    println!("✅ Distribution package created: {}", archive_name);
    Ok(())
}

fn deb(sh: &Shell) -> Result<()> {
    if cmd!(sh, "cargo deb --version").quiet().ignore_stdout().run().is_err() {
        bail!("cargo-deb is not installed (cargo install cargo-deb)");
    }
    cmd!(sh, "cargo deb -p {BIN}").run()?;
    println!("✅ Debian package written to target/debian/");
    Ok(())
}

fn install(sh: &Shell, prefix: &str) -> Result<()> {
    println!("📥 Installing {} to {}...", BIN, prefix);

    let binary = project_root()?.join(format!("target/release/{}", BIN));
    if !binary.exists() {
        println!("Building release binary first...");
        cmd!(sh, "cargo build --release --bin {BIN}").run()?;
    }

    // Provisioning needs root, so the binary goes to sbin
    let sbin_dir = Path::new(prefix).join("sbin");
    sh.create_dir(&sbin_dir)?;

    let install_path = sbin_dir.join(BIN);
    sh.copy_file(&binary, &install_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&install_path, std::fs::Permissions::from_mode(0o755))?;
    }

    println!("✅ Installed to: {}", install_path.display());
    Ok(())
}

fn ci(sh: &Shell) -> Result<()> {
    println!("🔍 Running CI checks...");

    println!("\n📝 Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;

    println!("\n🔧 Running clippy...");
    cmd!(sh, "cargo clippy --all-targets -- -D warnings").run()?;

    println!("\n🧪 Running tests...");
    test(sh, false)?;

    println!("\n✅ All CI checks passed!");
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask must live one level below the workspace root")
}
