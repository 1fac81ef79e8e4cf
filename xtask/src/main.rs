//! Build automation for k8s-cli
//!
//! Usage: cargo xtask <command>
//!
//! Available commands:
//! - build: Build the binary
//! - test: Run unit and/or integration tests
//! - dist: Package a release tarball named for the target triple
//! - install: Install the binary under a prefix
//! - ci: Run format, clippy and test checks

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use xshell::{cmd, Shell};

const BIN: &str = "k8s-cli";

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for k8s-cli")]
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
        /// Run only the tests/ integration suites
        #[arg(long, conflicts_with = "unit")]
        integration: bool,
        /// Run only library unit tests
        #[arg(long)]
        unit: bool,
    },
    /// Create a release tarball matching the binstall layout
    Dist {
        /// Target triple (defaults to the host)
        #[arg(long)]
        target: Option<String>,
    },
    /// Install to system
    Install {
        /// Installation prefix (default: /usr/local)
        #[arg(long, default_value = "/usr/local")]
        prefix: String,
    },
    /// Run CI checks (format, clippy, test)
    Ci,
    /// Format code
    Format {
        /// Check formatting without modifying files
        #[arg(long)]
        check: bool,
    },
    /// Run clippy
    Clippy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    sh.change_dir(project_root()?);

    match cli.command {
        Commands::Build { release } => build(&sh, release),
        Commands::Test { integration, unit } => test(&sh, integration, unit),
        Commands::Dist { target } => dist(&sh, target),
        Commands::Install { prefix } => install(&sh, &prefix),
        Commands::Ci => ci(&sh),
        Commands::Format { check } => format(&sh, check),
        Commands::Clippy => clippy(&sh),
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

fn test(sh: &Shell, integration: bool, unit: bool) -> Result<()> {
    println!("🧪 Running tests...");

    if integration {
        cmd!(sh, "cargo test -p {BIN} --tests --test '*'").run()?;
    } else if unit {
        cmd!(sh, "cargo test -p {BIN} --lib --bins").run()?;
    } else {
        cmd!(sh, "cargo test --workspace").run()?;
    }

    println!("✅ All tests passed");
    Ok(())
}

fn host_triple(sh: &Shell) -> Result<String> {
    let info = cmd!(sh, "rustc -vV").read()?;
    info.lines()
        .find_map(|line| line.strip_prefix("host: "))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("rustc -vV did not report a host triple"))
}

fn dist(sh: &Shell, target: Option<String>) -> Result<()> {
    println!("📦 Creating distribution package...");

    let (binary_src, triple) = match target {
        Some(triple) => {
            cmd!(sh, "cargo build --release --bin {BIN} --target {triple}").run()?;
            (
                project_root()?.join(format!("target/{}/release/{}", triple, BIN)),
                triple,
            )
        }
        None => {
            cmd!(sh, "cargo build --release --bin {BIN}").run()?;
            (
                project_root()?.join(format!("target/release/{}", BIN)),
                host_triple(sh)?,
            )
        }
    };

    let dist_dir = project_root()?.join("dist");
    sh.create_dir(&dist_dir)?;
    sh.copy_file(&binary_src, dist_dir.join(BIN))?;

    // Must match package.metadata.binstall pkg-url
    let archive_name = format!("{}-{}.tar.gz", BIN, triple);
    cmd!(sh, "tar -czf {archive_name} -C dist {BIN}")
        .run()
        .context("Failed to create tarball")?;

    println!("✅ Distribution package created: {}", archive_name);
    Ok(())
}

fn install(sh: &Shell, prefix: &str) -> Result<()> {
    println!("📥 Installing {} to {}...", BIN, prefix);

    let binary = project_root()?.join(format!("target/release/{}", BIN));
    if !binary.exists() {
        println!("Building release binary first...");
        cmd!(sh, "cargo build --release --bin {BIN}").run()?;
    }

    let bin_dir = Path::new(prefix).join("bin");
    sh.create_dir(&bin_dir)?;

    let install_path = bin_dir.join(BIN);
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
    format(sh, true)?;

    println!("\n🔧 Running clippy...");
    clippy(sh)?;

    println!("\n🧪 Running tests...");
    test(sh, false, false)?;

    println!("\n✅ All CI checks passed!");
    Ok(())
}

fn format(sh: &Shell, check: bool) -> Result<()> {
    if check {
        cmd!(sh, "cargo fmt --all -- --check").run()?;
        println!("✅ Code formatting is correct");
    } else {
        cmd!(sh, "cargo fmt --all").run()?;
        println!("✅ Code formatted");
    }
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    println!("✅ Clippy checks passed");
    Ok(())
}

fn project_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("xtask must live one level below the workspace root"))
}
