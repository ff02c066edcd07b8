//! Command-line entry point
//!
//! Resolves configuration, takes the tree lock, and hands off to the
//! acquisition pipeline. On success the path of the cached shell binary is
//! printed on stdout, for consumption by harnesses driving this tool.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use shellforge::acquire::{obtain_shell, Shell};
use shellforge::builder::spidermonkey::SpiderMonkeyBuilder;
use shellforge::cache::{lock_dir_path, LockDir};
use shellforge::config::{home_dir, ForgeConfig};
use shellforge::host::HostFacts;
use shellforge::options::parse_shell_opts;
use shellforge::signal::{install_ctrlc, CancelToken};
use shellforge::vcs::{AbortOffDefault, HgVcs, VersionControl};
use shellforge::verify::SystemInspector;

#[derive(Debug, Parser)]
#[command(name = "shellforge", version, about = "Build and cache JS engine shells")]
struct Cli {
    /// Build flags, quoted as one string, e.g. "--enable-debug --32".
    /// Pass "--random" to generate a random valid set.
    #[arg(short = 'b', long = "build", default_value = "", allow_hyphen_values = true)]
    build: String,

    /// Revision to build. Defaults to the tree's current revision.
    #[arg(short = 'r', long = "rev")]
    rev: Option<String>,

    /// Repository to build from: an absolute path, or a name under the
    /// configured trees directory.
    #[arg(short = 'R', long = "repodir")]
    repodir: Option<PathBuf>,

    /// Config file path. Defaults to ~/.shellforge.toml when present.
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<PathBuf, Box<dyn Error>> {
    let host = HostFacts::detect().ok_or("unsupported host operating system")?;
    let home = home_dir()?;
    let cfg = ForgeConfig::load_or_default(cli.config.as_deref(), &home)?;

    let mut rng = rand::thread_rng();
    let opts = parse_shell_opts(&cli.build, &host, cfg.valgrind_policy(), &mut rng)?;

    let requested_repo = opts.repo_dir.clone().or(cli.repodir);
    let repo_dir = cfg.resolve_repo_dir(requested_repo.as_deref(), &home);

    let token = CancelToken::new();
    install_ctrlc(&token)?;

    let cache_base = cfg.cache_base(&home);
    let lock = LockDir::acquire(&lock_dir_path(&cache_base, &repo_dir)?)?;

    let vcs = HgVcs::new();
    let revision = match &cli.rev {
        Some(rev) => rev.clone(),
        None => vcs.current_revision(&repo_dir, &AbortOffDefault)?.hash,
    };

    let shell = Shell::new(
        opts,
        host,
        &cache_base,
        repo_dir,
        &revision,
        cfg.effective_jobs(),
    )?;
    eprintln!("[acquire] obtaining shell {}", shell.name());

    let strategy = SpiderMonkeyBuilder::new();
    let inspector = SystemInspector::new();
    let binary = obtain_shell(
        &shell,
        &strategy,
        Some(&vcs),
        &inspector,
        &token,
        &lock,
        cli.rev.as_deref(),
    )?;
    Ok(binary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(binary) => {
            println!("{}", binary.display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("[shellforge] ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}
