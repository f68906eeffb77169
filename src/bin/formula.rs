//! formula CLI - declarative build-recipe interpreter
//!
//! Usage:
//!   formula install <recipe>       Fetch, build and install a recipe
//!   formula check <recipe>         Validate a recipe and show its expanded plan
//!   formula info <recipe>          Show recipe metadata
//!   formula deps <recipe>          Show dependencies and whether they are present
//!   formula fmt <file>             Print a recipe in canonical form
//!   formula list                   List recipes in the recipes directory

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use formula::core::output::Mark;
use formula::error::exit;
use formula::executor::TemplateVars;
use formula::executor::template::RESERVED;
use formula::gate::{self, MissingReason};
use formula::recipe::{SourceKind, ValidationWarning};
use formula::{
    ChecksumPolicy, Config, Context, DryRunRunner, Executor, HostProbe, Installer, ProbeChain,
    ProcessRunner, Recipe, Step, catalog, output,
};

#[derive(Parser)]
#[command(name = "formula")]
#[command(about = "Declarative build-recipe interpreter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to recipes directory
    #[arg(short = 'r', long, global = true, env = "FORMULA_RECIPES")]
    recipes_path: Option<PathBuf>,

    /// Config file (replaces the XDG search)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More output (-v info, -vv debug, -vvv trace); FORMULA_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
struct BuildArgs {
    /// Installation prefix
    #[arg(short, long)]
    prefix: Option<PathBuf>,

    /// Build directory (fresh temp dir if not specified)
    #[arg(short, long)]
    build_dir: Option<PathBuf>,

    /// Checksum policy: accept archives without a checksum, with a warning
    #[arg(long)]
    allow_unverified: bool,

    /// Extra template variable
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_define)]
    defines: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, build and install a recipe
    Install {
        /// Recipe name or path to a .recipe file
        recipe: String,

        #[command(flatten)]
        build: BuildArgs,

        /// Build an existing source tree instead of fetching
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Show what would run without running it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Write per-step results as JSON
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,

        /// Per-command timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Validate a recipe and show its expanded plan
    Check {
        recipe: String,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Show recipe metadata
    Info { recipe: String },

    /// Show dependencies and whether they are present
    Deps { recipe: String },

    /// Print a recipe in canonical form
    Fmt {
        recipe: String,

        /// Rewrite the file in place
        #[arg(short, long)]
        write: bool,
    },

    /// List recipes in the recipes directory
    List,
}

fn parse_define(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let valid = key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(format!("invalid variable name '{}'", key));
    }
    if RESERVED.contains(&key) {
        return Err(format!("'{}' is set by formula and cannot be defined", key));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FORMULA_LOG").unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&format!("{:#}", err));
            let code = err
                .downcast_ref::<formula::Error>()
                .map(formula::Error::exit_code)
                .unwrap_or(exit::OTHER);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(formula::Error::from)?;
    for source in &config.sources {
        tracing::debug!(path = %source.display(), "config loaded");
    }
    let recipes_path = cli
        .recipes_path
        .clone()
        .unwrap_or_else(|| config.recipes_path.clone());
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Install {
            recipe,
            build,
            source_dir,
            dry_run,
            log,
            timeout,
        } => {
            let (_, recipe) = load_recipe(&recipe, &recipes_path)?;
            let mut ctx = build_context(&recipe, &build, &config, dry_run)?
                .verbose(verbose)
                .timeout(timeout.map(Duration::from_secs).or(config.timeout));
            if let Some(dir) = &source_dir {
                ctx = ctx.source_dir(dir);
            }

            let probe = ProbeChain::new()
                .push(config.provides.clone())
                .push(HostProbe::new());
            let mut installer = Installer::new(ctx, probe)
                .checksum_policy(policy(&build, &config))
                .delegates(config.delegate_registry().map_err(formula::Error::from)?)
                .progress(true);
            if source_dir.is_some() {
                installer = installer.use_existing_source();
            }
            if let Some(log) = log {
                installer = installer.log_to(log);
            }

            output::action(&format!(
                "Installing {}{}",
                recipe.name,
                if dry_run { " (dry run)" } else { "" }
            ));
            let outcome = if dry_run {
                installer.install(&recipe, &mut DryRunRunner::new().echo(true))
            } else {
                let mut runner = ProcessRunner::from_context(installer.context()).spinner(true);
                installer.install(&recipe, &mut runner)
            }
            .with_context(|| format!("installing {}", recipe.name))?;

            output::success(&format!(
                "{} installed into {} ({} steps)",
                recipe.name,
                installer.context().prefix.display(),
                outcome.report.total
            ));
            Ok(())
        }

        Commands::Check { recipe, build } => {
            let (path, recipe) = load_recipe(&recipe, &recipes_path)?;
            let warnings = recipe
                .validate(policy(&build, &config))
                .map_err(formula::Error::from)?;
            print_warnings(&warnings);

            let ctx = build_context(&recipe, &build, &config, true)?;
            let root = ctx.source_dir_for(&recipe.name);
            let plan = Executor::new(root, TemplateVars::for_recipe(&recipe, &ctx))
                .with_delegates(config.delegate_registry().map_err(formula::Error::from)?)
                .materialize(&recipe.install)
                .map_err(formula::Error::from)?;

            output::success(&format!("{} is valid ({})", recipe.name, path.display()));
            output::plan(&plan);
            Ok(())
        }

        Commands::Info { recipe } => {
            let (path, recipe) = load_recipe(&recipe, &recipes_path)?;
            show_info(&path, &recipe, &config.prefix);
            Ok(())
        }

        Commands::Deps { recipe } => {
            let (_, recipe) = load_recipe(&recipe, &recipes_path)?;
            let probe = ProbeChain::new()
                .push(config.provides.clone())
                .push(HostProbe::new());
            show_deps(&recipe, &probe);
            Ok(())
        }

        Commands::Fmt { recipe, write } => {
            let (path, parsed) = load_recipe(&recipe, &recipes_path)?;
            let text = parsed.to_string();
            if write {
                std::fs::write(&path, &text)
                    .with_context(|| format!("writing {}", path.display()))?;
                output::success(&format!("formatted {}", path.display()));
            } else {
                print!("{}", text);
            }
            Ok(())
        }

        Commands::List => {
            list_recipes(&recipes_path);
            Ok(())
        }
    }
}

fn load_recipe(id: &str, recipes_path: &Path) -> formula::Result<(PathBuf, Recipe)> {
    let path = catalog::resolve(id, recipes_path)?;
    let recipe = Recipe::load(&path)?;
    Ok((path, recipe))
}

fn policy(build: &BuildArgs, config: &Config) -> ChecksumPolicy {
    if build.allow_unverified {
        ChecksumPolicy::Warn
    } else {
        config.checksum_policy
    }
}

/// Context from flags, then config, then defaults.
fn build_context(
    recipe: &Recipe,
    build: &BuildArgs,
    config: &Config,
    dry_run: bool,
) -> Result<Context> {
    let prefix = build.prefix.clone().unwrap_or_else(|| config.prefix.clone());
    let build_dir = match build.build_dir.clone().or_else(|| config.build_dir.clone()) {
        Some(dir) => dir,
        None if dry_run => std::env::temp_dir().join(format!("formula-{}", recipe.name)),
        None => tempfile::Builder::new()
            .prefix(&format!("formula-{}-", recipe.name))
            .tempdir()
            .context("Failed to create temporary build directory")?
            .keep(),
    };

    let mut ctx = Context::with_prefix(prefix).build_dir(build_dir).dry_run(dry_run);
    for (key, value) in &build.defines {
        ctx = ctx.define(key, value);
    }
    Ok(ctx)
}

fn print_warnings(warnings: &[ValidationWarning]) {
    for warning in warnings {
        output::warning(&warning.to_string());
    }
}

fn show_info(path: &Path, recipe: &Recipe, prefix: &Path) {
    println!("{}", recipe.name.bold());
    if let Some(version) = &recipe.version {
        println!("  {:<14} {}", "Version:".dimmed(), version);
    }
    println!("  {:<14} {}", "Description:".dimmed(), recipe.description);
    println!("  {:<14} {}", "Homepage:".dimmed(), recipe.homepage);
    println!("  {:<14} {}", "Recipe:".dimmed(), path.display());

    let source = &recipe.source;
    let verification = match (&source.checksum, source.kind) {
        (Some(c), _) => format!("{} {}", c.algorithm, c.digest),
        (None, SourceKind::Archive) if source.unverified => "unverified".yellow().to_string(),
        (None, SourceKind::Archive) => "no checksum".red().to_string(),
        (None, SourceKind::Head) => match &source.branch {
            Some(branch) => format!("branch {}", branch),
            None => "default branch".to_string(),
        },
    };
    println!(
        "  {:<14} {} {} ({})",
        "Source:".dimmed(),
        source.kind.keyword(),
        source.location,
        verification
    );

    if !recipe.dependencies.is_empty() {
        let deps: Vec<String> = recipe
            .dependencies
            .iter()
            .map(|d| format!("{} ({})", d, d.kind))
            .collect();
        println!("  {:<14} {}", "Depends on:".dimmed(), deps.join(", "));
    }

    if let Some(config) = &recipe.configuration {
        let prefix = prefix.display().to_string();
        println!(
            "  {:<14} {} {}",
            "Configure:".dimmed(),
            config.system,
            config.configure_args(&prefix).join(" ")
        );
    }
    println!("  {:<14} {}", "Steps:".dimmed(), Step::count(&recipe.install));
}

fn show_deps(recipe: &Recipe, probe: &ProbeChain) {
    if recipe.dependencies.is_empty() {
        output::info(&format!("{} has no dependencies", recipe.name));
        return;
    }
    output::info(&format!("Dependencies of {}:", recipe.name));
    for (dep, missing) in gate::survey(recipe, probe) {
        let (mark, note) = match missing {
            None => (Mark::Ok, dep.kind.to_string()),
            Some(MissingReason::Absent) => (Mark::Missing, format!("{}, not found", dep.kind)),
            Some(MissingReason::VersionUnknown { .. }) => {
                (Mark::Missing, format!("{}, version unknown", dep.kind))
            }
            Some(MissingReason::VersionMismatch { found, .. }) => {
                (Mark::Missing, format!("{}, found {}", dep.kind, found))
            }
        };
        output::row(&dep.to_string(), mark, &note);
    }
}

fn list_recipes(recipes_path: &Path) {
    let found = catalog::discover(recipes_path);
    if found.is_empty() {
        output::info(&format!("No recipes found in {}", recipes_path.display()));
        return;
    }

    for path in found {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match Recipe::load(&path) {
            Ok(recipe) => {
                let note = match &recipe.version {
                    Some(v) => format!("{} - {}", v, recipe.description),
                    None => recipe.description.clone(),
                };
                output::row(&recipe.name, Mark::Ok, &note);
            }
            Err(e) => output::row(&stem, Mark::Invalid, &e.to_string()),
        }
    }
}
