use anyhow::Context;
use clap::{Parser, Subcommand};
use models::PropertyRegistry;
use mutations::Draft;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Manage declarative operator catalogs: add bundles, deprecate and prune
/// them, validate invariants, and maintain the query cache.
#[derive(Debug, Parser)]
#[command(name = "catctl", version)]
struct Cli {
    #[clap(flatten)]
    log_args: cli_common::LogArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a catalog and check every model invariant, strictly.
    Validate {
        /// Directory of the declarative catalog.
        catalog: PathBuf,
    },
    /// Add a batch of bundles to a catalog.
    Add {
        /// Directory of the declarative catalog.
        catalog: PathBuf,
        /// YAML file holding the list of bundles to add.
        #[arg(long)]
        batch: PathBuf,
        /// Edge derivation mode for the batch.
        #[arg(long, value_enum, default_value = "replaces")]
        mode: ModeArg,
        /// Permit overwriting a channel head in place.
        #[arg(long)]
        overwrite_latest: bool,
        /// Tolerate pre-existing invalid packages in the loaded catalog.
        #[arg(long)]
        permissive: bool,
    },
    /// Mark a bundle (and optionally everything below it) deprecated.
    Deprecate {
        catalog: PathBuf,
        package: models::PackageName,
        bundle: models::BundleName,
        /// Also deprecate every bundle the target transitively replaces.
        #[arg(long)]
        and_below: bool,
    },
    /// Remove an entire package from the catalog.
    Rm {
        catalog: PathBuf,
        package: models::PackageName,
    },
    /// Retain only the named packages.
    Prune {
        catalog: PathBuf,
        /// Package to retain. Repeatable.
        #[arg(long = "keep", required = true)]
        keep: Vec<models::PackageName>,
    },
    /// Delete bundles unreachable from their channel's head.
    PruneStranded { catalog: PathBuf },
    /// List catalog contents.
    List {
        catalog: PathBuf,
        #[command(subcommand)]
        what: ListCommand,
    },
    /// Maintain the pre-computed query cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ListCommand {
    /// All packages, with their default channels.
    Packages,
    /// The channels of a package, with their heads.
    Channels { package: models::PackageName },
    /// Bundles, flattened per channel membership.
    Bundles {
        /// Restrict to one package.
        #[arg(long)]
        package: Option<models::PackageName>,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// Build (or refresh) the cache of query answers for a catalog.
    Build {
        catalog: PathBuf,
        cache_dir: PathBuf,
    },
    /// Verify that cached answers match a fresh evaluation.
    Check {
        catalog: PathBuf,
        cache_dir: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Replaces,
    SkipPatch,
}

impl From<ModeArg> for mutations::Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Replaces => mutations::Mode::Replaces,
            ModeArg::SkipPatch => mutations::Mode::SkipPatch,
        }
    }
}

// Exit codes of the add path. Other failures map to 1.
const EXIT_BUNDLE_ALREADY_ADDED: u8 = 2;
const EXIT_PACKAGE_VERSION_ALREADY_ADDED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let Cli { log_args, command } = Cli::parse();
    cli_common::init_logging(&log_args);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; stopping at the next bundle boundary");
                cancel.cancel();
            }
        });
    }

    match run(command, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            match err.downcast_ref::<mutations::Error>() {
                Some(mutations::Error::BundleAlreadyAdded { .. }) => {
                    ExitCode::from(EXIT_BUNDLE_ALREADY_ADDED)
                }
                Some(mutations::Error::PackageVersionAlreadyAdded { .. }) => {
                    ExitCode::from(EXIT_PACKAGE_VERSION_ALREADY_ADDED)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(command: Command, cancel: &CancellationToken) -> anyhow::Result<()> {
    let registry = PropertyRegistry::new();

    match command {
        Command::Validate { catalog } => {
            load_draft(&catalog, true, &registry, cancel).await?;
            println!("catalog {} is valid", catalog.display());
            Ok(())
        }
        Command::Add {
            catalog,
            batch,
            mode,
            overwrite_latest,
            permissive,
        } => {
            let draft = load_draft(&catalog, !permissive, &registry, cancel).await?;

            let raw = std::fs::read(&batch)
                .with_context(|| format!("failed to read batch file {}", batch.display()))?;
            let inputs: Vec<mutations::BundleInput> = serde_yaml::from_slice(&raw)
                .with_context(|| format!("failed to parse batch file {}", batch.display()))?;
            let count = inputs.len();

            let next = mutations::add(
                &draft,
                mutations::AddRequest {
                    inputs,
                    mode: mode.into(),
                    overwrite: overwrite_latest,
                },
                &registry,
                cancel,
            )?;
            mutations::persist(&next, &catalog)?;
            println!("added {} bundles to {}", count, catalog.display());
            Ok(())
        }
        Command::Deprecate {
            catalog,
            package,
            bundle,
            and_below,
        } => {
            let draft = load_draft(&catalog, true, &registry, cancel).await?;
            let next = mutations::deprecate(&draft, &package, &bundle, and_below, &registry)?;
            mutations::persist(&next, &catalog)?;
            Ok(())
        }
        Command::Rm { catalog, package } => {
            let draft = load_draft(&catalog, true, &registry, cancel).await?;
            let next = mutations::remove_package(&draft, &package)?;
            mutations::persist(&next, &catalog)?;
            Ok(())
        }
        Command::Prune { catalog, keep } => {
            let draft = load_draft(&catalog, true, &registry, cancel).await?;
            let keep: BTreeSet<models::PackageName> = keep.into_iter().collect();
            let next = mutations::prune_to_keep(&draft, &keep);
            mutations::persist(&next, &catalog)?;
            Ok(())
        }
        Command::PruneStranded { catalog } => {
            let draft = load_draft(&catalog, true, &registry, cancel).await?;
            let next = mutations::prune_stranded(&draft, &registry)?;
            mutations::persist(&next, &catalog)?;
            Ok(())
        }
        Command::List { catalog, what } => {
            // Listing is read-only; serve the valid packages even when
            // some neighbors are broken.
            let draft = load_draft(&catalog, false, &registry, cancel).await?;
            let engine = queries::Engine::new(draft.catalog, draft.built, registry.clone());

            match what {
                ListCommand::Packages => {
                    for name in engine.list_packages(cancel)? {
                        let package = engine.get_package(&name, cancel)?;
                        println!("{}\t{}", package.name, package.default_channel);
                    }
                }
                ListCommand::Channels { package } => {
                    for channel in engine.get_package(&package, cancel)?.channels {
                        println!("{}\t{}", channel.name, channel.head);
                    }
                }
                ListCommand::Bundles { package } => {
                    for bundle in engine.list_bundles(cancel)? {
                        if package.as_ref().is_some_and(|p| p != &bundle.package) {
                            continue;
                        }
                        let version = bundle
                            .version
                            .map(|v| v.to_string())
                            .unwrap_or_default();
                        println!(
                            "{}\t{}\t{}\t{}\t{}",
                            bundle.package, bundle.channel, bundle.name, version, bundle.image,
                        );
                    }
                }
            }
            Ok(())
        }
        Command::Cache { command } => match command {
            CacheCommand::Build { catalog, cache_dir } => {
                let draft = load_draft(&catalog, true, &registry, cancel).await?;
                let engine =
                    queries::Engine::new(draft.catalog, draft.built, registry.clone());
                let (cache, rebuilt) = cache::load_or_rebuild(&cache_dir, &engine, cancel).await?;
                println!(
                    "cache {} for digest {} ({})",
                    cache_dir.display(),
                    cache.digest,
                    if rebuilt { "rebuilt" } else { "up to date" },
                );
                Ok(())
            }
            CacheCommand::Check { catalog, cache_dir } => {
                let draft = load_draft(&catalog, true, &registry, cancel).await?;
                let engine =
                    queries::Engine::new(draft.catalog, draft.built, registry.clone());
                let cached = cache::Cache::read(&cache_dir).await?;
                cache::check_integrity(&cached, &engine, cancel)?;
                println!("cache {} is consistent", cache_dir.display());
                Ok(())
            }
        },
    }
}

/// Load and assemble the catalog under |root|, holding the shared
/// advisory lock for the duration of the read. In strict mode any
/// aggregated load or invariant error is fatal; in permissive mode they
/// are logged and the valid packages are served.
async fn load_draft(
    root: &Path,
    strict: bool,
    registry: &PropertyRegistry,
    cancel: &CancellationToken,
) -> anyhow::Result<Draft> {
    // A fresh catalog begins as an empty directory.
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create catalog directory {}", root.display()))?;
    let lock = mutations::CatalogLock::shared(root)?;

    let (catalog, load_errors) = sources::load(root, registry.clone(), cancel).await?;
    let (built, assemble_errors) = assemble::assemble(&catalog, registry);
    drop(lock);

    let total = load_errors.len() + assemble_errors.len();
    cli_common::report_errors(&load_errors, strict);
    cli_common::report_errors(&assemble_errors, strict);
    if strict && total != 0 {
        anyhow::bail!("catalog {} has {} errors", root.display(), total);
    }
    Ok(Draft::new(catalog, built))
}
