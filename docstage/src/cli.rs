///
/// This module implements the CLI interface for docstage: command parsing,
/// argument validation, the confirmation prompt and user-visible output.
///
/// All planning and committing logic lives in the [`docstage-core`] crate.
/// This module only turns flags into a [`StageConfig`], picks the S3 store
/// and decides whether a plan may be committed.
///
/// ## Features
/// - Entry struct [`Cli`] defines all user-facing options and subcommands.
/// - `publish`: stage, deploy or destage a build directory.
/// - `redirects`: compile a rule file into `Redirect` lines.
/// - `convert-redirects`: turn legacy YAML redirect files into rule lines.
///
/// ## How To Use
/// - For command-line users: run the `docstage` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`docstage-core`]: ../../docstage-core/
use crate::load_config::load_optional_config;
use crate::s3::S3Store;
use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use docstage_core::changeset::{ChangeSet, Summary};
use docstage_core::config::{RedirectSource, StageConfig, StageMode};
use docstage_core::redirects::convert::convert;
use docstage_core::redirects::{compile, htaccess::write_rules};
use docstage_core::stage::Staging;
use owo_colors::OwoColorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// CLI for docstage: publish documentation builds to S3.
#[derive(Parser, Debug)]
#[clap(
    name = "docstage",
    version,
    about = "Stage and deploy documentation builds to S3 with redirect management"
)]
pub struct Cli {
    /// Log progress at info level (RUST_LOG overrides)
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronise a build directory with a bucket
    Publish(PublishArgs),

    /// Compile a redirect rule file into `Redirect` lines
    Redirects {
        /// Rule file to compile
        rules: PathBuf,
        /// Where to write the compiled redirects
        #[clap(long, short)]
        output: PathBuf,
    },

    /// Convert a legacy YAML redirect file into rule lines
    ConvertRedirects {
        /// Multi-document YAML file with `from`, `to` and `outputs`
        input: PathBuf,
        /// Output file; stdout when omitted
        #[clap(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
#[clap(group = ArgGroup::new("mode").required(true).multiple(false))]
pub struct PublishArgs {
    /// Build directory to publish
    pub source: PathBuf,

    /// Target bucket
    pub bucket: String,

    /// Key prefix inside the bucket
    #[clap(long, default_value = "")]
    pub prefix: String,

    /// Publish under prefix/username/branch
    #[clap(long, group = "mode")]
    pub stage: bool,

    /// Publish under prefix
    #[clap(long, group = "mode")]
    pub deploy: bool,

    /// Remove everything under prefix/username/branch
    #[clap(long, group = "mode")]
    pub destage: bool,

    /// Publish every top-level directory, not only the branch directory
    #[clap(long)]
    pub all_subdirectories: bool,

    /// Use the redirects from this .htaccess file
    #[clap(long, conflicts_with = "redirect_rules")]
    pub redirects: Option<PathBuf>,

    /// Compile this rule file and use its redirects
    #[clap(long)]
    pub redirect_rules: Option<PathBuf>,

    /// Regular expression naming a prefix under which redirects may be removed
    #[clap(long = "redirect-prefix")]
    pub redirect_prefix: Vec<String>,

    /// Branch name; detected with git when omitted
    #[clap(long)]
    pub branch: Option<String>,

    /// Username for the staging namespace
    #[clap(long)]
    pub username: Option<String>,

    /// YAML file with publishing defaults
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Print the plan without changing anything
    #[clap(long)]
    pub dry_run: bool,

    /// Print the plan as JSON
    #[clap(long)]
    pub json: bool,

    /// Commit without asking
    #[clap(long, short)]
    pub yes: bool,
}

impl PublishArgs {
    pub fn mode(&self) -> StageMode {
        if self.deploy {
            StageMode::Deploy
        } else {
            StageMode::Stage
        }
    }

    fn redirect_source(&self) -> Option<RedirectSource> {
        if let Some(rules) = &self.redirect_rules {
            return Some(RedirectSource::Rules(rules.clone()));
        }
        self.redirects.clone().map(RedirectSource::Htaccess)
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Publish(args) => publish(args).await,
        Commands::Redirects { rules, output } => {
            let source = std::fs::read_to_string(&rules)
                .with_context(|| format!("Failed to read rule file {}", rules.display()))?;
            let compiled = compile(&source)?;
            write_rules(&compiled, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(rules = compiled.len(), output = %output.display(), "Wrote redirects");
            Ok(())
        }
        Commands::ConvertRedirects { input, output } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let mut rendered = convert(&text)?.join("\n");
            rendered.push('\n');
            match output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{rendered}"),
            }
            Ok(())
        }
    }
}

/// Translate flags and config file into a [`StageConfig`].
pub fn build_stage_config(args: &PublishArgs) -> Result<StageConfig> {
    let file = load_optional_config(args.config.as_deref())?;

    let branch = match &args.branch {
        Some(branch) => branch.clone(),
        None => detect_branch(&args.source)?,
    };

    let mut config = StageConfig::new(&args.bucket, &args.prefix, args.mode())
        .with_redirect_prefixes(&args.redirect_prefix)
        .context("Invalid --redirect-prefix pattern")?;
    config.username = file.resolve_username(args.username.as_deref());
    config.branch = branch;
    config.all_subdirectories = args.all_subdirectories;
    config.redirects = args.redirect_source();
    config.cache_policy = file.cache_policy()?;
    config.danger_threshold = file.danger_threshold;
    config.pool = file.pool();
    config.chunk_size = file.multipart_chunk_size;
    Ok(config)
}

async fn publish(args: PublishArgs) -> Result<()> {
    let config = build_stage_config(&args)?;
    config.trace_loaded();

    if args.mode() == StageMode::Stage && config.username.is_empty() {
        bail!("No username for the staging namespace; pass --username or set USER");
    }

    let store = S3Store::from_env(&config.bucket)
        .await
        .with_chunk_size(config.chunk_size);
    let staging = Staging::new(config);

    let changes = if args.destage {
        staging.plan_purge(&store).await?
    } else {
        staging.plan(&args.source, &store).await?
    };

    let summary = report(&changes, args.json)?;
    if args.dry_run {
        tracing::info!("Dry run; nothing committed");
        return Ok(());
    }
    if changes.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    let needs_consent = args.deploy || args.destage;
    if needs_consent && !args.yes && !confirm(&summary)? {
        println!("Aborted.");
        return Ok(());
    }

    staging.commit(&changes, &store).await?;
    tracing::info!(%summary, "Publish complete");
    Ok(())
}

/// Print the plan and summary; suspicious reasons are highlighted.
fn report(changes: &ChangeSet, json: bool) -> Result<Summary> {
    let mut stdout = io::stdout();
    let summary = changes.print(json, &mut stdout)?;
    if !json {
        writeln!(stdout, "{summary}")?;
        for reason in &summary.reasons {
            writeln!(stdout, "{}", format!("WARNING: {reason}").red().bold())?;
        }
    }
    Ok(summary)
}

fn confirm(summary: &Summary) -> Result<bool> {
    if summary.suspicious {
        println!("{}", "This change set looks suspicious. Review it carefully.".red());
    }
    print!("Commit? [y/N] ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Current branch of the git checkout containing `source`.
pub fn detect_branch(source: &Path) -> Result<String> {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("--abbrev-ref")
        .arg("HEAD")
        .current_dir(source)
        .output()
        .context("Failed to run git to detect the branch; pass --branch")?;

    if !output.status.success() {
        bail!(
            "git could not determine the branch of {}; pass --branch",
            source.display()
        );
    }
    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    tracing::info!(branch = %branch, "Detected branch");
    Ok(branch)
}
