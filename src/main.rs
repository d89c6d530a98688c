use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

use recompose::formats::{apk, tar, zip};
use recompose::materialize::{self, SpecialEntryPolicy};
use recompose::{
    ContainerResource, ExternalTool, Notifier, PackConfig, ResourceTag, SignatureRegistry,
    Transcoder,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Format {
    Tar,
    Apk,
}

impl Format {
    fn tag(self) -> ResourceTag {
        match self {
            Format::Tar => ResourceTag::TarArchive,
            Format::Apk => ResourceTag::Apk,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SpecialEntries {
    Skip,
    Fail,
}

impl From<SpecialEntries> for SpecialEntryPolicy {
    fn from(value: SpecialEntries) -> Self {
        match value {
            SpecialEntries::Skip => SpecialEntryPolicy::Skip,
            SpecialEntries::Fail => SpecialEntryPolicy::Fail,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Verbose mode (-v for info, -vv for debug, -vvv for trace). Also switches to text-based progress"
    )]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Print the type tags of a file
    Identify {
        #[arg(help = "File to classify")]
        file: PathBuf,

        #[arg(long, help = "MIME type reported by an external sniffer")]
        mime: Option<String>,

        #[arg(long, help = "Free-form description reported by an external sniffer")]
        description: Option<String>,
    },

    /// Unpack a container into a directory
    Unpack {
        #[arg(help = "Container file to unpack")]
        file: PathBuf,

        #[arg(short, long, help = "Directory to write the unpacked tree to")]
        output: PathBuf,

        #[arg(short, long, value_enum, help = "Treat the file as this format instead of detecting it")]
        format: Option<Format>,

        #[arg(long, value_enum, default_value = "skip", help = "What to do with entries this host cannot recreate")]
        special_entries: SpecialEntries,
    },

    /// Pack a directory into a container
    Pack {
        #[arg(help = "Directory holding the tree to pack")]
        dir: PathBuf,

        #[arg(short, long, value_enum, help = "Container format to produce")]
        format: Format,

        #[arg(short, long, help = "File to write the container to")]
        output: PathBuf,

        #[arg(long, help = "Skip post-process stages such as APK signing")]
        no_post_process: bool,

        #[arg(long, help = "JSON file with pack settings")]
        config: Option<PathBuf>,
    },

    /// Report which external tools are installed
    Tools {
        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
}

#[derive(Serialize)]
struct ToolStatus {
    name: String,
    path: String,
    installed: bool,
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let notifier = Notifier::new(cli.verbose);

    let result = match cli.command {
        Command::Identify {
            file,
            mime,
            description,
        } => identify(&notifier, &file, mime.as_deref(), description.as_deref()).await,
        Command::Unpack {
            file,
            output,
            format,
            special_entries,
        } => unpack(&notifier, &file, &output, format, special_entries.into()).await,
        Command::Pack {
            dir,
            format,
            output,
            no_post_process,
            config,
        } => {
            pack(
                &notifier,
                &dir,
                format,
                &output,
                no_post_process,
                config.as_deref(),
            )
            .await
        }
        Command::Tools { json } => tools(&notifier, json).await,
    };

    if result.is_err() {
        notifier.abandon();
    }
    result
}

async fn load(path: &Path) -> Result<ContainerResource> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(ContainerResource::new(name, data))
}

async fn classify(
    notifier: &Notifier,
    transcoder: &Transcoder,
    resource: &mut ContainerResource,
    mime: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    notifier.stage(&format!("Classifying {}", resource.name()));
    let matched = SignatureRegistry::builtin().tag(resource, mime, description);
    debug!("Signature matches: {:?}", matched);
    if matched.is_empty() {
        resource.add_tag(ResourceTag::GenericBinary);
    }
    let ran = transcoder.identify(resource).await?;
    debug!("Identifiers run: {:?}", ran);
    Ok(())
}

async fn identify(
    notifier: &Notifier,
    file: &Path,
    mime: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let transcoder = Transcoder::builtin();
    let mut resource = load(file).await?;
    classify(notifier, &transcoder, &mut resource, mime, description).await?;
    notifier.finish(&format!("Identified {}", resource.name()));

    println!("{}: {}", file.display(), resource.tags_display());
    Ok(())
}

async fn unpack(
    notifier: &Notifier,
    file: &Path,
    output: &Path,
    format: Option<Format>,
    policy: SpecialEntryPolicy,
) -> Result<()> {
    let transcoder = Transcoder::builtin();
    let mut resource = load(file).await?;
    match format {
        Some(format) => resource.add_tag(format.tag()),
        None => classify(notifier, &transcoder, &mut resource, None, None).await?,
    }

    notifier.stage(&format!("Unpacking {}", resource.name()));
    transcoder
        .unpack(&mut resource)
        .await
        .with_context(|| format!("Failed to unpack {}", file.display()))?;

    let Some(tree) = resource.tree() else {
        bail!("{} produced no tree", file.display());
    };
    notifier.stage(&format!("Writing {}", output.display()));
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let report = materialize::write_tree_to(tree, output, policy)?;
    for skipped in &report.skipped {
        notifier.warn(&format!(
            "Skipped {}: {}",
            skipped.path.display(),
            skipped.reason
        ));
    }

    notifier.finish(&format!(
        "Unpacked {} entries into {}",
        tree.len(),
        output.display()
    ));
    Ok(())
}

async fn pack(
    notifier: &Notifier,
    dir: &Path,
    format: Format,
    output: &Path,
    no_post_process: bool,
    config: Option<&Path>,
) -> Result<()> {
    let mut config = match config {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            PackConfig::from_json(&json)
                .with_context(|| format!("Invalid pack config {}", path.display()))?
        }
        None => PackConfig::default(),
    };
    if no_post_process {
        config.apply_post_process = false;
    }
    debug!("Pack config: {:?}", config);

    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output.display().to_string());
    let mut resource = ContainerResource::new(name, Vec::<u8>::new()).with_tag(format.tag());

    notifier.stage(&format!("Loading {}", dir.display()));
    resource.initialize_from_disk(dir).await?;

    notifier.stage(&format!("Packing {}", resource.name()));
    let transcoder = Transcoder::builtin();
    transcoder
        .pack(&mut resource, &config)
        .await
        .with_context(|| format!("Failed to pack {}", dir.display()))?;
    resource.commit_patches()?;

    tokio::fs::write(output, resource.data())
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    notifier.finish(&format!(
        "Wrote {} ({} bytes)",
        output.display(),
        resource.data_length()
    ));
    Ok(())
}

async fn tools(notifier: &Notifier, json: bool) -> Result<()> {
    let descriptors: [&ExternalTool; 5] = [
        &tar::TAR,
        &zip::UNZIP,
        &apk::APKTOOL,
        &apk::JAVA,
        &apk::UBER_APK_SIGNER,
    ];

    let mut report = Vec::new();
    for tool in descriptors {
        notifier.stage(&format!("Checking {}", tool.name()));
        report.push(ToolStatus {
            name: tool.name().to_string(),
            path: tool.resolve_path().display().to_string(),
            installed: tool.is_installed().await?,
            url: tool.url().to_string(),
        });
    }

    notifier.abandon();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for status in &report {
            let state = if status.installed { "ok" } else { "missing" };
            println!("{:<16} {:<8} {} ({})", status.name, state, status.path, status.url);
        }
    }
    Ok(())
}
