use clap::Args;
use gar_core::{Container, Resource};
use gar_tre::{write::TreWriterOptions, CompressionMethod, TreWriter};
use itertools::Itertools;
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{
    fs::File,
    io::{Seek, Write},
    path::{Path, PathBuf},
};
use tracing::info;
use walkdir::WalkDir;

#[derive(Args)]
pub struct MergeArgs {
    /// An input directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// A target TRE file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Store file data without compressing it
    #[arg(long, default_value_t = false)]
    store: bool,
}

/// Archive name of a file below `root`, always separated by `/`
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).into_diagnostic()?;
    relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| miette!("unable to convert {} to a string", relative.display()))
        })
        .collect::<Result<Vec<_>>>()
        .map(|parts| parts.into_iter().join("/"))
}

/// Every regular file below `root`, in a stable order
fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Add every file below `root` to the archive as a stored resource
pub fn merge_directory<W: Write + Seek>(
    root: &Path,
    tre: &mut TreWriter<W>,
    compression: CompressionMethod,
) -> Result<usize> {
    let files = collect_files(root);
    if files.is_empty() {
        return Err(miette!("{} has no files to merge", root.display()));
    }

    for path in &files {
        let name = entry_name(root, path)?;
        info!("merging {name}");

        let container = Container::open(path).context(format!("opening {}", path.display()))?;
        let length = container.len();
        let resource = Resource::new(container, name, 0, length, length);

        tre.add_resource(&resource, compression)
            .context(format!("adding {}", path.display()))?;
    }
    Ok(files.len())
}

impl MergeArgs {
    pub fn handle(&self) -> Result<()> {
        info!("creating {}", self.file.display());

        let mut out = if self.overwrite {
            File::create(&self.file)
        } else {
            File::create_new(&self.file)
        }
        .into_diagnostic()
        .context(format!("creating {}", self.file.display()))?;

        let mut tre = TreWriter::new(
            &mut out,
            TreWriterOptions::builder()
                .name_compression(CompressionMethod::Zlib)
                .record_compression(CompressionMethod::Zlib)
                .build(),
        );

        let compression = if self.store {
            CompressionMethod::None
        } else {
            CompressionMethod::Zlib
        };
        let count = merge_directory(&self.directory, &mut tre, compression)?;

        tre.finish().context("finalizing tre file")?;
        info!("merged {count} files");
        Ok(())
    }
}
