use bon::Builder;
use clap::Args;
use gar_core::{drain_all, error::Error as ResourceError, BatchReport, DrainOptions, Resource};
use gar_tre::TreArchive;
use miette::{miette, Context, Result};
use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Component, Path, PathBuf},
};
use tracing::{error, info, instrument, warn};

#[derive(Args)]
pub struct ExtractArgs {
    /// An input TRE file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting existing files
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Where and how resources are written out
#[derive(Debug, Clone, Builder)]
pub struct ExtractOptions {
    #[builder(into)]
    pub directory: PathBuf,

    #[builder(default)]
    pub overwrite: bool,

    #[builder(default)]
    pub drain: DrainOptions,
}

/// Join an archive entry name onto `root`, refusing names that would leave it
pub fn output_path(root: &Path, name: &str) -> gar_core::error::Result<PathBuf> {
    let mut path = root.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ResourceError::CustomError(format!(
                    "refusing to write {name:?} outside of {}",
                    root.display()
                )));
            }
        }
    }
    if depth == 0 {
        return Err(ResourceError::CustomError(format!(
            "{name:?} does not name a file"
        )));
    }
    Ok(path)
}

fn create(path: &Path, overwrite: bool) -> gar_core::error::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(if overwrite {
        File::create(path)?
    } else {
        File::create_new(path)?
    })
}

/// Write every resource below the target directory, continuing past failures
///
/// A file created for a resource that then fails to decode is removed again, so only complete
/// files are left behind.
#[instrument(skip_all, fields(directory = %options.directory.display()))]
pub fn extract_all<'a>(
    resources: impl IntoIterator<Item = &'a Resource>,
    options: &ExtractOptions,
) -> BatchReport {
    let mut created = HashMap::new();
    let report = drain_all(resources, options.drain, |index, resource| {
        let path = output_path(&options.directory, resource.name())?;
        info!("writing {}", path.display());
        let file = create(&path, options.overwrite)?;
        created.insert(index, path);
        Ok(file)
    });

    for failure in &report.failures {
        if let Some(path) = created.remove(&failure.index) {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), %e, "unable to remove partial file");
            }
        }
    }
    report
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let tre = TreArchive::open(&self.file)
            .context(format!("opening {}", self.file.display()))?;

        let options = ExtractOptions::builder()
            .directory(&self.directory)
            .overwrite(self.overwrite)
            .build();
        let report = extract_all(tre.resources(), &options);

        for rejected in tre.rejected() {
            error!(name = %rejected.name, "{}", rejected.error);
        }
        for failure in &report.failures {
            error!(name = %failure.name, "{}", failure.error);
        }

        let failed = report.failures.len() + tre.rejected().len();
        if failed > 0 {
            return Err(miette!(
                "{} of {} files could not be extracted",
                failed,
                tre.len() + tre.rejected().len()
            ));
        }
        Ok(())
    }
}
