use clap::Args;
use gar_core::{DecodePlan, Resource};
use gar_tre::TreArchive;
use itertools::Itertools;
use miette::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use std::path::PathBuf;

#[derive(Args)]
pub struct ListArgs {
    /// An input TRE file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Also print each file's properties
    #[arg(short, long, default_value_t = false)]
    long: bool,
}

fn codec_name(resource: &Resource) -> &'static str {
    match resource.decoder() {
        None => "stored",
        Some(DecodePlan::Codec(codec)) => codec.name(),
        Some(DecodePlan::Exporter(_)) => "blocks",
    }
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let tre = TreArchive::open(&self.file)
            .context(format!("opening {}", self.file.display()))?;

        for resource in tre.resources() {
            let codec = codec_name(resource);
            print!(
                "{:>10} {:>10} {:<6} {}",
                resource.length(),
                resource.decompressed_length(),
                codec.if_supports_color(Stream::Stdout, |c| c.cyan()),
                resource.name()
            );
            if self.long {
                let properties = resource
                    .properties()
                    .map(|(key, value)| format!("{key}={value}"))
                    .join(" ");
                print!(" {}", properties.if_supports_color(Stream::Stdout, |p| p.dimmed()));
            }
            println!();
        }

        for rejected in tre.rejected() {
            println!(
                "{:>21} {:<6} {} ({})",
                "",
                "?".if_supports_color(Stream::Stdout, |c| c.red()),
                rejected.name,
                rejected.error
            );
        }

        println!(
            "{} files, version {}, {} bytes decompressed",
            tre.len(),
            tre.version(),
            tre.decompressed_size().unwrap_or_default()
        );
        Ok(())
    }
}
