pub mod extract;
pub mod list;
pub mod merge;

#[derive(clap::Subcommand)]
pub enum TreCommands {
    /// List the files inside a TRE archive
    List(list::ListArgs),
    /// Extract a TRE archive into a directory
    Extract(extract::ExtractArgs),
    /// Merge a directory into a TRE archive
    Merge(merge::MergeArgs),
}

impl TreCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            TreCommands::List(list) => list.handle(),
            TreCommands::Extract(extract) => extract.handle(),
            TreCommands::Merge(merge) => merge.handle(),
        }
    }
}
