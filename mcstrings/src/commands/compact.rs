use std::path::PathBuf;

use clap::Args;
use mcstrings_world::compact;

#[derive(Args)]
pub struct CompactArgs {
    /// Path to the world to compact (the directory containing level.dat)
    pub world: PathBuf,

    /// Do not ask for confirmation before proceeding
    #[arg(long = "skip_confirmation")]
    pub skip_confirmation: bool,
}

pub fn run(args: &CompactArgs) -> anyhow::Result<()> {
    if !args.skip_confirmation {
        super::confirm();
    }
    compact::compact_world(&args.world)?;
    Ok(())
}
