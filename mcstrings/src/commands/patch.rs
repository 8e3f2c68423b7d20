use std::fs::File;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Args;
use mcstrings_world::extract::StringRow;
use mcstrings_world::patch::{PatchError, Patcher};

#[derive(Args)]
pub struct PatchArgs {
    /// The CSV file to read strings from
    #[arg(long)]
    pub strings: PathBuf,

    /// Path to the world to patch (the directory containing level.dat)
    pub world: PathBuf,

    /// Do not ask for confirmation before proceeding
    #[arg(long = "skip_confirmation")]
    pub skip_confirmation: bool,
}

/// The `index`th field of a record, or `""` when the record is shorter.
fn field<'a>(record: &'a csv::StringRecord, index: usize) -> &'a str {
    record.get(index).unwrap_or("")
}

pub fn run(args: &PatchArgs) -> anyhow::Result<()> {
    let file = File::open(&args.strings).context("cannot open strings file")?;
    if !args.skip_confirmation {
        super::confirm();
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut patcher = Patcher::new(args.world.clone());
    let mut record = csv::StringRecord::new();
    let mut line = 0u64;
    while reader
        .read_record(&mut record)
        .context("cannot read strings file")?
    {
        line += 1;
        if line == 1 && field(&record, 0) == "dimension" {
            continue; // Skip header row if present.
        }

        let mut ok = true;
        let dimension = field(&record, 0).parse::<i32>().unwrap_or_else(|err| {
            log::warn!("Line {line}: invalid dimension: {err}");
            ok = false;
            0
        });
        let chunk_x = field(&record, 1).parse::<i32>().unwrap_or_else(|err| {
            log::warn!("Line {line}: invalid chunk_x: {err}");
            ok = false;
            0
        });
        let chunk_z = field(&record, 2).parse::<i32>().unwrap_or_else(|err| {
            log::warn!("Line {line}: invalid chunk_z: {err}");
            ok = false;
            0
        });
        let nbt_path = field(&record, 3);
        if nbt_path.is_empty() {
            log::warn!("Line {line}: missing nbt_path");
            ok = false;
        }
        if !ok {
            continue;
        }

        let row = StringRow {
            dimension,
            chunk_x,
            chunk_z,
            nbt_path: nbt_path.to_string(),
            value: field(&record, 4).to_string(),
        };
        if let Err(err) = patcher.apply(&row) {
            // A path that does not resolve means the CSV and the world have
            // drifted apart; name the offending line and chunk.
            return Err(match err {
                PatchError::Path(_) => anyhow!(
                    "line {}, dimension {}, chunk ({}, {}): {}",
                    line,
                    row.dimension,
                    row.chunk_x,
                    row.chunk_z,
                    err
                ),
                other => anyhow::Error::new(other),
            });
        }
    }

    let should_compact = patcher.finish()?;
    if should_compact {
        log::info!("Some chunks were resized or relocated. It is recommended to compact the world.");
    }
    Ok(())
}
