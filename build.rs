//! Build script rendering the `blockyard(1)` man page into `OUT_DIR`.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const WATCHED: [&str; 2] = ["build.rs", "src/cli/mod.rs"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    for path in WATCHED {
        writeln!(stdout, "cargo:rerun-if-changed={path}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or("OUT_DIR was not set")?;

    let mut page = BufWriter::new(File::create(out_dir.join("blockyard.1"))?);
    Man::new(cli::Cli::command()).render(&mut page)?;
    page.flush()?;

    Ok(())
}
