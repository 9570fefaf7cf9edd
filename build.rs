//! Build script rendering the `agentlink` manual pages.
//!
//! Writes `agentlink.1` for the top-level command and one
//! `agentlink-<subcommand>.1` page per subcommand.

use std::{fs, path::Path, path::PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli.rs"]
mod cli;

fn render(cmd: clap::Command, title: &str, out_dir: &Path) -> std::io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    Man::new(cmd).title(title).render(&mut buf)?;
    fs::write(out_dir.join(format!("{title}.1")), buf)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from("target/generated-man");
    fs::create_dir_all(&out_dir)?;

    let cmd = cli::Cli::command();
    let name = cmd.get_name().to_owned();
    for sub in cmd.get_subcommands() {
        render(sub.clone(), &format!("{name}-{}", sub.get_name()), &out_dir)?;
    }
    render(cmd, &name, &out_dir)?;

    Ok(())
}
