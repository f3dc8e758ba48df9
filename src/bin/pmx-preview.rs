//! Command line front end.
//!
//! ```text
//! pmx-preview <model.pmx> [width] [height]            open a preview window
//! pmx-preview <model.pmx> [width] [height] -o <out>   write a preview image
//! ```

use std::path::PathBuf;

use anyhow::{Context, bail};

const USAGE: &str = "usage: pmx-preview <model.pmx> [width] [height] [-o <output image>]";

fn main() -> anyhow::Result<()> {
    let mut model = None;
    let mut output = None;
    let mut dims = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                output = Some(PathBuf::from(args.next().context(USAGE)?));
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ if model.is_none() => model = Some(PathBuf::from(arg)),
            _ => dims.push(
                arg.parse::<u32>()
                    .with_context(|| format!("invalid size {arg:?}\n{USAGE}"))?,
            ),
        }
    }
    let Some(model) = model else {
        bail!(USAGE);
    };
    let width = dims.first().copied().unwrap_or(800);
    let height = dims.get(1).copied().unwrap_or(600);

    match output {
        Some(output) => {
            let Some(img) = pmx_preview::render_preview(&model, width, height) else {
                bail!("could not render {}", model.display());
            };
            img.save(&output)
                .with_context(|| format!("could not write {}", output.display()))?;
            Ok(())
        }
        None => pmx_preview::run_window(&model, width, height),
    }
}
