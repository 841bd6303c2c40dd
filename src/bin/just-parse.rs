use anyhow::Result;
use clap::Parser;
use linkmap::{build_tree, LinkMapParser};
use std::io::Write;

/// Parses a linker map and prints where the bytes went.
#[derive(Debug, Parser)]
struct JustParse {
    filename: std::path::PathBuf,
    /// Show parse progress on stderr.
    #[arg(long)]
    progress: bool,
    /// Log as JSON instead of plain text.
    #[arg(long)]
    json_logs: bool,
    /// Also list the N largest symbols.
    #[arg(long, value_name = "N")]
    top: Option<usize>,
}

fn main() -> Result<()> {
    let args = JustParse::parse();
    if args.json_logs {
        linkmap::logging::init_tracing_json();
    } else {
        linkmap::logging::init_tracing();
    }

    let show_progress = args.progress;
    let map = LinkMapParser::new().parse_file(&args.filename, |done, total| {
        if show_progress && total > 0 {
            eprint!("\rparsing... {:3}%", done * 100 / total);
            let _ = std::io::stderr().flush();
        }
    })?;
    if show_progress {
        eprintln!();
    }

    let tree = build_tree(&map);
    println!("{} ({})", map.name, if map.arch.is_empty() { "?" } else { map.arch.as_str() });
    println!("{}", map.summary());
    if tree.orphaned_symbols() > 0 {
        println!("{} symbols refer to unknown objects", tree.orphaned_symbols());
    }
    println!();

    let mut libs = tree.roots();
    libs.sort_by(|a, b| b.size().cmp(&a.size()));
    for lib in &libs {
        println!("{:>12} {} ({} objects)", lib.size(), lib.name(), lib.children().len());
    }

    if let Some(n) = args.top {
        println!();
        let mut symbols: Vec<_> = map.symbols.iter().filter(|s| !s.dead).collect();
        symbols.sort_by(|a, b| b.size.cmp(&a.size));
        for s in symbols.into_iter().take(n) {
            println!("{:>12} {:#x} {}", s.size, s.address, s.name);
        }
    }

    Ok(())
}
