use std::fmt::Display;

use clap::Parser;
use linkmap::{AddressIndex, FilteredNode, LinkMap, LinkMapParser, TreeView};

#[derive(Debug, Parser)]
struct LmSh {
    filename: std::path::PathBuf,
}

struct Session {
    map: LinkMap,
    view: TreeView,
}

fn main() -> anyhow::Result<()> {
    let args = LmSh::parse();
    linkmap::logging::init_tracing();

    let map = LinkMapParser::new().parse_file(&args.filename, |_, _| ())?;
    let view = TreeView::from_linkmap(&map);
    let mut session = Session { map, view };

    println!("Loaded {}; {}.", session.map.name, session.map.summary());
    println!("To quit: ^D or exit");

    let mut rl = rustyline::DefaultEditor::new()?;
    let prompt = ansi_term::Colour::Green.paint(">> ").to_string();
    'lineloop:
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                let (cmd, rest) = line.split_once(char::is_whitespace)
                    .unwrap_or((line, ""));
                if line.is_empty() {
                    continue 'lineloop;
                }

                let _ = rl.add_history_entry(line);

                match cmd {
                    "exit" => break,
                    "help" => {
                        println!("commands:");
                        for (name, _, desc) in COMMANDS {
                            println!("{:12} {}", name, desc);
                        }
                    }
                    _ => {
                        for (name, imp, _) in COMMANDS {
                            if *name == cmd {
                                imp(&mut session, rest.trim());
                                continue 'lineloop;
                            }
                        }
                        println!("unknown command: {}", cmd);
                        println!("for help, try: help");
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                println!("{:?}", e);
                break;
            }
        }
    }

    Ok(())
}

/// A name in bold followed by its size, dimmed.
struct WithSize<'a, N: Display>(N, &'a u64);

impl<N: Display> Display for WithSize<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let bold = ansi_term::Style::new().bold();
        let dim = ansi_term::Style::new().dimmed();
        write!(f, "{} {}({} bytes){}", bold.paint(self.0.to_string()), dim.prefix(), self.1, dim.suffix())
    }
}

type Command = fn(&mut Session, &str);

static COMMANDS: &[(&str, Command, &str)] = &[
    ("summary", cmd_summary, "print object/section/symbol/library counts"),
    ("libs", cmd_libs, "list libraries, largest first"),
    ("objects", cmd_objects, "list objects, optionally of one library"),
    ("tree", cmd_tree, "print the filtered tree, to a depth (default 2)"),
    ("filter", cmd_filter, "show only names containing a string; no argument clears"),
    ("find", cmd_find, "list visible nodes whose names contain a string"),
    ("top", cmd_top, "print the N largest symbols (default 20)"),
    ("sections", cmd_sections, "list output sections"),
    ("dead", cmd_dead, "summarize dead-stripped symbols"),
    ("addr", cmd_addr, "look up the symbol and section at an address"),
];

fn cmd_summary(s: &mut Session, _args: &str) {
    let summary = s.map.summary();
    println!("{}", summary);
    println!("- path: {}", s.map.path);
    if !s.map.arch.is_empty() {
        println!("- arch: {}", s.map.arch);
    }
    println!("- symbol bytes: {}", summary.symbol_bytes);
    println!("- dead symbols: {}", summary.dead_symbols);
}

fn cmd_libs(s: &mut Session, _args: &str) {
    let mut libs = s.view.roots().iter().collect::<Vec<_>>();
    libs.sort_by(|a, b| b.size().cmp(&a.size()));
    for lib in libs {
        println!("{} - {} objects", WithSize(lib.name(), &lib.size()), lib.children().len());
    }
}

fn cmd_objects(s: &mut Session, args: &str) {
    let mut objects = s.view.roots().iter()
        .filter(|lib| args.is_empty() || lib.name() == args)
        .flat_map(|lib| lib.children().iter().map(move |o| (lib.name(), o)))
        .collect::<Vec<_>>();
    if objects.is_empty() {
        println!("{}", ansi_term::Colour::Red.paint("No objects found."));
        return;
    }
    objects.sort_by(|a, b| b.1.size().cmp(&a.1.size()));
    for (lib, o) in objects {
        println!("{} in {}", WithSize(o.name(), &o.size()), lib);
    }
}

fn cmd_tree(s: &mut Session, args: &str) {
    let depth = if args.is_empty() {
        2
    } else {
        match parse_int::parse::<usize>(args) {
            Ok(d) => d,
            Err(_) => {
                println!("can't parse {} as a depth", args);
                return;
            }
        }
    };
    if let Some(f) = s.view.filter() {
        println!("{}{}", ansi_term::Color::Yellow.paint("filter: "), f.text());
    }
    for root in s.view.visible() {
        print_node(&root, 0, depth);
    }
}

fn print_node(node: &FilteredNode<'_>, level: usize, depth: usize) {
    let hidden = node.all_children().len() - node.children().len();
    if hidden > 0 {
        println!("{:indent$}{} [{} hidden]", "", WithSize(node.name(), &node.size()), hidden, indent = level * 2);
    } else {
        println!("{:indent$}{}", "", WithSize(node.name(), &node.size()), indent = level * 2);
    }
    if level + 1 < depth {
        for child in node.children() {
            print_node(child, level + 1, depth);
        }
    } else if !node.children().is_empty() {
        println!("{:indent$}...", "", indent = (level + 1) * 2);
    }
}

fn cmd_filter(s: &mut Session, args: &str) {
    s.view.set_filter(args);
    match s.view.filter() {
        Some(f) => println!("filtering on {:?}", f.text()),
        None => println!("filter cleared"),
    }
}

fn cmd_find(s: &mut Session, args: &str) {
    if args.is_empty() {
        println!("find what?");
        return;
    }
    let paths = s.view.find(args);
    if paths.is_empty() {
        println!("{}", ansi_term::Colour::Red.paint("Nothing found."));
        return;
    }
    let visible = s.view.visible();
    for path in paths {
        let mut names = Vec::with_capacity(path.len());
        let mut level = visible.as_slice();
        for &i in &path {
            let node = &level[i];
            names.push(node.name());
            level = node.children();
        }
        println!("{}", names.join(" / "));
    }
}

fn cmd_top(s: &mut Session, args: &str) {
    let n = if args.is_empty() { 20 } else {
        match parse_int::parse::<usize>(args) {
            Ok(n) => n,
            Err(_) => {
                println!("can't parse {} as a count", args);
                return;
            }
        }
    };
    let mut symbols = s.map.symbols.iter().filter(|sym| !sym.dead).collect::<Vec<_>>();
    symbols.sort_by(|a, b| b.size.cmp(&a.size));
    for sym in symbols.into_iter().take(n) {
        let owner = s.map.object_by_index(sym.object_index)
            .map(|o| o.name.as_str())
            .unwrap_or("<unknown object>");
        println!("{:#012x} {} in {}", sym.address, WithSize(&sym.name, &sym.size), owner);
    }
}

fn cmd_sections(s: &mut Session, _args: &str) {
    for sec in &s.map.sections {
        println!("{:#012x} {:16} {}", sec.address, sec.segment, WithSize(&sec.section, &sec.size));
    }
}

fn cmd_dead(s: &mut Session, _args: &str) {
    let dead = s.map.symbols.iter().filter(|sym| sym.dead).collect::<Vec<_>>();
    let bytes = dead.iter().fold(0u64, |acc, sym| acc.saturating_add(sym.size));
    println!("{} dead-stripped symbols, {} bytes", dead.len(), bytes);
}

fn cmd_addr(s: &mut Session, args: &str) {
    let addr = match parse_int::parse::<u64>(args) {
        Ok(a) => a,
        Err(_) => {
            println!("can't parse {} as an address", args);
            return;
        }
    };
    let index = AddressIndex::new(&s.map);
    match index.section_at(addr) {
        Some(sec) => println!("- section: {},{}", sec.segment, sec.section),
        None => println!("- not in any section"),
    }
    match index.symbol_at(addr) {
        Some(sym) => {
            println!("- symbol: {} at {:#x}+{:#x}", WithSize(&sym.name, &sym.size), sym.address, addr - sym.address);
            if let Some(o) = s.map.object_by_index(sym.object_index) {
                println!("- object: {}", o.path);
            }
        }
        None => println!("- no symbol covers {:#x}", addr),
    }
}
