//! Data model types.
//!
//! This is our description of what a linker map says about a binary: which
//! object files went in, what sections came out, and where every symbol
//! landed.

use std::fmt;

/// An entry in the `# Object files:` table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectRecord {
    /// Slot in the object table, as printed between the brackets. Symbols
    /// refer to their owning object by this value.
    pub index: u32,
    /// Path exactly as printed by the linker.
    pub path: String,
    /// Archive or framework the object was pulled out of, if any. Objects
    /// without one are direct translation units of the binary itself.
    pub library: Option<String>,
    /// Display name: the archive member for `archive(member)` paths, the final
    /// path component otherwise.
    pub name: String,
}

impl ObjectRecord {
    pub fn new(index: u32, path: impl Into<String>) -> Self {
        let path = path.into();
        let filename = last_component(&path);

        let (library, name) = if filename.ends_with(')') {
            // archive(member) form. Frameworks win over the archive name.
            let archive = filename.split('(').next().unwrap_or(filename);
            let member = filename.rsplit('(').next().unwrap_or(filename);
            let member = &member[..member.len() - 1];
            let library = framework_name(&path).unwrap_or(archive);
            (Some(library.to_string()), member.to_string())
        } else {
            (None, filename.to_string())
        };

        Self {
            index,
            path,
            library,
            name,
        }
    }
}

/// An entry in the `# Sections:` table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SectionRecord {
    pub address: u64,
    pub size: u64,
    pub segment: String,
    pub section: String,
}

/// An entry in the `# Symbols:` table, including dead-stripped entries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolRecord {
    /// Placement address; 0 for dead symbols.
    pub address: u64,
    pub size: u64,
    /// Index of the owning `ObjectRecord`. Nothing guarantees a matching
    /// object exists.
    pub object_index: u32,
    pub name: String,
    /// The address column read `<<dead>>`: the linker stripped this symbol
    /// but still reported it.
    pub dead: bool,
}

/// Everything one parse learned about one linked binary.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinkMap {
    /// Path of the linked binary, from the `# Path:` header.
    pub path: String,
    /// Final component of `path`.
    pub name: String,
    /// Architecture from the `# Arch:` header, empty if there wasn't one.
    pub arch: String,
    pub objects: Vec<ObjectRecord>,
    pub sections: Vec<SectionRecord>,
    pub symbols: Vec<SymbolRecord>,
}

impl LinkMap {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = last_component(&path).to_string();
        Self {
            path,
            name,
            ..Self::default()
        }
    }

    /// Looks up an object by its table index.
    ///
    /// If the input repeated an index, the last record printed with it wins.
    pub fn object_by_index(&self, index: u32) -> Option<&ObjectRecord> {
        self.objects.iter().rev().find(|o| o.index == index)
    }

    /// Name of the group an object's symbols are attributed to: its library,
    /// or the binary itself for plain object files.
    pub fn library_of<'a>(&'a self, object: &'a ObjectRecord) -> &'a str {
        object.library.as_deref().unwrap_or(&self.name)
    }

    /// Counts and totals, as shown in an inspector's status line.
    pub fn summary(&self) -> Summary {
        let mut libraries: Vec<&str> = Vec::new();
        for o in &self.objects {
            let lib = self.library_of(o);
            if !libraries.contains(&lib) {
                libraries.push(lib);
            }
        }

        Summary {
            objects: self.objects.len(),
            sections: self.sections.len(),
            symbols: self.symbols.len(),
            dead_symbols: self.symbols.iter().filter(|s| s.dead).count(),
            libraries: libraries.len(),
            symbol_bytes: self
                .symbols
                .iter()
                .fold(0u64, |acc, s| acc.saturating_add(s.size)),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub objects: usize,
    pub sections: usize,
    pub symbols: usize,
    pub dead_symbols: usize,
    pub libraries: usize,
    /// Sum of every symbol's size, dead ones included.
    pub symbol_bytes: u64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} objects {} sections {} symbols {} libs",
            self.objects, self.sections, self.symbols, self.libraries,
        )
    }
}

fn last_component(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Finds `Name.framework` in a path, taking the last occurrence.
fn framework_name(path: &str) -> Option<&str> {
    const SUFFIX: &str = ".framework";
    let suffix_start = path.rfind(SUFFIX)?;
    let start = path[..suffix_start].rfind('/')? + 1;
    Some(&path[start..suffix_start + SUFFIX.len()])
}
