use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::kicad_symbol::Symbol;
use super::reader::SymbolReader;
use super::writer::ToSExp;
use super::{FormatError, GENERATOR, SUPPORTED_VERSION};
use crate::parser::{self, format_number, SExp};

/// Where a library lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibrarySource {
    /// A single `.kicad_sym` file.
    #[default]
    File,
    /// A `.kicad_symdir` directory holding one symbol per file.
    Dir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    pub filename: PathBuf,
    pub version: String,
    pub generator: String,
    pub generator_version: Option<String>,
    pub symbols: Vec<Symbol>,
    /// Top-level nodes this model does not interpret.
    pub extra: Vec<SExp>,
    /// The source text used CRLF line endings.
    pub crlf: bool,
    pub source: LibrarySource,
}

impl Library {
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            version: SUPPORTED_VERSION.to_string(),
            generator: GENERATOR.to_string(),
            generator_version: None,
            symbols: Vec::new(),
            extra: Vec::new(),
            crlf: false,
            source: LibrarySource::File,
        }
    }

    /// Library name: the file stem without `.kicad_sym` / `.kicad_symdir`.
    pub fn libname(&self) -> String {
        libname_of(&self.filename)
    }

    /// Parse library text. Inheritance is resolved before returning.
    pub fn parse(text: &str, filename: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let mut library = Self::parse_unresolved(text, filename.into())?;
        library.resolve_inheritance()?;
        Ok(library)
    }

    fn parse_unresolved(text: &str, filename: PathBuf) -> Result<Self, FormatError> {
        let root = parser::parse(text)?;
        if root.keyword() != Some("kicad_symbol_lib") {
            return Err(FormatError::InvalidFormat(format!(
                "expected kicad_symbol_lib, found {}",
                root.keyword().unwrap_or("a non-list expression")
            )));
        }

        let version = match root.value_of("version") {
            Some(SExp::Number(v)) => format_number(*v),
            Some(other) => other.as_str().unwrap_or_default().to_string(),
            None => String::new(),
        };
        if version != SUPPORTED_VERSION {
            return Err(FormatError::VersionMismatch {
                found: version,
                expected: SUPPORTED_VERSION.to_string(),
            });
        }

        let mut library = Library::new(filename);
        library.crlf = text.contains("\r\n");
        let libname = library.libname();
        let mut seen = HashSet::new();

        for node in root.as_list().unwrap_or(&[]).iter().skip(1) {
            match node.keyword() {
                Some("version") => {}
                Some("generator") => {
                    if let Some(g) = node.as_list().and_then(|i| i.get(1)).and_then(SExp::as_str) {
                        library.generator = g.to_string();
                    }
                }
                Some("generator_version") => {
                    library.generator_version = node
                        .as_list()
                        .and_then(|i| i.get(1))
                        .map(|v| match v {
                            SExp::Number(n) => format_number(*n),
                            other => other.as_str().unwrap_or_default().to_string(),
                        });
                }
                Some("symbol") => {
                    let symbol = SymbolReader::read_symbol(node, &libname)?;
                    if !seen.insert(symbol.name.clone()) {
                        return Err(FormatError::DuplicateSymbol(symbol.name));
                    }
                    library.symbols.push(symbol);
                }
                _ => library.extra.push(node.clone()),
            }
        }

        tracing::debug!(
            "Parsed {} symbols from {}",
            library.symbols.len(),
            library.filename.display()
        );
        Ok(library)
    }

    pub fn from_file(path: &Path) -> Result<Self, FormatError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// Load a `.kicad_symdir` directory. Each `.kicad_sym` inside must hold
    /// at most one symbol; parents may live in sibling files.
    pub fn from_dir(path: &Path) -> Result<Self, FormatError> {
        let mut entries: Vec<PathBuf> = fs::read_dir(path)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == "kicad_sym"))
            .collect();
        entries.sort();

        let mut library = Library::new(path);
        library.source = LibrarySource::Dir;
        let libname = library.libname();
        let mut seen = HashSet::new();

        for entry in entries {
            let text = fs::read_to_string(&entry)?;
            let sub = Self::parse_unresolved(&text, entry.clone())?;
            if sub.symbols.len() > 1 {
                return Err(FormatError::InvalidFormat(format!(
                    "Found more than one symbols in: {}",
                    entry.display()
                )));
            }
            library.crlf |= sub.crlf;
            if library.symbols.is_empty() {
                library.generator = sub.generator.clone();
                library.generator_version = sub.generator_version.clone();
            }
            for mut symbol in sub.symbols {
                if !seen.insert(symbol.name.clone()) {
                    return Err(FormatError::DuplicateSymbol(symbol.name));
                }
                symbol.libname = libname.clone();
                library.symbols.push(symbol);
            }
        }

        library.resolve_inheritance()?;
        Ok(library)
    }

    /// Load either a library file or a `.kicad_symdir` directory.
    pub fn from_path(path: &Path) -> Result<Self, FormatError> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_file(path)
        }
    }

    pub fn add_symbol(&mut self, mut symbol: Symbol) -> Result<&mut Symbol, FormatError> {
        if self.get_symbol(&symbol.name).is_some() {
            return Err(FormatError::DuplicateSymbol(symbol.name));
        }
        symbol.libname = self.libname();
        self.symbols.push(symbol);
        let idx = self.symbols.len() - 1;
        Ok(&mut self.symbols[idx])
    }

    /// Compute every symbol's parent chain. The model is only updated when
    /// all chains resolve.
    pub fn resolve_inheritance(&mut self) -> Result<(), FormatError> {
        let by_name: HashMap<&str, &Symbol> =
            self.symbols.iter().map(|s| (s.name.as_str(), s)).collect();

        let mut chains = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            let mut chain: Vec<String> = Vec::new();
            let mut visited: HashSet<&str> = HashSet::from([symbol.name.as_str()]);
            let mut cursor = symbol;
            while let Some(parent) = cursor.extends.as_deref() {
                if parent == symbol.name {
                    return Err(if chain.is_empty() {
                        FormatError::SelfExtension(symbol.name.clone())
                    } else {
                        FormatError::CircularInheritance(symbol.name.clone())
                    });
                }
                if !visited.insert(parent) {
                    return Err(FormatError::CircularInheritance(symbol.name.clone()));
                }
                let parent_sym = by_name.get(parent).copied().ok_or_else(|| FormatError::MissingParent {
                    symbol: symbol.name.clone(),
                    parent: parent.to_string(),
                })?;
                chain.push(parent.to_string());
                cursor = parent_sym;
            }
            chains.push(chain);
        }

        for (symbol, chain) in self.symbols.iter_mut().zip(chains) {
            symbol.inheritance = chain;
        }
        Ok(())
    }

    pub fn get_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn get_symbol_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.iter_mut().find(|s| s.name == name)
    }

    /// Direct parent of a derived symbol.
    pub fn get_parent_symbol(&self, symbol: &Symbol) -> Option<&Symbol> {
        symbol.extends.as_deref().and_then(|p| self.get_symbol(p))
    }

    /// Last symbol of the `extends` chain starting at `name`; the symbol
    /// itself when it does not extend anything.
    pub fn get_root_symbol(&self, name: &str) -> Option<&Symbol> {
        let mut current = self.get_symbol(name)?;
        let mut visited = HashSet::from([current.name.as_str()]);
        while let Some(parent) = self.get_parent_symbol(current) {
            if !visited.insert(parent.name.as_str()) {
                return None;
            }
            current = parent;
        }
        Some(current)
    }

    /// Number of `extends` hops from `symbol` to its root.
    pub fn symbol_inheritance_depth(&self, symbol: &Symbol) -> Result<usize, FormatError> {
        let mut depth = 0;
        let mut visited = HashSet::from([symbol.name.as_str()]);
        let mut current = symbol;
        while let Some(parent) = current.extends.as_deref() {
            if !visited.insert(parent) {
                return Err(FormatError::CircularInheritance(symbol.name.clone()));
            }
            current = self.get_symbol(parent).ok_or_else(|| FormatError::MissingParent {
                symbol: current.name.clone(),
                parent: parent.to_string(),
            })?;
            depth += 1;
        }
        Ok(depth)
    }

    /// Every parent exists and appears before the symbols extending it.
    pub fn check_extends_order(&self) -> Result<(), FormatError> {
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if let Some(parent) = symbol.extends.as_deref() {
                if !seen.contains(parent) {
                    return Err(FormatError::MissingParent {
                        symbol: symbol.name.clone(),
                        parent: parent.to_string(),
                    });
                }
            }
            seen.insert(symbol.name.as_str());
        }
        Ok(())
    }

    /// Symbols ordered by inheritance depth, then name.
    fn ordered_symbols(&self) -> Result<Vec<&Symbol>, FormatError> {
        let mut keyed = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            keyed.push((self.symbol_inheritance_depth(symbol)?, symbol));
        }
        keyed.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.name.cmp(&b.name)));
        Ok(keyed.into_iter().map(|(_, s)| s).collect())
    }

    fn header(&self) -> Vec<SExp> {
        let mut items = vec![
            SExp::node("version", [self.version.parse().map(SExp::number).unwrap_or_else(|_| SExp::atom(self.version.as_str()))]),
            SExp::node("generator", [SExp::string(self.generator.as_str())]),
        ];
        if let Some(v) = &self.generator_version {
            items.push(SExp::node("generator_version", [SExp::string(v.as_str())]));
        }
        items.extend(self.extra.iter().cloned());
        items
    }

    pub fn to_sexp(&self) -> Result<SExp, FormatError> {
        let mut items = self.header();
        items.extend(self.ordered_symbols()?.into_iter().map(ToSExp::to_sexp));
        Ok(SExp::node("kicad_symbol_lib", items))
    }

    /// Canonical file text, LF line endings, single trailing newline.
    pub fn to_sexpr_string(&self) -> Result<String, FormatError> {
        Ok(parser::serialize(&self.to_sexp()?))
    }

    /// Overwrite the library at its own path.
    pub fn write(&self) -> Result<(), FormatError> {
        self.write_to(&self.filename)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), FormatError> {
        match self.source {
            LibrarySource::File => {
                fs::write(path, self.to_sexpr_string()?)?;
            }
            LibrarySource::Dir => {
                // validate the whole graph before touching any file
                self.ordered_symbols()?;
                fs::create_dir_all(path)?;
                for symbol in &self.symbols {
                    let mut items = self.header();
                    items.push(symbol.to_sexp());
                    let text = parser::serialize(&SExp::node("kicad_symbol_lib", items));
                    fs::write(path.join(format!("{}.kicad_sym", symbol.name)), text)?;
                }
            }
        }
        tracing::info!("Wrote library {}", path.display());
        Ok(())
    }
}

fn libname_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lib_text(body: &str) -> String {
        format!(
            "(kicad_symbol_lib (version 20251024) (generator \"kicad_symbol_editor\") \
             (generator_version \"9.0\") {})",
            body
        )
    }

    fn bare(name: &str, extends: Option<&str>) -> String {
        match extends {
            Some(p) => format!("(symbol \"{}\" (extends \"{}\") (property \"Reference\" \"U\" (at 0 0 0) (effects (font (size 1.27 1.27)))))", name, p),
            None => format!("(symbol \"{}\" (property \"Reference\" \"U\" (at 0 0 0) (effects (font (size 1.27 1.27)))))", name),
        }
    }

    #[test]
    fn test_version_mismatch() {
        let err = Library::parse("(kicad_symbol_lib (version 20231120))", "x.kicad_sym").unwrap_err();
        assert!(matches!(err, FormatError::VersionMismatch { ref found, .. } if found == "20231120"));
    }

    #[test]
    fn test_duplicate_symbol() {
        let text = lib_text(&format!("{} {}", bare("A", None), bare("A", None)));
        assert!(matches!(
            Library::parse(&text, "x.kicad_sym"),
            Err(FormatError::DuplicateSymbol(name)) if name == "A"
        ));
    }

    #[test]
    fn test_self_extension() {
        let text = lib_text(&bare("X", Some("X")));
        assert!(matches!(
            Library::parse(&text, "x.kicad_sym"),
            Err(FormatError::SelfExtension(_))
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let text = lib_text(&format!("{} {}", bare("X", Some("Y")), bare("Y", Some("X"))));
        assert!(matches!(
            Library::parse(&text, "x.kicad_sym"),
            Err(FormatError::CircularInheritance(_))
        ));
    }

    #[test]
    fn test_missing_parent() {
        let text = lib_text(&bare("X", Some("Nope")));
        assert!(matches!(
            Library::parse(&text, "x.kicad_sym"),
            Err(FormatError::MissingParent { parent, .. }) if parent == "Nope"
        ));
    }

    #[test]
    fn test_inheritance_ordering() {
        let text = lib_text(&format!(
            "{} {} {}",
            bare("C", Some("B")),
            bare("A", None),
            bare("B", Some("A"))
        ));
        let lib = Library::parse(&text, "x.kicad_sym").unwrap();
        assert!(lib.check_extends_order().is_err());

        let out = lib.to_sexpr_string().unwrap();
        let a = out.find("(symbol \"A\"").unwrap();
        let b = out.find("(symbol \"B\"").unwrap();
        let c = out.find("(symbol \"C\"").unwrap();
        assert!(a < b && b < c);

        let c_sym = lib.get_symbol("C").unwrap();
        assert_eq!(c_sym.inheritance(), ["B".to_string(), "A".to_string()]);
        assert_eq!(lib.get_root_symbol("C").unwrap().name, "A");
        assert_eq!(lib.symbol_inheritance_depth(c_sym).unwrap(), 2);

        let reordered = Library::parse(&out, "x.kicad_sym").unwrap();
        assert!(reordered.check_extends_order().is_ok());
    }

    #[test]
    fn test_legacy_name_prefix() {
        let text = lib_text("(symbol \"Device:R\")");
        let lib = Library::parse(&text, "Device.kicad_sym").unwrap();
        assert_eq!(lib.symbols[0].name, "R");
        assert_eq!(lib.symbols[0].libname, "Device");
    }

    #[test]
    fn test_unknown_nodes_preserved() {
        let text = lib_text("(future_thing 1 2) (symbol \"A\" (jumper_pin_groups (\"1\" \"2\")))");
        let lib = Library::parse(&text, "x.kicad_sym").unwrap();
        assert_eq!(lib.extra.len(), 1);
        assert_eq!(lib.symbols[0].extra.len(), 1);
        let out = lib.to_sexpr_string().unwrap();
        assert!(out.contains("(future_thing 1 2)"));
        assert!(out.contains("(jumper_pin_groups"));
    }

    #[test]
    fn test_crlf_detection() {
        let text = lib_text("").replace(' ', "\r\n");
        let lib = Library::parse(&text, "x.kicad_sym").unwrap();
        assert!(lib.crlf);
        assert!(!lib.to_sexpr_string().unwrap().contains('\r'));
    }
}
