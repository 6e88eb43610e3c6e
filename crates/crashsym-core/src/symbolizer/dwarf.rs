//! Symbolization against local debug files.
//!
//! Debug files live in a flat directory and are found by debug identifier
//! or by the basename of the image's code file. Parsed files are kept for
//! the lifetime of the symbolizer.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use addr2line::Context;
use crashsym_protocol::{HexValue, SymbolCandidate};
use debugid::DebugId;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use super::demangle::{demangle_symbol, detect_language, strip_symbol_prefix};
use super::{Candidates, SymbolizeRequest, Symbolizer};
use crate::error::{FailureReason, SymbolicationFailed};
use crate::types::DebugImage;

type OwnedReader = EndianArcSlice<RunTimeEndian>;

const DWARF_SECTIONS: &[(SectionId, &[&str])] = &[
    (SectionId::DebugAbbrev, &[".debug_abbrev", "__debug_abbrev"]),
    (SectionId::DebugAddr, &[".debug_addr", "__debug_addr"]),
    (SectionId::DebugInfo, &[".debug_info", "__debug_info"]),
    (SectionId::DebugLine, &[".debug_line", "__debug_line"]),
    (SectionId::DebugLineStr, &[".debug_line_str", "__debug_line_str"]),
    (SectionId::DebugRanges, &[".debug_ranges", "__debug_ranges"]),
    (SectionId::DebugRngLists, &[".debug_rnglists", "__debug_rnglists"]),
    (SectionId::DebugStr, &[".debug_str", "__debug_str"]),
    (SectionId::DebugStrOffsets, &[".debug_str_offsets", "__debug_str_offs", "__debug_str_offsets"]),
    (SectionId::DebugTypes, &[".debug_types", "__debug_types"]),
    (SectionId::DebugLoc, &[".debug_loc", "__debug_loc"]),
    (SectionId::DebugLocLists, &[".debug_loclists", "__debug_loclists"]),
];

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> Result<Arc<[u8]>, String>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| format!("failed to read {name}: {err}"))?;
            return Ok(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                Cow::Owned(vec) => vec.into(),
            });
        }
    }

    Ok(Arc::<[u8]>::from(Vec::new()))
}

/// Identifier of an object file in the form crash reports use.
///
/// Mach-O files carry a UUID and PE files a PDB signature. ELF build ids
/// are truncated to 16 bytes, with the first three fields byte-swapped on
/// little-endian files.
fn object_debug_id(file: &object::File<'_>) -> Option<DebugId>
{
    if let Ok(Some(uuid)) = file.mach_uuid() {
        return Some(DebugId::from_uuid(Uuid::from_bytes(uuid)));
    }
    if let Ok(Some(pdb)) = file.pdb_info() {
        return DebugId::from_guid_age(&pdb.guid(), pdb.age()).ok();
    }
    if let Ok(Some(build_id)) = file.build_id() {
        return elf_debug_id(build_id, file.is_little_endian());
    }
    None
}

fn elf_debug_id(build_id: &[u8], little_endian: bool) -> Option<DebugId>
{
    if build_id.is_empty() {
        return None;
    }
    let mut bytes = [0u8; 16];
    let len = build_id.len().min(16);
    bytes[..len].copy_from_slice(&build_id[..len]);
    if little_endian {
        bytes[0..4].reverse();
        bytes[4..6].reverse();
        bytes[6..8].reverse();
    }
    Some(DebugId::from_uuid(Uuid::from_bytes(bytes)))
}

/// A function symbol from the object's symbol table.
#[derive(Debug, Clone)]
struct SymbolEntry
{
    address: u64,
    size: u64,
    name: String,
}

/// Parsed debug file: DWARF line tables plus a sorted symbol table
struct DebugFile
{
    path: PathBuf,
    /// Identifier embedded in the file, if it has one.
    debug_id: Option<DebugId>,
    /// Added to image-relative addresses to get addresses inside the file.
    relative_base: u64,
    context: Option<Mutex<Context<OwnedReader>>>,
    symbols: Vec<SymbolEntry>,
}

impl DebugFile
{
    fn open(path: &Path) -> Result<Self, String>
    {
        let bytes = fs::read(path).map_err(|err| format!("failed to read {}: {err}", path.display()))?;
        let file = object::File::parse(&*bytes).map_err(|err| format!("failed to parse {}: {err}", path.display()))?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for (id, aliases) in DWARF_SECTIONS {
            sections.insert(*id, load_section_bytes(&file, aliases)?);
        }
        let has_debug_info = sections.get(&SectionId::DebugInfo).is_some_and(|data| !data.is_empty());

        let context = if has_debug_info {
            let dwarf = Dwarf::load(|id| {
                let data = sections
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
                Ok::<_, gimli::Error>(EndianArcSlice::new(data, endian))
            })
            .map_err(|err| format!("failed to load DWARF: {err}"))?;
            let context =
                Context::from_dwarf(dwarf).map_err(|err| format!("failed to build addr2line context: {err}"))?;
            Some(Mutex::new(context))
        } else {
            None
        };

        let mut symbols: Vec<SymbolEntry> = file
            .symbols()
            .filter(|symbol| symbol.kind() == SymbolKind::Text && symbol.address() != 0)
            .filter_map(|symbol| {
                let name = symbol.name().ok()?;
                (!name.is_empty()).then(|| SymbolEntry {
                    address: symbol.address(),
                    size: symbol.size(),
                    name: name.to_string(),
                })
            })
            .collect();
        symbols.sort_by_key(|entry| entry.address);

        debug!(
            path = %path.display(),
            dwarf = context.is_some(),
            symbols = symbols.len(),
            "loaded debug file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            debug_id: object_debug_id(&file),
            relative_base: file.relative_address_base(),
            context,
            symbols,
        })
    }

    /// `true` if the file belongs to `image`.
    ///
    /// A file without an embedded identifier is only accepted when it was
    /// found under the image's debug id.
    fn matches(&self, image: &DebugImage, named_by_id: bool) -> bool
    {
        let Some(actual) = self.debug_id else {
            return named_by_id;
        };
        let Ok(expected) = image.debug_id().parse::<DebugId>() else {
            return false;
        };
        expected.uuid() == actual.uuid() && (expected.appendix() == 0 || expected.appendix() == actual.appendix())
    }

    fn symbol_at(&self, file_addr: u64) -> Option<&SymbolEntry>
    {
        let position = self.symbols.partition_point(|entry| entry.address <= file_addr);
        let entry = self.symbols.get(position.checked_sub(1)?)?;
        (entry.size == 0 || file_addr < entry.address.saturating_add(entry.size)).then_some(entry)
    }

    /// Candidates for an image-relative address, caller-first.
    fn lookup(&self, rebased: u64, image: &DebugImage) -> Candidates
    {
        let file_addr = rebased.saturating_add(self.relative_base);
        let package = image.code_file().map(str::to_string);
        let symbol = self.symbol_at(file_addr);
        let symbol_addr = symbol.map(|entry| {
            HexValue(
                image
                    .start()
                    .value()
                    .saturating_add(entry.address.saturating_sub(self.relative_base)),
            )
        });

        let mut candidates = Candidates::new();
        if let Some(context) = &self.context {
            let context = context.lock();
            let frames = context.find_frames(file_addr).skip_all_loads();
            if let Ok(mut frames) = frames {
                while let Ok(Some(frame)) = frames.next() {
                    let Some(raw_name) = frame
                        .function
                        .as_ref()
                        .and_then(|function| function.raw_name().ok())
                    else {
                        continue;
                    };
                    let (abs_path, lineno) = frame
                        .location
                        .map(|location| (location.file.map(str::to_string), location.line))
                        .unwrap_or_default();

                    candidates.push(SymbolCandidate {
                        package: package.clone(),
                        lang: detect_language(&raw_name).as_lang().map(str::to_string),
                        symbol: Some(strip_symbol_prefix(&raw_name).to_string()),
                        function: Some(demangle_symbol(&raw_name)),
                        symbol_addr,
                        filename: abs_path.as_deref().map(file_name),
                        abs_path,
                        lineno,
                        ..SymbolCandidate::default()
                    });
                }
            };
        }

        if candidates.is_empty() {
            if let Some(entry) = symbol {
                candidates.push(SymbolCandidate {
                    package,
                    lang: detect_language(&entry.name).as_lang().map(str::to_string),
                    symbol: Some(strip_symbol_prefix(&entry.name).to_string()),
                    function: Some(demangle_symbol(&entry.name)),
                    symbol_addr,
                    ..SymbolCandidate::default()
                });
            }
        }

        // addr2line yields the innermost inlined function first
        candidates.reverse();
        trace!(path = %self.path.display(), file_addr, found = candidates.len(), "debug file lookup");
        candidates
    }
}

fn file_name(path: &str) -> String
{
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Symbolizer backed by a directory of debug files
///
/// A file is looked up as `{root}/{debug_id}`, `{root}/{debug_id without dashes}`,
/// `{root}/{code file basename}`, and finally at the absolute code file path.
/// Frames with remote or system matches, and frames whose image has no file,
/// go to the fallback symbolizer.
pub struct DwarfSymbolizer
{
    root: PathBuf,
    fallback: Box<dyn Symbolizer>,
    files: Mutex<HashMap<PathBuf, Result<Arc<DebugFile>, String>>>,
}

impl DwarfSymbolizer
{
    pub fn new(root: impl Into<PathBuf>, fallback: Box<dyn Symbolizer>) -> Self
    {
        Self {
            root: root.into(),
            fallback,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    /// Existing files that may hold debug information for `image`, in lookup order.
    ///
    /// The flag tells whether the file was found under the image's debug id.
    fn candidate_files(&self, image: &DebugImage) -> Vec<(PathBuf, bool)>
    {
        let debug_id = image.debug_id().to_ascii_lowercase();
        let mut candidates = vec![
            (self.root.join(&debug_id), true),
            (self.root.join(debug_id.replace('-', "")), true),
        ];
        if let Some(code_file) = image.code_file() {
            candidates.push((self.root.join(file_name(code_file)), false));
            let absolute = Path::new(code_file);
            if absolute.is_absolute() {
                candidates.push((absolute.to_path_buf(), false));
            }
        }
        candidates.retain(|(path, _)| path.is_file());
        candidates
    }

    /// Path of the first debug file candidate for `image`, if one exists.
    pub fn locate(&self, image: &DebugImage) -> Option<PathBuf>
    {
        self.candidate_files(image).into_iter().next().map(|(path, _)| path)
    }

    fn open(&self, path: &Path) -> Result<Arc<DebugFile>, String>
    {
        if let Some(cached) = self.files.lock().get(path) {
            return cached.clone();
        }
        let opened = DebugFile::open(path).map(Arc::new);
        self.files.lock().insert(path.to_path_buf(), opened.clone());
        opened
    }
}

impl Symbolizer for DwarfSymbolizer
{
    fn symbolize(&self, request: &SymbolizeRequest<'_>) -> Result<Candidates, SymbolicationFailed>
    {
        if !request.remote_matches.is_empty() || request.system_match.is_some() {
            return self.fallback.symbolize(request);
        }
        let Some(image) = request.image else {
            return self.fallback.symbolize(request);
        };
        let Some(rebased) = image.rebase(request.address) else {
            return self.fallback.symbolize(request);
        };
        for (path, named_by_id) in self.candidate_files(image) {
            let file = self.open(&path).map_err(|message| {
                SymbolicationFailed::new(FailureReason::MalformedDebugFile)
                    .with_image(image)
                    .with_message(message)
            })?;
            if !file.matches(image, named_by_id) {
                debug!(
                    path = %path.display(),
                    debug_id = image.debug_id(),
                    found = ?file.debug_id,
                    "skipping debug file of another build"
                );
                continue;
            }

            let candidates = file.lookup(rebased, image);
            if !candidates.is_empty() {
                return Ok(candidates);
            }
            break;
        }
        self.fallback.symbolize(request)
    }
}

impl std::fmt::Debug for DwarfSymbolizer
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("DwarfSymbolizer")
            .field("root", &self.root)
            .field("loaded", &self.files.lock().len())
            .finish_non_exhaustive()
    }
}
