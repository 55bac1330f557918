use crate::file::{IndexFile, IndexFunc, IndexType, IndexVar};
use bincode::Options;
use quarry_core::{base_name, Range};
use serde::{Deserialize, Serialize};
use std::io;

/// Current on-disk index format number. Bump on any layout change; older
/// payloads are rejected on load and treated as cache misses.
pub const INDEX_FILE_VERSION: i32 = 11;

/// Hard upper bound for any binary-encoded index payload read from disk.
///
/// Cache corruption should degrade to a cache miss, not an out-of-memory
/// crash, so corrupted length prefixes must not be able to request enormous
/// allocations.
pub const BINARY_PAYLOAD_LIMIT_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializeFormat {
    /// Pretty-printed textual tree: 2-space indent, arrays on a single line.
    Json,
    /// Compact packed binary.
    Binary,
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn bincode_options() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn bincode_options_limited() -> impl bincode::Options {
    bincode_options().with_limit(BINARY_PAYLOAD_LIMIT_BYTES as u64)
}

/// Serializes `file`, stamping the current format version first.
///
/// A type record keyed by the empty USR aggregates fundamental types; it has
/// no name of its own, so one is patched in before writing.
pub fn serialize(format: SerializeFormat, file: &mut IndexFile) -> Result<Vec<u8>, SerializeError> {
    file.version = INDEX_FILE_VERSION;
    apply_fundamental_fixup(file);

    match format {
        SerializeFormat::Json => {
            let mut out = Vec::new();
            let formatter = SingleLineArrayFormatter::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
            file.serialize(&mut ser)?;
            Ok(out)
        }
        SerializeFormat::Binary => Ok(bincode_options().serialize(file)?),
    }
}

/// Deserializes an index payload, returning `None` on parse failure or when
/// the embedded format version does not match `expected_version`.
pub fn deserialize(
    format: SerializeFormat,
    path: &str,
    bytes: &[u8],
    expected_version: i32,
) -> Option<IndexFile> {
    let mut file = match format {
        SerializeFormat::Json => {
            let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
            // Check the version before decoding the full document; a payload
            // from an older build may not even have today's field layout.
            if value.get("version")?.as_i64()? != i64::from(expected_version) {
                return None;
            }
            serde_json::from_value::<IndexFile>(value).ok()?
        }
        SerializeFormat::Binary => {
            if bytes.is_empty() {
                return None;
            }
            let file = match bincode_options_limited().deserialize::<IndexFile>(bytes) {
                Ok(file) => file,
                Err(err) => {
                    tracing::debug!(
                        target = "quarry.index",
                        path = %path,
                        error = %err,
                        "rejecting undecodable binary index payload"
                    );
                    return None;
                }
            };
            if file.version != expected_version {
                return None;
            }
            file
        }
    };

    file.restore_after_load(path);
    Some(file)
}

fn apply_fundamental_fixup(file: &mut IndexFile) {
    if let Some(&id) = file.id_cache.usr_to_type_id.get("") {
        let ty = &mut file.types[id.index()];
        debug_assert!(ty.uses.is_empty());
        ty.def.short_name = "<fundamental>".to_string();
    }
}

#[derive(Serialize)]
struct SnapshotInclude {
    line: u32,
    resolved_path: String,
}

/// Fixture-stable projection of an index file.
///
/// Volatile fields (version, mtime, language, import file, compile args,
/// dependency list) are dropped, and include paths are reduced to
/// `&`-prefixed basenames so snapshots do not depend on the machine the
/// index was produced on.
#[derive(Serialize)]
struct SnapshotFile<'a> {
    includes: Vec<SnapshotInclude>,
    skipped_by_preprocessor: &'a [Range],
    types: &'a [IndexType],
    funcs: &'a [IndexFunc],
    vars: &'a [IndexVar],
}

pub fn to_test_snapshot(file: &mut IndexFile) -> Result<String, SerializeError> {
    apply_fundamental_fixup(file);

    let includes = file
        .includes
        .iter()
        .map(|include| {
            let base = base_name(&include.resolved_path);
            let resolved_path = if include.resolved_path.starts_with('&') {
                base.to_string()
            } else {
                format!("&{base}")
            };
            SnapshotInclude {
                line: include.line,
                resolved_path,
            }
        })
        .collect();

    let snapshot = SnapshotFile {
        includes,
        skipped_by_preprocessor: &file.skipped_by_preprocessor,
        types: &file.types,
        funcs: &file.funcs,
        vars: &file.vars,
    };

    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SingleLineArrayFormatter::new());
    snapshot.serialize(&mut ser)?;
    Ok(String::from_utf8(out).expect("serde_json emits utf-8"))
}

/// Pretty JSON formatter that keeps arrays (and everything nested inside
/// them) on a single line. Objects outside arrays indent by two spaces.
struct SingleLineArrayFormatter {
    current_indent: usize,
    array_depth: usize,
    has_value: bool,
}

impl SingleLineArrayFormatter {
    fn new() -> Self {
        Self {
            current_indent: 0,
            array_depth: 0,
            has_value: false,
        }
    }

    fn write_indent<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        for _ in 0..self.current_indent {
            writer.write_all(b"  ")?;
        }
        Ok(())
    }
}

impl serde_json::ser::Formatter for SingleLineArrayFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.array_depth += 1;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.array_depth -= 1;
        writer.write_all(b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.current_indent -= 1;
        if self.array_depth == 0 && self.has_value {
            writer.write_all(b"\n")?;
            self.write_indent(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if self.array_depth > 0 {
            return if first {
                Ok(())
            } else {
                writer.write_all(b", ")
            };
        }
        if first {
            writer.write_all(b"\n")?;
        } else {
            writer.write_all(b",\n")?;
        }
        self.write_indent(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{IndexInclude, LanguageId};
    use pretty_assertions::assert_eq;
    use quarry_core::{Position, Range};

    fn sample_file() -> IndexFile {
        let mut file = IndexFile::new("/proj/src/a.cc");
        file.import_file = "/proj/src/a.cc".to_string();
        file.args = vec!["-std=c++17".to_string()];
        file.language = LanguageId::Cpp;
        file.last_modification_time = 1_600_000_000;
        file.includes.push(IndexInclude {
            line: 0,
            resolved_path: "/proj/src/h.h".to_string(),
        });
        file.dependencies.push("/proj/src/h.h".to_string());
        file.skipped_by_preprocessor.push(Range::for_line(12));

        let foo = file.type_id_for_usr("c:@S@Foo");
        file.type_mut(foo).def.short_name = "Foo".to_string();
        file.type_mut(foo).uses.push(Range::new(
            Position::new(4, 0),
            Position::new(4, 3),
        ));

        let main = file.func_id_for_usr("c:@F@main#");
        file.func_mut(main).def.short_name = "main".to_string();

        let var = file.var_id_for_usr("c:@a.cc@v");
        file.var_mut(var).def.short_name = "v".to_string();
        file
    }

    #[test]
    fn roundtrip_preserves_the_serialized_payload() {
        for format in [SerializeFormat::Json, SerializeFormat::Binary] {
            let mut file = sample_file();
            let bytes = serialize(format, &mut file).unwrap();
            let loaded = deserialize(format, &file.path, &bytes, INDEX_FILE_VERSION)
                .expect("payload should deserialize");
            assert_eq!(loaded, file);
        }
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        for format in [SerializeFormat::Json, SerializeFormat::Binary] {
            let mut file = sample_file();
            let bytes = serialize(format, &mut file).unwrap();
            assert!(deserialize(format, &file.path, &bytes, INDEX_FILE_VERSION + 1).is_none());
        }
    }

    #[test]
    fn garbage_is_a_miss() {
        assert!(deserialize(SerializeFormat::Json, "a.cc", b"{not json", INDEX_FILE_VERSION).is_none());
        assert!(deserialize(SerializeFormat::Binary, "a.cc", b"", INDEX_FILE_VERSION).is_none());
        assert!(
            deserialize(SerializeFormat::Binary, "a.cc", &[0xff; 16], INDEX_FILE_VERSION).is_none()
        );
    }

    #[test]
    fn binary_is_deterministic() {
        let mut file = sample_file();
        let first = serialize(SerializeFormat::Binary, &mut file).unwrap();
        let second = serialize(SerializeFormat::Binary, &mut file).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn json_keeps_arrays_on_one_line() {
        let mut file = sample_file();
        let bytes = serialize(SerializeFormat::Json, &mut file).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(text.contains("\n  \"version\": "));
        assert!(text.contains("\"args\": [\"-std=c++17\"]"));
        assert!(text.contains("\"dependencies\": [\"/proj/src/h.h\"]"));
    }

    #[test]
    fn test_snapshot_drops_volatile_fields_and_rewrites_includes() {
        let mut file = sample_file();
        let snapshot = to_test_snapshot(&mut file).unwrap();

        assert!(!snapshot.contains("version"));
        assert!(!snapshot.contains("last_modification_time"));
        assert!(!snapshot.contains("import_file"));
        assert!(!snapshot.contains("dependencies"));
        assert!(!snapshot.contains("-std=c++17"));
        assert!(snapshot.contains("\"&h.h\""));
    }

    #[test]
    fn test_snapshot_keeps_existing_ampersand_prefixes() {
        let mut file = IndexFile::new("/proj/a.cc");
        file.includes.push(IndexInclude {
            line: 3,
            resolved_path: "&h.h".to_string(),
        });
        let snapshot = to_test_snapshot(&mut file).unwrap();
        assert!(snapshot.contains("\"&h.h\""));
        assert!(!snapshot.contains("&&"));
    }

    #[test]
    fn fundamental_type_is_renamed_on_write() {
        let mut file = IndexFile::new("/proj/a.cc");
        file.type_id_for_usr("");
        let bytes = serialize(SerializeFormat::Json, &mut file).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("<fundamental>"));
    }
}
