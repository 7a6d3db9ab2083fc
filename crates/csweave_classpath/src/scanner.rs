use crate::classfile::{parse_class, ClassParseError, ParsedClass};
use crate::index::ClassIndex;
use std::env;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::ZipArchive;

/// Locations scanned to build the type index.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub java_home: Option<PathBuf>,
    pub classpath: Vec<PathBuf>,
    pub module_path: Vec<PathBuf>,
}

impl ScanContext {
    /// Context for the given classpath with the JDK detected from
    /// `JAVA_HOME` or the `java` executable on `PATH`.
    pub fn detect(classpath: &[String]) -> Self {
        Self {
            java_home: detect_java_home(),
            classpath: expand_classpath(classpath),
            module_path: Vec::new(),
        }
    }

    pub fn with_java_home(mut self, java_home: impl Into<PathBuf>) -> Self {
        self.java_home = Some(java_home.into());
        self
    }

    pub fn with_module_path<I>(mut self, module_path: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.module_path = module_path.into_iter().collect();
        self
    }

    pub fn add_classpath<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.classpath.extend(entries);
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error while scanning {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ZIP error while scanning {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
    #[error("Class parse error in {path}: {source}")]
    ClassFile {
        path: PathBuf,
        #[source]
        source: ClassParseError,
    },
    #[error("Path does not exist: {path}")]
    Missing { path: PathBuf },
}

/// A class read from disk together with where it came from.
#[derive(Debug, Clone)]
pub struct ScannedClass {
    pub origin: PathBuf,
    pub class: ParsedClass,
}

/// Whether unreadable class files abort the scan or are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Advice roots: every class must parse.
    Strict,
    /// Classpath entries: broken classes are logged and skipped.
    Lenient,
}

pub struct ClasspathScanner<'a> {
    context: &'a ScanContext,
}

impl<'a> ClasspathScanner<'a> {
    pub fn new(context: &'a ScanContext) -> Self {
        Self { context }
    }

    /// Indexes the module path (or the JDK's `jmods`) followed by the classpath.
    pub fn build_index(&self) -> Result<ClassIndex, IndexError> {
        let mut index = ClassIndex::new();
        let mut artifacts = self.resolve_module_artifacts()?;
        artifacts.extend(self.context.classpath.iter().cloned());

        for path in &artifacts {
            if !path.exists() {
                warn!(path = %path.display(), "classpath entry does not exist");
                continue;
            }
            scan_path(path, ScanMode::Lenient, &mut |scanned| {
                index.add_class(&scanned.class)
            })?;
        }

        debug!(types = index.len(), artifacts = artifacts.len(), "class index built");
        Ok(index)
    }

    fn resolve_module_artifacts(&self) -> Result<Vec<PathBuf>, IndexError> {
        let mut artifacts = Vec::new();

        if !self.context.module_path.is_empty() {
            for entry in &self.context.module_path {
                collect_artifact(entry, &mut artifacts)?;
            }
        } else if let Some(java_home) = &self.context.java_home {
            let jmods_dir = java_home.join("jmods");
            if jmods_dir.exists() {
                collect_artifact(&jmods_dir, &mut artifacts)?;
            }
        }

        Ok(artifacts)
    }
}

/// Reads every class under the given roots; any unreadable class is an error.
pub fn scan_roots(roots: &[PathBuf]) -> Result<Vec<ScannedClass>, IndexError> {
    let mut classes = Vec::new();
    for root in roots {
        if !root.exists() {
            return Err(IndexError::Missing { path: root.clone() });
        }
        scan_path(root, ScanMode::Strict, &mut |scanned| classes.push(scanned))?;
    }
    Ok(classes)
}

/// Visits every class file reachable from `path` (directory, archive or single class).
pub fn scan_path(
    path: &Path,
    mode: ScanMode,
    visit: &mut dyn FnMut(ScannedClass),
) -> Result<(), IndexError> {
    if path.is_dir() {
        return scan_directory(path, mode, visit);
    }
    if is_archive(path) {
        return scan_archive(path, mode, visit);
    }
    if is_class_file(path) {
        let bytes = read_file(path)?;
        return index_class_bytes(&bytes, path.to_path_buf(), mode, visit);
    }
    Ok(())
}

fn scan_directory(
    root: &Path,
    mode: ScanMode,
    visit: &mut dyn FnMut(ScannedClass),
) -> Result<(), IndexError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|error| IndexError::Io {
            path: error
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source: error
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop")),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    // Stable visiting order keeps downstream output deterministic.
    files.sort();

    for path in files {
        if is_archive(&path) {
            scan_archive(&path, mode, visit)?;
        } else if is_class_file(&path) && !is_module_info(&path.to_string_lossy()) {
            let bytes = read_file(&path)?;
            index_class_bytes(&bytes, path, mode, visit)?;
        }
    }
    Ok(())
}

fn scan_archive(
    path: &Path,
    mode: ScanMode,
    visit: &mut dyn FnMut(ScannedClass),
) -> Result<(), IndexError> {
    let file = File::open(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|source| IndexError::Zip {
        path: path.to_path_buf(),
        source,
    })?;

    let mut buffer = Vec::new();
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx).map_err(|source| IndexError::Zip {
            path: path.to_path_buf(),
            source,
        })?;

        if !entry.is_file() {
            continue;
        }

        let name = entry.name().to_string();
        if should_skip_entry(&name) || is_module_info(&name) || !name.ends_with(".class") {
            continue;
        }

        buffer.clear();
        entry
            .read_to_end(&mut buffer)
            .map_err(|source| IndexError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        index_class_bytes(&buffer, archive_entry_path(path, &name), mode, visit)?;
    }

    Ok(())
}

fn index_class_bytes(
    bytes: &[u8],
    origin: PathBuf,
    mode: ScanMode,
    visit: &mut dyn FnMut(ScannedClass),
) -> Result<(), IndexError> {
    match parse_class(bytes) {
        Ok(class) => {
            visit(ScannedClass { origin, class });
            Ok(())
        }
        Err(source) if mode == ScanMode::Lenient => {
            warn!(path = %origin.display(), error = %source, "skipping unreadable class");
            Ok(())
        }
        Err(source) => Err(IndexError::ClassFile {
            path: origin,
            source,
        }),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, IndexError> {
    fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn detect_java_home() -> Option<PathBuf> {
    if let Ok(path) = env::var("JAVA_HOME") {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(java_path) = which::which("java") {
        let resolved = fs::canonicalize(&java_path).unwrap_or(java_path);
        if let Some(home) = resolved.parent().and_then(Path::parent) {
            return Some(home.to_path_buf());
        }
    }

    None
}

/// Splits platform-separated classpath strings into individual entries.
pub fn expand_classpath(raw: &[String]) -> Vec<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };
    raw.iter()
        .flat_map(|entry| entry.split(separator))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn collect_artifact(path: &Path, out: &mut Vec<PathBuf>) -> Result<(), IndexError> {
    if !path.exists() {
        return Ok(());
    }

    if path.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }

    let entries = fs::read_dir(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entry_path = entry.path();
        if entry_path.is_file() {
            found.push(entry_path);
        }
    }
    found.sort();
    out.extend(found);

    Ok(())
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| matches_ignore_case(ext, &["jar", "zip", "jmod"]))
        .unwrap_or(false)
}

fn is_class_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case("class"))
        .unwrap_or(false)
}

fn is_module_info(name: &str) -> bool {
    name == "module-info.class" || name.ends_with("/module-info.class")
}

fn matches_ignore_case(candidate: &str, values: &[&str]) -> bool {
    values
        .iter()
        .any(|value| candidate.eq_ignore_ascii_case(value))
}

fn should_skip_entry(name: &str) -> bool {
    if name.starts_with("META-INF/") {
        return true;
    }
    if let Some(stripped) = name.strip_prefix("classes/") {
        return should_skip_entry(stripped);
    }
    false
}

fn archive_entry_path(archive: &Path, entry: &str) -> PathBuf {
    let mut display = archive.display().to_string();
    display.push_str("!/");
    display.push_str(entry);
    PathBuf::from(display)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::ClassFileBuilder;
    use crate::index::TypeIndex;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::FileOptions;

    fn write_class(dir: &Path, fqcn: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(format!("{}.class", fqcn.replace('.', "/")));
        fs::create_dir_all(path.parent().expect("class parent")).expect("create package dirs");
        fs::write(&path, bytes).expect("write class");
        path
    }

    #[test]
    fn indexes_directories_and_archives() {
        let dir = tempdir().expect("tempdir");
        let classes = dir.path().join("classes");
        write_class(
            &classes,
            "com.acme.Alpha",
            &ClassFileBuilder::new("com.acme.Alpha").build(),
        );

        let jar_path = dir.path().join("lib.jar");
        let mut jar = zip::ZipWriter::new(File::create(&jar_path).expect("create jar"));
        jar.start_file("META-INF/MANIFEST.MF", FileOptions::default())
            .expect("manifest entry");
        jar.write_all(b"Manifest-Version: 1.0\n").expect("write manifest");
        jar.start_file("com/acme/Beta.class", FileOptions::default())
            .expect("class entry");
        jar.write_all(&ClassFileBuilder::new("com.acme.Beta").build())
            .expect("write class entry");
        jar.finish().expect("finish jar");

        let context = ScanContext {
            java_home: None,
            classpath: vec![classes, jar_path, dir.path().join("missing.jar")],
            module_path: Vec::new(),
        };
        let index = ClasspathScanner::new(&context)
            .build_index()
            .expect("build index");

        assert!(index.lookup_type("com.acme.Alpha").is_some());
        assert!(index.lookup_type("com.acme.Beta").is_some());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn lenient_scan_skips_broken_classes_but_strict_scan_fails() {
        let dir = tempdir().expect("tempdir");
        write_class(dir.path(), "com.acme.Broken", b"not a class file");
        write_class(
            dir.path(),
            "com.acme.Good",
            &ClassFileBuilder::new("com.acme.Good").build(),
        );

        let context = ScanContext {
            classpath: vec![dir.path().to_path_buf()],
            ..ScanContext::default()
        };
        let index = ClasspathScanner::new(&context)
            .build_index()
            .expect("lenient scan");
        assert!(index.lookup_type("com.acme.Good").is_some());

        let error = scan_roots(&[dir.path().to_path_buf()]).expect_err("strict scan");
        assert!(matches!(error, IndexError::ClassFile { .. }));
    }

    #[test]
    fn scan_roots_reports_missing_root() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_roots(&[missing]),
            Err(IndexError::Missing { .. })
        ));
    }

    #[test]
    fn expand_classpath_splits_entries() {
        let separator = if cfg!(windows) { ";" } else { ":" };
        let raw = vec![format!("a.jar{separator}b.jar"), " ".to_string(), "c".to_string()];
        assert_eq!(
            expand_classpath(&raw),
            vec![
                PathBuf::from("a.jar"),
                PathBuf::from("b.jar"),
                PathBuf::from("c")
            ]
        );
    }
}
