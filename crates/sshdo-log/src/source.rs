//! Opens a log file for line-by-line streaming, transparently decompressing
//! gzip input and treating `-` as standard input (§4.5).

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use camino::Utf8PathBuf;
use flate2::read::MultiGzDecoder;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// An error opening a log source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Open `path` (or stdin, for `-`) and return an iterator over its lines,
/// decompressing transparently if the content starts with the gzip magic
/// number, regardless of file extension.
pub fn open_lines(path: &str) -> Result<Box<dyn Iterator<Item = io::Result<String>>>, SourceError> {
    let reader: Box<dyn Read> = if path == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(path).map_err(|e| SourceError::Io {
            path: path.to_string(),
            source: e,
        })?)
    };

    let mut reader = BufReader::new(reader);
    let mut peek = [0u8; 2];
    let n = peek_bytes(&mut reader, &mut peek).map_err(|e| SourceError::Io {
        path: path.to_string(),
        source: e,
    })?;

    let full: Box<dyn Read> = if n == 2 && peek == GZIP_MAGIC {
        Box::new(MultiGzDecoder::new(io::Cursor::new(peek).chain(reader)))
    } else {
        Box::new(io::Cursor::new(peek[..n].to_vec()).chain(reader))
    };

    Ok(Box::new(BufReader::new(full).lines()))
}

/// Fill `buf` with up to `buf.len()` bytes without consuming them from a
/// caller's perspective beyond what's returned; the caller re-chains
/// whatever was read back onto the stream.
fn peek_bytes(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Expand a set of glob patterns (§3 `logfiles`) against the filesystem,
/// returning matching paths in lexical order, deduplicated.
pub fn expand_globs(patterns: &[String]) -> Vec<Utf8PathBuf> {
    // Kept intentionally simple: callers resolve a small, fixed set of
    // globs (typically one), not an open-ended tree walk.
    let mut out = Vec::new();
    for pattern in patterns {
        out.extend(expand_one_glob(pattern));
    }
    out.sort();
    out.dedup();
    out
}

fn expand_one_glob(pattern: &str) -> Vec<Utf8PathBuf> {
    let path = std::path::Path::new(pattern);
    let (dir, file_glob) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) if !dir.as_os_str().is_empty() => {
            (dir.to_path_buf(), name.to_string_lossy().into_owned())
        }
        _ => (std::path::PathBuf::from("."), pattern.to_string()),
    };

    let Ok(matcher) = globset::Glob::new(&file_glob) else {
        return Vec::new();
    };
    let matcher = matcher.compile_matcher();

    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| matcher.is_match(name))
        })
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .collect()
}
