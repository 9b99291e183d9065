use std::{fmt, sync::Arc};

use codespan_reporting::files::Files;
use thiserror::Error;
use tracing::trace;

/// An offset into the global source space shared by all registered files.
pub type SourceOffset = u32;

/// The offset space is capped so offsets survive conversion to `i32`.
pub const MAX_SOURCE_OFFSET: SourceOffset = i32::MAX as SourceOffset;

/// Returned by [`SourceFileSet::add`] when the combined size of all registered
/// files no longer fits in the global offset space. This is fatal for the
/// translation unit; there is no way to address more source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("total registered source exceeds the addressable offset space")]
pub struct OffsetOverflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceFileId(usize);

/// A human-readable source position, displayed as `file:line:col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position<'a> {
    pub filename: &'a str,
    /// 1-based.
    pub line: u32,
    /// 1-based, in bytes.
    pub column: u32,
}

impl fmt::Display for Position<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    filename: String,
    source: Arc<str>,
    base: SourceOffset,
    /// Local offsets at which lines begin. `line_starts[0]` is always 0; the
    /// scanner appends the rest as it consumes newlines, so lookups are valid
    /// mid-scan.
    line_starts: Vec<SourceOffset>,
}

impl SourceFile {
    fn new(filename: String, source: Arc<str>, base: SourceOffset) -> Self {
        Self {
            filename,
            source,
            base,
            line_starts: vec![0],
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source(&self) -> &Arc<str> {
        &self.source
    }

    pub fn base(&self) -> SourceOffset {
        self.base
    }

    pub fn size(&self) -> SourceOffset {
        self.source.len() as SourceOffset
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Records that a new line begins at `local_offset`. Offsets must be
    /// added in strictly increasing order and lie within the file.
    pub fn add_line(&mut self, local_offset: SourceOffset) {
        debug_assert!(
            local_offset > *self.line_starts.last().unwrap(),
            "line starts must be registered in increasing order"
        );
        debug_assert!(local_offset <= self.size());
        self.line_starts.push(local_offset);
    }

    /// 1-based line and column for a local offset.
    ///
    /// An offset that sits exactly on the start of an empty trailing line
    /// (the byte just past a final newline) belongs to the previous line;
    /// this keeps the end-of-file marker of a newline-terminated file on its
    /// last real line.
    pub fn line_column(&self, local_offset: SourceOffset) -> (u32, u32) {
        assert!(
            local_offset <= self.size(),
            "offset {local_offset} lies past the end of {}",
            self.filename
        );
        let mut line = self.line_starts.partition_point(|&start| start <= local_offset);
        if line > 1 && self.line_starts[line - 1] == local_offset && local_offset == self.size() {
            line -= 1;
        }
        let start = self.line_starts[line - 1];
        (line as u32, local_offset - start + 1)
    }

    fn line_start(&self, line_index: usize) -> Result<usize, codespan_reporting::files::Error> {
        use std::cmp::Ordering;

        match line_index.cmp(&self.line_starts.len()) {
            Ordering::Less => Ok(self.line_starts[line_index] as usize),
            Ordering::Equal => Ok(self.source.len()),
            Ordering::Greater => Err(codespan_reporting::files::Error::LineTooLarge {
                given: line_index,
                max: self.line_starts.len() - 1,
            }),
        }
    }
}

/// An ordered, append-only registry of source files, each occupying a
/// disjoint `[base, base + size]` range of the global offset space. A
/// one-byte gap separates consecutive files so that every offset, including
/// a file's end-of-file offset, belongs to exactly one file.
#[derive(Debug, Clone, Default)]
pub struct SourceFileSet {
    files: Vec<SourceFile>,
    next_base: SourceOffset,
}

impl SourceFileSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a file at the current high-water offset and returns its id.
    pub fn add(
        &mut self,
        filename: impl Into<String>,
        source: impl Into<Arc<str>>,
    ) -> Result<SourceFileId, OffsetOverflow> {
        let filename = filename.into();
        let source = source.into();
        let end = self.next_base as u64 + source.len() as u64;
        if end > MAX_SOURCE_OFFSET as u64 {
            return Err(OffsetOverflow);
        }
        let id = SourceFileId(self.files.len());
        trace!(
            filename = %filename,
            base = self.next_base,
            size = source.len(),
            "registering source file"
        );
        self.files
            .push(SourceFile::new(filename, source, self.next_base));
        self.next_base = end as SourceOffset + 1;
        Ok(id)
    }

    /// Registers C source text, appending the trailing newline `.c`/`.h`
    /// files are guaranteed to have.
    pub fn add_c_source(
        &mut self,
        filename: impl Into<String>,
        text: &str,
    ) -> Result<SourceFileId, OffsetOverflow> {
        let filename = filename.into();
        let needs_newline = (filename.ends_with(".c") || filename.ends_with(".h"))
            && !text.is_empty()
            && !text.ends_with('\n');
        if needs_newline {
            let mut text = text.to_owned();
            text.push('\n');
            self.add(filename, text)
        } else {
            self.add(filename, text)
        }
    }

    pub fn get(&self, id: SourceFileId) -> &SourceFile {
        &self.files[id.0]
    }

    pub fn get_mut(&mut self, id: SourceFileId) -> &mut SourceFile {
        &mut self.files[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceFileId, &'_ SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(index, file)| (SourceFileId(index), file))
    }

    /// The file whose range contains `offset`. Offsets outside every
    /// registered range indicate a scanner bug and panic.
    pub fn file_at(&self, offset: SourceOffset) -> SourceFileId {
        let (mut lo, mut hi) = (0, self.files.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.files[mid].base <= offset {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        assert!(lo > 0, "offset {offset} precedes every registered file");
        let file = &self.files[lo - 1];
        assert!(
            offset <= file.base + file.size(),
            "offset {offset} lies in the gap after {}",
            file.filename
        );
        SourceFileId(lo - 1)
    }

    /// Converts a global offset into a `file:line:col` position.
    pub fn position(&self, offset: SourceOffset) -> Position<'_> {
        let file = self.get(self.file_at(offset));
        let (line, column) = file.line_column(offset - file.base);
        Position {
            filename: &file.filename,
            line,
            column,
        }
    }
}

impl<'f> Files<'f> for SourceFileSet {
    type FileId = SourceFileId;
    type Name = &'f str;
    type Source = &'f str;

    fn name(&'f self, id: Self::FileId) -> Result<Self::Name, codespan_reporting::files::Error> {
        Ok(&self.files[id.0].filename)
    }

    fn source(
        &'f self,
        id: Self::FileId,
    ) -> Result<Self::Source, codespan_reporting::files::Error> {
        Ok(&self.files[id.0].source)
    }

    fn line_index(
        &'f self,
        id: Self::FileId,
        byte_index: usize,
    ) -> Result<usize, codespan_reporting::files::Error> {
        Ok(self.files[id.0]
            .line_starts
            .binary_search(&(byte_index as SourceOffset))
            .unwrap_or_else(|next_line| next_line - 1))
    }

    fn line_range(
        &'f self,
        id: Self::FileId,
        line_index: usize,
    ) -> Result<std::ops::Range<usize>, codespan_reporting::files::Error> {
        let file = &self.files[id.0];
        let line_start = file.line_start(line_index)?;
        let next_line_start = file.line_start(line_index + 1)?;
        Ok(line_start..next_line_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bases_leave_a_gap_between_files() {
        let mut fset = SourceFileSet::new();
        let first = fset.add("a.c", "0123456789").unwrap();
        let second = fset.add("b.c", "01234567890123456789").unwrap();
        assert_eq!(fset.get(first).base(), 0);
        assert_eq!(fset.get(second).base(), 11);
        assert_eq!(fset.file_at(15), second);
        assert_eq!(fset.file_at(10), first);
    }

    #[test]
    fn lookup_never_crosses_into_another_file() {
        let mut fset = SourceFileSet::new();
        let first = fset.add("a.c", "aaa\n").unwrap();
        let second = fset.add("b.c", "bbb\n").unwrap();
        let b_base = fset.get(second).base();
        for local in 0..=fset.get(second).size() {
            assert_eq!(fset.file_at(b_base + local), second);
        }
        assert_eq!(fset.position(b_base).filename, "b.c");
        assert_ne!(fset.file_at(b_base), first);
    }

    #[test]
    fn offset_space_is_capped() {
        let mut fset = SourceFileSet::new();
        fset.add("a.c", "int x;\n").unwrap();
        // Pretend a gigantic file comes next.
        fset.next_base = MAX_SOURCE_OFFSET - 4;
        assert_eq!(fset.add("huge.c", "0123456789"), Err(OffsetOverflow));
    }

    #[test]
    fn incremental_line_table() {
        let mut fset = SourceFileSet::new();
        let id = fset.add("a.c", "abc\ndef\n ghi\n").unwrap();
        let file = fset.get_mut(id);
        file.add_line(4);
        file.add_line(8);
        file.add_line(13);

        let file = fset.get(id);
        assert_eq!(file.line_column(0), (1, 1));
        assert_eq!(file.line_column(4), (2, 1));
        assert_eq!(file.line_column(9), (3, 2));
        // End of file on the empty trailing line reports the last real line.
        assert_eq!(file.line_column(13), (3, 6));
    }

    #[test]
    fn display_is_file_line_col() {
        let mut fset = SourceFileSet::new();
        fset.add("main.c", "int main(void) {}\n").unwrap();
        assert_eq!(fset.position(4).to_string(), "main.c:1:5");
    }

    #[test]
    fn c_sources_gain_a_trailing_newline() {
        let mut fset = SourceFileSet::new();
        let id = fset.add_c_source("x.c", "int x;").unwrap();
        assert_eq!(&**fset.get(id).source(), "int x;\n");
        let id = fset.add_c_source("x.txt", "int x;").unwrap();
        assert_eq!(&**fset.get(id).source(), "int x;");
    }
}
