//! Seekable line file
//!
//! Newline-delimited text file with an in-memory index of line lengths, so
//! seeking to the start of line `n` is a single lookup instead of a scan.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, TubError};

const NEWLINE: u8 = b'\n';

/// Append/read access to a newline-delimited file with O(1) line addressing
///
/// Line numbers are 1-based. `line_lengths[i]` is the byte length of line
/// `i + 1` including its trailing newline; `cumulative_lengths[i]` is the
/// byte offset just past that line.
#[derive(Debug)]
pub struct Seekable {
    path: PathBuf,
    file: File,
    read_only: bool,
    line_lengths: Vec<u64>,
    cumulative_lengths: Vec<u64>,
    total_length: u64,
}

impl Seekable {
    /// Open (or create, unless read-only) a line file
    ///
    /// A non-empty `line_lengths` is checked against the file and adopted.
    /// Without one, or when the check fails, the whole file is scanned once
    /// to rebuild it.
    pub fn open(path: &Path, read_only: bool, line_lengths: Option<&[u64]>) -> Result<Self> {
        let file = if read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        };

        let mut seekable = Self {
            path: path.to_path_buf(),
            file,
            read_only,
            line_lengths: Vec::new(),
            cumulative_lengths: Vec::new(),
            total_length: 0,
        };

        match line_lengths {
            Some(lengths) if !lengths.is_empty() => seekable.restore_index(lengths)?,
            _ => seekable.read_contents()?,
        }

        seekable.seek_end_of_file()?;
        Ok(seekable)
    }

    /// Adopt a persisted index if it still describes the file
    ///
    /// A size mismatch or an indexed line that does not end in a newline
    /// means the index cannot be trusted (torn append, damaged line); the file
    /// is rescanned instead. A rescan in writable mode drops a torn tail.
    fn restore_index(&mut self, lengths: &[u64]) -> Result<()> {
        for &length in lengths {
            self.push_length(length);
        }

        let file_len = self.file.metadata()?.len();
        if file_len != self.total_length {
            warn!(
                path = %self.path.display(),
                indexed = self.total_length,
                actual = file_len,
                "Line index does not match the file size; rescanning"
            );
            return self.read_contents();
        }

        if !self.line_ends_intact()? {
            warn!(
                path = %self.path.display(),
                "Line index does not match line boundaries; rescanning"
            );
            return self.read_contents();
        }

        Ok(())
    }

    /// Whether every indexed line ends with a newline where the index says
    fn line_ends_intact(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        for &end in &self.cumulative_lengths {
            if end == 0 {
                return Ok(false);
            }
            self.file.seek(SeekFrom::Start(end - 1))?;
            self.file.read_exact(&mut byte)?;
            if byte[0] != NEWLINE {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Rebuild the line index by scanning the whole file
    fn read_contents(&mut self) -> Result<()> {
        self.line_lengths.clear();
        self.cumulative_lengths.clear();
        self.total_length = 0;

        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&self.file);
        let mut buf = Vec::new();
        let mut lengths = Vec::new();
        let mut torn_tail = 0;

        loop {
            buf.clear();
            let n = reader.read_until(NEWLINE, &mut buf)?;
            if n == 0 {
                break;
            }
            if buf.last() != Some(&NEWLINE) && !self.read_only {
                torn_tail = n as u64;
                break;
            }
            lengths.push(n as u64);
        }
        drop(reader);

        for length in lengths {
            self.push_length(length);
        }

        if torn_tail > 0 {
            warn!(
                path = %self.path.display(),
                bytes = torn_tail,
                "Dropping trailing line without newline"
            );
            self.file.set_len(self.total_length)?;
        }

        Ok(())
    }

    fn push_length(&mut self, length: u64) {
        self.total_length += length;
        self.line_lengths.push(length);
        self.cumulative_lengths.push(self.total_length);
    }

    /// Append a line, adding the trailing newline if absent
    ///
    /// The bytes are handed to the OS before returning; there is no fsync.
    pub fn writeline(&mut self, contents: &str) -> Result<()> {
        if self.read_only {
            return Err(TubError::ReadOnly(self.path.clone()));
        }

        let body = contents.strip_suffix('\n').unwrap_or(contents);
        if body.contains('\n') {
            return Err(TubError::Storage(format!(
                "refusing to write a multi-line record to {}",
                self.path.display()
            )));
        }

        let mut line = Vec::with_capacity(body.len() + 1);
        line.extend_from_slice(body.as_bytes());
        line.push(NEWLINE);

        self.file.seek(SeekFrom::Start(self.total_length))?;
        self.file.write_all(&line)?;
        self.file.flush()?;
        self.push_length(line.len() as u64);

        Ok(())
    }

    /// Read the line at the current position, without its line terminator
    ///
    /// Returns `None` once the position reaches the end of the indexed data.
    pub fn readline(&mut self) -> Result<Option<String>> {
        let position = self.file.stream_position()?;
        if position >= self.total_length {
            return Ok(None);
        }

        let line = self.cumulative_lengths.partition_point(|&end| end <= position);
        let end = self.cumulative_lengths[line];

        let mut buf = vec![0u8; (end - position) as usize];
        self.file.read_exact(&mut buf)?;

        let contents = String::from_utf8_lossy(&buf);
        Ok(Some(contents.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Position the file at the first byte of line `line_number`
    ///
    /// Line numbers past the end position at end of file.
    pub fn seek_line_start(&mut self, line_number: usize) -> Result<()> {
        let offset = self.offset_until(line_number.saturating_sub(1));
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn seek_end_of_file(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.total_length))?;
        Ok(())
    }

    /// Byte offset just past the first `lines` lines
    fn offset_until(&self, lines: usize) -> u64 {
        match lines {
            0 => 0,
            n if n <= self.cumulative_lengths.len() => self.cumulative_lengths[n - 1],
            _ => self.total_length,
        }
    }

    /// Keep the first `line_number` lines and drop everything after them
    pub fn truncate_until_end(&mut self, line_number: usize) -> Result<()> {
        if self.read_only {
            return Err(TubError::ReadOnly(self.path.clone()));
        }

        let keep = line_number.min(self.line_lengths.len());
        self.line_lengths.truncate(keep);
        self.cumulative_lengths.truncate(keep);
        self.total_length = self.cumulative_lengths.last().copied().unwrap_or(0);

        self.file.set_len(self.total_length)?;
        self.seek_end_of_file()
    }

    /// All lines from `line_number` to the end; the file position is restored
    pub fn read_from(&mut self, line_number: usize) -> Result<Vec<String>> {
        let current_offset = self.file.stream_position()?;
        self.seek_line_start(line_number)?;

        let mut lines = Vec::new();
        while let Some(line) = self.readline()? {
            lines.push(line);
        }

        self.file.seek(SeekFrom::Start(current_offset))?;
        Ok(lines)
    }

    /// Replace line `line_number`, rewriting every line after it
    ///
    /// Costs O(remaining lines); this is the only in-place update.
    pub fn update_line(&mut self, line_number: usize, contents: &str) -> Result<()> {
        let line_number = line_number.max(1);
        let lines = self.read_from(line_number)?;
        self.truncate_until_end(line_number - 1)?;
        self.writeline(contents)?;
        for line in lines.iter().skip(1) {
            self.writeline(line)?;
        }
        Ok(())
    }

    /// Number of indexed lines
    pub fn lines(&self) -> usize {
        self.line_lengths.len()
    }

    pub fn has_content(&self) -> bool {
        self.lines() > 0
    }

    pub fn line_lengths(&self) -> &[u64] {
        &self.line_lengths
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current byte position of the underlying file
    pub fn position(&mut self) -> Result<u64> {
        Ok(self.file.stream_position()?)
    }

    /// Flush and release the file handle
    pub fn close(mut self) -> Result<()> {
        if !self.read_only {
            self.file.flush()?;
        }
        Ok(())
    }
}
