//! Lazy reader over the recipient CSV.
//!
//! Only the first field of every row is of interest. Rows are decoded one at a
//! time as they are consumed, so a decoding error surfaces at the row that
//! holds it, after every earlier row has been handed out.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("CSV file '{}' not found.", .0.display())]
    NotFound(PathBuf),

    #[error("row {row} of '{}' is not valid UTF-8: {detail}", path.display())]
    Encoding {
        path: PathBuf,
        row: usize,
        detail: String,
    },

    #[error("Unable to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// The first field of a non-empty row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// 1-based line on which the row starts.
    pub row: usize,
    pub address: String,
}

pub struct RecipientSource {
    path: PathBuf,
    reader: BufReader<File>,
    line: usize,
}

impl RecipientSource {
    /// Opens `path` for reading.
    ///
    /// # Errors
    ///
    /// [`SourceError::NotFound`] if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|e| SourceError::from_io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            line: 0,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the next row's first field, skipping rows without fields.
    ///
    /// # Errors
    ///
    /// [`SourceError::Encoding`] if the row is not valid UTF-8, and
    /// [`SourceError::Io`] if reading fails.
    pub async fn next_candidate(&mut self) -> Result<Option<Candidate>, SourceError> {
        loop {
            let Some(mut record) = self.next_line().await? else {
                return Ok(None);
            };
            let row = self.line;

            let address = loop {
                match first_field(&record) {
                    FirstField::Empty => break None,
                    FirstField::Field(field) => break Some(field),
                    // A quoted field runs on to the following line
                    FirstField::Unterminated(partial) => match self.next_line().await? {
                        Some(next) => record.push_str(&next),
                        None => break Some(partial),
                    },
                }
            };

            if let Some(address) = address {
                return Ok(Some(Candidate { row, address }));
            }
        }
    }

    /// Collects every remaining candidate.
    ///
    /// # Errors
    ///
    /// See [`next_candidate`](Self::next_candidate).
    pub async fn candidates(mut self) -> Result<Vec<Candidate>, SourceError> {
        let mut candidates = Vec::new();
        while let Some(candidate) = self.next_candidate().await? {
            candidates.push(candidate);
        }
        Ok(candidates)
    }

    /// Reads one physical line, line ending included, decoded as UTF-8.
    async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        let mut bytes = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut bytes)
            .await
            .map_err(|e| SourceError::from_io(&self.path, e))?;

        if read == 0 {
            return Ok(None);
        }

        self.line += 1;

        let mut text = bytes.as_slice();
        if self.line == 1 {
            text = self.strip_bom(text)?;
        }

        std::str::from_utf8(text)
            .map(|line| Some(line.to_string()))
            .map_err(|e| SourceError::Encoding {
                path: self.path.clone(),
                row: self.line,
                detail: e.to_string(),
            })
    }

    /// Drops a UTF-8 byte-order mark. Any other mark means the file is not UTF-8.
    fn strip_bom<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8], SourceError> {
        match encoding_rs::Encoding::for_bom(bytes) {
            None => Ok(bytes),
            Some((encoding, length)) if encoding == encoding_rs::UTF_8 => Ok(&bytes[length..]),
            Some((encoding, _)) => Err(SourceError::Encoding {
                path: self.path.clone(),
                row: 1,
                detail: format!("file starts with a {} byte-order mark", encoding.name()),
            }),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FirstField {
    /// The row has no fields at all.
    Empty,
    Field(String),
    /// A quoted field is still open at the end of the input seen so far.
    Unterminated(String),
}

/// Extracts the first comma-separated field of a record, honouring quotes.
///
/// Inside quotes a doubled `""` stands for one `"`; anything between the
/// closing quote and the next comma is kept as part of the field.
fn first_field(record: &str) -> FirstField {
    let line = record
        .strip_suffix('\n')
        .map_or(record, |line| line.strip_suffix('\r').unwrap_or(line));

    if line.is_empty() {
        return FirstField::Empty;
    }

    let Some(quoted) = line.strip_prefix('"') else {
        let field = line.split_once(',').map_or(line, |(first, _)| first);
        return FirstField::Field(field.to_string());
    };

    let mut field = String::new();
    let mut chars = quoted.chars().peekable();

    loop {
        match chars.next() {
            None => {
                // The line ending belongs to the quoted field
                let mut partial = field;
                partial.push_str(&record[line.len()..]);
                return FirstField::Unterminated(partial);
            }
            Some('"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            Some('"') => break,
            Some(c) => field.push(c),
        }
    }

    field.extend(chars.take_while(|&c| c != ','));
    FirstField::Field(field)
}
