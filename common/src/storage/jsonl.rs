use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Lines, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

/// Lazily decodes one JSON value per line. Blank lines are skipped.
pub struct JsonlReader<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(path.display().to_string())
            } else {
                AppError::Io(err)
            }
        })?;

        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            _marker: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for JsonlReader<T> {
    type Item = Result<T, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let raw = match line {
                Ok(raw) => raw,
                Err(err) => return Some(Err(AppError::Io(err))),
            };
            if raw.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&raw).map_err(|err| {
                AppError::Validation(format!(
                    "parsing JSON on line {} of {}: {err}",
                    self.line_no,
                    self.path.display()
                ))
            }));
        }
    }
}

/// Buffered line-delimited JSON writer.
pub struct JsonlWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            written: 0,
        })
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), AppError> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flushes buffered lines and returns how many were written.
    pub fn finish(mut self) -> Result<usize, AppError> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    #[test]
    fn writes_and_reads_lines_skipping_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/records.jsonl");

        let mut writer = JsonlWriter::create(&path).unwrap();
        writer.write(&json!({"text": "a cake"})).unwrap();
        writer.write(&json!({"text": "a tart"})).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("\n   \n");
        fs::write(&path, raw).unwrap();

        let rows: Vec<Value> = JsonlReader::open(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows, vec![json!({"text": "a cake"}), json!({"text": "a tart"})]);
    }

    #[test]
    fn reports_line_number_of_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"text\": \"ok\"}\n\n{broken\n").unwrap();

        let results: Vec<Result<Value, AppError>> = JsonlReader::open(&path).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(AppError::Validation(message)) => assert!(message.contains("line 3")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = JsonlReader::<Value>::open(dir.path().join("absent.jsonl"))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
