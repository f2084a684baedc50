use std::path::Path;

use crate::error::SourceError;

/// Lines of a text file as characters. Rows may have different lengths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextGrid {
    rows: Vec<Vec<char>>,
}

impl TextGrid {
    /// Splits on `\n` and `\r\n`; a trailing newline adds no empty row.
    pub fn parse(contents: &str) -> Self {
        Self {
            rows: contents.lines().map(|line| line.chars().collect()).collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<char>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

pub fn load_text(path: &Path) -> Result<TextGrid, SourceError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(TextGrid::parse(&contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn keeps_ragged_rows_and_inner_blanks() {
        let grid = TextGrid::parse("ab\r\n\n c\n");
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.rows()[0], vec!['a', 'b']);
        assert!(grid.rows()[1].is_empty());
        assert_eq!(grid.rows()[2], vec![' ', 'c']);
        assert_eq!(grid.rows().iter().map(Vec::len).sum::<usize>(), 4);
    }

    #[test_timeout::timeout]
    fn multibyte_characters_are_single_cells() {
        let grid = TextGrid::parse("█▀é");
        assert_eq!(grid.rows(), &[vec!['█', '▀', 'é']]);
    }

    #[test_timeout::timeout]
    fn missing_file_is_an_io_error() {
        let err = load_text(Path::new("/definitely/not/art.txt")).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
