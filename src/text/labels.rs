//! Line-delimited label files: one label per line, blank lines skipped.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading label file {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn write_labels<P: AsRef<Path>>(path: P, labels: &[String]) -> Result<()> {
    let path = path.as_ref();
    let mut file = fs::File::create(path)
        .with_context(|| format!("creating label file {}", path.display()))?;
    for label in labels {
        writeln!(file, "{label}")
            .with_context(|| format!("writing label file {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("varspect-{}-{name}", std::process::id()))
    }

    #[test]
    fn labels_round_trip() {
        let path = temp_path("roundtrip.txt");
        let labels = vec!["spam".to_string(), "ham".to_string(), "spam".to_string()];

        write_labels(&path, &labels).unwrap();
        let read = read_labels(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(read, labels);
    }

    #[test]
    fn blank_lines_and_padding_are_dropped() {
        let path = temp_path("blanks.txt");
        std::fs::write(&path, "spam\n\n  ham  \n\n").unwrap();
        let read = read_labels(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(read, vec!["spam".to_string(), "ham".to_string()]);
    }

    #[test]
    fn missing_file_fails_with_path_context() {
        let err = read_labels("/nonexistent/varspect-labels.txt").unwrap_err();
        assert!(format!("{err:#}").contains("varspect-labels.txt"));
    }
}
