use std::path::Path;

use serde_json::Value;

use crate::store::models::UploadedFile;

/// Reads a local file into an [`UploadedFile`]. A `.json` file holding an
/// array contributes its elements as rows; anything else contributes one
/// string row per non-empty line.
pub fn load_file(path: &Path) -> std::io::Result<UploadedFile> {
    let raw = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    Ok(from_text(name, &extension, &raw))
}

pub fn from_text(name: String, extension: &str, raw: &str) -> UploadedFile {
    let json_rows = if extension == "json" {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(rows)) => Some(rows),
            Ok(other) => Some(vec![other]),
            Err(_) => None,
        }
    } else {
        None
    };

    let (file_type, content) = match json_rows {
        Some(rows) => ("application/json", rows),
        None => (
            mime_for(extension),
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| Value::String(l.to_string()))
                .collect(),
        ),
    };

    UploadedFile {
        name,
        size: raw.len() as u64,
        file_type: file_type.to_string(),
        content,
        processed: true,
        insights: None,
    }
}

fn mime_for(extension: &str) -> &'static str {
    match extension {
        "csv" => "text/csv",
        "md" => "text/markdown",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_arrays_become_rows() {
        let file = from_text("a.json".into(), "json", r#"[{"x":1},{"x":2}]"#);
        assert_eq!(file.content.len(), 2);
        assert_eq!(file.file_type, "application/json");
    }

    #[test]
    fn text_becomes_one_row_per_line() {
        let file = from_text("notes.csv".into(), "csv", "a,b\n\n1,2\n");
        assert_eq!(file.content, vec![Value::from("a,b"), Value::from("1,2")]);
        assert_eq!(file.file_type, "text/csv");
        assert!(file.processed);
    }

    #[test]
    fn invalid_json_falls_back_to_lines() {
        let file = from_text("broken.json".into(), "json", "{not json\nline two");
        assert_eq!(file.content.len(), 2);
    }
}
