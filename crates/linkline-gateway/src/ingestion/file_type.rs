use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::GatewayError;

/// Document formats accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Txt,
    Csv,
    Doc,
    Docx,
    Ppt,
    Pptx,
}

impl FileType {
    pub const ALL: [FileType; 7] = [
        FileType::Pdf,
        FileType::Txt,
        FileType::Csv,
        FileType::Doc,
        FileType::Docx,
        FileType::Ppt,
        FileType::Pptx,
    ];

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "txt" => Some(FileType::Txt),
            "csv" => Some(FileType::Csv),
            "doc" => Some(FileType::Doc),
            "docx" => Some(FileType::Docx),
            "ppt" => Some(FileType::Ppt),
            "pptx" => Some(FileType::Pptx),
            _ => None,
        }
    }

    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Txt => "txt",
            FileType::Csv => "csv",
            FileType::Doc => "doc",
            FileType::Docx => "docx",
            FileType::Ppt => "ppt",
            FileType::Pptx => "pptx",
        }
    }

    /// Comma separated list for error messages.
    pub fn supported_list() -> String {
        Self::ALL.iter().map(FileType::as_str).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| {
            GatewayError::UnsupportedType(format!(
                "'{}' is not supported. Supported types: {}",
                s,
                Self::supported_list()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_filename() {
        assert_eq!(FileType::from_filename("Report.PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_filename("deck.final.pptx"), Some(FileType::Pptx));
        assert_eq!(FileType::from_filename("notes"), None);
        assert_eq!(FileType::from_filename("image.png"), None);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(".docx".parse::<FileType>().unwrap(), FileType::Docx);
        let err = "xlsx".parse::<FileType>().unwrap_err();
        assert!(matches!(err, GatewayError::UnsupportedType(_)));
        assert!(err.to_string().contains("pdf, txt, csv"));
    }

    #[test]
    fn test_round_trip_names() {
        for file_type in FileType::ALL {
            assert_eq!(FileType::from_extension(file_type.as_str()), Some(file_type));
        }
    }
}
