use serde::{Deserialize, Serialize};

/// Separator between the name and the narrative when building corpus text.
pub const FIELD_SEPARATOR: &str = " - ";

/// A retrieval candidate: id, display name and the composite text the encoder sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub name: String,
    pub text: String,
}

impl Document {
    pub fn new(id: u64, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            text: text.into(),
        }
    }

    /// Build a document whose text joins `name` and `narrative` with [`FIELD_SEPARATOR`].
    pub fn from_fields(id: u64, name: &str, narrative: &str) -> Self {
        Self::new(id, name, format!("{}{}{}", name, FIELD_SEPARATOR, narrative))
    }
}

/// Patient record as kept by the clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: u64,
    pub name: String,
    pub age: u32,
    pub history: String,
    pub last_visit: String,
}

impl PatientRecord {
    pub fn to_document(&self) -> Document {
        Document::from_fields(self.id, &self.name, &self.history)
    }
}

/// Convert a slice of patient records into retrieval documents.
pub fn patient_documents(patients: &[PatientRecord]) -> Vec<Document> {
    patients.iter().map(PatientRecord::to_document).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub document: Document,
    pub score: f32,
    /// Index of `document` in the searched corpus.
    pub position: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_document_text() {
        let patient = PatientRecord {
            id: 1,
            name: "Ana Silva".into(),
            age: 32,
            history: "Enxaqueca crônica".into(),
            last_visit: "2023-10-15".into(),
        };
        let doc = patient.to_document();
        assert_eq!(doc.id, 1);
        assert_eq!(doc.name, "Ana Silva");
        assert_eq!(doc.text, "Ana Silva - Enxaqueca crônica");
    }
}
