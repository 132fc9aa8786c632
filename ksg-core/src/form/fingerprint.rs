//! Form fingerprinting (spec §4.4): a deterministic function of
//! `(domain, path, form labels, input types, placeholder text)`. Two
//! pages with cosmetically different DOMs but identical semantic fields
//! collide intentionally; changing any of the listed inputs changes the
//! hash.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The semantic shape of one form, extracted by whatever upstream DOM
/// parser feeds the form engine (an external collaborator, spec §1's
/// "vision-model screenshot parsing" and similar are out of scope —
/// the core only consumes this already-extracted shape).
#[derive(Debug, Clone)]
pub struct FormShape {
    pub domain: String,
    pub path: String,
    pub labels: Vec<String>,
    pub input_types: Vec<String>,
    pub placeholders: Vec<String>,
}

impl FormShape {
    fn canonical(&self) -> String {
        let mut labels = self.labels.iter().map(|s| s.trim().to_lowercase()).collect::<Vec<_>>();
        labels.sort();
        let mut types = self.input_types.iter().map(|s| s.trim().to_lowercase()).collect::<Vec<_>>();
        types.sort();
        let mut placeholders = self.placeholders.iter().map(|s| s.trim().to_lowercase()).collect::<Vec<_>>();
        placeholders.sort();
        format!(
            "{}|{}|{}|{}|{}",
            self.domain.trim().to_lowercase(),
            self.path.trim().to_lowercase(),
            labels.join(","),
            types.join(","),
            placeholders.join(",")
        )
    }
}

/// A stable hash of a form's semantic identity, independent of
/// whitespace/comment differences in the underlying HTML because it only
/// ever sees the already-extracted [`FormShape`] (spec §4.4, testable
/// property 7).
#[must_use]
pub fn fingerprint(shape: &FormShape) -> String {
    let mut hasher = DefaultHasher::new();
    shape.canonical().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
