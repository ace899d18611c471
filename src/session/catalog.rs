// src/session/catalog.rs
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use super::types::ReportedFormat;

/// Identity of a format within one enumeration of the device's formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatId {
    generation: u64,
    index: usize,
    fingerprint: u64,
}

impl FormatId {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub id: FormatId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl FormatDescriptor {
    pub fn label(&self) -> String {
        format!("{}: {}x{}", self.id.index, self.width, self.height)
    }

    pub fn reported(&self) -> ReportedFormat {
        ReportedFormat::new(self.width, self.height, self.frame_rate)
    }
}

/// Formats from the most recent enumeration. Replacing the list bumps the
/// generation so ids handed out earlier stop resolving.
#[derive(Debug, Default)]
pub struct FormatCatalog {
    generation: u64,
    formats: Vec<FormatDescriptor>,
}

impl FormatCatalog {
    pub fn replace(&mut self, reported: &[ReportedFormat]) {
        self.generation += 1;
        let generation = self.generation;
        self.formats = reported
            .iter()
            .enumerate()
            .map(|(index, format)| FormatDescriptor {
                id: FormatId {
                    generation,
                    index,
                    fingerprint: fingerprint(format),
                },
                width: format.width,
                height: format.height,
                frame_rate: format.frame_rate,
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FormatDescriptor> {
        self.formats.get(index)
    }

    pub fn resolve(&self, id: FormatId) -> Option<&FormatDescriptor> {
        if id.generation != self.generation {
            return None;
        }
        self.formats
            .get(id.index)
            .filter(|format| format.id.fingerprint == id.fingerprint)
    }

    /// Finds the format in this generation matching an id from any generation.
    pub fn rematch(&self, id: FormatId) -> Option<&FormatDescriptor> {
        self.formats
            .iter()
            .find(|format| format.id.fingerprint == id.fingerprint)
    }

    /// Format with the largest pixel area; first one wins on ties.
    pub fn largest(&self) -> Option<&FormatDescriptor> {
        self.formats.iter().fold(None, |best, format| match best {
            Some(b) if b.reported().pixel_count() >= format.reported().pixel_count() => Some(b),
            _ => Some(format),
        })
    }

    pub fn labels(&self) -> Vec<String> {
        self.formats.iter().map(FormatDescriptor::label).collect()
    }
}

fn fingerprint(format: &ReportedFormat) -> u64 {
    let mut hasher = DefaultHasher::new();
    format.hash(&mut hasher);
    hasher.finish()
}
