//! Манифесты обучающих данных.
//!
//! Формат: по одной записи на строку, `путь_к_аудио,путь_к_транскрипции`.
//! Пустые строки и строки, начинающиеся с `#`, пропускаются. Относительные
//! пути разрешаются относительно директории манифеста.

use std::path::{Path, PathBuf};

use asr_core::{AsrError, AsrResult};

/// Одна обучающая пара.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub audio: PathBuf,
    pub transcript: PathBuf,
}

/// Распарсенный обучающий манифест.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> AsrResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AsrError::Data(format!("Не удалось прочитать манифест {:?}: {e}", path))
        })?;
        Self::parse(&text, base_dir(path))
    }

    pub fn parse(text: &str, base: &Path) -> AsrResult<Self> {
        let mut entries = Vec::new();
        for (lineno, fields) in records(text) {
            match fields.as_slice() {
                [audio, transcript, ..] => entries.push(ManifestEntry {
                    audio: resolve(base, audio),
                    transcript: resolve(base, transcript),
                }),
                _ => {
                    return Err(AsrError::Data(format!(
                        "manifest line {}: expected `audio,transcript`",
                        lineno
                    )))
                }
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Загрузить манифест шумов: путь к аудио в первой колонке.
pub fn load_audio_list(path: impl AsRef<Path>) -> AsrResult<Vec<PathBuf>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        AsrError::Data(format!("Не удалось прочитать манифест шумов {:?}: {e}", path))
    })?;
    let base = base_dir(path);
    Ok(records(&text)
        .map(|(_, fields)| resolve(base, fields[0]))
        .collect())
}

/// Non-empty, non-comment lines with 1-based line numbers, split on commas.
fn records(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        Some((i + 1, line.split(',').map(str::trim).collect()))
    })
}

fn base_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

fn resolve(base: &Path, field: &str) -> PathBuf {
    let p = Path::new(field);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
