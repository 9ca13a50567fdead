//! Потоковый загрузчик батчей.
//!
//! Транскрипции читаются и кодируются один раз при открытии манифеста;
//! аудио декодируется лениво, по батчу за раз, параллельно через `rayon`.
//! Выдаются только полные батчи, хвост эпохи отбрасывается.

use std::path::PathBuf;
use std::time::Instant;

use asr_core::{AsrError, AsrResult, NoiseConfig, SpectrogramConfig, TranscriptConfig};
use audio::{load_mono, NoiseMixer, SpectrogramExtractor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alphabet::Alphabet;
use crate::batch::{Batch, BatchSource};
use crate::manifest::{load_audio_list, Manifest};

/// Конфигурация загрузчика.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLoaderConfig {
    /// Обучающий манифест.
    pub manifest: PathBuf,

    /// Размер минибатча.
    pub batch_size: usize,

    pub spectrogram: SpectrogramConfig,

    pub transcript: TranscriptConfig,

    pub noise: NoiseConfig,

    /// Перемешивать порядок записей в начале каждой эпохи.
    pub shuffle: bool,

    /// Seed для шума и перемешивания.
    pub seed: u64,
}

impl DataLoaderConfig {
    pub fn validate(&self) -> AsrResult<()> {
        if self.batch_size == 0 {
            return Err(AsrError::Config("batch_size must be positive".into()));
        }
        self.spectrogram.validate()?;
        self.transcript.validate()?;
        self.noise.validate()
    }
}

#[derive(Debug, Clone)]
struct Example {
    audio: PathBuf,
    labels: Vec<u32>,
}

/// Загрузчик батчей из манифеста.
pub struct DataLoader {
    config: DataLoaderConfig,
    extractor: SpectrogramExtractor,
    noise: Option<NoiseMixer>,
    examples: Vec<Example>,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl DataLoader {
    /// Открыть манифест, прочитать транскрипции и (при необходимости) шумы.
    pub fn open(config: DataLoaderConfig) -> AsrResult<Self> {
        config.validate()?;
        let start = Instant::now();

        let alphabet = Alphabet::from_config(&config.transcript)?;
        let manifest = Manifest::load(&config.manifest)?;
        let examples = encode_transcripts(&manifest, &alphabet, config.transcript.max_length)?;

        if examples.len() < config.batch_size {
            return Err(AsrError::Data(format!(
                "{:?}: {} usable entries, fewer than batch size {}",
                config.manifest,
                examples.len(),
                config.batch_size
            )));
        }

        let noise = load_noise(&config.noise, config.spectrogram.sample_rate)?;
        let extractor = SpectrogramExtractor::new(config.spectrogram.clone());
        let order = (0..examples.len()).collect();
        let rng = StdRng::seed_from_u64(config.seed);

        info!(
            "Манифест {:?}: {} записей, {} батчей по {} ({:.2}с)",
            config.manifest,
            examples.len(),
            examples.len() / config.batch_size,
            config.batch_size,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            config,
            extractor,
            noise,
            examples,
            order,
            cursor: 0,
            rng,
        })
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    pub fn num_examples(&self) -> usize {
        self.examples.len()
    }

    /// Load one example into `[freq][max_frames]`, returning its valid frame count.
    fn load_example(&self, example: &Example, seed: u64, out: &mut [f32]) -> AsrResult<usize> {
        let spec_cfg = self.extractor.config();
        let mut buffer = load_mono(&example.audio, spec_cfg.sample_rate)?;
        buffer.truncate(spec_cfg.max_samples());

        if let Some(noise) = &self.noise {
            let mut rng = StdRng::seed_from_u64(seed);
            if let Some(level) = noise.apply(&mut buffer.samples, &mut rng) {
                debug!("шум {:.2} -> {:?}", level, example.audio);
            }
        }

        let spectrogram = self.extractor.extract(&buffer.samples);
        if spectrogram.num_frames() == 0 {
            return Err(AsrError::Data(format!(
                "{:?} is shorter than one spectrogram frame",
                example.audio
            )));
        }
        Ok(spectrogram.write_padded(out, spec_cfg.max_frames()))
    }
}

impl BatchSource for DataLoader {
    fn num_batches(&self) -> usize {
        self.examples.len() / self.config.batch_size
    }

    fn start_epoch(&mut self, epoch: usize) {
        self.cursor = 0;
        if self.config.shuffle {
            self.order.shuffle(&mut self.rng);
            debug!("эпоха {}: порядок записей перемешан", epoch);
        }
    }

    fn next_batch(&mut self) -> AsrResult<Option<Batch>> {
        let batch_size = self.config.batch_size;
        if self.cursor + batch_size > self.order.len() {
            return Ok(None);
        }
        let indices: Vec<usize> = self.order[self.cursor..self.cursor + batch_size].to_vec();
        self.cursor += batch_size;

        let freq_bins = self.config.spectrogram.freq_bins();
        let max_frames = self.config.spectrogram.max_frames();
        let per_example = freq_bins * max_frames;

        // Seeds are drawn in batch order, before the parallel section.
        let seeds: Vec<u64> = indices.iter().map(|_| self.rng.gen()).collect();
        let mut features = vec![0.0f32; batch_size * per_example];

        let this = &*self;
        let frames: Vec<usize> = features
            .par_chunks_mut(per_example)
            .zip(indices.par_iter().zip(seeds.par_iter()))
            .map(|(out, (&idx, &seed))| this.load_example(&this.examples[idx], seed, out))
            .collect::<AsrResult<Vec<_>>>()?;

        let mut targets = Vec::new();
        let mut label_lengths = Vec::with_capacity(batch_size);
        for &idx in &indices {
            let labels = &self.examples[idx].labels;
            targets.extend_from_slice(labels);
            label_lengths.push(labels.len());
        }
        let valid_fractions = frames
            .iter()
            .map(|&f| f as f32 / max_frames as f32)
            .collect();

        Ok(Some(Batch {
            features,
            targets,
            label_lengths,
            valid_fractions,
        }))
    }
}

fn encode_transcripts(
    manifest: &Manifest,
    alphabet: &Alphabet,
    max_length: usize,
) -> AsrResult<Vec<Example>> {
    let mut examples = Vec::with_capacity(manifest.len());
    for entry in &manifest.entries {
        let text = std::fs::read_to_string(&entry.transcript).map_err(|e| {
            AsrError::Data(format!(
                "Не удалось прочитать транскрипцию {:?}: {e}",
                entry.transcript
            ))
        })?;
        let labels = alphabet.encode(text.trim());
        if labels.is_empty() {
            warn!("{:?}: пустая транскрипция, запись пропущена", entry.transcript);
            continue;
        }
        if labels.len() > max_length {
            warn!(
                "{:?}: транскрипция длиной {} превышает {}, запись пропущена",
                entry.transcript,
                labels.len(),
                max_length
            );
            continue;
        }
        examples.push(Example {
            audio: entry.audio.clone(),
            labels,
        });
    }
    Ok(examples)
}

fn load_noise(config: &NoiseConfig, sample_rate: usize) -> AsrResult<Option<NoiseMixer>> {
    let manifest = match &config.manifest {
        Some(path) if config.probability > 0.0 => path,
        _ => return Ok(None),
    };

    let clips = load_audio_list(manifest)?
        .iter()
        .map(|path| load_mono(path, sample_rate))
        .collect::<AsrResult<Vec<_>>>()?;

    let mixer = NoiseMixer::new(clips, config.probability, config.level_min, config.level_max)?;
    if mixer.num_clips() == 0 {
        warn!("Манифест шумов {:?} не содержит непустых записей", manifest);
        return Ok(None);
    }
    info!("Загружено {} шумовых записей из {:?}", mixer.num_clips(), manifest);
    Ok(Some(mixer))
}
