//!
//! CLI для обучения акустической модели DeepSpeech с CTC-loss.

mod args;

use anyhow::{Context, Result};
use candle_core::Device;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use asr_data::DataLoader;
use asr_train::Trainer;

use crate::args::Args;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let device = create_device(args.cuda)?;
    info!("Устройство: {:?}", device);

    let data_config = args.data_config();
    let model_config = args.model_config();
    let trainer_config = args.trainer_config();
    debug!("data: {}", serde_json::to_string(&data_config)?);
    debug!("model: {}", serde_json::to_string(&model_config)?);
    debug!("trainer: {}", serde_json::to_string(&trainer_config)?);

    let mut loader = DataLoader::open(data_config)
        .with_context(|| format!("не удалось открыть {}", args.train_manifest.display()))?;

    let mut trainer = Trainer::new(&model_config, trainer_config, &device)?;
    println!("{}", trainer.model().summary());
    println!("Number of parameters: {}", trainer.model().num_parameters());

    trainer.train(&mut loader)?;

    info!(
        "Обучение завершено: средний loss {:.4} по {} примерам",
        trainer.losses().avg,
        trainer.losses().count
    );
    Ok(())
}

/// CUDA при запросе и наличии, иначе CPU.
fn create_device(cuda: bool) -> Result<Device> {
    if !cuda {
        return Ok(Device::Cpu);
    }
    let device = Device::cuda_if_available(0)?;
    if device.is_cpu() {
        warn!("CUDA недоступна, обучение на CPU");
    }
    Ok(device)
}
