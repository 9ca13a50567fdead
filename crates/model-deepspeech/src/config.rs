//! Конфигурация DeepSpeech.

use asr_core::{AsrError, AsrResult};
use serde::{Deserialize, Serialize};

/// Гиперпараметры модели.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepSpeechConfig {
    /// Количество частотных бинов входной спектрограммы (161).
    pub freq_bins: usize,

    /// Каналы обеих свёрток (32).
    pub conv_channels: usize,

    /// Размер (квадратного) ядра свёрток (11).
    pub conv_kernel: usize,

    /// Шаг первой свёртки (2); вторая свёртка идёт с шагом 1.
    pub conv_stride: usize,

    /// Размер скрытого состояния LSTM (200).
    pub hidden_size: usize,

    /// Количество слоёв LSTM (2).
    pub hidden_layers: usize,

    /// Количество выходных классов, включая blank (29).
    pub num_classes: usize,

    /// Верхняя граница HardTanh (20).
    pub hardtanh_max: f64,

    /// Epsilon для BatchNorm.
    pub bn_eps: f64,
}

impl Default for DeepSpeechConfig {
    fn default() -> Self {
        Self {
            freq_bins: 161,
            conv_channels: 32,
            conv_kernel: 11,
            conv_stride: 2,
            hidden_size: 200,
            hidden_layers: 2,
            num_classes: 29,
            hardtanh_max: 20.0,
            bn_eps: 1e-5,
        }
    }
}

impl DeepSpeechConfig {
    /// Padding that keeps stride-1 convolutions length-preserving.
    pub fn conv_padding(&self) -> usize {
        self.conv_kernel / 2
    }

    /// Длина измерения после первой (страйденной) свёртки.
    pub fn conv_output_len(&self, input_len: usize) -> usize {
        let padded = input_len + 2 * self.conv_padding();
        if padded < self.conv_kernel {
            return 0;
        }
        (padded - self.conv_kernel) / self.conv_stride + 1
    }

    /// Размер входа первого LSTM: каналы × частоты после свёрток.
    pub fn rnn_input_size(&self) -> usize {
        self.conv_channels * self.conv_output_len(self.freq_bins)
    }

    pub fn validate(&self) -> AsrResult<()> {
        if self.hidden_size == 0 || self.hidden_layers == 0 {
            return Err(AsrError::Config(
                "hidden size and hidden layer count must be positive".into(),
            ));
        }
        if self.conv_kernel % 2 == 0 || self.conv_stride == 0 {
            return Err(AsrError::Config(format!(
                "conv kernel {} must be odd and stride {} positive",
                self.conv_kernel, self.conv_stride
            )));
        }
        if self.num_classes < 2 {
            return Err(AsrError::Config("need a blank and at least one class".into()));
        }
        if self.rnn_input_size() == 0 {
            return Err(AsrError::Config(format!(
                "{} frequency bins are too few for the convolution front-end",
                self.freq_bins
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rnn_input() {
        let config = DeepSpeechConfig::default();
        assert_eq!(config.conv_padding(), 5);
        assert_eq!(config.conv_output_len(161), 81);
        assert_eq!(config.rnn_input_size(), 32 * 81);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_time_downsampling() {
        let config = DeepSpeechConfig::default();
        assert_eq!(config.conv_output_len(1499), 750);
        assert_eq!(config.conv_output_len(10), 5);
    }

    #[test]
    fn test_zero_layers_rejected() {
        let config = DeepSpeechConfig {
            hidden_layers: 0,
            ..DeepSpeechConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
