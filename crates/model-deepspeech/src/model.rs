//! DeepSpeech: Conv2d ×2 → LSTM ×N → Linear.
//!
//! Вход: `(batch, 1, freq, time)`. Выход: `(time', batch, num_classes)`,
//! time-major, как ожидает CTC-loss.

use candle_core::{Device, ModuleT, Result, Tensor};
use candle_nn::rnn::{LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear, Module, VarBuilder};
use tracing::debug;

use asr_core::AsrResult;

use crate::config::DeepSpeechConfig;

/// Свёртка + BatchNorm + HardTanh.
struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
    clamp_max: f64,
    kernel: usize,
    stride: usize,
    padding: usize,
}

impl ConvBlock {
    fn new(
        in_channels: usize,
        config: &DeepSpeechConfig,
        stride: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: config.conv_padding(),
            stride,
            dilation: 1,
            groups: 1,
            ..Default::default()
        };
        let conv = candle_nn::conv2d(
            in_channels,
            config.conv_channels,
            config.conv_kernel,
            cfg,
            vb.pp("conv"),
        )?;
        let bn = candle_nn::batch_norm(config.conv_channels, config.bn_eps, vb.pp("bn"))?;
        Ok(Self {
            conv,
            bn,
            clamp_max: config.hardtanh_max,
            kernel: config.conv_kernel,
            stride,
            padding: config.conv_padding(),
        })
    }

    fn output_len(&self, len: usize) -> usize {
        (len + 2 * self.padding).saturating_sub(self.kernel) / self.stride + 1
    }

    /// Zeros needed so that `len + 2p - k` divides by the stride.
    fn alignment_pad(&self, len: usize) -> usize {
        let span = (len + 2 * self.padding).saturating_sub(self.kernel);
        (self.stride - span % self.stride) % self.stride
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_, _, freq, time) = x.dims4()?;
        // Backward страйденной conv2d в Candle возвращает градиент длины
        // `(out - 1) * s - 2p + k`: вход выравнивается нулями до этой длины,
        // лишние выходы отрезаются. Значения совпадают с невыровненной свёрткой,
        // так как добавленные нули лежат в зоне её собственного паддинга.
        let x = x
            .pad_with_zeros(2, 0, self.alignment_pad(freq))?
            .pad_with_zeros(3, 0, self.alignment_pad(time))?;
        let x = self
            .conv
            .forward(&x)?
            .narrow(2, 0, self.output_len(freq))?
            .narrow(3, 0, self.output_len(time))?;
        let x = self.bn.forward_t(&x, train)?;
        x.clamp(0f64, self.clamp_max)
    }
}

/// Акустическая модель DeepSpeech.
pub struct DeepSpeech {
    conv1: ConvBlock,
    conv2: ConvBlock,
    rnns: Vec<LSTM>,
    fc: Linear,
    config: DeepSpeechConfig,
}

impl DeepSpeech {
    /// Создать модель; параметры берутся из `vb` (обычно `VarMap` для обучения).
    pub fn new(config: &DeepSpeechConfig, vb: VarBuilder) -> AsrResult<Self> {
        config.validate()?;

        let conv1 = ConvBlock::new(1, config, config.conv_stride, vb.pp("conv1"))?;
        let conv2 = ConvBlock::new(config.conv_channels, config, 1, vb.pp("conv2"))?;

        let mut rnns = Vec::with_capacity(config.hidden_layers);
        let mut in_dim = config.rnn_input_size();
        for i in 0..config.hidden_layers {
            let rnn = candle_nn::lstm(
                in_dim,
                config.hidden_size,
                LSTMConfig::default(),
                vb.pp(format!("rnn.{i}")),
            )?;
            rnns.push(rnn);
            in_dim = config.hidden_size;
        }

        let fc = candle_nn::linear(config.hidden_size, config.num_classes, vb.pp("fc"))?;

        debug!(
            "DeepSpeech: rnn_input={}, {} LSTM x {}, {} классов",
            config.rnn_input_size(),
            config.hidden_layers,
            config.hidden_size,
            config.num_classes
        );

        Ok(Self {
            conv1,
            conv2,
            rnns,
            fc,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &DeepSpeechConfig {
        &self.config
    }

    /// Начальные состояния LSTM `(hidden, cell)` формы `(layers, batch, hidden)` из N(0, 1).
    pub fn random_state(&self, batch: usize, device: &Device) -> Result<(Tensor, Tensor)> {
        let shape = (self.config.hidden_layers, batch, self.config.hidden_size);
        let hidden = Tensor::randn(0f32, 1f32, shape, device)?;
        let cell = Tensor::randn(0f32, 1f32, shape, device)?;
        Ok((hidden, cell))
    }

    /// Прямой проход.
    ///
    /// * `input`: `(batch, 1, freq, time)`
    /// * `hidden`, `cell`: `(layers, batch, hidden)`
    ///
    /// Возвращает ненормализованные активации `(time', batch, num_classes)`.
    pub fn forward(&self, input: &Tensor, hidden: &Tensor, cell: &Tensor, train: bool) -> Result<Tensor> {
        let x = self.conv1.forward_t(input, train)?;
        let x = self.conv2.forward_t(&x, train)?;

        // (batch, channels, freq', time') → (batch, time', channels * freq')
        let (batch, channels, freq, time) = x.dims4()?;
        let mut x = x
            .reshape((batch, channels * freq, time))?
            .transpose(1, 2)?
            .contiguous()?;

        for (i, rnn) in self.rnns.iter().enumerate() {
            let init = LSTMState::new(hidden.get(i)?.contiguous()?, cell.get(i)?.contiguous()?);
            let states = rnn.seq_init(&x, &init)?;
            x = rnn.states_to_tensor(&states)?;
        }

        let logits = self.fc.forward(&x)?;
        logits.transpose(0, 1)?.contiguous()
    }

    /// Человекочитаемое описание слоёв (аналог `print(model)`).
    pub fn summary(&self) -> String {
        let c = &self.config;
        let mut lines = vec![
            "DeepSpeech(".to_string(),
            format!(
                "  (conv1): Conv2d(1, {ch}, kernel={k}, stride={s}, padding={p}) + BatchNorm2d({ch}) + Hardtanh(0, {m})",
                ch = c.conv_channels,
                k = c.conv_kernel,
                s = c.conv_stride,
                p = c.conv_padding(),
                m = c.hardtanh_max
            ),
            format!(
                "  (conv2): Conv2d({ch}, {ch}, kernel={k}, stride=1, padding={p}) + BatchNorm2d({ch}) + Hardtanh(0, {m})",
                ch = c.conv_channels,
                k = c.conv_kernel,
                p = c.conv_padding(),
                m = c.hardtanh_max
            ),
        ];
        let mut in_dim = c.rnn_input_size();
        for i in 0..c.hidden_layers {
            lines.push(format!("  (rnn.{i}): LSTM({in_dim}, {})", c.hidden_size));
            in_dim = c.hidden_size;
        }
        lines.push(format!("  (fc): Linear({}, {})", c.hidden_size, c.num_classes));
        lines.push(")".to_string());
        lines.join("\n")
    }

    /// Количество обучаемых параметров.
    pub fn num_parameters(&self) -> usize {
        let c = &self.config;
        let k2 = c.conv_kernel * c.conv_kernel;
        let conv1 = c.conv_channels * k2 + c.conv_channels;
        let conv2 = c.conv_channels * c.conv_channels * k2 + c.conv_channels;
        let bn = 2 * 2 * c.conv_channels;

        let mut rnn = 0;
        let mut in_dim = c.rnn_input_size();
        for _ in 0..c.hidden_layers {
            let gates = 4 * c.hidden_size;
            rnn += gates * in_dim + gates * c.hidden_size + 2 * gates;
            in_dim = c.hidden_size;
        }

        let fc = c.hidden_size * c.num_classes + c.num_classes;
        conv1 + conv2 + bn + rnn + fc
    }
}
